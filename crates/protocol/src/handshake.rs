/// The single line the server sends after reading a connection's token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeReply {
    Success,
    EmptyToken,
    InvalidToken,
    TokenNotFound,
    AlreadyConnected,
    ServerError,
}

impl HandshakeReply {
    pub fn as_line(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::EmptyToken => "empty token",
            Self::InvalidToken => "invalid token",
            Self::TokenNotFound => "token not found",
            Self::AlreadyConnected => "already connected; disconnect the existing session first",
            Self::ServerError => "server-side error",
        }
    }
}

impl std::fmt::Display for HandshakeReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_line())
    }
}
