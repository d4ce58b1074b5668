//! Transport connections: `Unauthenticated → Active → Closed`.
//!
//! A connection starts by reading one line, the bearer token. A token that
//! resolves to an identity and wins the registry's `register` race moves the
//! connection to `Active`; anything else gets a single rejection line and the
//! socket is closed. While active the task multiplexes client control lines
//! with commands from the registry (pushes and closes). Whatever ends the
//! active phase, the registry entry is released before the socket is shut
//! down.

use std::{io, net::SocketAddr, sync::Arc};

use {
    futures::StreamExt,
    tokio::{
        io::{AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf},
        sync::mpsc,
    },
    tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError},
    tracing::{debug, info, warn},
    uuid::Uuid,
};

use overmsg_protocol::{CloseReason, HandshakeReply, MAX_LINE_BYTES, PushFrame, control};

use crate::{
    registry::{ConnectionHandle, Outbound},
    state::RelayState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unauthenticated,
    Active,
    Closed,
}

/// An authenticated connection's place in the registry.
struct ActiveSession {
    token: Uuid,
    name: String,
    commands: mpsc::UnboundedReceiver<Outbound>,
}

struct Connection<S> {
    conn_id: Uuid,
    peer: SocketAddr,
    state: ConnectionState,
    lines: FramedRead<tokio::io::ReadHalf<S>, LinesCodec>,
    writer: WriteHalf<S>,
    relay: Arc<RelayState>,
}

/// Drive one accepted transport connection until it is closed.
pub async fn handle_connection<S>(stream: S, peer: SocketAddr, relay: Arc<RelayState>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut conn = Connection {
        conn_id: Uuid::new_v4(),
        peer,
        state: ConnectionState::Unauthenticated,
        lines: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_BYTES)),
        writer,
        relay,
    };
    debug!(conn_id = %conn.conn_id, %peer, "connection accepted");

    match conn.handshake().await {
        Ok(ActiveSession {
            token,
            name,
            commands,
        }) => {
            conn.transition(ConnectionState::Active);
            let reason = conn.run_active(&token, commands).await;
            conn.relay.registry.release(&token, conn.conn_id, reason).await;
            info!(%name, conn_id = %conn.conn_id, %reason, "connection closed");
        },
        Err(Some(reply)) => {
            debug!(conn_id = %conn.conn_id, %peer, %reply, "handshake rejected");
            let _ = conn.write_line(reply.as_line()).await;
        },
        Err(None) => {},
    }

    let write_timeout = conn.relay.settings.write_timeout;
    let _ = tokio::time::timeout(write_timeout, conn.writer.shutdown()).await;
    conn.transition(ConnectionState::Closed);
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn transition(&mut self, next: ConnectionState) {
        debug!(conn_id = %self.conn_id, from = ?self.state, to = ?next, "connection state");
        self.state = next;
    }

    /// Read the token line and try to register a session for it.
    ///
    /// `Err(None)` means the peer went away (or timed out) before sending a
    /// token; there is nobody to answer.
    async fn handshake(&mut self) -> Result<ActiveSession, Option<HandshakeReply>> {
        let timeout = self.relay.settings.handshake_timeout;
        let line = match tokio::time::timeout(timeout, self.lines.next()).await {
            Err(_) => {
                debug!(conn_id = %self.conn_id, "handshake timed out");
                return Err(None);
            },
            Ok(None) => return Err(None),
            Ok(Some(Ok(line))) => line,
            Ok(Some(Err(LinesCodecError::MaxLineLengthExceeded))) => {
                return Err(Some(HandshakeReply::InvalidToken));
            },
            Ok(Some(Err(LinesCodecError::Io(e)))) => {
                warn!(conn_id = %self.conn_id, error = %e, "reading token failed");
                return Err(Some(HandshakeReply::ServerError));
            },
        };

        let raw = line.trim();
        if raw.is_empty() {
            return Err(Some(HandshakeReply::EmptyToken));
        }
        let token = Uuid::parse_str(raw).map_err(|_| Some(HandshakeReply::InvalidToken))?;

        let identity = match self.relay.identities.find_by_token(&token).await {
            Ok(Some(identity)) => identity,
            Ok(None) => return Err(Some(HandshakeReply::TokenNotFound)),
            Err(e) => {
                warn!(conn_id = %self.conn_id, error = %e, "identity lookup failed");
                return Err(Some(HandshakeReply::ServerError));
            },
        };

        let (handle, commands) = ConnectionHandle::new(self.conn_id);
        self.relay
            .registry
            .register(token, &identity.name, handle, Some(self.peer))
            .await
            .map_err(|_| Some(HandshakeReply::AlreadyConnected))?;

        // Anything the router queues meanwhile waits in `commands`, so the
        // acknowledgement is always the first line the client sees.
        if let Err(e) = self.write_line(HandshakeReply::Success.as_line()).await {
            debug!(conn_id = %self.conn_id, error = %e, "acknowledging handshake failed");
            self.relay
                .registry
                .release(&token, self.conn_id, CloseReason::TransportError)
                .await;
            return Err(None);
        }
        info!(name = %identity.name, conn_id = %self.conn_id, peer = %self.peer, "session active");
        Ok(ActiveSession {
            token,
            name: identity.name,
            commands,
        })
    }

    /// Serve an active session. Returns why it ended.
    async fn run_active(
        &mut self,
        token: &Uuid,
        mut commands: mpsc::UnboundedReceiver<Outbound>,
    ) -> CloseReason {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Outbound::Push { line, done }) => {
                        let result = self.write_line(&line).await;
                        let failed = result.is_err();
                        let _ = done.send(result);
                        if failed {
                            return CloseReason::WriteFailed;
                        }
                    },
                    Some(Outbound::Close { reason }) => {
                        self.write_closed_notice(reason).await;
                        return reason;
                    },
                    // Handle dropped without a close command.
                    None => return CloseReason::Shutdown,
                },
                line = self.lines.next() => match line {
                    Some(Ok(line)) => match line.trim() {
                        control::PING => {
                            self.relay.registry.touch(token).await;
                            if self.write_line(control::PONG).await.is_err() {
                                return CloseReason::WriteFailed;
                            }
                        },
                        control::DISCONNECT => {
                            self.write_closed_notice(CloseReason::ClientDisconnect).await;
                            return CloseReason::ClientDisconnect;
                        },
                        "" => {},
                        other => debug!(conn_id = %self.conn_id, line = other, "ignoring line"),
                    },
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        debug!(conn_id = %self.conn_id, "ignoring over-long line");
                    },
                    Some(Err(LinesCodecError::Io(e))) => {
                        debug!(conn_id = %self.conn_id, error = %e, "read failed");
                        return CloseReason::TransportError;
                    },
                    None => return CloseReason::TransportError,
                },
            }
        }
    }

    /// Best-effort final frame, bounded like every other write.
    async fn write_closed_notice(&mut self, reason: CloseReason) {
        if let Ok(line) = (PushFrame::Closed { reason }).to_line() {
            let _ = self.write_line(&line).await;
        }
    }

    /// Write one line, bounded by the write timeout. A peer that stops
    /// reading must not pin the task; expiry surfaces as `TimedOut`.
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        let limit = self.relay.settings.write_timeout;
        let writer = &mut self.writer;
        let write = async {
            writer.write_all(buf.as_bytes()).await?;
            writer.flush().await
        };
        tokio::time::timeout(limit, write)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write timed out"))?
    }
}
