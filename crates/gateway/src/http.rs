//! HTTP API: five JSON routes over the relay operations plus two info routes.

use std::sync::Arc;

use {
    axum::{
        Router,
        extract::{FromRequest, Request, State, rejection::JsonRejection},
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::{get, post},
    },
    secrecy::ExposeSecret,
    serde::{Serialize, de::DeserializeOwned},
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{debug, error},
};

use overmsg_protocol::{
    ALLOWED_NAME_SYMBOLS, AUTH_TOKEN_HEADER, Answer, CredentialsRequest, ErrorKind,
    PROTOCOL_VERSION, PresenceRequest, PresenceResult, ReasonCode, SendMessageRequest,
    TokenResult,
};

use crate::{auth::parse_bearer, error::RelayError, state::RelayState};

/// Build the HTTP router (shared between production startup and tests).
pub fn build_http_app(state: Arc<RelayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/register", post(register_handler))
        .route("/token", post(token_handler))
        .route("/send_message", post(send_message_handler))
        .route("/go_offline", post(go_offline_handler))
        .route("/is_online", post(is_online_handler))
        .route("/allowed_syms", get(allowed_syms_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ── Errors ───────────────────────────────────────────────────────────────────

pub fn status_for(code: ReasonCode) -> StatusCode {
    match code {
        ReasonCode::NameTooLong | ReasonCode::CredentialTooLong | ReasonCode::BodyTooLong => {
            StatusCode::PAYLOAD_TOO_LARGE
        },
        ReasonCode::DeliveryFailed => StatusCode::BAD_GATEWAY,
        other => match other.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Unavailable => StatusCode::GONE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        if self.is_internal() {
            error!(error = %self, "request failed");
        }
        let code = self.reason();
        (status_for(code), Json(Answer::<()>::err(code))).into_response()
    }
}

impl From<JsonRejection> for RelayError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(%rejection, "request body rejected");
        match rejection {
            JsonRejection::MissingJsonContentType(_) => ReasonCode::UnsupportedContentType.into(),
            _ => ReasonCode::InvalidJson.into(),
        }
    }
}

/// `Json` extractor whose rejections use the relay's error envelope.
pub struct Body<T>(pub T);

impl<S, T> FromRequest<S> for Body<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = RelayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

fn bearer(headers: &HeaderMap) -> Result<uuid::Uuid, RelayError> {
    let raw = headers
        .get(AUTH_TOKEN_HEADER)
        .map(|v| v.to_str().map_err(|_| ReasonCode::TokenInvalid))
        .transpose()?;
    Ok(parse_bearer(raw)?)
}

fn ok<T: Serialize>(status: StatusCode, result: T) -> Response {
    (status, Json(Answer::ok(result))).into_response()
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn register_handler(
    State(state): State<Arc<RelayState>>,
    Body(req): Body<CredentialsRequest>,
) -> Result<Response, RelayError> {
    let token = state
        .create_identity(&req.name, req.pass.expose_secret())
        .await?;
    Ok(ok(StatusCode::CREATED, TokenResult { token }))
}

async fn token_handler(
    State(state): State<Arc<RelayState>>,
    Body(req): Body<CredentialsRequest>,
) -> Result<Response, RelayError> {
    let token = state
        .authenticate(&req.name, req.pass.expose_secret())
        .await?;
    Ok(ok(StatusCode::OK, TokenResult { token }))
}

async fn send_message_handler(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Body(req): Body<SendMessageRequest>,
) -> Result<Response, RelayError> {
    let sender = bearer(&headers)?;
    state
        .send_message(&sender, &req.peer_name, &req.message)
        .await?;
    Ok((StatusCode::OK, Json(Answer::done())).into_response())
}

async fn go_offline_handler(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
) -> Result<Response, RelayError> {
    let token = bearer(&headers)?;
    state.disconnect(&token).await?;
    Ok((StatusCode::OK, Json(Answer::done())).into_response())
}

async fn is_online_handler(
    State(state): State<Arc<RelayState>>,
    Body(req): Body<PresenceRequest>,
) -> Response {
    let online = state.is_online(&req.name).await;
    ok(StatusCode::OK, PresenceResult { online })
}

async fn allowed_syms_handler() -> impl IntoResponse {
    (
        [("content-type", "text/plain; charset=utf-8")],
        ALLOWED_NAME_SYMBOLS,
    )
}

async fn health_handler(State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    let sessions = state.registry.count().await;
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "protocol": PROTOCOL_VERSION,
        "sessions": sessions,
        "store": state.identities.backend(),
    }))
}
