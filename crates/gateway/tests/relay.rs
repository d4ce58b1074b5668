//! End-to-end tests: HTTP API and transport listener on loopback ports,
//! backed by the in-memory identity store.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    serde_json::{Value, json},
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
        net::{
            TcpListener, TcpStream,
            tcp::{OwnedReadHalf, OwnedWriteHalf},
        },
    },
    uuid::Uuid,
};

use {
    overmsg_gateway::{RelayState, SessionSettings, http::build_http_app, serve_tcp},
    overmsg_identity::{IdentityStore, MemoryIdentityStore},
    overmsg_protocol::AUTH_TOKEN_HEADER,
};

struct Relay {
    state: Arc<RelayState>,
    http: String,
    tcp: SocketAddr,
    client: reqwest::Client,
}

impl Relay {
    async fn start(settings: SessionSettings) -> Self {
        let store: Arc<dyn IdentityStore> = Arc::new(MemoryIdentityStore::new());
        let state = RelayState::new(store, settings);

        let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let http_addr = http_listener.local_addr().unwrap();
        let app = build_http_app(Arc::clone(&state));
        tokio::spawn(async move {
            axum::serve(http_listener, app).await.unwrap();
        });

        let tcp_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let tcp = tcp_listener.local_addr().unwrap();
        tokio::spawn(serve_tcp(tcp_listener, Arc::clone(&state)));
        overmsg_gateway::sweep::spawn_idle_sweep(Arc::clone(&state));

        Self {
            state,
            http: format!("http://{http_addr}"),
            tcp,
            client: reqwest::Client::new(),
        }
    }

    async fn with_defaults() -> Self {
        Self::start(SessionSettings::default()).await
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}{path}", self.http))
            .json(&body)
            .send()
            .await
            .unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn post_authed(&self, path: &str, token: &Uuid, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}{path}", self.http))
            .header(AUTH_TOKEN_HEADER, token.to_string())
            .json(&body)
            .send()
            .await
            .unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn register(&self, name: &str, pass: &str) -> Uuid {
        let (status, body) = self
            .post("/register", json!({ "name": name, "pass": pass }))
            .await;
        assert_eq!(status, 201, "{body}");
        body["result"]["token"].as_str().unwrap().parse().unwrap()
    }

    async fn online(&self, name: &str) -> bool {
        let (status, body) = self.post("/is_online", json!({ "name": name })).await;
        assert_eq!(status, 200);
        body["result"]["online"].as_bool().unwrap()
    }

    async fn connect(&self) -> Conn {
        let stream = TcpStream::connect(self.tcp).await.unwrap();
        let (reader, writer) = stream.into_split();
        Conn {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    /// Connect and complete the handshake.
    async fn session(&self, token: &Uuid) -> Conn {
        let mut conn = self.connect().await;
        conn.send(&token.to_string()).await;
        assert_eq!(conn.recv().await.as_deref(), Some("success"));
        conn
    }
}

struct Conn {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Conn {
    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    /// Next line, or `None` once the server closed the connection.
    async fn recv(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("no line within 5s")
            .ok()
            .flatten()
    }

    async fn recv_json(&mut self) -> Value {
        serde_json::from_str(&self.recv().await.unwrap()).unwrap()
    }
}

fn code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap()
}

#[tokio::test]
async fn register_then_token_round_trip() {
    let relay = Relay::with_defaults().await;
    let token = relay.register("alice", "hunter2").await;

    let (status, body) = relay
        .post("/token", json!({ "name": "alice", "pass": "hunter2" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["error"], Value::Null);
    assert_eq!(body["result"]["token"], token.to_string());

    let (status, body) = relay
        .post("/token", json!({ "name": "alice", "pass": "wrong" }))
        .await;
    assert_eq!(status, 401);
    assert_eq!(code(&body), "wrong_credential");

    let (status, body) = relay
        .post("/register", json!({ "name": "alice", "pass": "again" }))
        .await;
    assert_eq!(status, 409);
    assert_eq!(code(&body), "name_taken");
}

#[tokio::test]
async fn register_validates_names() {
    let relay = Relay::with_defaults().await;
    let cases = [
        ("abc", 400, "name_too_short"),
        ("a234567890123456789012345678901234", 413, "name_too_long"),
        ("bob@home", 400, "name_disallowed_characters"),
        ("_abc", 400, "name_leading_underscore"),
    ];
    for (name, status, expected) in cases {
        let (got, body) = relay
            .post("/register", json!({ "name": name, "pass": "pw" }))
            .await;
        assert_eq!(got, status, "{name}");
        assert_eq!(code(&body), expected, "{name}");
    }
}

#[tokio::test]
async fn message_reaches_recipient_socket() {
    let relay = Relay::with_defaults().await;
    let alice = relay.register("alice", "pw").await;
    let bobby = relay.register("bobby", "pw").await;
    let _a = relay.session(&alice).await;
    let mut b = relay.session(&bobby).await;

    let (status, body) = relay
        .post_authed(
            "/send_message",
            &alice,
            json!({ "peer_name": "bobby", "message": "hello there" }),
        )
        .await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["success"], true);

    assert_eq!(
        b.recv_json().await,
        json!({ "kind": "message", "from": "alice", "to": "bobby", "body": "hello there" })
    );
}

#[tokio::test]
async fn send_failures_are_distinguished() {
    let relay = Relay::with_defaults().await;
    let alice = relay.register("alice", "pw").await;
    relay.register("bobby", "pw").await;

    // No live session for the sender yet.
    let (status, body) = relay
        .post_authed("/send_message", &alice, json!({ "peer_name": "bobby", "message": "hi" }))
        .await;
    assert_eq!(status, 401);
    assert_eq!(code(&body), "sender_unauthenticated");

    let _a = relay.session(&alice).await;
    let cases = [
        (json!({ "peer_name": "bobby", "message": "hi" }), 410, "recipient_offline"),
        (json!({ "peer_name": "carol", "message": "hi" }), 404, "recipient_unknown"),
        (
            json!({ "peer_name": "bobby", "message": "x".repeat(1025) }),
            413,
            "body_too_long",
        ),
        (json!({ "peer_name": "bobby", "message": "" }), 400, "body_empty"),
    ];
    for (req, status, expected) in cases {
        let (got, body) = relay.post_authed("/send_message", &alice, req).await;
        assert_eq!(got, status, "{body}");
        assert_eq!(code(&body), expected);
    }
}

#[tokio::test]
async fn bearer_and_body_rejections() {
    let relay = Relay::with_defaults().await;

    let (status, body) = relay
        .post("/send_message", json!({ "peer_name": "bobby", "message": "hi" }))
        .await;
    assert_eq!(status, 401);
    assert_eq!(code(&body), "missing_token");

    let resp = relay
        .client
        .post(format!("{}/register", relay.http))
        .header("content-type", "text/plain")
        .body(r#"{"name":"alice","pass":"pw"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(code(&body), "unsupported_content_type");

    let resp = relay
        .client
        .post(format!("{}/register", relay.http))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(code(&body), "invalid_json");
}

#[tokio::test]
async fn concurrent_handshakes_admit_exactly_one() {
    let relay = Relay::with_defaults().await;
    let token = relay.register("alice", "pw").await;

    let mut first = relay.connect().await;
    let mut second = relay.connect().await;
    let line = token.to_string();
    tokio::join!(first.send(&line), second.send(&line));
    let (a, b) = tokio::join!(first.recv(), second.recv());
    let mut replies = [a.unwrap(), b.unwrap()];
    replies.sort();
    assert_eq!(replies, [
        "already connected; disconnect the existing session first".to_string(),
        "success".to_string(),
    ]);
    assert_eq!(relay.state.registry.count().await, 1);
}

#[tokio::test]
async fn go_offline_frees_the_token() {
    let relay = Relay::with_defaults().await;
    let token = relay.register("alice", "pw").await;
    let mut conn = relay.session(&token).await;
    assert!(relay.online("alice").await);

    let (status, _) = relay.post_authed("/go_offline", &token, json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(
        conn.recv_json().await,
        json!({ "kind": "closed", "reason": "api_disconnect" })
    );
    assert_eq!(conn.recv().await, None);
    assert!(!relay.online("alice").await);

    let (status, body) = relay.post_authed("/go_offline", &token, json!({})).await;
    assert_eq!(status, 404);
    assert_eq!(code(&body), "session_not_found");

    let _again = relay.session(&token).await;
    assert!(relay.online("alice").await);
}

#[tokio::test]
async fn idle_session_is_swept() {
    let relay = Relay::start(SessionSettings {
        idle_timeout: Duration::from_millis(300),
        sweep_interval: Duration::from_millis(50),
        ..SessionSettings::default()
    })
    .await;
    let token = relay.register("alice", "pw").await;
    let mut conn = relay.session(&token).await;

    assert_eq!(
        conn.recv_json().await,
        json!({ "kind": "closed", "reason": "idle_timeout" })
    );
    assert_eq!(conn.recv().await, None);
    assert!(!relay.online("alice").await);
}

#[tokio::test]
async fn ping_keeps_session_alive() {
    let relay = Relay::start(SessionSettings {
        idle_timeout: Duration::from_millis(400),
        sweep_interval: Duration::from_millis(50),
        ..SessionSettings::default()
    })
    .await;
    let token = relay.register("alice", "pw").await;
    let mut conn = relay.session(&token).await;

    for _ in 0..6 {
        tokio::time::sleep(Duration::from_millis(150)).await;
        conn.send("ping").await;
        assert_eq!(conn.recv().await.as_deref(), Some("pong"));
    }
    assert!(relay.online("alice").await);
}

#[tokio::test]
async fn handshake_rejections() {
    let relay = Relay::with_defaults().await;
    let unknown = Uuid::new_v4().to_string();
    for (line, reply) in [
        ("", "empty token"),
        ("not-a-token", "invalid token"),
        (unknown.as_str(), "token not found"),
    ] {
        let mut conn = relay.connect().await;
        conn.send(line).await;
        assert_eq!(conn.recv().await.as_deref(), Some(reply));
        assert_eq!(conn.recv().await, None);
    }
}

#[tokio::test]
async fn info_routes() {
    let relay = Relay::with_defaults().await;
    let syms = relay
        .client
        .get(format!("{}/allowed_syms", relay.http))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(syms, overmsg_protocol::ALLOWED_NAME_SYMBOLS);

    let token = relay.register("alice", "pw").await;
    let _conn = relay.session(&token).await;
    let health: Value = relay
        .client
        .get(format!("{}/health", relay.http))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["sessions"], 1);
    assert_eq!(health["store"], "memory");
}
