use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use {
    tokio::net::TcpListener,
    tracing::{debug, info, warn},
};

use {
    overmsg_config::{OvermsgConfig, StorageBackend},
    overmsg_identity::{IdentityStore, MemoryIdentityStore, SqliteIdentityStore},
    overmsg_protocol::{CloseReason, PROTOCOL_VERSION},
};

use crate::{
    connection::handle_connection,
    http::build_http_app,
    state::{RelayState, SessionSettings},
    sweep::spawn_idle_sweep,
};

// ── Transport listener ───────────────────────────────────────────────────────

/// Accept transport connections forever, one task per connection.
pub async fn serve_tcp(listener: TcpListener, state: Arc<RelayState>) {
    let mut failures = 0u32;
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => {
                failures = 0;
                accepted
            },
            Err(e) => {
                // Accept errors (ECONNABORTED, EMFILE) must not stop the listener,
                // nor spin it while the condition lasts.
                failures = failures.saturating_add(1);
                let pause = accept_backoff(failures);
                warn!(error = %e, retry_in_ms = pause.as_millis() as u64, "accept failed");
                tokio::time::sleep(pause).await;
                continue;
            },
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "set_nodelay failed");
        }
        tokio::spawn(handle_connection(stream, peer, Arc::clone(&state)));
    }
}

/// Pause before retrying after `failures` consecutive accept errors:
/// 10ms doubling up to one second.
fn accept_backoff(failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(7);
    Duration::from_millis(10u64 << exp).min(Duration::from_secs(1))
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Listener address for `bind` (IPv4 or IPv6 literal) and `port`.
pub fn listen_addr(bind: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let ip: IpAddr = bind
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address {bind:?}: {e}"))?;
    Ok(SocketAddr::from((ip, port)))
}

/// Open the identity store selected by config.
pub async fn open_identity_store(config: &OvermsgConfig) -> anyhow::Result<Arc<dyn IdentityStore>> {
    let store: Arc<dyn IdentityStore> = match config.storage.backend {
        StorageBackend::Sqlite => {
            // The default database lives in the data dir, which may not exist yet.
            let data_dir = overmsg_config::data_dir();
            if let Err(e) = std::fs::create_dir_all(&data_dir) {
                warn!(path = %data_dir.display(), error = %e, "cannot create data dir");
            }
            Arc::new(SqliteIdentityStore::connect(&config.storage.database_url).await?)
        },
        StorageBackend::Memory => Arc::new(MemoryIdentityStore::new()),
    };
    Ok(store)
}

/// Start the relay: HTTP API plus transport listener, until Ctrl-C.
pub async fn start_relay(config: &OvermsgConfig) -> anyhow::Result<()> {
    config.validate()?;

    let identities = open_identity_store(config).await?;
    let state = RelayState::new(identities, SessionSettings::from(&config.sessions));

    let http_addr = listen_addr(&config.server.bind, config.server.http_port)?;
    let tcp_addr = listen_addr(&config.server.bind, config.server.tcp_port)?;
    let http_listener = TcpListener::bind(http_addr).await?;
    let tcp_listener = TcpListener::bind(tcp_addr).await?;

    // Startup banner.
    let lines = [
        format!("overmsg relay v{}", state.version),
        format!("protocol v{PROTOCOL_VERSION}"),
        format!("http api on {http_addr}"),
        format!("transport on {tcp_addr}"),
        format!("identity store: {}", state.identities.backend()),
        format!(
            "idle timeout {}s, sweep every {}s",
            state.settings.idle_timeout.as_secs(),
            state.settings.sweep_interval.as_secs()
        ),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    let sweeper = spawn_idle_sweep(Arc::clone(&state));
    let transport = tokio::spawn(serve_tcp(tcp_listener, Arc::clone(&state)));

    let app = build_http_app(Arc::clone(&state));
    let result = axum::serve(
        http_listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    transport.abort();
    sweeper.abort();
    let closed = state.registry.close_all(CloseReason::Shutdown).await;
    info!(closed, "relay stopped");
    result?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
