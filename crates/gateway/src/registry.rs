//! The session registry: the single source of truth for who is online.
//!
//! Every entry owns the handle of exactly one live transport connection.
//! All reads and writes go through one mutex, so `register`, `remove` and
//! the lookups are linearizable with respect to each other. Removing an
//! entry closes its connection inside the same critical section: no caller
//! can observe a removed session whose connection is still writable, nor a
//! closed connection that is still listed.

use std::{collections::HashMap, io, net::SocketAddr, time::Duration};

use {
    tokio::{
        sync::{Mutex, mpsc, oneshot},
        time::Instant,
    },
    tracing::{debug, info},
    uuid::Uuid,
};

use overmsg_protocol::CloseReason;

// ── Connection handle ────────────────────────────────────────────────────────

/// Commands consumed by a connection's task.
#[derive(Debug)]
pub enum Outbound {
    /// Write one line; the outcome of the write is reported on `done`.
    Push {
        line: String,
        done: oneshot::Sender<io::Result<()>>,
    },
    /// Send a final notice and shut the transport down.
    Close { reason: CloseReason },
}

/// Owning handle to one live transport connection.
///
/// Dropping the handle (or calling [`close`](Self::close)) ends the
/// connection task, which releases the socket and interrupts any pending read.
#[derive(Debug)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    /// Create a handle plus the command stream its connection task drains.
    pub fn new(conn_id: Uuid) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { conn_id, tx }, rx)
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Queue a line. The receiver resolves once the connection task has
    /// attempted the write, or errors if the task is already gone.
    fn push(&self, line: String) -> oneshot::Receiver<io::Result<()>> {
        let (done, rx) = oneshot::channel();
        // A send error drops `done`, which the caller sees as a failed write.
        let _ = self.tx.send(Outbound::Push { line, done });
        rx
    }

    fn close(self, reason: CloseReason) {
        let _ = self.tx.send(Outbound::Close { reason });
    }
}

// ── Sessions ─────────────────────────────────────────────────────────────────

struct SessionEntry {
    display_name: String,
    conn: ConnectionHandle,
    peer: Option<SocketAddr>,
    connected_at: Instant,
    last_activity: Instant,
}

impl SessionEntry {
    fn info(&self, token: Uuid) -> SessionInfo {
        SessionInfo {
            token,
            display_name: self.display_name.clone(),
            conn_id: self.conn.conn_id(),
            peer: self.peer,
            connected_at: self.connected_at,
            last_activity: self.last_activity,
        }
    }
}

/// Snapshot of a session. Never exposes the connection itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub token: Uuid,
    pub display_name: String,
    pub conn_id: Uuid,
    pub peer: Option<SocketAddr>,
    pub connected_at: Instant,
    pub last_activity: Instant,
}

/// A write handed to a recipient's connection, awaited outside the lock.
#[derive(Debug)]
pub struct PendingWrite {
    pub token: Uuid,
    pub conn_id: Uuid,
    pub done: oneshot::Receiver<io::Result<()>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("a session already exists for this token")]
pub struct AlreadyConnected;

#[derive(Default)]
struct Table {
    by_token: HashMap<Uuid, SessionEntry>,
    /// display name → token
    by_name: HashMap<String, Uuid>,
}

impl Table {
    fn take(&mut self, token: &Uuid) -> Option<(SessionInfo, ConnectionHandle)> {
        let entry = self.by_token.remove(token)?;
        self.by_name.remove(&entry.display_name);
        let info = entry.info(*token);
        Some((info, entry.conn))
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Token → live session table.
#[derive(Default)]
pub struct SessionRegistry {
    table: Mutex<Table>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session for `token`. Exactly one of any number of concurrent
    /// registrations for the same token succeeds.
    pub async fn register(
        &self,
        token: Uuid,
        display_name: &str,
        conn: ConnectionHandle,
        peer: Option<SocketAddr>,
    ) -> Result<(), AlreadyConnected> {
        let mut table = self.table.lock().await;
        if table.by_token.contains_key(&token) || table.by_name.contains_key(display_name) {
            return Err(AlreadyConnected);
        }
        let now = Instant::now();
        let conn_id = conn.conn_id();
        table.by_name.insert(display_name.to_string(), token);
        table.by_token.insert(token, SessionEntry {
            display_name: display_name.to_string(),
            conn,
            peer,
            connected_at: now,
            last_activity: now,
        });
        debug!(name = display_name, %conn_id, "session registered");
        Ok(())
    }

    pub async fn lookup_by_token(&self, token: &Uuid) -> Option<SessionInfo> {
        let table = self.table.lock().await;
        table.by_token.get(token).map(|e| e.info(*token))
    }

    pub async fn lookup_by_name(&self, display_name: &str) -> Option<SessionInfo> {
        let table = self.table.lock().await;
        let token = table.by_name.get(display_name)?;
        table.by_token.get(token).map(|e| e.info(*token))
    }

    /// Presence: whether `lookup_by_name` finds a live session.
    pub async fn is_online(&self, display_name: &str) -> bool {
        self.lookup_by_name(display_name).await.is_some()
    }

    /// Close the session's connection and drop the entry. Removing an absent
    /// token is a no-op and returns `None`.
    pub async fn remove(&self, token: &Uuid, reason: CloseReason) -> Option<SessionInfo> {
        let mut table = self.table.lock().await;
        let (info, conn) = table.take(token)?;
        conn.close(reason);
        info!(name = %info.display_name, conn_id = %info.conn_id, %reason, "session closed");
        Some(info)
    }

    /// Like [`remove`](Self::remove), but only if the live session still
    /// belongs to `conn_id`. A connection tearing itself down must not remove
    /// a newer session that re-used its token.
    pub async fn release(&self, token: &Uuid, conn_id: Uuid, reason: CloseReason) -> bool {
        let mut table = self.table.lock().await;
        match table.by_token.get(token) {
            Some(entry) if entry.conn.conn_id() == conn_id => {},
            _ => return false,
        }
        let Some((info, conn)) = table.take(token) else {
            return false;
        };
        conn.close(reason);
        info!(name = %info.display_name, %conn_id, %reason, "session released");
        true
    }

    /// Refresh `last_activity`. Returns false if no session exists.
    pub async fn touch(&self, token: &Uuid) -> bool {
        let mut table = self.table.lock().await;
        match table.by_token.get_mut(token) {
            Some(entry) => {
                entry.last_activity = Instant::now();
                true
            },
            None => false,
        }
    }

    /// Remove every session idle for longer than `threshold`.
    pub async fn evict_idle(&self, threshold: Duration) -> Vec<SessionInfo> {
        let now = Instant::now();
        let mut table = self.table.lock().await;
        let expired: Vec<Uuid> = table
            .by_token
            .iter()
            .filter(|(_, e)| now.duration_since(e.last_activity) > threshold)
            .map(|(token, _)| *token)
            .collect();

        let mut evicted = Vec::with_capacity(expired.len());
        for token in expired {
            if let Some((info, conn)) = table.take(&token) {
                conn.close(CloseReason::IdleTimeout);
                evicted.push(info);
            }
        }
        evicted
    }

    /// Hand one line to the live connection of `display_name`.
    pub async fn push(&self, display_name: &str, line: String) -> Option<PendingWrite> {
        let table = self.table.lock().await;
        let token = *table.by_name.get(display_name)?;
        let entry = table.by_token.get(&token)?;
        Some(PendingWrite {
            token,
            conn_id: entry.conn.conn_id(),
            done: entry.conn.push(line),
        })
    }

    /// Close every session. Returns how many were open.
    pub async fn close_all(&self, reason: CloseReason) -> usize {
        let mut table = self.table.lock().await;
        table.by_name.clear();
        let entries: Vec<_> = table.by_token.drain().collect();
        let count = entries.len();
        for (_, entry) in entries {
            entry.conn.close(reason);
        }
        count
    }

    pub async fn count(&self) -> usize {
        self.table.lock().await.by_token.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn conn() -> (ConnectionHandle, mpsc::UnboundedReceiver<Outbound>) {
        ConnectionHandle::new(Uuid::new_v4())
    }

    fn expect_close(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> CloseReason {
        match rx.try_recv() {
            Ok(Outbound::Close { reason }) => reason,
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn register_and_lookup() {
        let reg = SessionRegistry::new();
        let token = Uuid::new_v4();
        let (c, _rx) = conn();
        let conn_id = c.conn_id();
        reg.register(token, "alice", c, None).await.unwrap();

        let by_token = reg.lookup_by_token(&token).await.unwrap();
        assert_eq!(by_token.display_name, "alice");
        assert_eq!(by_token.conn_id, conn_id);
        assert_eq!(reg.lookup_by_name("alice").await, Some(by_token));
        assert!(reg.is_online("alice").await);
        assert!(reg.lookup_by_name("bobby").await.is_none());
        assert_eq!(reg.count().await, 1);
    }

    #[tokio::test]
    async fn presence_tracks_name_lookup() {
        let reg = SessionRegistry::new();
        let token = Uuid::new_v4();
        let (c, _rx) = conn();
        reg.register(token, "alice", c, None).await.unwrap();
        assert!(reg.is_online("alice").await);

        reg.remove(&token, CloseReason::ApiDisconnect).await;
        assert!(reg.lookup_by_name("alice").await.is_none());
        assert!(!reg.is_online("alice").await);
    }

    #[tokio::test]
    async fn second_register_is_already_connected() {
        let reg = SessionRegistry::new();
        let token = Uuid::new_v4();
        let (first, _rx1) = conn();
        let (second, _rx2) = conn();
        let first_id = first.conn_id();
        reg.register(token, "alice", first, None).await.unwrap();
        assert_eq!(
            reg.register(token, "alice", second, None).await,
            Err(AlreadyConnected)
        );
        assert_eq!(reg.lookup_by_token(&token).await.unwrap().conn_id, first_id);
    }

    #[tokio::test]
    async fn concurrent_registers_admit_exactly_one() {
        let reg = Arc::new(SessionRegistry::new());
        let token = Uuid::new_v4();
        let mut tasks = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..32 {
            let (c, rx) = conn();
            receivers.push(rx);
            let reg = Arc::clone(&reg);
            tasks.push(tokio::spawn(async move {
                reg.register(token, "alice", c, None).await
            }));
        }
        let mut ok = 0;
        for t in tasks {
            if t.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(reg.count().await, 1);
    }

    #[tokio::test]
    async fn remove_closes_connection_and_is_idempotent() {
        let reg = SessionRegistry::new();
        let token = Uuid::new_v4();
        let (c, mut rx) = conn();
        reg.register(token, "alice", c, None).await.unwrap();

        let removed = reg.remove(&token, CloseReason::ApiDisconnect).await;
        assert_eq!(removed.map(|s| s.display_name).as_deref(), Some("alice"));
        assert_eq!(expect_close(&mut rx), CloseReason::ApiDisconnect);
        // The handle was dropped together with the entry.
        assert!(rx.recv().await.is_none());
        assert!(!reg.is_online("alice").await);

        assert!(reg.remove(&token, CloseReason::ApiDisconnect).await.is_none());
    }

    #[tokio::test]
    async fn token_can_register_again_after_remove() {
        let reg = SessionRegistry::new();
        let token = Uuid::new_v4();
        let (c1, _rx1) = conn();
        let (c2, _rx2) = conn();
        reg.register(token, "alice", c1, None).await.unwrap();
        reg.remove(&token, CloseReason::ClientDisconnect).await;
        reg.register(token, "alice", c2, None).await.unwrap();
        assert!(reg.is_online("alice").await);
    }

    #[tokio::test]
    async fn release_ignores_stale_connection() {
        let reg = SessionRegistry::new();
        let token = Uuid::new_v4();
        let (old, _old_rx) = conn();
        let old_id = old.conn_id();
        reg.register(token, "alice", old, None).await.unwrap();
        reg.remove(&token, CloseReason::ApiDisconnect).await;

        let (new, mut new_rx) = conn();
        let new_id = new.conn_id();
        reg.register(token, "alice", new, None).await.unwrap();

        assert!(!reg.release(&token, old_id, CloseReason::TransportError).await);
        assert!(reg.is_online("alice").await);

        assert!(reg.release(&token, new_id, CloseReason::TransportError).await);
        assert_eq!(expect_close(&mut new_rx), CloseReason::TransportError);
        assert!(!reg.is_online("alice").await);
    }

    #[tokio::test(start_paused = true)]
    async fn evict_idle_respects_touch() {
        let reg = SessionRegistry::new();
        let (idle_token, busy_token) = (Uuid::new_v4(), Uuid::new_v4());
        let (idle, mut idle_rx) = conn();
        let (busy, mut busy_rx) = conn();
        reg.register(idle_token, "idler", idle, None).await.unwrap();
        reg.register(busy_token, "busybee", busy, None).await.unwrap();

        tokio::time::advance(Duration::from_secs(90)).await;
        assert!(reg.touch(&busy_token).await);
        tokio::time::advance(Duration::from_secs(31)).await;

        let evicted = reg.evict_idle(Duration::from_secs(120)).await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].token, idle_token);
        assert_eq!(expect_close(&mut idle_rx), CloseReason::IdleTimeout);
        assert!(busy_rx.try_recv().is_err());
        assert!(reg.is_online("busybee").await);
        assert!(!reg.is_online("idler").await);
    }

    #[tokio::test]
    async fn touch_unknown_token_is_false() {
        let reg = SessionRegistry::new();
        assert!(!reg.touch(&Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn push_reaches_connection() {
        let reg = SessionRegistry::new();
        let token = Uuid::new_v4();
        let (c, mut rx) = conn();
        reg.register(token, "alice", c, None).await.unwrap();

        let pending = reg.push("alice", "hello".into()).await.unwrap();
        assert_eq!(pending.token, token);
        match rx.try_recv() {
            Ok(Outbound::Push { line, done }) => {
                assert_eq!(line, "hello");
                done.send(Ok(())).unwrap();
            },
            other => panic!("expected push, got {other:?}"),
        }
        assert!(pending.done.await.unwrap().is_ok());
        assert!(reg.push("bobby", "x".into()).await.is_none());
    }

    #[tokio::test]
    async fn push_to_dead_task_fails() {
        let reg = SessionRegistry::new();
        let (c, rx) = conn();
        reg.register(Uuid::new_v4(), "alice", c, None).await.unwrap();
        drop(rx);
        let pending = reg.push("alice", "hello".into()).await.unwrap();
        assert!(pending.done.await.is_err());
    }

    #[tokio::test]
    async fn close_all_empties_table() {
        let reg = SessionRegistry::new();
        let (a, mut a_rx) = conn();
        let (b, mut b_rx) = conn();
        reg.register(Uuid::new_v4(), "alice", a, None).await.unwrap();
        reg.register(Uuid::new_v4(), "bobby", b, None).await.unwrap();
        assert_eq!(reg.count().await, 2);

        assert_eq!(reg.close_all(CloseReason::Shutdown).await, 2);
        assert_eq!(expect_close(&mut a_rx), CloseReason::Shutdown);
        assert_eq!(expect_close(&mut b_rx), CloseReason::Shutdown);
        assert_eq!(reg.count().await, 0);
    }
}
