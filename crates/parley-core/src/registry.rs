//! SessionRegistry - the single source of truth for live sessions.
//!
//! The registry owns the user→[`Session`] map, mediates which session
//! each transport connection is attached to, and reclaims abandoned
//! sessions on a periodic sweep. It is constructed once at process start
//! and injected wherever it is needed; there is no module-level global.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::config::RegistryConfig;
use crate::runtime::AgentRuntime;
use crate::session::{Connection, ConnectionId, Session};

struct SessionEntry {
    session: Arc<Session>,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct RegistryInner {
    /// Live sessions, keyed by the raw (unsanitized) user id.
    sessions: HashMap<String, SessionEntry>,
    /// Which session each connection is currently attached to.
    connections: HashMap<ConnectionId, String>,
}

/// Owns all live sessions for the process.
pub struct SessionRegistry {
    config: RegistryConfig,
    runtime: Arc<dyn AgentRuntime>,
    inner: Mutex<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig, runtime: Arc<dyn AgentRuntime>) -> Self {
        Self {
            config,
            runtime,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Return the live session for `user_id`, creating one if none exists.
    pub fn get_or_create(&self, user_id: &str) -> Arc<Session> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.sessions.get(user_id) {
            return Arc::clone(&entry.session);
        }

        log::info!("creating session for user {}", user_id);
        let session = Arc::new(Session::new(
            user_id,
            &self.config.sessions_root,
            Arc::clone(&self.runtime),
        ));
        inner.sessions.insert(
            user_id.to_string(),
            SessionEntry {
                session: Arc::clone(&session),
                created_at: Utc::now(),
            },
        );
        session
    }

    /// Look up the live session for a user without creating one.
    pub fn session_for(&self, user_id: &str) -> Option<Arc<Session>> {
        let inner = self.inner.lock().unwrap();
        inner.sessions.get(user_id).map(|e| Arc::clone(&e.session))
    }

    /// When the registry first saw this user, if their session is live.
    pub fn created_at(&self, user_id: &str) -> Option<DateTime<Utc>> {
        let inner = self.inner.lock().unwrap();
        inner.sessions.get(user_id).map(|e| e.created_at)
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().unwrap().sessions.len()
    }

    /// Attach a connection to a session.
    ///
    /// A connection belongs to at most one session at a time: if it was
    /// previously attached elsewhere it is detached there first.
    pub fn attach_connection(&self, connection: Arc<dyn Connection>, session: &Arc<Session>) {
        let previous = {
            let mut inner = self.inner.lock().unwrap();
            let previous = inner
                .connections
                .insert(connection.id(), session.user_id().to_string());
            previous
                .filter(|user| user != session.user_id())
                .and_then(|user| inner.sessions.get(&user).map(|e| Arc::clone(&e.session)))
        };
        if let Some(old) = previous {
            old.detach(connection.id());
        }
        session.attach(connection);
    }

    /// Detach a connection from whatever session it is attached to.
    pub fn detach_connection(&self, connection_id: ConnectionId) {
        let session = {
            let mut inner = self.inner.lock().unwrap();
            inner
                .connections
                .remove(&connection_id)
                .and_then(|user| inner.sessions.get(&user).map(|e| Arc::clone(&e.session)))
        };
        if let Some(session) = session {
            session.detach(connection_id);
        }
    }

    /// Evict sessions that are idle past the threshold, have no attached
    /// connections, and are not busy. All three guards must hold: long
    /// idle alone may just be an open-but-quiet tab, and a busy session
    /// mid-stream must survive even with zero connections.
    pub fn sweep(&self) {
        let mut inner = self.inner.lock().unwrap();
        let expired: Vec<String> = inner
            .sessions
            .iter()
            .filter(|(_, entry)| {
                let session = &entry.session;
                session.idle_for() > self.config.idle_threshold
                    && !session.has_connections()
                    && !session.is_busy()
            })
            .map(|(user, _)| user.clone())
            .collect();

        for user in expired {
            if let Some(entry) = inner.sessions.remove(&user) {
                // Busy may have flipped true between the check and the
                // removal; interrupt covers that race and never blocks.
                entry.session.interrupt();
                log::info!("evicted idle session for user {}", user);
            }
        }
    }

    /// Interrupt every live session and clear the registry. Called at
    /// process termination so no in-flight call is silently abandoned.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().unwrap();
        for entry in inner.sessions.values() {
            entry.session.interrupt();
        }
        inner.sessions.clear();
        inner.connections.clear();
        log::info!("session registry shut down");
    }

    /// Run [`SessionRegistry::sweep`] on the configured interval until the
    /// returned task is aborted.
    pub fn spawn_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = self;
        let period = registry.config.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately; skip it so a fresh process
            // does not sweep before anything happened.
            interval.tick().await;
            loop {
                interval.tick().await;
                registry.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::Outbound;
    use crate::runtime::{EventReceiver, RuntimeError, RuntimeRequest};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct IdleRuntime;

    impl AgentRuntime for IdleRuntime {
        fn start(&self, _request: RuntimeRequest) -> Result<EventReceiver, RuntimeError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
    }

    /// Runtime whose calls stay in flight until released.
    struct PendingRuntime {
        senders: Mutex<Vec<mpsc::Sender<Result<crate::runtime::RuntimeEvent, RuntimeError>>>>,
    }

    impl PendingRuntime {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                senders: Mutex::new(Vec::new()),
            })
        }

        fn release(&self) {
            self.senders.lock().unwrap().clear();
        }
    }

    impl AgentRuntime for PendingRuntime {
        fn start(&self, _request: RuntimeRequest) -> Result<EventReceiver, RuntimeError> {
            let (tx, rx) = mpsc::channel(1);
            self.senders.lock().unwrap().push(tx);
            Ok(rx)
        }
    }

    struct NullConnection {
        id: ConnectionId,
        open: AtomicBool,
    }

    impl NullConnection {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: ConnectionId::new(),
                open: AtomicBool::new(true),
            })
        }
    }

    impl Connection for NullConnection {
        fn id(&self) -> ConnectionId {
            self.id
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        fn send(&self, _message: &Outbound) -> bool {
            true
        }
    }

    fn make_registry(idle_threshold: Duration) -> (Arc<SessionRegistry>, tempfile::TempDir) {
        let root = tempfile::tempdir().unwrap();
        let config = RegistryConfig::new(root.path())
            .idle_threshold(idle_threshold)
            .sweep_interval(Duration::from_millis(10));
        let registry = Arc::new(SessionRegistry::new(config, Arc::new(IdleRuntime)));
        (registry, root)
    }

    mod lookup {
        use super::*;

        #[test]
        fn get_or_create_reuses_the_session() {
            let (registry, _root) = make_registry(Duration::from_secs(3600));
            let a = registry.get_or_create("alice");
            let b = registry.get_or_create("alice");
            assert!(Arc::ptr_eq(&a, &b));
            assert_eq!(registry.session_count(), 1);
        }

        #[test]
        fn distinct_users_get_distinct_sessions() {
            let (registry, root) = make_registry(Duration::from_secs(3600));
            let a = registry.get_or_create("alice");
            let b = registry.get_or_create("bob");
            assert!(!Arc::ptr_eq(&a, &b));
            assert_ne!(a.home_dir(), b.home_dir());
            assert!(a.home_dir().starts_with(root.path()));
        }

        #[test]
        fn session_for_does_not_create() {
            let (registry, _root) = make_registry(Duration::from_secs(3600));
            assert!(registry.session_for("alice").is_none());
            registry.get_or_create("alice");
            assert!(registry.session_for("alice").is_some());
            assert!(registry.created_at("alice").is_some());
        }
    }

    mod connections {
        use super::*;

        #[test]
        fn attach_binds_connection_to_session() {
            let (registry, _root) = make_registry(Duration::from_secs(3600));
            let session = registry.get_or_create("alice");
            let conn = NullConnection::new();

            registry.attach_connection(conn.clone(), &session);
            assert!(session.has_connections());

            registry.detach_connection(conn.id());
            assert!(!session.has_connections());
        }

        #[test]
        fn attach_moves_connection_between_sessions() {
            let (registry, _root) = make_registry(Duration::from_secs(3600));
            let alice = registry.get_or_create("alice");
            let bob = registry.get_or_create("bob");
            let conn = NullConnection::new();

            registry.attach_connection(conn.clone(), &alice);
            registry.attach_connection(conn.clone(), &bob);

            assert!(!alice.has_connections());
            assert!(bob.has_connections());
        }

        #[test]
        fn detach_unknown_connection_is_harmless() {
            let (registry, _root) = make_registry(Duration::from_secs(3600));
            registry.detach_connection(ConnectionId::new());
        }
    }

    mod sweep {
        use super::*;

        #[tokio::test]
        async fn evicts_idle_unattached_sessions() {
            let (registry, _root) = make_registry(Duration::ZERO);
            registry.get_or_create("alice");
            tokio::time::sleep(Duration::from_millis(30)).await;

            registry.sweep();
            assert_eq!(registry.session_count(), 0);
        }

        #[tokio::test]
        async fn retains_sessions_with_connections() {
            let (registry, _root) = make_registry(Duration::ZERO);
            let session = registry.get_or_create("alice");
            registry.attach_connection(NullConnection::new(), &session);
            tokio::time::sleep(Duration::from_millis(30)).await;

            registry.sweep();
            assert_eq!(registry.session_count(), 1);
        }

        #[tokio::test]
        async fn retains_busy_sessions_even_without_connections() {
            let root = tempfile::tempdir().unwrap();
            let runtime = PendingRuntime::new();
            let config = RegistryConfig::new(root.path()).idle_threshold(Duration::ZERO);
            let registry = Arc::new(SessionRegistry::new(config, runtime.clone()));

            let session = registry.get_or_create("alice");
            let inflight = {
                let session = Arc::clone(&session);
                tokio::spawn(async move { session.submit("hello".to_string()).await })
            };
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert!(session.is_busy());

            registry.sweep();
            assert_eq!(registry.session_count(), 1);

            runtime.release();
            inflight.await.unwrap();
        }

        #[test]
        fn retains_fresh_sessions() {
            let (registry, _root) = make_registry(Duration::from_secs(3600));
            registry.get_or_create("alice");
            registry.sweep();
            assert_eq!(registry.session_count(), 1);
        }

        #[tokio::test]
        async fn sweeper_task_evicts_on_schedule() {
            let (registry, _root) = make_registry(Duration::ZERO);
            registry.get_or_create("alice");

            let sweeper = Arc::clone(&registry).spawn_sweeper();
            tokio::time::sleep(Duration::from_millis(80)).await;
            assert_eq!(registry.session_count(), 0);
            sweeper.abort();
        }
    }

    mod shutdown {
        use super::*;

        #[tokio::test]
        async fn shutdown_interrupts_in_flight_work() {
            let root = tempfile::tempdir().unwrap();
            let runtime = PendingRuntime::new();
            let config = RegistryConfig::new(root.path());
            let registry = Arc::new(SessionRegistry::new(config, runtime.clone()));

            let session = registry.get_or_create("alice");
            let inflight = {
                let session = Arc::clone(&session);
                tokio::spawn(async move { session.submit("hello".to_string()).await })
            };
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert!(session.is_busy());

            registry.shutdown();
            assert_eq!(registry.session_count(), 0);
            assert!(!session.is_busy());

            runtime.release();
            inflight.await.unwrap();
        }
    }
}
