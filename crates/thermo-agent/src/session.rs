//! Session manager: owns the one live transport session.
//!
//! State machine:
//!
//! ```text
//!   Disconnected --connect()--> Connecting --ok--> Connected
//!        ^                          |                  |
//!        +------ failure, wait -----+   high failure ratio or lost transport
//!                                   |                  v
//!              attempts exhausted   v              Degraded --reconnect()--> Connecting
//!                                 Fatal
//! ```
//!
//! Retries are an explicit bounded loop. The wait between attempts
//! observes the cancellation token, so shutdown never waits out a
//! backoff. Each successful connect bumps the session generation and
//! empties the shared node cache.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Lock order is always `inner` before the node cache

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thermo_core::{NodeId, SensorKey, SensorMetadata};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::SharedNodeCache;
use crate::error::{SessionError, TransportError};
use crate::transport::{ConnectOptions, Transport, TransportSession};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    /// Connected, but the last batch mostly failed or found the transport dead
    Degraded,
    /// Reconnect attempts exhausted. Terminal.
    Fatal,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Degraded => "degraded",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Session manager settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub server_url: String,
    pub namespace_uri: String,
    pub client_id: Option<String>,
    pub connection_timeout: Duration,
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub reconnect_attempts: u32,
    pub last_error: Option<String>,
    pub generation: u64,
}

/// Borrowed access to the live session at a given generation.
///
/// Once the manager replaces or closes the session every call fails fast
/// with `TransportError::SessionClosed`.
#[derive(Clone)]
pub struct SessionLease {
    generation: u64,
    session: Arc<dyn TransportSession>,
    closed: Arc<AtomicBool>,
}

impl SessionLease {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            Err(TransportError::SessionClosed)
        } else {
            Ok(())
        }
    }

    pub async fn get_or_create_node(
        &self,
        key: SensorKey,
        metadata: &SensorMetadata,
    ) -> Result<NodeId, TransportError> {
        self.check_open()?;
        self.session.get_or_create_node(key, metadata).await
    }

    pub async fn write(
        &self,
        handle: NodeId,
        key: SensorKey,
        value: f64,
        metadata: &SensorMetadata,
    ) -> Result<(), TransportError> {
        self.check_open()?;
        self.session.write(handle, key, value, metadata).await
    }

    pub async fn read(&self, handle: NodeId) -> Result<f64, TransportError> {
        self.check_open()?;
        self.session.read(handle).await
    }
}

struct Inner {
    state: SessionState,
    reconnect_attempts: u32,
    last_error: Option<String>,
    generation: u64,
    live: Option<SessionLease>,
}

impl Inner {
    fn fatal_error(&self) -> SessionError {
        SessionError::Fatal {
            attempts: self.reconnect_attempts,
            last_error: self.last_error.clone().unwrap_or_default(),
        }
    }
}

/// Owns the connect/reconnect lifecycle of one transport session.
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    cache: SharedNodeCache,
    cancel_token: CancellationToken,
    /// Serializes connect, reconnect and close
    lifecycle: Mutex<()>,
    inner: Mutex<Inner>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        cache: SharedNodeCache,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            transport,
            config,
            cache,
            cancel_token,
            lifecycle: Mutex::new(()),
            inner: Mutex::new(Inner {
                state: SessionState::Disconnected,
                reconnect_attempts: 0,
                last_error: None,
                generation: 0,
                live: None,
            }),
        }
    }

    pub fn cache(&self) -> &SharedNodeCache {
        &self.cache
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn status(&self) -> SessionStatus {
        let inner = self.inner.lock().await;
        SessionStatus {
            state: inner.state,
            reconnect_attempts: inner.reconnect_attempts,
            last_error: inner.last_error.clone(),
            generation: inner.generation,
        }
    }

    /// The live session, if connected (or degraded).
    pub async fn lease(&self) -> Option<SessionLease> {
        let inner = self.inner.lock().await;
        match inner.state {
            SessionState::Connected | SessionState::Degraded => inner.live.clone(),
            _ => None,
        }
    }

    /// Connects if not already connected.
    ///
    /// Returns `SessionError::Fatal` once attempts are exhausted, and on
    /// every later call without trying again.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let _lifecycle = self.lifecycle.lock().await;
        {
            let inner = self.inner.lock().await;
            match inner.state {
                SessionState::Fatal => return Err(inner.fatal_error()),
                SessionState::Connected | SessionState::Degraded if inner.live.is_some() => {
                    return Ok(())
                }
                _ => {}
            }
        }
        self.connect_loop().await
    }

    /// Tears down the live session, then connects again.
    ///
    /// Safe to call repeatedly.
    pub async fn reconnect(&self) -> Result<(), SessionError> {
        let _lifecycle = self.lifecycle.lock().await;
        {
            let inner = self.inner.lock().await;
            if inner.state == SessionState::Fatal {
                return Err(inner.fatal_error());
            }
        }
        info!("Reconnecting");
        self.teardown().await;
        self.connect_loop().await
    }

    /// Releases the live session. Used at shutdown.
    pub async fn close(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.teardown().await;
        debug!("Session closed");
    }

    /// Connected -> Degraded. Returns true if the state changed.
    pub async fn mark_degraded(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Connected {
            return false;
        }
        inner.state = SessionState::Degraded;
        warn!(generation = inner.generation, "Session degraded");
        true
    }

    /// Bounded retry loop. Caller holds the lifecycle lock.
    async fn connect_loop(&self) -> Result<(), SessionError> {
        let options = ConnectOptions {
            namespace_uri: self.config.namespace_uri.clone(),
            client_id: self.config.client_id.clone(),
            timeout: self.config.connection_timeout,
        };

        loop {
            if self.cancel_token.is_cancelled() {
                self.set_state(SessionState::Disconnected).await;
                return Err(SessionError::Cancelled);
            }
            self.set_state(SessionState::Connecting).await;
            debug!(url = %self.config.server_url, "Connecting");

            let attempt = tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    self.set_state(SessionState::Disconnected).await;
                    return Err(SessionError::Cancelled);
                }

                result = timeout(
                    self.config.connection_timeout,
                    self.transport.connect(&self.config.server_url, &options),
                ) => result,
            };
            let result = attempt.unwrap_or(Err(TransportError::Timeout {
                after: self.config.connection_timeout,
            }));

            match result {
                Ok(session) => {
                    self.install(Arc::from(session)).await;
                    return Ok(());
                }
                Err(e) => {
                    let mut inner = self.inner.lock().await;
                    inner.reconnect_attempts = inner.reconnect_attempts.saturating_add(1);
                    inner.last_error = Some(e.to_string());

                    if inner.reconnect_attempts >= self.config.max_reconnect_attempts {
                        inner.state = SessionState::Fatal;
                        error!(
                            attempts = inner.reconnect_attempts,
                            error = %e,
                            "Reconnect attempts exhausted"
                        );
                        return Err(inner.fatal_error());
                    }

                    inner.state = SessionState::Disconnected;
                    warn!(
                        attempt = inner.reconnect_attempts,
                        max = self.config.max_reconnect_attempts,
                        error = %e,
                        retry_in = ?self.config.reconnect_interval,
                        "Connect failed"
                    );
                }
            }

            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    return Err(SessionError::Cancelled);
                }

                _ = sleep(self.config.reconnect_interval) => {}
            }
        }
    }

    async fn install(&self, session: Arc<dyn TransportSession>) {
        let mut inner = self.inner.lock().await;
        inner.generation += 1;
        inner.reconnect_attempts = 0;
        inner.last_error = None;
        inner.state = SessionState::Connected;
        inner.live = Some(SessionLease {
            generation: inner.generation,
            session,
            closed: Arc::new(AtomicBool::new(false)),
        });
        self.cache.lock().await.invalidate(inner.generation);
        info!(generation = inner.generation, url = %self.config.server_url, "Connected");
    }

    /// Marks the live session closed, then closes it.
    async fn teardown(&self) {
        let live = {
            let mut inner = self.inner.lock().await;
            if inner.state != SessionState::Fatal {
                inner.state = SessionState::Disconnected;
            }
            inner.live.take()
        };
        let Some(live) = live else {
            return;
        };

        live.closed.store(true, Ordering::Release);
        match timeout(self.config.connection_timeout, live.session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(generation = live.generation, error = %e, "Error closing session"),
            Err(_) => debug!(generation = live.generation, "Timed out closing session"),
        }
    }

    async fn set_state(&self, state: SessionState) {
        self.inner.lock().await.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NodeCache;
    use crate::testing::MockTransport;
    use std::sync::atomic::Ordering;
    use thermo_core::{HardwareType, Location};

    fn config(max_attempts: u32) -> SessionConfig {
        SessionConfig {
            server_url: "opc.tcp://localhost:4840/".to_string(),
            namespace_uri: thermo_protocol::DEFAULT_NAMESPACE_URI.to_string(),
            client_id: None,
            connection_timeout: Duration::from_secs(10),
            reconnect_interval: Duration::from_secs(5),
            max_reconnect_attempts: max_attempts,
        }
    }

    fn manager(transport: Arc<MockTransport>, max_attempts: u32) -> SessionManager {
        SessionManager::new(
            transport,
            config(max_attempts),
            NodeCache::shared(),
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_fatal_and_bounded() {
        let transport = MockTransport::always_failing();
        let session = manager(transport.clone(), 5);

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Fatal { attempts: 5, .. }));
        assert_eq!(transport.connect_attempts.load(Ordering::SeqCst), 5);
        assert_eq!(session.state().await, SessionState::Fatal);

        // Fatal is terminal: no further attempts.
        assert!(session.connect().await.is_err());
        assert!(session.reconnect().await.is_err());
        assert_eq!(transport.connect_attempts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_reset_on_success() {
        let transport = MockTransport::failing(2);
        let session = manager(transport.clone(), 5);

        let started = tokio::time::Instant::now();
        session.connect().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(10));

        let status = session.status().await;
        assert_eq!(status.state, SessionState::Connected);
        assert_eq!(status.reconnect_attempts, 0);
        assert_eq!(status.last_error, None);
        assert_eq!(status.generation, 1);
        assert_eq!(transport.connect_attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_counts_as_failure() {
        let transport = MockTransport::hanging();
        let session = manager(transport, 2);

        match session.connect().await {
            Err(SessionError::Fatal {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("Timed out"));
            }
            other => panic!("Expected Fatal, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let transport = MockTransport::always_failing();
        let cancel = CancellationToken::new();
        let session = Arc::new(SessionManager::new(
            transport.clone(),
            SessionConfig {
                reconnect_interval: Duration::from_secs(3600),
                ..config(100)
            },
            NodeCache::shared(),
            cancel.clone(),
        ));

        let task = {
            let session = session.clone();
            tokio::spawn(async move { session.connect().await })
        };
        sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        assert_eq!(task.await.unwrap(), Err(SessionError::Cancelled));
        assert_eq!(transport.connect_attempts.load(Ordering::SeqCst), 1);
        assert_ne!(session.state().await, SessionState::Fatal);
    }

    #[tokio::test]
    async fn test_degraded_only_from_connected() {
        let transport = MockTransport::failing(0);
        let session = manager(transport, 3);

        assert!(!session.mark_degraded().await);
        session.connect().await.unwrap();
        assert!(session.mark_degraded().await);
        assert_eq!(session.state().await, SessionState::Degraded);
        assert!(!session.mark_degraded().await);

        // Still usable while degraded.
        assert!(session.lease().await.is_some());
    }

    #[tokio::test]
    async fn test_reconnect_replaces_session() {
        let transport = MockTransport::failing(0);
        let session = manager(transport.clone(), 3);
        let key = SensorKey::new(Location::new(1, 101, 1), HardwareType::CPU, 0);
        let node = NodeId::derive(&key);

        session.connect().await.unwrap();
        let old = session.lease().await.unwrap();
        session.cache().lock().await.insert(old.generation(), node, node);

        session.mark_degraded().await;
        session.reconnect().await.unwrap();
        session.reconnect().await.unwrap();

        let status = session.status().await;
        assert_eq!(status.state, SessionState::Connected);
        assert_eq!(status.generation, 3);
        assert!(session.cache().lock().await.is_empty());
        assert_eq!(transport.closes.load(Ordering::SeqCst), 2);

        // Writes through the replaced session fail fast.
        assert!(old.is_closed());
        assert_eq!(
            old.write(node, key, 40.0, &SensorMetadata::unknown("core")).await,
            Err(TransportError::SessionClosed)
        );
        assert!(transport.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_releases_session() {
        let transport = MockTransport::failing(0);
        let session = manager(transport.clone(), 3);

        session.connect().await.unwrap();
        session.close().await;
        session.close().await;

        assert_eq!(session.state().await, SessionState::Disconnected);
        assert!(session.lease().await.is_none());
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
    }
}
