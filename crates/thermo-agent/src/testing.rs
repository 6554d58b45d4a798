//! In-memory transport for unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thermo_core::{NodeId, SensorKey, SensorMetadata};

use crate::error::TransportError;
use crate::transport::{ConnectOptions, Transport, TransportSession};

const ALWAYS: u32 = u32::MAX;

pub(crate) struct MockTransport {
    /// Connect failures left before the first success
    failures_left: AtomicU32,
    hang: AtomicBool,
    pub connect_attempts: AtomicU32,
    /// Sensor indices whose writes fail
    pub failing_indexes: Arc<Mutex<HashSet<u32>>>,
    pub writes: Arc<Mutex<Vec<(NodeId, f64)>>>,
    pub resolves: Arc<AtomicU32>,
    pub closes: Arc<AtomicU32>,
    /// Liveness flag of every session handed out
    sessions: Mutex<Vec<Arc<AtomicBool>>>,
}

impl MockTransport {
    pub fn failing(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicU32::new(failures),
            hang: AtomicBool::new(false),
            connect_attempts: AtomicU32::new(0),
            failing_indexes: Arc::new(Mutex::new(HashSet::new())),
            writes: Arc::new(Mutex::new(Vec::new())),
            resolves: Arc::new(AtomicU32::new(0)),
            closes: Arc::new(AtomicU32::new(0)),
            sessions: Mutex::new(Vec::new()),
        })
    }

    pub fn always_failing() -> Arc<Self> {
        Self::failing(ALWAYS)
    }

    /// Connect attempts never complete.
    pub fn hanging() -> Arc<Self> {
        let transport = Self::failing(0);
        transport.hang.store(true, Ordering::SeqCst);
        transport
    }

    pub fn fail_writes_for(&self, indexes: impl IntoIterator<Item = u32>) {
        self.failing_indexes.lock().unwrap().extend(indexes);
    }

    /// Kills every session opened so far, as if the server went away.
    pub fn drop_sessions(&self) {
        for lost in self.sessions.lock().unwrap().iter() {
            lost.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        _url: &str,
        _options: &ConnectOptions,
    ) -> Result<Box<dyn TransportSession>, TransportError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            if left != ALWAYS {
                self.failures_left.store(left - 1, Ordering::SeqCst);
            }
            return Err(TransportError::Connect {
                endpoint: "mock".to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let lost = Arc::new(AtomicBool::new(false));
        self.sessions.lock().unwrap().push(lost.clone());

        Ok(Box::new(MockSession {
            lost,
            failing_indexes: self.failing_indexes.clone(),
            writes: self.writes.clone(),
            resolves: self.resolves.clone(),
            closes: self.closes.clone(),
        }))
    }
}

struct MockSession {
    lost: Arc<AtomicBool>,
    failing_indexes: Arc<Mutex<HashSet<u32>>>,
    writes: Arc<Mutex<Vec<(NodeId, f64)>>>,
    resolves: Arc<AtomicU32>,
    closes: Arc<AtomicU32>,
}

impl MockSession {
    fn check_alive(&self) -> Result<(), TransportError> {
        if self.lost.load(Ordering::SeqCst) {
            Err(TransportError::Io("connection reset by peer".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TransportSession for MockSession {
    async fn get_or_create_node(
        &self,
        key: SensorKey,
        _metadata: &SensorMetadata,
    ) -> Result<NodeId, TransportError> {
        self.check_alive()?;
        self.resolves.fetch_add(1, Ordering::SeqCst);
        Ok(NodeId::derive(&key))
    }

    async fn write(
        &self,
        handle: NodeId,
        key: SensorKey,
        value: f64,
        _metadata: &SensorMetadata,
    ) -> Result<(), TransportError> {
        self.check_alive()?;
        if self.failing_indexes.lock().unwrap().contains(&key.sensor_index) {
            return Err(TransportError::Server {
                message: "write refused".to_string(),
                code: Some("internal".to_string()),
            });
        }
        self.writes.lock().unwrap().push((handle, value));
        Ok(())
    }

    async fn read(&self, handle: NodeId) -> Result<f64, TransportError> {
        self.check_alive()?;
        self.writes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _)| *id == handle)
            .map(|(_, value)| *value)
            .ok_or(TransportError::Server {
                message: "not found".to_string(),
                code: Some("not_found".to_string()),
            })
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
