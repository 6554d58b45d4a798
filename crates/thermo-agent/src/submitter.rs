//! Telemetry submitter: pushes one batch of readings through the session.
//!
//! Per-sensor failures are logged and counted, never raised. A batch that
//! mostly fails, or that finds the transport dead, marks the session
//! degraded so the run loop reconnects.

use std::sync::Arc;

use thermo_core::NodeId;
use thermo_protocol::SensorReading;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::session::{SessionLease, SessionManager};

/// Failures above this count (and above the success count) degrade the session.
pub const DEGRADED_FAILURE_FLOOR: usize = 3;

/// Tally of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub success_count: usize,
    pub failure_count: usize,
    /// Readings held back by the minimum-change filter
    pub skipped_count: usize,
    /// A write found the transport session dead
    pub session_lost: bool,
}

impl BatchOutcome {
    /// True when failures outnumber successes and exceed the floor.
    pub fn is_degraded(&self) -> bool {
        self.failure_count > self.success_count && self.failure_count > DEGRADED_FAILURE_FLOOR
    }

    /// True when the session should be replaced before the next batch.
    pub fn needs_reconnect(&self) -> bool {
        self.session_lost || self.is_degraded()
    }
}

enum Submitted {
    Written,
    Skipped,
}

pub struct TelemetrySubmitter {
    session: Arc<SessionManager>,
    /// 0 sends every reading
    min_change: f64,
}

impl TelemetrySubmitter {
    pub fn new(session: Arc<SessionManager>, min_change: f64) -> Self {
        Self {
            session,
            min_change,
        }
    }

    /// Submits `readings` and signals the session manager when the batch
    /// is mostly failures or the session is gone.
    pub async fn submit_batch(&self, readings: &[SensorReading]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        let Some(lease) = self.session.lease().await else {
            outcome.failure_count = readings.len();
            if !readings.is_empty() {
                warn!(count = readings.len(), "Not connected, batch dropped");
            }
            return outcome;
        };

        for reading in readings {
            match self.submit_one(&lease, reading).await {
                Ok(Submitted::Written) => outcome.success_count += 1,
                Ok(Submitted::Skipped) => outcome.skipped_count += 1,
                Err(e) => {
                    warn!(
                        sensor = %reading.key.display_name(),
                        error = %e,
                        "Failed to submit reading"
                    );
                    outcome.failure_count += 1;
                    outcome.session_lost |= e.is_session_lost();
                }
            }
        }

        debug!(
            written = outcome.success_count,
            failed = outcome.failure_count,
            skipped = outcome.skipped_count,
            generation = lease.generation(),
            "Batch submitted"
        );

        if outcome.needs_reconnect() {
            self.session.mark_degraded().await;
        }
        outcome
    }

    async fn submit_one(
        &self,
        lease: &SessionLease,
        reading: &SensorReading,
    ) -> Result<Submitted, TransportError> {
        let generation = lease.generation();
        let node_id = NodeId::derive(&reading.key);
        let cache = self.session.cache();

        let cached = cache.lock().await.get(generation, node_id);
        let handle = match cached {
            Some(node) => {
                if let Some(last) = node.last_sent {
                    if (reading.temperature - last).abs() < self.min_change {
                        return Ok(Submitted::Skipped);
                    }
                }
                node.handle
            }
            None => {
                let handle = lease
                    .get_or_create_node(reading.key, &reading.metadata)
                    .await?;
                if handle != node_id {
                    warn!(
                        sensor = %reading.key.display_name(),
                        derived = %node_id,
                        server = %handle,
                        "Server handle differs from derived node id"
                    );
                }
                cache.lock().await.insert(generation, node_id, handle);
                handle
            }
        };

        lease
            .write(handle, reading.key, reading.temperature, &reading.metadata)
            .await?;
        cache
            .lock()
            .await
            .record_sent(generation, node_id, reading.temperature);
        Ok(Submitted::Written)
    }
}
