//! Submission loop: probe, validate, submit, repeat.

use std::sync::Arc;

use thermo_protocol::SensorReading;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::NodeCache;
use crate::config::AgentConfig;
use crate::error::SessionError;
use crate::probe::SensorProbe;
use crate::session::{SessionManager, SessionState};
use crate::submitter::{BatchOutcome, TelemetrySubmitter};
use crate::transport::Transport;

/// One producer machine's agent.
pub struct Agent<P> {
    config: AgentConfig,
    probe: P,
    session: Arc<SessionManager>,
    submitter: TelemetrySubmitter,
    cancel_token: CancellationToken,
}

impl<P: SensorProbe> Agent<P> {
    pub fn new(
        config: AgentConfig,
        probe: P,
        transport: Arc<dyn Transport>,
        cancel_token: CancellationToken,
    ) -> Self {
        let session = Arc::new(SessionManager::new(
            transport,
            config.session_config(),
            NodeCache::shared(),
            cancel_token.clone(),
        ));
        let submitter = TelemetrySubmitter::new(session.clone(), config.min_temperature_change);
        Self {
            config,
            probe,
            session,
            submitter,
            cancel_token,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Enumerates the probe and keeps the readings that validate.
    pub fn collect(&mut self) -> Vec<SensorReading> {
        let location = self.config.location;
        self.probe
            .enumerate_sensors()
            .into_iter()
            .filter_map(|raw| match raw.to_reading(location) {
                Ok(reading) => Some(reading),
                Err(e) => {
                    warn!(sensor = %raw.sensor_name, error = %e, "Skipping invalid reading");
                    None
                }
            })
            .collect()
    }

    /// Makes sure a session is up, then submits one batch.
    pub async fn tick(&mut self) -> Result<BatchOutcome, SessionError> {
        match self.session.state().await {
            SessionState::Degraded => self.session.reconnect().await?,
            SessionState::Disconnected | SessionState::Connecting | SessionState::Fatal => {
                self.session.connect().await?
            }
            SessionState::Connected => {}
        }

        let readings = self.collect();
        let outcome = self.submitter.submit_batch(&readings).await;
        info!(
            location = %self.config.location,
            written = outcome.success_count,
            failed = outcome.failure_count,
            skipped = outcome.skipped_count,
            "Submitted readings"
        );
        Ok(outcome)
    }

    /// Runs until cancelled, or until the session goes fatal.
    pub async fn run(mut self) -> Result<(), SessionError> {
        let mut ticker = interval(self.config.update_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            location = %self.config.location,
            server = %self.config.server_url,
            every = ?self.config.update_interval(),
            "Agent started"
        );

        let result = loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => break Ok(()),

                _ = ticker.tick() => match self.tick().await {
                    Ok(_) => {}
                    Err(SessionError::Cancelled) => break Ok(()),
                    Err(e) => break Err(e),
                },
            }
        };

        self.session.close().await;
        info!("Agent stopped");
        result
    }

    /// Submits a single batch and closes the session.
    pub async fn run_once(mut self) -> Result<BatchOutcome, SessionError> {
        let result = self.tick().await;
        self.session.close().await;
        result
    }
}
