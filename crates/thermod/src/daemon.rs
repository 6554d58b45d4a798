//! Wiring of the registry server: registry actor, startup sweep, change
//! monitor, status reporter and TCP listener under one cancellation token.

use std::net::SocketAddr;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::{prepopulate, SweepReport};
use crate::config::ServerConfig;
use crate::monitor::{spawn_monitor_task, ChangeEvent, MonitorConfig};
use crate::registry::{spawn_registry, RegistryHandle};
use crate::server::{RegistryServer, ServerError};
use crate::status::spawn_status_task;

/// A started server and its background tasks.
pub struct RunningServer {
    pub registry: RegistryHandle,
    pub local_addr: SocketAddr,
    /// Outcome of the startup sweep, `None` when disabled
    pub sweep: Option<SweepReport>,
    /// Change events from the monitor
    pub changes: broadcast::Receiver<ChangeEvent>,
    server: JoinHandle<Result<(), ServerError>>,
    background: Vec<JoinHandle<()>>,
}

impl RunningServer {
    /// Waits for the listener and background tasks to stop.
    pub async fn wait(self) -> Result<(), ServerError> {
        let result = match self.server.await {
            Ok(result) => result,
            Err(e) => Err(ServerError::Task(e.to_string())),
        };
        for task in self.background {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Registry server stopped");
        result
    }
}

/// Starts every server component.
///
/// The sweep completes before the listener accepts agents, so an agent
/// never races the catalog for a slot.
pub async fn start(
    config: &ServerConfig,
    cancel_token: CancellationToken,
) -> Result<RunningServer, ServerError> {
    let registry = spawn_registry();
    info!("Registry started");

    let sweep = if config.prepopulate.enabled {
        let report = prepopulate(&registry, &config.prepopulate).await;
        if let Ok(stats) = registry.stats().await {
            if stats.collisions > 0 {
                warn!(
                    collisions = stats.collisions,
                    entries = stats.entries,
                    "Catalog keys share slots"
                );
            }
        }
        Some(report)
    } else {
        None
    };

    // Bind before spawning anything that only the token would stop.
    let server = RegistryServer::bind(
        &config.listen_addr,
        registry.clone(),
        config.namespace_uri.clone(),
        cancel_token.clone(),
    )
    .await?;
    let local_addr = server.local_addr()?;

    let (monitor, changes) = spawn_monitor_task(
        registry.clone(),
        MonitorConfig {
            poll_interval: config.poll_interval(),
            epsilon: config.change_epsilon,
        },
        cancel_token.clone(),
    );
    let mut background = vec![monitor];

    if let Some(period) = config.status_interval() {
        background.push(spawn_status_task(registry.clone(), period, cancel_token));
    }

    let server = tokio::spawn(server.run());

    Ok(RunningServer {
        registry,
        local_addr,
        sweep,
        changes,
        server,
        background,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrepopulateConfig;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout};

    fn config(listen_addr: String) -> ServerConfig {
        ServerConfig {
            listen_addr,
            status_interval_s: 1,
            prepopulate: PrepopulateConfig {
                enabled: false,
                ..PrepopulateConfig::default()
            },
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_failed_bind_leaves_no_tasks() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let cancel = CancellationToken::new();

        let result = start(&config(addr), cancel.clone()).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
        assert!(!cancel.is_cancelled());

        // Only the registry actor was spawned, and it exits once its handles drop.
        let metrics = tokio::runtime::Handle::current().metrics();
        timeout(Duration::from_secs(2), async {
            while metrics.num_alive_tasks() > 0 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("background tasks still running after failed start");
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let cancel = CancellationToken::new();
        let server = start(&config("127.0.0.1:0".to_string()), cancel.clone())
            .await
            .unwrap();
        assert_ne!(server.local_addr.port(), 0);
        assert!(server.sweep.is_none());

        cancel.cancel();
        timeout(Duration::from_secs(2), server.wait())
            .await
            .unwrap()
            .unwrap();
    }
}
