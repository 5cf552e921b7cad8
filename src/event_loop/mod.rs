mod restart;
mod staleness;

use std::{future::Future, path::PathBuf, pin::pin, sync::Arc, time::Duration};

use anyhow::{Context as _, Result};
use clap::ValueEnum;
use tokio::{
    select,
    signal::unix::{signal, SignalKind},
    time::{interval, MissedTickBehavior},
};
use zbus::Connection;

use crate::{
    dbus::BusStateProxy,
    error::BusConnectionError,
    state::StateModel,
    supervisor::{BackendHandle, BackendSupervisor},
};

pub use restart::RestartPolicy;
use restart::RestartSchedule;
use staleness::StalenessCheck;

const STALENESS_CHECK_INTERVAL: Duration = Duration::from_secs(3);

/// Which producers feed the state model.
#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum Transport {
    /// Parse the backend's stdout only
    Pipe,
    /// Mirror the MusicInfoService bus object only
    Bus,
    /// Run both; the latest update wins
    Both,
}

impl Transport {
    pub const fn uses_pipe(self) -> bool {
        matches!(self, Self::Pipe | Self::Both)
    }
    pub const fn uses_bus(self) -> bool {
        matches!(self, Self::Bus | Self::Both)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub transport: Transport,
    pub backend: PathBuf,
    pub working_dir: PathBuf,
    pub bus_name: String,
    pub bus_path: String,
    pub restart: RestartPolicy,
    pub stale_after: Duration,
}

/// Everything started on behalf of one backend generation.
struct Producers {
    backend: Option<BackendHandle>,
    bus_proxy: Option<BusStateProxy>,
}

impl Producers {
    async fn start(
        supervisor: &BackendSupervisor,
        conn: Option<&Connection>,
        model: &Arc<StateModel>,
        config: &Config,
    ) -> Self {
        let backend = if config.transport.uses_pipe() {
            start_backend(supervisor, model, config)
        } else {
            None
        };
        let bus_proxy = match conn {
            Some(conn) => connect_proxy(conn, model, config).await,
            None => None,
        };
        Self { backend, bus_proxy }
    }

    /// The pipe transport is wanted but no backend is running.
    fn backend_missing(&self, config: &Config) -> bool {
        config.transport.uses_pipe() && self.backend.is_none()
    }

    fn stop(&mut self, supervisor: &BackendSupervisor) {
        if let Some(mut backend) = self.backend.take() {
            supervisor.stop(&mut backend);
        }
        if let Some(bus_proxy) = self.bus_proxy.take() {
            bus_proxy.disconnect();
        }
    }
}

fn start_backend(
    supervisor: &BackendSupervisor,
    model: &StateModel,
    config: &Config,
) -> Option<BackendHandle> {
    supervisor
        .start(&config.backend, &config.working_dir)
        .inspect_err(|e| {
            tracing::error!(%e, "Failed to start backend");
            model.show_error(&format!("Failed to start backend: {e}"));
        })
        .ok()
}

async fn connect_proxy(
    conn: &Connection,
    model: &Arc<StateModel>,
    config: &Config,
) -> Option<BusStateProxy> {
    BusStateProxy::connect(conn, Arc::clone(model), &config.bus_name, &config.bus_path)
        .await
        .inspect_err(|e| {
            tracing::error!(%e, "Failed to connect to MusicInfoService");
            model.show_error(&e.to_string());
        })
        .ok()
}

async fn open_session(model: &StateModel) -> Option<Connection> {
    Connection::session()
        .await
        .map_err(BusConnectionError::Session)
        .inspect_err(|e| {
            tracing::error!(%e, "Bus transport unavailable");
            model.show_error(&e.to_string());
        })
        .ok()
}

/// Run until SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed.
pub async fn event_loop(model: Arc<StateModel>, config: Config) -> Result<()> {
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
    let shutdown = async move {
        select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for SIGINT")?;
                tracing::info!("Interrupted, shutting down");
            }
            _ = terminate.recv() => tracing::info!("Terminated, shutting down"),
        }
        anyhow::Ok(())
    };
    run(model, config, shutdown).await
}

async fn run(
    model: Arc<StateModel>,
    config: Config,
    shutdown: impl Future<Output = Result<()>>,
) -> Result<()> {
    tracing::info!(?config, "Starting");
    let (supervisor, mut lost_receiver) = BackendSupervisor::new(Arc::clone(&model));
    let conn = if config.transport.uses_bus() {
        open_session(&model).await
    } else {
        None
    };

    let mut restarts = RestartSchedule::new(config.restart);
    let mut producers = Producers::start(&supervisor, conn.as_ref(), &model, &config).await;
    if producers.backend_missing(&config) {
        restarts.schedule();
    }
    let mut staleness = StalenessCheck::new(config.stale_after);

    let mut staleness_timer = interval(STALENESS_CHECK_INTERVAL);
    staleness_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut shutdown = pin!(shutdown);

    let result = loop {
        select! {
            Some(lost) = lost_receiver.recv() => {
                tracing::warn!(%lost, "Backend lost");
                producers.backend = None;
                // A restarted backend republishes the bus object, so reconnect alongside it.
                if restarts.schedule() {
                    if let Some(bus_proxy) = producers.bus_proxy.take() {
                        bus_proxy.disconnect();
                    }
                }
            }
            () = &mut restarts.timer => {
                restarts.disarm();
                tracing::info!("Restarting backend");
                producers.stop(&supervisor);
                producers = Producers::start(&supervisor, conn.as_ref(), &model, &config).await;
                if producers.backend_missing(&config) {
                    restarts.schedule();
                }
            }
            _ = staleness_timer.tick() => {
                staleness.check(&model.current());
            }
            result = &mut shutdown => break result,
        }
    };

    producers.stop(&supervisor);
    result
}
