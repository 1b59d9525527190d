//! Companion process supervision
//!
//! The supervisor owns the companion handle and its health state. A
//! start launches the process, runs the handshake (readiness probe plus
//! initial settings push), then arms a periodic health task. A clean
//! self-exit (code 0) is the companion asking to be restarted; the
//! health task tears down and starts a fresh cycle. Termination is
//! idempotent and never fails.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use libdevview_hub::{wait_until_ready, Hub, HubCommand, RpcClient, DEFAULT_CALL_TIMEOUT};
use libdevview_settings::{codec, keys, Series, SettingsDocument, StructuredValue};

use crate::error::PluginError;
use crate::launch::{CompanionLauncher, CompanionProcess, LaunchSpec};

/// Supervision parameters
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Companion executable path
    pub executable: std::path::PathBuf,
    /// Registered hub name of the companion
    pub name: String,
    /// Hub endpoint passed to the companion at launch
    pub hub_uri: String,
    /// Launch the companion with debug output
    pub debug: bool,
    /// Readiness probe attempts per start
    pub retry_count: u32,
    /// Pause between readiness attempts
    pub retry_interval: Duration,
    /// Health check period
    pub health_interval: Duration,
}

/// Supervision health, owned by the supervisor
#[derive(Debug, Clone, Default)]
pub struct HealthState {
    /// Supervision active; false suspends the health timer
    pub enabled: bool,
    /// Last time the companion was observed alive; None before the
    /// handshake completes
    pub last_alive: Option<DateTime<Utc>>,
}

/// Owner of the companion process handle and restart logic
pub struct ProcessSupervisor<H: Hub> {
    config: SupervisorConfig,
    client: Arc<RpcClient<H>>,
    document: Arc<Mutex<SettingsDocument>>,
    launcher: Box<dyn CompanionLauncher>,
    process: Mutex<Option<Box<dyn CompanionProcess>>>,
    health: Mutex<HealthState>,
    timer_generation: AtomicU64,
    weak: Weak<Self>,
}

impl<H: Hub + 'static> ProcessSupervisor<H> {
    pub fn new(
        config: SupervisorConfig,
        client: Arc<RpcClient<H>>,
        document: Arc<Mutex<SettingsDocument>>,
        launcher: Box<dyn CompanionLauncher>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            config,
            client,
            document,
            launcher,
            process: Mutex::new(None),
            health: Mutex::new(HealthState::default()),
            timer_generation: AtomicU64::new(0),
            weak: weak.clone(),
        })
    }

    /// Launch the companion, run the handshake, and arm the health task.
    ///
    /// Launch and handshake failures are fatal to this attempt and
    /// surfaced to the caller; the probe already retried internally.
    pub async fn start(&self) -> Result<(), PluginError> {
        let spec = self.launch_spec().await;
        info!(executable = %spec.executable.display(), name = %spec.name, "launching companion process");

        let process = self.launcher.launch(&spec).map_err(PluginError::Launch)?;
        info!(pid = process.id(), "companion process launched");
        *self.process.lock().await = Some(process);

        {
            let mut health = self.health.lock().await;
            health.enabled = true;
            health.last_alive = None;
        }

        if let Err(err) = self.handshake().await {
            self.terminate().await;
            return Err(err);
        }

        self.arm_health_timer();
        Ok(())
    }

    /// Probe readiness, then push the persisted settings.
    async fn handshake(&self) -> Result<(), PluginError> {
        let alive_at = wait_until_ready(
            &self.client,
            self.config.retry_count,
            self.config.retry_interval,
        )
        .await?;
        self.health.lock().await.last_alive = Some(alive_at);

        self.push_settings().await?;
        Ok(())
    }

    /// Push persisted settings to a freshly connected companion.
    ///
    /// Corners seed only as a pair; series push unconditionally (an
    /// empty series clears companion state back to defaults).
    async fn push_settings(&self) -> Result<(), PluginError> {
        let structured = {
            let doc = self.document.lock().await;
            codec::to_structured(&doc)
        };

        let canvas = structured.get(keys::CANVAS_CORNERS);
        let frame = structured.get(keys::FRAME_CORNERS);
        if let (Some(StructuredValue::Table(canvas)), Some(StructuredValue::Table(frame))) =
            (canvas, frame)
        {
            self.client
                .call(
                    HubCommand::SetDefaultCorners {
                        canvas: canvas.to_csv(),
                        frame: frame.to_csv(),
                    },
                    DEFAULT_CALL_TIMEOUT,
                    false,
                )
                .await?;
        }

        let video_config = match structured.get(keys::VIDEO_CONFIG) {
            Some(StructuredValue::Series(series)) => series.clone(),
            _ => Series::new(),
        };
        self.client
            .call(
                HubCommand::SetVideoConfig {
                    video_config: video_config.to_json(),
                },
                DEFAULT_CALL_TIMEOUT,
                false,
            )
            .await?;

        let surface_alphas = match structured.get(keys::SURFACE_ALPHAS) {
            Some(StructuredValue::Series(series)) => series.clone(),
            _ => Series::new(),
        };
        self.client
            .call(
                HubCommand::SetSurfaceAlphas {
                    surface_alphas: surface_alphas.to_json(),
                },
                DEFAULT_CALL_TIMEOUT,
                false,
            )
            .await?;

        Ok(())
    }

    /// Arm the periodic health task for the current process cycle.
    ///
    /// The generation counter invalidates every previously armed task,
    /// so a restart never leaves two timers running.
    fn arm_health_timer(&self) {
        let generation = self.timer_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(supervisor) = self.weak.upgrade() else {
            return;
        };

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(supervisor.config.health_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;

                if supervisor.timer_generation.load(Ordering::SeqCst) != generation {
                    break;
                }
                if !supervisor.health.lock().await.enabled {
                    debug!("supervision disabled, stopping health task");
                    break;
                }

                let exit = {
                    let mut process = supervisor.process.lock().await;
                    match process.as_mut() {
                        Some(process) => process.poll_exit(),
                        None => break,
                    }
                };

                if exit == Some(0) {
                    // The companion exited cleanly to request a restart.
                    info!("companion process exited cleanly, restarting");
                    supervisor.terminate().await;
                    if let Err(err) = supervisor.start().await {
                        error!(%err, "companion restart failed");
                    }
                    break;
                }

                // A nonzero exit is indistinguishable from a running
                // process here; only a clean exit requests a restart.
                supervisor.health.lock().await.last_alive = Some(Utc::now());

                if let Err(err) = supervisor.client.poll_once() {
                    debug!(%err, "hub poll failed");
                }
            }
        });
    }

    /// Tear down the current cycle. Idempotent; termination failures are
    /// logged and swallowed, since a dead companion is a successful
    /// outcome here.
    pub async fn terminate(&self) {
        self.timer_generation.fetch_add(1, Ordering::SeqCst);

        let process = self.process.lock().await.take();
        if let Some(mut process) = process {
            let pid = process.id();
            match self.client.call_async(HubCommand::Terminate, None, true) {
                Ok(()) => debug!(pid, "companion termination requested"),
                Err(err) => {
                    debug!(pid, %err, "termination request not delivered, killing process");
                    if let Err(err) = process.kill() {
                        warn!(pid, %err, "failed to kill companion process");
                    }
                }
            }
        }

        let mut health = self.health.lock().await;
        health.enabled = false;
        health.last_alive = None;
    }

    /// Current health snapshot
    pub async fn health(&self) -> HealthState {
        self.health.lock().await.clone()
    }

    /// Whether a handshaken companion process is currently held
    pub async fn is_alive(&self) -> bool {
        if self.process.lock().await.is_none() {
            return false;
        }
        self.health.lock().await.last_alive.is_some()
    }

    /// Whether a companion process handle is currently held
    pub async fn has_process(&self) -> bool {
        self.process.lock().await.is_some()
    }

    async fn launch_spec(&self) -> LaunchSpec {
        let allocation_json = self.document.lock().await.to_json();
        LaunchSpec {
            executable: self.config.executable.clone(),
            name: self.config.name.clone(),
            allocation_json,
            debug: self.config.debug,
            hub_uri: self.config.hub_uri.clone(),
        }
    }
}
