//! Plugin orchestrator
//!
//! Wires supervision, settings translation, and step dispatch to the
//! host's lifecycle hooks. The plugin owns the authoritative settings
//! document; other components see shared read-only views of it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use libdevview_hub::{Hub, HubCommand, RpcClient, EXIT_QUERY_TIMEOUT};
use libdevview_settings::{
    codec, keys, CornerTable, Series, SettingValue, SettingsDocument,
};

use crate::error::PluginError;
use crate::launch::CompanionLauncher;
use crate::step::{StepHost, StepOptions, StepSynchronizer};
use crate::supervisor::{ProcessSupervisor, SupervisorConfig};

/// Host settings storage, external to this crate
pub trait SettingsStore: Send + Sync {
    /// Load the persisted document (empty when nothing was stored yet)
    fn load(&self) -> SettingsDocument;

    /// Persist the document
    fn store(&self, document: &SettingsDocument);
}

/// Host lifecycle hooks the plugin participates in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleHook {
    PluginEnable,
    PluginDisable,
    AppExit,
    StepRun,
}

/// Hook ordering declaration surfaced to the host scheduler:
/// `before` must run its hook before `after` does
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub before: String,
    pub after: String,
}

/// Plugin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Registered hub name of this plugin and its companion
    pub name: String,
    /// Companion executable path
    pub executable: std::path::PathBuf,
    /// Hub endpoint handed to the companion at launch
    pub hub_uri: String,
    /// Peer plugin whose enable hook must be scheduled after ours
    #[serde(default)]
    pub peer_plugin: Option<String>,
    /// Launch the companion with debug output
    #[serde(default)]
    pub debug: bool,
    /// Readiness probe attempts per start
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Pause between readiness attempts, milliseconds
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Health check period, milliseconds
    #[serde(default = "default_health_interval_ms")]
    pub health_interval_ms: u64,
}

fn default_retry_count() -> u32 {
    libdevview_hub::DEFAULT_RETRY_COUNT
}

fn default_retry_interval_ms() -> u64 {
    libdevview_hub::DEFAULT_RETRY_INTERVAL.as_millis() as u64
}

fn default_health_interval_ms() -> u64 {
    1000
}

impl PluginConfig {
    fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            executable: self.executable.clone(),
            name: self.name.clone(),
            hub_uri: self.hub_uri.clone(),
            debug: self.debug,
            retry_count: self.retry_count,
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            health_interval: Duration::from_millis(self.health_interval_ms),
        }
    }
}

/// Device view plugin
pub struct UiPlugin<H: Hub> {
    config: PluginConfig,
    client: Arc<RpcClient<H>>,
    document: Arc<Mutex<SettingsDocument>>,
    supervisor: Arc<ProcessSupervisor<H>>,
    step: StepSynchronizer<H>,
    store: Arc<dyn SettingsStore>,
    run_active: AtomicBool,
}

impl<H: Hub + 'static> UiPlugin<H> {
    pub fn new(
        config: PluginConfig,
        hub: H,
        launcher: Box<dyn CompanionLauncher>,
        store: Arc<dyn SettingsStore>,
        step_host: Arc<dyn StepHost>,
    ) -> Self {
        let client = Arc::new(RpcClient::new(hub, config.name.clone()));
        let document = Arc::new(Mutex::new(SettingsDocument::new()));
        let supervisor = ProcessSupervisor::new(
            config.supervisor_config(),
            Arc::clone(&client),
            Arc::clone(&document),
            launcher,
        );
        let step = StepSynchronizer::new(Arc::clone(&client), step_host);

        Self {
            config,
            client,
            document,
            supervisor,
            step,
            store,
            run_active: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Host run/preview mode, consulted on step runs
    pub fn set_run_active(&self, active: bool) {
        self.run_active.store(active, Ordering::SeqCst);
    }

    /// Supervisor handle (health inspection)
    pub fn supervisor(&self) -> &Arc<ProcessSupervisor<H>> {
        &self.supervisor
    }

    /// Snapshot of the authoritative settings document
    pub async fn document(&self) -> SettingsDocument {
        self.document.lock().await.clone()
    }

    /// Plugin enabled: load persisted settings and bring the companion up.
    ///
    /// Handshake failure aborts enablement with the bounded-wait error.
    pub async fn on_plugin_enable(&self) -> Result<(), PluginError> {
        {
            let mut doc = self.document.lock().await;
            *doc = self.store.load();
            doc.ensure_layout_defaults();
        }
        self.supervisor.start().await
    }

    /// Plugin disabled: suspend supervision and tear the companion down.
    pub async fn on_plugin_disable(&self) {
        self.supervisor.terminate().await;
    }

    /// Application exit: pull current companion settings best-effort,
    /// persist them if anything changed, then tear down.
    pub async fn on_app_exit(&self) {
        if self.supervisor.has_process().await {
            let mut incoming = SettingsDocument::new();

            self.pull_series(HubCommand::GetVideoConfig, keys::VIDEO_CONFIG, &mut incoming)
                .await;
            self.pull_series(
                HubCommand::GetSurfaceAlphas,
                keys::SURFACE_ALPHAS,
                &mut incoming,
            )
            .await;
            self.pull_allocation(&mut incoming).await;

            let changed = {
                let mut doc = self.document.lock().await;
                codec::merge(&mut doc, &incoming)
            };
            if changed {
                let snapshot = self.document.lock().await.clone();
                self.store.store(&snapshot);
                info!("persisted updated device view settings");
            } else {
                debug!("device view settings unchanged, skipping persistence write");
            }
        }

        self.supervisor.terminate().await;
    }

    /// Step run: dispatch the step's video command and let the
    /// synchronizer signal completion.
    pub async fn on_step_run(&self, options: &StepOptions) {
        let alive = self.supervisor.is_alive().await;
        self.step
            .on_step_run(options, self.run_active.load(Ordering::SeqCst), alive);
    }

    /// Scheduling contract: the peer plugin's enable hook runs after ours.
    pub fn schedule_requests(&self, hook: LifecycleHook) -> Vec<ScheduleRequest> {
        match (hook, &self.config.peer_plugin) {
            (LifecycleHook::PluginEnable, Some(peer)) => vec![ScheduleRequest {
                before: self.config.name.clone(),
                after: peer.clone(),
            }],
            _ => Vec::new(),
        }
    }

    async fn pull_series(&self, command: HubCommand, key: &str, incoming: &mut SettingsDocument) {
        let command_name = command.name();
        match self.client.call(command, EXIT_QUERY_TIMEOUT, false).await {
            Ok(data) => match series_reply_to_text(data.as_deref()) {
                Some(text) => incoming.set(key, text),
                None => warn!(command = command_name, "malformed series reply, setting untouched"),
            },
            Err(err) => {
                warn!(command = command_name, %err, "setting not updated this session");
            }
        }
    }

    async fn pull_allocation(&self, incoming: &mut SettingsDocument) {
        match self
            .client
            .call(HubCommand::GetCorners, EXIT_QUERY_TIMEOUT, false)
            .await
        {
            Ok(Some(text)) => match allocation_reply_to_document(&text) {
                Ok(pulled) => {
                    codec::merge(incoming, &pulled);
                }
                Err(err) => warn!(%err, "malformed allocation reply, allocation untouched"),
            },
            Ok(None) => debug!("companion returned no allocation"),
            Err(err) => {
                warn!(%err, "window allocation not updated this session");
            }
        }
    }
}

/// Normalize a series query reply into persisted text.
///
/// An absent series persists as the empty string, never as `"null"`.
/// Returns `None` when the payload is not a series.
fn series_reply_to_text(data: Option<&str>) -> Option<String> {
    let text = match data {
        None => return Some(String::new()),
        Some(text) => text.trim(),
    };
    if text.is_empty() || text == "null" {
        return Some(String::new());
    }
    match Series::from_json(text) {
        Ok(series) if series.is_empty() => Some(String::new()),
        Ok(series) => Some(series.to_json()),
        Err(_) => None,
    }
}

/// Fold a `get_corners` reply into document form.
///
/// Corner tables arrive CSV-encoded under `df_`-prefixed keys inside
/// the allocation object; the prefix is a wire convention and is
/// stripped here, at the boundary.
fn allocation_reply_to_document(text: &str) -> Result<SettingsDocument, PluginError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let allocation = value
        .get("allocation")
        .and_then(|v| v.as_object())
        .ok_or_else(|| PluginError::MalformedReply("allocation object missing".to_string()))?;

    let mut doc = SettingsDocument::new();
    for (key, entry) in allocation {
        if let Some(plain_key) = key.strip_prefix("df_") {
            let csv = entry.as_str().ok_or_else(|| {
                PluginError::MalformedReply(format!("'{key}' is not CSV text"))
            })?;
            let table = CornerTable::from_csv(csv)?;
            doc.set(plain_key.to_string(), table.to_csv());
        } else {
            doc.set(key.clone(), json_to_setting(key, entry)?);
        }
    }
    Ok(doc)
}

fn json_to_setting(key: &str, value: &serde_json::Value) -> Result<SettingValue, PluginError> {
    match value {
        serde_json::Value::Null => Ok(SettingValue::Null),
        serde_json::Value::Bool(b) => Ok(SettingValue::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SettingValue::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(SettingValue::Float(f))
            } else {
                Err(PluginError::MalformedReply(format!(
                    "'{key}' is out of numeric range"
                )))
            }
        }
        serde_json::Value::String(s) => Ok(SettingValue::Text(s.clone())),
        _ => Err(PluginError::MalformedReply(format!(
            "'{key}' is not a scalar"
        ))),
    }
}
