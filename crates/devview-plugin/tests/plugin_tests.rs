//! Integration tests for companion supervision and settings sync

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::time::{sleep, Instant};

use devview_plugin::{
    CompanionLauncher, CompanionProcess, LaunchSpec, LifecycleHook, PluginConfig, PluginError,
    ProcessSupervisor, ScheduleRequest, SettingsStore, StepHost, StepOptions, SupervisorConfig,
    UiPlugin,
};
use libdevview_hub::testing::ScriptedHub;
use libdevview_hub::{HubError, HubReply, HubRequest, RpcClient};
use libdevview_settings::{keys, SettingsDocument};

// ---------------------------------------------------------------------------
// fakes

#[derive(Clone, Default)]
struct FakeProcessHandle {
    exit: Arc<StdMutex<Option<i32>>>,
    killed: Arc<AtomicBool>,
}

impl FakeProcessHandle {
    fn set_exit(&self, code: i32) {
        *self.exit.lock().unwrap() = Some(code);
    }
}

struct FakeProcess {
    id: u32,
    handle: FakeProcessHandle,
}

impl CompanionProcess for FakeProcess {
    fn id(&self) -> u32 {
        self.id
    }

    fn poll_exit(&mut self) -> Option<i32> {
        *self.handle.exit.lock().unwrap()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.handle.killed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Default)]
struct FakeLauncher {
    launches: Arc<StdMutex<Vec<(LaunchSpec, FakeProcessHandle)>>>,
    fail: Arc<AtomicBool>,
}

impl FakeLauncher {
    fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    fn handle(&self, index: usize) -> FakeProcessHandle {
        self.launches.lock().unwrap()[index].1.clone()
    }

    fn spec(&self, index: usize) -> LaunchSpec {
        self.launches.lock().unwrap()[index].0.clone()
    }

    fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

impl CompanionLauncher for FakeLauncher {
    fn launch(&self, spec: &LaunchSpec) -> io::Result<Box<dyn CompanionProcess>> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such executable"));
        }
        let handle = FakeProcessHandle::default();
        let mut launches = self.launches.lock().unwrap();
        launches.push((spec.clone(), handle.clone()));
        Ok(Box::new(FakeProcess {
            id: launches.len() as u32,
            handle,
        }))
    }
}

#[derive(Default)]
struct MemoryStore {
    initial: SettingsDocument,
    stored: StdMutex<Vec<SettingsDocument>>,
}

impl MemoryStore {
    fn with_document(initial: SettingsDocument) -> Self {
        Self {
            initial,
            stored: StdMutex::new(Vec::new()),
        }
    }

    fn store_count(&self) -> usize {
        self.stored.lock().unwrap().len()
    }

    fn last_stored(&self) -> Option<SettingsDocument> {
        self.stored.lock().unwrap().last().cloned()
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> SettingsDocument {
        self.initial.clone()
    }

    fn store(&self, document: &SettingsDocument) {
        self.stored.lock().unwrap().push(document.clone());
    }
}

#[derive(Default)]
struct CountingStepHost {
    completions: AtomicUsize,
}

impl StepHost for CountingStepHost {
    fn step_complete(&self) {
        self.completions.fetch_add(1, Ordering::SeqCst);
    }
}

fn answer_everything(hub: &ScriptedHub) {
    hub.respond_with(|request| Some(HubReply::success(request.request_id.clone(), None)));
}

fn supervisor_config() -> SupervisorConfig {
    SupervisorConfig {
        executable: PathBuf::from("/usr/bin/devview"),
        name: "devview".to_string(),
        hub_uri: "ipc:///tmp/devview-hub.sock".to_string(),
        debug: false,
        retry_count: 3,
        retry_interval: Duration::from_millis(100),
        health_interval: Duration::from_millis(100),
    }
}

fn build_supervisor(
    hub: &Arc<ScriptedHub>,
    launcher: &FakeLauncher,
    document: SettingsDocument,
) -> Arc<ProcessSupervisor<Arc<ScriptedHub>>> {
    init_tracing();
    let client = Arc::new(RpcClient::new(Arc::clone(hub), "devview"));
    ProcessSupervisor::new(
        supervisor_config(),
        client,
        Arc::new(tokio::sync::Mutex::new(document)),
        Box::new(launcher.clone()),
    )
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

const CANVAS_CSV: &str = ",x,y\n0,0.0,0.0\n1,1.0,0.0\n2,1.0,1.0\n3,0.0,1.0\n";
const FRAME_CSV: &str = ",x,y\n0,5.0,5.0\n1,6.0,5.0\n2,6.0,6.0\n3,5.0,6.0\n";

fn layout_document() -> SettingsDocument {
    let mut doc = SettingsDocument::new();
    doc.set(keys::X, 10);
    doc.set(keys::Y, 20);
    doc.set(keys::WIDTH, 400);
    doc.set(keys::HEIGHT, 500);
    doc
}

// ---------------------------------------------------------------------------
// supervision

#[tokio::test(start_paused = true)]
async fn start_pushes_settings_after_probe() {
    let hub = Arc::new(ScriptedHub::new());
    answer_everything(&hub);
    let launcher = FakeLauncher::default();

    let mut doc = layout_document();
    doc.set(keys::VIDEO_CONFIG, r#"{"fps":30}"#);
    doc.set(keys::CANVAS_CORNERS, CANVAS_CSV);
    doc.set(keys::FRAME_CORNERS, FRAME_CSV);

    let supervisor = build_supervisor(&hub, &launcher, doc);
    supervisor.start().await.unwrap();

    let commands = hub.sent_commands();
    assert_eq!(
        commands,
        vec![
            "ping",
            "set_default_corners",
            "set_video_config",
            "set_surface_alphas",
        ]
    );

    let health = supervisor.health().await;
    assert!(health.enabled);
    assert!(health.last_alive.is_some());
    assert!(supervisor.is_alive().await);

    // Launch arguments carry the persisted allocation.
    let spec = launcher.spec(0);
    assert!(spec.allocation_json.contains(r#""width":400"#));
}

#[tokio::test(start_paused = true)]
async fn start_skips_corner_seed_without_pair() {
    let hub = Arc::new(ScriptedHub::new());
    answer_everything(&hub);
    let launcher = FakeLauncher::default();

    let mut doc = layout_document();
    doc.set(keys::CANVAS_CORNERS, CANVAS_CSV);

    let supervisor = build_supervisor(&hub, &launcher, doc);
    supervisor.start().await.unwrap();

    let commands = hub.sent_commands();
    assert!(!commands.contains(&"set_default_corners"));
    assert!(commands.contains(&"set_video_config"));
}

#[tokio::test(start_paused = true)]
async fn handshake_failure_aborts_start() {
    let hub = Arc::new(ScriptedHub::new());
    // No responder: every ping goes unanswered.
    let launcher = FakeLauncher::default();
    let supervisor = build_supervisor(&hub, &launcher, layout_document());

    let started = Instant::now();
    let err = supervisor.start().await.unwrap_err();

    match err {
        PluginError::Hub(HubError::Unreachable { .. }) => {}
        other => panic!("unexpected error: {other}"),
    }
    // Three 5s ping timeouts plus three 100ms pauses, then cleanup.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(15));
    assert!(elapsed < Duration::from_secs(16));

    assert!(!supervisor.has_process().await);
    assert!(!supervisor.health().await.enabled);
}

#[tokio::test(start_paused = true)]
async fn launch_failure_propagates() {
    let hub = Arc::new(ScriptedHub::new());
    answer_everything(&hub);
    let launcher = FakeLauncher::default();
    launcher.fail_next();

    let supervisor = build_supervisor(&hub, &launcher, layout_document());
    let err = supervisor.start().await.unwrap_err();

    assert!(matches!(err, PluginError::Launch(_)));
    assert!(hub.sent_commands().is_empty());
    assert_eq!(launcher.launch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn clean_exit_restarts_exactly_once() {
    let hub = Arc::new(ScriptedHub::new());
    answer_everything(&hub);
    let launcher = FakeLauncher::default();
    let supervisor = build_supervisor(&hub, &launcher, layout_document());

    supervisor.start().await.unwrap();
    assert_eq!(launcher.launch_count(), 1);

    // The companion exits cleanly to request a restart.
    launcher.handle(0).set_exit(0);
    sleep(Duration::from_millis(500)).await;

    assert_eq!(launcher.launch_count(), 2);
    assert!(supervisor.is_alive().await);

    // One observed exit, one restart: no duplicate timers keep firing.
    sleep(Duration::from_millis(1000)).await;
    assert_eq!(launcher.launch_count(), 2);

    // The next clean exit restarts exactly once again.
    launcher.handle(1).set_exit(0);
    sleep(Duration::from_millis(500)).await;
    assert_eq!(launcher.launch_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn nonzero_exit_does_not_restart() {
    let hub = Arc::new(ScriptedHub::new());
    answer_everything(&hub);
    let launcher = FakeLauncher::default();
    let supervisor = build_supervisor(&hub, &launcher, layout_document());

    supervisor.start().await.unwrap();
    launcher.handle(0).set_exit(3);
    sleep(Duration::from_millis(1000)).await;

    // Only a clean exit requests a restart; a crash goes unnoticed here.
    assert_eq!(launcher.launch_count(), 1);
    assert!(supervisor.health().await.last_alive.is_some());
}

#[tokio::test(start_paused = true)]
async fn terminate_is_idempotent() {
    let hub = Arc::new(ScriptedHub::new());
    answer_everything(&hub);
    let launcher = FakeLauncher::default();
    let supervisor = build_supervisor(&hub, &launcher, layout_document());

    supervisor.start().await.unwrap();
    supervisor.terminate().await;
    supervisor.terminate().await;

    let terminates = hub
        .sent_commands()
        .iter()
        .filter(|name| **name == "terminate")
        .count();
    assert_eq!(terminates, 1);

    let health = supervisor.health().await;
    assert!(!health.enabled);
    assert!(health.last_alive.is_none());
    assert!(!supervisor.has_process().await);
    assert!(!launcher.handle(0).killed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn terminate_kills_when_hub_is_down() {
    let hub = Arc::new(ScriptedHub::new());
    answer_everything(&hub);
    let launcher = FakeLauncher::default();
    let supervisor = build_supervisor(&hub, &launcher, layout_document());

    supervisor.start().await.unwrap();
    hub.fail_sends();
    supervisor.terminate().await;

    assert!(launcher.handle(0).killed.load(Ordering::SeqCst));
    assert!(!supervisor.has_process().await);
}

#[tokio::test(start_paused = true)]
async fn health_timer_stops_when_disabled() {
    let hub = Arc::new(ScriptedHub::new());
    answer_everything(&hub);
    let launcher = FakeLauncher::default();
    let supervisor = build_supervisor(&hub, &launcher, layout_document());

    supervisor.start().await.unwrap();
    supervisor.terminate().await;

    // A clean exit after teardown must not resurrect the companion.
    launcher.handle(0).set_exit(0);
    sleep(Duration::from_millis(1000)).await;
    assert_eq!(launcher.launch_count(), 1);
}

// ---------------------------------------------------------------------------
// plugin orchestration

fn plugin_config() -> PluginConfig {
    PluginConfig {
        name: "devview".to_string(),
        executable: PathBuf::from("/usr/bin/devview"),
        hub_uri: "ipc:///tmp/devview-hub.sock".to_string(),
        peer_plugin: Some("droplet-planner".to_string()),
        debug: false,
        retry_count: 3,
        retry_interval_ms: 100,
        health_interval_ms: 100,
    }
}

fn build_plugin(
    hub: &Arc<ScriptedHub>,
    launcher: &FakeLauncher,
    store: Arc<MemoryStore>,
) -> (UiPlugin<Arc<ScriptedHub>>, Arc<CountingStepHost>) {
    init_tracing();
    let step_host = Arc::new(CountingStepHost::default());
    let plugin = UiPlugin::new(
        plugin_config(),
        Arc::clone(hub),
        Box::new(launcher.clone()),
        store,
        Arc::clone(&step_host) as Arc<dyn StepHost>,
    );
    (plugin, step_host)
}

/// Reply script for exit-time queries: series replies echo `video`, the
/// corners reply carries `allocation` JSON.
fn answer_exit_queries(hub: &ScriptedHub, video: Option<&'static str>, allocation: &'static str) {
    hub.respond_with(move |request: &HubRequest| {
        let data = match request.command.name() {
            "get_video_config" | "get_surface_alphas" => video.map(str::to_string),
            "get_corners" => Some(allocation.to_string()),
            _ => None,
        };
        Some(HubReply::success(request.request_id.clone(), data))
    });
}

#[tokio::test(start_paused = true)]
async fn enable_loads_settings_and_starts() {
    let hub = Arc::new(ScriptedHub::new());
    answer_everything(&hub);
    let launcher = FakeLauncher::default();
    let store = Arc::new(MemoryStore::with_document(layout_document()));
    let (plugin, _) = build_plugin(&hub, &launcher, Arc::clone(&store));

    plugin.on_plugin_enable().await.unwrap();

    assert_eq!(launcher.launch_count(), 1);
    assert!(plugin.supervisor().is_alive().await);

    let doc = plugin.document().await;
    assert_eq!(doc.int(keys::WIDTH), Some(400));

    plugin.on_plugin_disable().await;
    assert!(!plugin.supervisor().has_process().await);
}

#[tokio::test(start_paused = true)]
async fn enable_applies_layout_defaults() {
    let hub = Arc::new(ScriptedHub::new());
    answer_everything(&hub);
    let launcher = FakeLauncher::default();
    let store = Arc::new(MemoryStore::default());
    let (plugin, _) = build_plugin(&hub, &launcher, store);

    plugin.on_plugin_enable().await.unwrap();

    let doc = plugin.document().await;
    assert_eq!(doc.int(keys::WIDTH), Some(400));
    assert_eq!(doc.int(keys::HEIGHT), Some(500));
    assert!(launcher.spec(0).allocation_json.contains(r#""height":500"#));
}

#[tokio::test(start_paused = true)]
async fn app_exit_merges_pulled_allocation() {
    let hub = Arc::new(ScriptedHub::new());
    answer_everything(&hub);
    let launcher = FakeLauncher::default();
    let store = Arc::new(MemoryStore::with_document(layout_document()));
    let (plugin, _) = build_plugin(&hub, &launcher, Arc::clone(&store));

    plugin.on_plugin_enable().await.unwrap();

    // The companion moved its window: x changed from 10 to 15.
    answer_exit_queries(
        &hub,
        None,
        r#"{"allocation": {"x": 15, "y": 20, "width": 400, "height": 500}}"#,
    );
    plugin.on_app_exit().await;

    assert_eq!(store.store_count(), 1);
    let stored = store.last_stored().unwrap();
    assert_eq!(stored.int(keys::X), Some(15));
    assert_eq!(stored.int(keys::Y), Some(20));
    assert_eq!(stored.int(keys::WIDTH), Some(400));
    assert_eq!(stored.int(keys::HEIGHT), Some(500));
    assert_eq!(stored.text(keys::VIDEO_CONFIG), Some(""));

    assert!(!plugin.supervisor().has_process().await);
}

#[tokio::test(start_paused = true)]
async fn app_exit_skips_write_when_unchanged() {
    let hub = Arc::new(ScriptedHub::new());
    answer_everything(&hub);
    let launcher = FakeLauncher::default();

    let mut initial = layout_document();
    initial.set(keys::VIDEO_CONFIG, "");
    initial.set(keys::SURFACE_ALPHAS, "");
    let store = Arc::new(MemoryStore::with_document(initial));
    let (plugin, _) = build_plugin(&hub, &launcher, Arc::clone(&store));

    plugin.on_plugin_enable().await.unwrap();

    // Everything the companion reports matches what is stored.
    answer_exit_queries(
        &hub,
        None,
        r#"{"allocation": {"x": 10, "y": 20, "width": 400, "height": 500}}"#,
    );
    plugin.on_app_exit().await;

    assert_eq!(store.store_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn app_exit_tolerates_query_timeouts() {
    let hub = Arc::new(ScriptedHub::new());
    answer_everything(&hub);
    let launcher = FakeLauncher::default();
    let store = Arc::new(MemoryStore::with_document(layout_document()));
    let (plugin, _) = build_plugin(&hub, &launcher, Arc::clone(&store));

    plugin.on_plugin_enable().await.unwrap();

    // Exit queries go unanswered; exit must still complete and skip the
    // persistence write.
    hub.respond_with(|request: &HubRequest| match request.command.name() {
        "get_video_config" | "get_surface_alphas" | "get_corners" => None,
        _ => Some(HubReply::success(request.request_id.clone(), None)),
    });

    let started = Instant::now();
    plugin.on_app_exit().await;

    // Three best-effort 2s queries.
    assert!(started.elapsed() >= Duration::from_secs(6));
    assert_eq!(store.store_count(), 0);
    assert!(!plugin.supervisor().has_process().await);
}

#[tokio::test(start_paused = true)]
async fn app_exit_normalizes_video_config() {
    let hub = Arc::new(ScriptedHub::new());
    answer_everything(&hub);
    let launcher = FakeLauncher::default();
    let store = Arc::new(MemoryStore::with_document(layout_document()));
    let (plugin, _) = build_plugin(&hub, &launcher, Arc::clone(&store));

    plugin.on_plugin_enable().await.unwrap();

    answer_exit_queries(
        &hub,
        Some(r#"{"fps":30,"exposure":0.25}"#),
        r#"{"allocation": {"x": 10, "y": 20, "width": 400, "height": 500}}"#,
    );
    plugin.on_app_exit().await;

    let stored = store.last_stored().unwrap();
    assert_eq!(
        stored.text(keys::VIDEO_CONFIG),
        Some(r#"{"fps":30,"exposure":0.25}"#)
    );
}

#[tokio::test(start_paused = true)]
async fn app_exit_stores_pulled_corner_tables() {
    let hub = Arc::new(ScriptedHub::new());
    answer_everything(&hub);
    let launcher = FakeLauncher::default();
    let store = Arc::new(MemoryStore::with_document(layout_document()));
    let (plugin, _) = build_plugin(&hub, &launcher, Arc::clone(&store));

    plugin.on_plugin_enable().await.unwrap();

    answer_exit_queries(
        &hub,
        None,
        r#"{"allocation": {"x": 10, "y": 20, "width": 400, "height": 500,
            "df_canvas_corners": ",x,y\n0,0.0,0.0\n1,1.0,0.0\n2,1.0,1.0\n3,0.0,1.0\n",
            "df_frame_corners": ",x,y\n0,5.0,5.0\n1,6.0,5.0\n2,6.0,6.0\n3,5.0,6.0\n"}}"#,
    );
    plugin.on_app_exit().await;

    let stored = store.last_stored().unwrap();
    assert_eq!(stored.text(keys::CANVAS_CORNERS), Some(CANVAS_CSV));
    assert_eq!(stored.text(keys::FRAME_CORNERS), Some(FRAME_CSV));
    assert!(!stored.contains("df_canvas_corners"));
}

#[tokio::test(start_paused = true)]
async fn step_run_completes_through_plugin() {
    let hub = Arc::new(ScriptedHub::new());
    answer_everything(&hub);
    let launcher = FakeLauncher::default();
    let store = Arc::new(MemoryStore::with_document(layout_document()));
    let (plugin, step_host) = build_plugin(&hub, &launcher, store);

    plugin.on_plugin_enable().await.unwrap();
    plugin.set_run_active(true);

    plugin
        .on_step_run(&StepOptions { video_enabled: true })
        .await;
    // The health tick pumps completions within one period.
    sleep(Duration::from_millis(300)).await;
    assert_eq!(step_host.completions.load(Ordering::SeqCst), 1);
    assert!(hub.sent_commands().contains(&"enable_video"));
}

#[tokio::test(start_paused = true)]
async fn step_run_completes_when_plugin_idle() {
    let hub = Arc::new(ScriptedHub::new());
    let launcher = FakeLauncher::default();
    let store = Arc::new(MemoryStore::default());
    let (plugin, step_host) = build_plugin(&hub, &launcher, store);

    // Companion never started; the step must still complete.
    plugin.set_run_active(true);
    plugin
        .on_step_run(&StepOptions { video_enabled: true })
        .await;
    assert_eq!(step_host.completions.load(Ordering::SeqCst), 1);
    assert!(hub.sent_commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn schedule_requests_cover_enable_only() {
    let hub = Arc::new(ScriptedHub::new());
    let launcher = FakeLauncher::default();
    let store = Arc::new(MemoryStore::default());
    let (plugin, _) = build_plugin(&hub, &launcher, store);

    assert_eq!(
        plugin.schedule_requests(LifecycleHook::PluginEnable),
        vec![ScheduleRequest {
            before: "devview".to_string(),
            after: "droplet-planner".to_string(),
        }]
    );
    assert!(plugin.schedule_requests(LifecycleHook::AppExit).is_empty());
    assert!(plugin.schedule_requests(LifecycleHook::StepRun).is_empty());
}
