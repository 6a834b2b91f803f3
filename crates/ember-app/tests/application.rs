//! End-to-end launcher behaviour through the [`Application`] surface.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rstest::rstest;
use serde_json::{Value, json};
use tempfile::NamedTempFile;

use ember_app::{
    Application, DeployError, Deployable, DeploymentContext, DeploymentOptions, Hooks,
    LaunchError, LaunchOutcome, Launched, PropertySnapshot, ProviderDescriptor, RuntimeError,
    RuntimeFactory, RuntimeHandle, RuntimeOptions, StaticManifest, StaticProviderRegistry,
    ThreadingModel, exit_codes,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct ProbeState {
    started: AtomicUsize,
    stopped: AtomicUsize,
    contexts: Mutex<Vec<(u32, ThreadingModel, Value)>>,
}

impl ProbeState {
    fn contexts(&self) -> Vec<(u32, ThreadingModel, Value)> {
        self.contexts.lock().expect("contexts lock").clone()
    }
}

struct Probe {
    state: Arc<ProbeState>,
}

impl Deployable for Probe {
    fn start(&mut self, context: &DeploymentContext) -> Result<(), DeployError> {
        self.state.started.fetch_add(1, Ordering::SeqCst);
        self.state.contexts.lock().expect("contexts lock").push((
            context.instance(),
            context.threading_model(),
            context.config().clone(),
        ));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeployError> {
        self.state.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn probe_factory(state: &Arc<ProbeState>) -> impl Fn() -> Box<dyn Deployable> + Send + Sync + use<> {
    let state = Arc::clone(state);
    move || {
        Box::new(Probe {
            state: Arc::clone(&state),
        }) as Box<dyn Deployable>
    }
}

#[derive(Default)]
struct HookLog {
    observed_options: Option<RuntimeOptions>,
    started: bool,
    stopped: bool,
    failure: Option<String>,
}

/// Hooks that record what each checkpoint saw.
#[derive(Clone, Default)]
struct RecordingHooks {
    log: Arc<Mutex<HookLog>>,
    payload_rewrite: Option<Value>,
    options_rewrite: Option<Value>,
    instances_rewrite: Option<u32>,
    deployment_payload_rewrite: Option<Value>,
}

impl RecordingHooks {
    fn log(&self) -> Arc<Mutex<HookLog>> {
        Arc::clone(&self.log)
    }
}

impl Hooks for RecordingHooks {
    fn after_config_parsed(&mut self, payload: Value) -> Value {
        self.payload_rewrite.clone().unwrap_or(payload)
    }

    fn after_options_parsed(&mut self, document: Value) -> Value {
        self.options_rewrite.clone().unwrap_or(document)
    }

    fn before_starting_runtime(&mut self, context: &mut ember_app::HookContext<'_>) {
        self.log.lock().expect("hook log").observed_options =
            Some(context.runtime_options().clone());
    }

    fn before_deploying(&mut self, options: &mut DeploymentOptions) {
        if let Some(instances) = self.instances_rewrite {
            options.instances = instances;
        }
        if let Some(payload) = self.deployment_payload_rewrite.clone() {
            options.config = payload;
        }
    }

    fn after_started(&mut self, context: &ember_app::HookContext<'_>) {
        assert!(context.runtime().is_some(), "runtime visible once started");
        self.log.lock().expect("hook log").started = true;
    }

    fn after_stopped(&mut self) {
        self.log.lock().expect("hook log").stopped = true;
    }

    fn after_failure(&mut self, error: &LaunchError) {
        self.log.lock().expect("hook log").failure = Some(error.to_string());
    }
}

struct FailingRuntimeFactory;

impl RuntimeFactory for FailingRuntimeFactory {
    fn create(&self, _options: &RuntimeOptions) -> Result<Arc<dyn RuntimeHandle>, RuntimeError> {
        Err(RuntimeError::Startup(
            "cluster manager unavailable".to_owned(),
        ))
    }
}

fn application(args: &[&str], state: &Arc<ProbeState>) -> Application {
    Application::new(std::iter::once("ember").chain(args.iter().copied()))
        .with_deployable("ember:Probe", probe_factory(state))
        .with_manifest(StaticManifest::empty())
}

fn launch(application: &mut Application) -> (LaunchOutcome, String, String) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let outcome = application.launch_with(&mut stdout, &mut stderr);
    (
        outcome,
        String::from_utf8(stdout).expect("stdout utf8"),
        String::from_utf8(stderr).expect("stderr utf8"),
    )
}

fn expect_running(outcome: LaunchOutcome) -> Launched {
    match outcome {
        LaunchOutcome::Running(launched) => launched,
        LaunchOutcome::Exited(code) => panic!("launch exited with code {code}"),
    }
}

fn stop(application: &mut Application, launched: &Launched) {
    application
        .shutdown(launched, SHUTDOWN_TIMEOUT)
        .expect("shutdown");
}

#[rstest]
#[case::default(&[], ThreadingModel::EventLoop)]
#[case::worker(&["-w"], ThreadingModel::Worker)]
#[case::virtual_threads(&["-vt"], ThreadingModel::VirtualThread)]
fn deploys_the_requested_instance_count_on_the_requested_model(
    #[case] flags: &[&str],
    #[case] expected: ThreadingModel,
) {
    let state = Arc::new(ProbeState::default());
    let mut args = vec!["ember:Probe", "--instances", "4"];
    args.extend_from_slice(flags);
    let mut app = application(&args, &state);

    let (outcome, _, stderr) = launch(&mut app);
    let launched = expect_running(outcome);
    assert_eq!(stderr, "");
    assert_eq!(state.started.load(Ordering::SeqCst), 4);
    for (instance, threading, _) in state.contexts() {
        assert!(instance < 4);
        assert_eq!(threading, expected);
    }

    stop(&mut app, &launched);
    assert_eq!(state.stopped.load(Ordering::SeqCst), 4);
}

#[test]
fn conflicting_threading_flags_fail_deployment_without_a_usage_banner() {
    let state = Arc::new(ProbeState::default());
    let mut app = application(&["ember:Probe", "-w", "-vt"], &state);

    let (outcome, stdout, stderr) = launch(&mut app);
    assert_eq!(outcome.exit_code(), exit_codes::DEPLOYMENT);
    assert_eq!(stdout, "", "configuration errors do not render usage");
    assert!(stderr.contains("threading model"));
    assert_eq!(state.started.load(Ordering::SeqCst), 0);
}

#[test]
fn malformed_instance_count_is_a_usage_error_with_banner_and_cause() {
    let state = Arc::new(ProbeState::default());
    let mut app = application(&["ember:Probe", "-instances", "BOOM"], &state);

    let (outcome, stdout, stderr) = launch(&mut app);
    assert_eq!(outcome.exit_code(), exit_codes::USAGE);
    assert!(stdout.contains("Usage:"));
    assert!(stderr.contains("BOOM"));
}

#[rstest]
#[case::inline(r#"{"greeting":"hello"}"#)]
fn inline_payload_reaches_every_instance(#[case] conf: &str) {
    let state = Arc::new(ProbeState::default());
    let mut app = application(&["ember:Probe", "--conf", conf, "--instances", "2"], &state);

    let launched = expect_running(launch(&mut app).0);
    for (_, _, config) in state.contexts() {
        assert_eq!(config, json!({"greeting": "hello"}));
    }
    stop(&mut app, &launched);
}

#[test]
fn payload_from_a_file_reaches_the_deployable() {
    let mut file = NamedTempFile::new().expect("temp file");
    write!(file, r#"{{"source":"disk"}}"#).expect("write payload");
    let path = file.path().to_str().expect("utf8 path").to_owned();

    let state = Arc::new(ProbeState::default());
    let mut app = application(&["ember:Probe", "--conf", &path], &state);

    let launched = expect_running(launch(&mut app).0);
    assert_eq!(state.contexts()[0].2, json!({"source": "disk"}));
    stop(&mut app, &launched);
}

#[test]
fn malformed_payload_degrades_to_an_empty_document() {
    let state = Arc::new(ProbeState::default());
    let mut app = application(&["ember:Probe", "--conf", "{not json"], &state);

    let launched = expect_running(launch(&mut app).0);
    assert_eq!(state.contexts()[0].2, json!({}));
    stop(&mut app, &launched);
}

#[test]
fn payload_hook_rewrite_replaces_the_parsed_document() {
    let state = Arc::new(ProbeState::default());
    let hooks = RecordingHooks {
        payload_rewrite: Some(json!({"rewritten": true})),
        ..RecordingHooks::default()
    };
    let mut app =
        application(&["ember:Probe", "--conf", r#"{"original":1}"#], &state).with_hooks(hooks);

    let launched = expect_running(launch(&mut app).0);
    assert_eq!(state.contexts()[0].2, json!({"rewritten": true}));
    stop(&mut app, &launched);
}

#[test]
fn deployment_hook_rewrite_is_honoured_by_the_deploy_call() {
    let state = Arc::new(ProbeState::default());
    let hooks = RecordingHooks {
        instances_rewrite: Some(3),
        deployment_payload_rewrite: Some(json!({"fromHook": true})),
        ..RecordingHooks::default()
    };
    let mut app = application(
        &["ember:Probe", "--instances", "1", "--conf", r#"{"fromFlag": true}"#],
        &state,
    )
    .with_hooks(hooks);

    let launched = expect_running(launch(&mut app).0);
    assert_eq!(state.started.load(Ordering::SeqCst), 3);
    for (_, _, config) in state.contexts() {
        assert_eq!(config, json!({"fromHook": true}));
    }
    stop(&mut app, &launched);
    assert_eq!(state.stopped.load(Ordering::SeqCst), 3);
}

#[test]
fn options_document_configures_the_runtime() {
    let state = Arc::new(ProbeState::default());
    let hooks = RecordingHooks::default();
    let log = hooks.log();
    let mut app = application(
        &[
            "ember:Probe",
            "--options",
            r#"{"eventLoopPoolSize":7,"workerPoolSize":11}"#,
        ],
        &state,
    )
    .with_hooks(hooks);

    let launched = expect_running(launch(&mut app).0);
    {
        let log = log.lock().expect("hook log");
        let options = log.observed_options.as_ref().expect("options observed");
        assert_eq!(options.event_loop_pool_size, 7);
        assert_eq!(options.worker_pool_size, 11);
        assert!(log.started);
    }
    stop(&mut app, &launched);
    assert!(log.lock().expect("hook log").stopped);
}

#[test]
fn options_hook_rewrite_wins_over_the_supplied_document() {
    let state = Arc::new(ProbeState::default());
    let hooks = RecordingHooks {
        options_rewrite: Some(json!({"eventLoopPoolSize": 123})),
        ..RecordingHooks::default()
    };
    let log = hooks.log();
    let mut app = application(
        &["ember:Probe", "--options", r#"{"eventLoopPoolSize":7}"#],
        &state,
    )
    .with_hooks(hooks);

    let launched = expect_running(launch(&mut app).0);
    assert_eq!(
        log.lock()
            .expect("hook log")
            .observed_options
            .as_ref()
            .expect("options observed")
            .event_loop_pool_size,
        123
    );
    stop(&mut app, &launched);
}

#[test]
fn malformed_options_document_fails_initialization() {
    let state = Arc::new(ProbeState::default());
    let mut app = application(&["ember:Probe", "--options", "{not json"], &state);

    let (outcome, stdout, stderr) = launch(&mut app);
    assert_eq!(outcome.exit_code(), exit_codes::INITIALIZATION);
    assert_eq!(stdout, "");
    assert!(stderr.contains("runtime options"));
}

#[test]
fn property_snapshot_feeds_the_runtime_options() {
    let state = Arc::new(ProbeState::default());
    let hooks = RecordingHooks::default();
    let log = hooks.log();
    let snapshot = PropertySnapshot::from_vars([
        ("EMBER_OPTIONS_WORKER_POOL_SIZE".to_owned(), "42".to_owned()),
        ("EMBER_OPTIONS_HA_GROUP".to_owned(), "payments".to_owned()),
    ]);
    let mut app = application(&["ember:Probe"], &state)
        .with_properties(snapshot)
        .with_hooks(hooks);

    let launched = expect_running(launch(&mut app).0);
    {
        let log = log.lock().expect("hook log");
        let options = log.observed_options.as_ref().expect("options observed");
        assert_eq!(options.worker_pool_size, 42);
        assert_eq!(options.ha_group, "payments");
    }
    stop(&mut app, &launched);
}

#[test]
fn options_document_overrides_property_values() {
    let state = Arc::new(ProbeState::default());
    let hooks = RecordingHooks::default();
    let log = hooks.log();
    let snapshot = PropertySnapshot::from_vars([(
        "EMBER_OPTIONS_WORKER_POOL_SIZE".to_owned(),
        "42".to_owned(),
    )]);
    let mut app = application(
        &["ember:Probe", "--options", r#"{"workerPoolSize":9}"#],
        &state,
    )
    .with_properties(snapshot)
    .with_hooks(hooks);

    let launched = expect_running(launch(&mut app).0);
    assert_eq!(
        log.lock()
            .expect("hook log")
            .observed_options
            .as_ref()
            .expect("options observed")
            .worker_pool_size,
        9
    );
    stop(&mut app, &launched);
}

#[test]
fn cluster_flag_produces_a_clustered_runtime() {
    let state = Arc::new(ProbeState::default());
    let mut app = application(
        &["ember:Probe", "--cluster", "--cluster-host", "10.0.0.9"],
        &state,
    );

    let launched = expect_running(launch(&mut app).0);
    assert!(launched.runtime().is_clustered());
    stop(&mut app, &launched);
}

#[test]
fn discovered_provider_enables_metrics() {
    let state = Arc::new(ProbeState::default());
    let providers = StaticProviderRegistry::new(vec![ProviderDescriptor::new(
        "test-metrics",
        json!({"enabled": true}),
    )]);
    let mut app = application(&["ember:Probe"], &state).with_providers(providers);

    let launched = expect_running(launch(&mut app).0);
    assert!(launched.runtime().is_metrics_enabled());
    stop(&mut app, &launched);
}

#[test]
fn manifest_entry_resolves_the_deployable_when_none_is_given() {
    let state = Arc::new(ProbeState::default());
    let mut app = Application::new(["ember"])
        .with_deployable("ember:Probe", probe_factory(&state))
        .with_manifest(StaticManifest::naming("ember:Probe"));

    let launched = expect_running(launch(&mut app).0);
    assert_eq!(launched.identifier(), "ember:Probe");
    assert_eq!(state.started.load(Ordering::SeqCst), 1);
    stop(&mut app, &launched);
}

#[test]
fn missing_deployable_is_a_deployment_error_not_a_usage_error() {
    let state = Arc::new(ProbeState::default());
    let mut app = application(&[], &state);

    let (outcome, stdout, stderr) = launch(&mut app);
    assert_eq!(outcome.exit_code(), exit_codes::DEPLOYMENT);
    assert_eq!(stdout, "");
    assert!(stderr.contains("no deployable"));
}

#[test]
fn unregistered_identifier_is_a_deployment_error() {
    let state = Arc::new(ProbeState::default());
    let mut app = application(&["ember:Ghost"], &state);

    let (outcome, _, stderr) = launch(&mut app);
    assert_eq!(outcome.exit_code(), exit_codes::DEPLOYMENT);
    assert!(stderr.contains("ember:Ghost"));
}

#[test]
fn runtime_creation_failure_maps_to_the_initialization_code() {
    let state = Arc::new(ProbeState::default());
    let hooks = RecordingHooks::default();
    let log = hooks.log();
    let mut app = application(&["ember:Probe"], &state)
        .with_runtime_factory(FailingRuntimeFactory)
        .with_hooks(hooks);

    let (outcome, _, stderr) = launch(&mut app);
    assert_eq!(outcome.exit_code(), exit_codes::INITIALIZATION);
    assert!(stderr.contains("cluster manager unavailable"));
    assert!(
        log.lock()
            .expect("hook log")
            .failure
            .as_deref()
            .expect("failure observed")
            .contains("cluster manager unavailable")
    );
}

#[test]
fn deploy_failure_preserves_the_cause_and_stops_the_runtime() {
    let hooks = RecordingHooks::default();
    let log = hooks.log();
    let mut app = Application::new(["ember", "ember:Broken"])
        .with_deployable("ember:Broken", || {
            Box::new(Broken) as Box<dyn Deployable>
        })
        .with_manifest(StaticManifest::empty())
        .with_hooks(hooks);

    let (outcome, stdout, stderr) = launch(&mut app);
    assert_eq!(outcome.exit_code(), exit_codes::DEPLOYMENT);
    assert_eq!(stdout, "");
    assert!(stderr.contains("ember:Broken"));
    assert!(stderr.contains("boom at start"));
    let log = log.lock().expect("hook log");
    assert!(log.stopped, "runtime is torn down after a failed deploy");
    assert!(
        log.failure
            .as_deref()
            .expect("failure observed")
            .contains("boom at start")
    );
}

struct Broken;

impl Deployable for Broken {
    fn start(&mut self, _context: &DeploymentContext) -> Result<(), DeployError> {
        Err(DeployError::new("boom at start"))
    }
}
