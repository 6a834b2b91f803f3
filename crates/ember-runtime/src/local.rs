//! Thread-backed in-process runtime.
//!
//! `LocalRuntime` executes deployable starts on thread pools sized from
//! the merged options: event-loop deployments share a pool of
//! `event_loop_pool_size` threads, worker deployments a pool of
//! `worker_pool_size` threads, and virtual-thread deployments get one
//! dedicated thread per instance. Deploy calls block until every
//! instance has resolved.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, mpsc};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use ember_config::{DeploymentOptions, RuntimeOptions, ThreadingModel};

use crate::deployable::{Deployable, DeployError, DeployableFactory, DeploymentContext};
use crate::handle::{DeploymentId, RuntimeError, RuntimeFactory, RuntimeHandle};

const RUNTIME_TARGET: &str = "ember::runtime";

type Job = Box<dyn FnOnce() + Send + 'static>;

type InstanceResult = (Box<dyn Deployable>, Result<(), DeployError>);

/// Fixed-size pool draining jobs from a shared channel.
struct ThreadPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl ThreadPool {
    fn new(label: &str, size: u32) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(size as usize);
        for index in 0..size {
            let receiver = Arc::clone(&receiver);
            let builder = thread::Builder::new().name(format!("{label}-{index}"));
            let handle = builder.spawn(move || {
                loop {
                    let job = match receiver.lock() {
                        Ok(guard) => guard.recv(),
                        Err(_) => break,
                    };
                    match job {
                        Ok(job) => job(),
                        Err(_) => break,
                    }
                }
            });
            match handle {
                Ok(handle) => workers.push(handle),
                Err(error) => {
                    warn!(target: RUNTIME_TARGET, %error, label, "failed to spawn pool worker");
                }
            }
        }
        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    fn execute(&self, job: Job) -> Result<(), RuntimeError> {
        let guard = lock(&self.sender);
        match guard.as_ref() {
            Some(sender) => sender.send(job).map_err(|_| RuntimeError::ShuttingDown),
            None => Err(RuntimeError::ShuttingDown),
        }
    }

    /// Drops the job channel and joins the workers. Idempotent.
    fn close(&self) {
        lock(&self.sender).take();
        let mut workers = lock(&self.workers);
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct Inner {
    clustered: bool,
    metrics_enabled: bool,
    event_loop: ThreadPool,
    worker: ThreadPool,
    deployments: Mutex<BTreeMap<DeploymentId, Vec<Box<dyn Deployable>>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// The built-in thread-backed execution engine.
#[derive(Clone)]
pub struct LocalRuntime {
    inner: Arc<Inner>,
}

impl LocalRuntime {
    /// Creates a started runtime from merged options.
    pub fn new(options: &RuntimeOptions) -> Result<Self, RuntimeError> {
        if options.event_loop_pool_size == 0 {
            return Err(RuntimeError::Startup(
                "event loop pool size must be at least 1".to_owned(),
            ));
        }
        if options.worker_pool_size == 0 {
            return Err(RuntimeError::Startup(
                "worker pool size must be at least 1".to_owned(),
            ));
        }
        info!(
            target: RUNTIME_TARGET,
            event_loops = options.event_loop_pool_size,
            workers = options.worker_pool_size,
            clustered = options.clustered,
            metrics = options.metrics.enabled,
            "starting local runtime"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                clustered: options.clustered,
                metrics_enabled: options.metrics.enabled,
                event_loop: ThreadPool::new("ember-eventloop", options.event_loop_pool_size),
                worker: ThreadPool::new("ember-worker", options.worker_pool_size),
                deployments: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        })
    }

    fn dispatch(&self, threading: ThreadingModel, instance: u32, job: Job) -> Result<(), RuntimeError> {
        match threading {
            ThreadingModel::EventLoop => self.inner.event_loop.execute(job),
            ThreadingModel::Worker => self.inner.worker.execute(job),
            ThreadingModel::VirtualThread => thread::Builder::new()
                .name(format!("ember-vthread-{instance}"))
                .spawn(move || job())
                .map(drop)
                .map_err(|error| RuntimeError::Startup(error.to_string())),
        }
    }

    fn stop_instances(instances: Vec<Box<dyn Deployable>>) -> Option<DeployError> {
        let mut first_error = None;
        for mut instance in instances.into_iter().rev() {
            if let Err(error) = instance.stop() {
                warn!(target: RUNTIME_TARGET, %error, "deployable failed to stop");
                first_error.get_or_insert(error);
            }
        }
        first_error
    }

    /// Collects the results of `dispatched` in-flight instances and
    /// resolves the deployment. Any failure, including a `dispatch_error`
    /// raised before all instances were queued, stops the instances that
    /// did start before the error is returned.
    fn settle_deploy(
        receiver: &mpsc::Receiver<InstanceResult>,
        dispatched: u32,
        dispatch_error: Option<RuntimeError>,
    ) -> Result<Vec<Box<dyn Deployable>>, RuntimeError> {
        let mut started = Vec::with_capacity(dispatched as usize);
        let mut failure: Option<DeployError> = None;
        let mut lost = false;
        for _ in 0..dispatched {
            match receiver.recv() {
                Ok((deployable, Ok(()))) => started.push(deployable),
                Ok((_, Err(error))) => {
                    failure.get_or_insert(error);
                }
                Err(_) => {
                    lost = true;
                    break;
                }
            }
        }

        if let Some(error) = dispatch_error {
            Self::stop_instances(started);
            return Err(error);
        }
        if let Some(source) = failure {
            Self::stop_instances(started);
            return Err(RuntimeError::Deploy { source });
        }
        if lost {
            Self::stop_instances(started);
            return Err(RuntimeError::WorkerLost);
        }
        Ok(started)
    }
}

impl RuntimeHandle for LocalRuntime {
    fn deploy(
        &self,
        factory: Arc<dyn DeployableFactory>,
        options: &DeploymentOptions,
    ) -> Result<DeploymentId, RuntimeError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(RuntimeError::ShuttingDown);
        }
        if options.instances == 0 {
            return Err(RuntimeError::Deploy {
                source: DeployError::new("instance count must be at least 1"),
            });
        }

        let handle: Arc<dyn RuntimeHandle> = Arc::new(self.clone());
        let (sender, receiver) = mpsc::channel();
        let mut dispatched = 0;
        let mut dispatch_error = None;
        for instance in 0..options.instances {
            let factory = Arc::clone(&factory);
            let sender = sender.clone();
            let context = DeploymentContext::new(
                Arc::clone(&handle),
                options.threading,
                options.config.clone(),
                instance,
            );
            let job: Job = Box::new(move || {
                let mut deployable = factory.create();
                let result = deployable.start(&context);
                let _ = sender.send((deployable, result));
            });
            // Instances queued in earlier iterations may already be
            // starting; on a dispatch failure they still get drained and
            // stopped in settle_deploy.
            match self.dispatch(options.threading, instance, job) {
                Ok(()) => dispatched += 1,
                Err(error) => {
                    dispatch_error = Some(error);
                    break;
                }
            }
        }
        drop(sender);

        let started = Self::settle_deploy(&receiver, dispatched, dispatch_error)?;

        let id = DeploymentId::new(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.inner.deployments).insert(id, started);
        info!(
            target: RUNTIME_TARGET,
            %id,
            instances = options.instances,
            threading = %options.threading,
            "deployment started"
        );
        Ok(id)
    }

    fn undeploy(&self, id: DeploymentId) -> Result<(), RuntimeError> {
        let instances = lock(&self.inner.deployments)
            .remove(&id)
            .ok_or(RuntimeError::UnknownDeployment(id))?;
        match Self::stop_instances(instances) {
            Some(source) => Err(RuntimeError::Stop { source }),
            None => Ok(()),
        }
    }

    fn shutdown(&self, timeout: Duration) -> Result<(), RuntimeError> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let drained: Vec<_> = {
            let mut deployments = lock(&self.inner.deployments);
            let mut entries: Vec<_> = std::mem::take(&mut *deployments).into_iter().collect();
            entries.reverse();
            entries
        };

        let (sender, receiver) = mpsc::channel();
        let stopper = thread::Builder::new()
            .name("ember-shutdown".to_owned())
            .spawn(move || {
                let mut first_error = None;
                for (_, instances) in drained {
                    if let Some(error) = Self::stop_instances(instances) {
                        first_error.get_or_insert(error);
                    }
                }
                let _ = sender.send(first_error);
            })
            .map_err(|error| RuntimeError::Startup(error.to_string()))?;

        match receiver.recv_timeout(timeout) {
            Ok(outcome) => {
                let _ = stopper.join();
                self.inner.event_loop.close();
                self.inner.worker.close();
                info!(target: RUNTIME_TARGET, "local runtime stopped");
                match outcome {
                    Some(source) => Err(RuntimeError::Stop { source }),
                    None => Ok(()),
                }
            }
            Err(_) => Err(RuntimeError::ShutdownTimeout(timeout)),
        }
    }

    fn is_metrics_enabled(&self) -> bool {
        self.inner.metrics_enabled
    }

    fn is_clustered(&self) -> bool {
        self.inner.clustered
    }
}

/// Stock [`RuntimeFactory`] producing [`LocalRuntime`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalRuntimeFactory;

impl RuntimeFactory for LocalRuntimeFactory {
    fn create(&self, options: &RuntimeOptions) -> Result<Arc<dyn RuntimeHandle>, RuntimeError> {
        LocalRuntime::new(options).map(|runtime| Arc::new(runtime) as Arc<dyn RuntimeHandle>)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct Probe {
        started: AtomicUsize,
        stopped: AtomicUsize,
        threading: Mutex<Option<ThreadingModel>>,
        config: Mutex<Option<serde_json::Value>>,
    }

    struct ProbeDeployable {
        probe: Arc<Probe>,
        fail_on_start: bool,
    }

    impl Deployable for ProbeDeployable {
        fn start(&mut self, context: &DeploymentContext) -> Result<(), DeployError> {
            *lock(&self.probe.threading) = Some(context.threading_model());
            *lock(&self.probe.config) = Some(context.config().clone());
            if self.fail_on_start {
                return Err(DeployError::new("boom during start"));
            }
            self.probe.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), DeployError> {
            self.probe.stopped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn probe_factory(probe: &Arc<Probe>, fail_on_start: bool) -> Arc<dyn DeployableFactory> {
        let probe = Arc::clone(probe);
        Arc::new(move || {
            Box::new(ProbeDeployable {
                probe: Arc::clone(&probe),
                fail_on_start,
            }) as Box<dyn Deployable>
        })
    }

    fn runtime() -> LocalRuntime {
        let mut options = RuntimeOptions::default();
        options.event_loop_pool_size = 2;
        options.worker_pool_size = 2;
        LocalRuntime::new(&options).expect("runtime")
    }

    fn deployment_options(instances: u32, threading: ThreadingModel) -> DeploymentOptions {
        DeploymentOptions {
            instances,
            threading,
            config: json!({"from": "test"}),
            ha: false,
        }
    }

    #[test]
    fn deploys_the_requested_instance_count() {
        let probe = Arc::new(Probe::default());
        let runtime = runtime();
        runtime
            .deploy(
                probe_factory(&probe, false),
                &deployment_options(4, ThreadingModel::EventLoop),
            )
            .expect("deploy");
        assert_eq!(probe.started.load(Ordering::SeqCst), 4);
    }

    #[rstest]
    #[case::event_loop(ThreadingModel::EventLoop)]
    #[case::worker(ThreadingModel::Worker)]
    #[case::virtual_thread(ThreadingModel::VirtualThread)]
    fn context_carries_threading_model_and_payload(#[case] threading: ThreadingModel) {
        let probe = Arc::new(Probe::default());
        let runtime = runtime();
        runtime
            .deploy(probe_factory(&probe, false), &deployment_options(1, threading))
            .expect("deploy");
        assert_eq!(*lock(&probe.threading), Some(threading));
        assert_eq!(*lock(&probe.config), Some(json!({"from": "test"})));
    }

    #[test]
    fn dispatch_failure_drains_and_stops_instances_already_started() {
        let probe = Arc::new(Probe::default());
        let factory = probe_factory(&probe, false);
        let (sender, receiver) = mpsc::channel::<InstanceResult>();

        // One instance resolved before the next dispatch failed.
        let mut deployable = factory.create();
        let result = deployable.start(&DeploymentContext::new(
            Arc::new(runtime()),
            ThreadingModel::EventLoop,
            json!({"from": "test"}),
            0,
        ));
        sender.send((deployable, result)).expect("send result");
        drop(sender);

        let error = LocalRuntime::settle_deploy(&receiver, 1, Some(RuntimeError::ShuttingDown))
            .err()
            .expect("dispatch error surfaces");
        assert!(matches!(error, RuntimeError::ShuttingDown));
        assert_eq!(probe.started.load(Ordering::SeqCst), 1);
        assert_eq!(probe.stopped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn start_failure_fails_the_deployment_and_stops_survivors() {
        let good = Arc::new(Probe::default());
        let bad = Arc::new(Probe::default());
        let runtime = runtime();
        let good_factory = probe_factory(&good, false);
        let bad_factory = probe_factory(&bad, true);

        runtime
            .deploy(good_factory, &deployment_options(2, ThreadingModel::Worker))
            .expect("good deploy");
        let error = runtime
            .deploy(bad_factory, &deployment_options(2, ThreadingModel::Worker))
            .expect_err("bad deploy");
        assert!(error.to_string().contains("boom during start"));
        // The failed deployment left nothing registered.
        assert!(matches!(
            runtime.undeploy(DeploymentId::new(99)),
            Err(RuntimeError::UnknownDeployment(_))
        ));
    }

    #[test]
    fn undeploy_stops_every_instance() {
        let probe = Arc::new(Probe::default());
        let runtime = runtime();
        let id = runtime
            .deploy(
                probe_factory(&probe, false),
                &deployment_options(3, ThreadingModel::EventLoop),
            )
            .expect("deploy");
        runtime.undeploy(id).expect("undeploy");
        assert_eq!(probe.stopped.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn shutdown_stops_deployments_and_refuses_new_work() {
        let probe = Arc::new(Probe::default());
        let runtime = runtime();
        runtime
            .deploy(
                probe_factory(&probe, false),
                &deployment_options(2, ThreadingModel::EventLoop),
            )
            .expect("deploy");
        runtime
            .shutdown(Duration::from_secs(5))
            .expect("shutdown");
        assert_eq!(probe.stopped.load(Ordering::SeqCst), 2);
        assert!(matches!(
            runtime.deploy(
                probe_factory(&probe, false),
                &deployment_options(1, ThreadingModel::EventLoop),
            ),
            Err(RuntimeError::ShuttingDown)
        ));
    }

    #[test]
    fn slow_stop_exceeding_the_bound_times_out() {
        struct SlowStop;
        impl Deployable for SlowStop {
            fn start(&mut self, _context: &DeploymentContext) -> Result<(), DeployError> {
                Ok(())
            }
            fn stop(&mut self) -> Result<(), DeployError> {
                thread::sleep(Duration::from_millis(400));
                Ok(())
            }
        }
        let runtime = runtime();
        runtime
            .deploy(
                Arc::new(|| Box::new(SlowStop) as Box<dyn Deployable>),
                &deployment_options(1, ThreadingModel::EventLoop),
            )
            .expect("deploy");
        assert!(matches!(
            runtime.shutdown(Duration::from_millis(20)),
            Err(RuntimeError::ShutdownTimeout(_))
        ));
    }

    #[test]
    fn handle_reports_configured_state() {
        let mut options = RuntimeOptions::default();
        options.clustered = true;
        options.metrics.enabled = true;
        let runtime = LocalRuntime::new(&options).expect("runtime");
        assert!(runtime.is_clustered());
        assert!(runtime.is_metrics_enabled());

        assert!(matches!(
            LocalRuntime::new(&RuntimeOptions {
                event_loop_pool_size: 0,
                ..RuntimeOptions::default()
            }),
            Err(RuntimeError::Startup(_))
        ));
    }
}
