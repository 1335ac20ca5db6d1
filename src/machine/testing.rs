//! In-memory cluster used by the machine tests

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::kubernetes::{
    ClientFactory, ContainerPortInfo, ContainerSpec, ExecChannel, ExecListener, PodEventListener,
    PodInfo, PodPhase, ResourceClient, RouteInfo, ServiceInfo, Subscription, TargetPort,
};

/// How the fake remote command behaves once started
#[derive(Clone, Debug)]
pub enum ExecScript {
    /// Close the channel after the delay
    CloseAfter(Duration),
    /// Report a failure after the delay
    FailAfter(Duration),
    /// Fail and then close, both after the delay
    FailThenClose(Duration),
    /// Never signal anything
    Hang,
}

#[derive(Clone, Debug)]
pub enum WatchStep {
    Phase(PodPhase),
    Close(Option<String>),
    /// Drop the listener without telling it anything
    Vanish,
}

#[derive(Default)]
struct State {
    pods: HashMap<String, PodInfo>,
    services: Vec<ServiceInfo>,
    routes: Vec<RouteInfo>,
    watch_script: Vec<(Duration, WatchStep)>,
    exec_script: Option<ExecScript>,
    exec_commands: Vec<Vec<String>>,
    fail_connect: Option<String>,
    fail_channel_close: Option<String>,
    fail_exec_open: Option<String>,
    fail_watch_open: Option<String>,
}

#[derive(Default)]
struct Counters {
    connections: AtomicUsize,
    released: AtomicUsize,
    subscriptions: AtomicUsize,
    subscriptions_closed: AtomicUsize,
    channels_closed: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
    counters: Arc<Counters>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> Arc<dyn ClientFactory> {
        Arc::new(self.clone())
    }

    pub fn pod(
        name: &str,
        labels: &[(&str, &str)],
        container: &str,
        ports: &[(Option<i32>, Option<&str>)],
    ) -> PodInfo {
        PodInfo {
            name: name.to_string(),
            labels: if labels.is_empty() {
                None
            } else {
                Some(to_map(labels))
            },
            phase: PodPhase::Running,
            containers: vec![ContainerSpec {
                name: container.to_string(),
                ports: ports
                    .iter()
                    .map(|(number, name)| ContainerPortInfo {
                        number: *number,
                        name: name.map(String::from),
                    })
                    .collect(),
            }],
        }
    }

    pub fn service(name: &str, selector: &[(&str, &str)], ports: Vec<TargetPort>) -> ServiceInfo {
        ServiceInfo {
            name: name.to_string(),
            selector: to_map(selector),
            target_ports: ports,
        }
    }

    pub fn route(name: &str, target: &str, host: &str, annotations: &[(&str, &str)]) -> RouteInfo {
        RouteInfo {
            name: name.to_string(),
            target_service: target.to_string(),
            host: host.to_string(),
            annotations: to_map(annotations),
        }
    }

    pub fn add_pod(&self, pod: PodInfo) {
        self.lock().pods.insert(pod.name.clone(), pod);
    }

    pub fn set_phase(&self, pod: &str, phase: PodPhase) {
        if let Some(p) = self.lock().pods.get_mut(pod) {
            p.phase = phase;
        }
    }

    pub fn add_service(&self, service: ServiceInfo) {
        self.lock().services.push(service);
    }

    pub fn add_route(&self, route: RouteInfo) {
        self.lock().routes.push(route);
    }

    pub fn script_watch(&self, steps: Vec<(Duration, WatchStep)>) {
        self.lock().watch_script = steps;
    }

    pub fn script_exec(&self, script: ExecScript) {
        self.lock().exec_script = Some(script);
    }

    pub fn fail_connect(&self, message: &str) {
        self.lock().fail_connect = Some(message.to_string());
    }

    pub fn fail_channel_close(&self, message: &str) {
        self.lock().fail_channel_close = Some(message.to_string());
    }

    /// Make opening the exec channel fail with a transport error
    pub fn fail_exec_open(&self, message: &str) {
        self.lock().fail_exec_open = Some(message.to_string());
    }

    /// Make opening the pod watch fail with a transport error
    pub fn fail_watch_open(&self, message: &str) {
        self.lock().fail_watch_open = Some(message.to_string());
    }

    pub fn exec_commands(&self) -> Vec<Vec<String>> {
        self.lock().exec_commands.clone()
    }

    pub fn connections(&self) -> usize {
        self.counters.connections.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> usize {
        self.counters.subscriptions.load(Ordering::SeqCst)
    }

    pub fn subscriptions_closed(&self) -> usize {
        self.counters.subscriptions_closed.load(Ordering::SeqCst)
    }

    pub fn channels_closed(&self) -> usize {
        self.counters.channels_closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[async_trait]
impl ClientFactory for FakeCluster {
    async fn create(&self, _namespace: &str) -> Result<Box<dyn ResourceClient>> {
        if let Some(message) = self.lock().fail_connect.clone() {
            return Err(Error::connectivity_msg(message));
        }
        self.counters.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeClient {
            cluster: self.clone(),
        }))
    }
}

struct FakeClient {
    cluster: FakeCluster,
}

impl Drop for FakeClient {
    fn drop(&mut self) {
        self.cluster.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResourceClient for FakeClient {
    async fn get_pod(&self, name: &str) -> Result<Option<PodInfo>> {
        Ok(self.cluster.lock().pods.get(name).cloned())
    }

    async fn list_services(&self) -> Result<Vec<ServiceInfo>> {
        Ok(self.cluster.lock().services.clone())
    }

    async fn list_routes(&self) -> Result<Vec<RouteInfo>> {
        Ok(self.cluster.lock().routes.clone())
    }

    async fn exec_in_container(
        &self,
        _pod: &str,
        _container: &str,
        command: Vec<String>,
        listener: Arc<dyn ExecListener>,
    ) -> Result<Box<dyn ExecChannel>> {
        let script = {
            let mut state = self.cluster.lock();
            if let Some(message) = state.fail_exec_open.clone() {
                return Err(Error::connectivity_msg(message));
            }
            state.exec_commands.push(command);
            state
                .exec_script
                .clone()
                .unwrap_or(ExecScript::CloseAfter(Duration::ZERO))
        };

        listener.on_open();
        let task = tokio::spawn(async move {
            match script {
                ExecScript::CloseAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    listener.on_close(None);
                }
                ExecScript::FailAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    listener.on_failure("command terminated with non-zero exit code");
                }
                ExecScript::FailThenClose(delay) => {
                    tokio::time::sleep(delay).await;
                    listener.on_failure("boom");
                    listener.on_close(Some("after failure"));
                }
                ExecScript::Hang => std::future::pending::<()>().await,
            }
        });

        Ok(Box::new(FakeChannel {
            cluster: self.cluster.clone(),
            task,
        }))
    }

    async fn watch_pod(
        &self,
        _name: &str,
        listener: Arc<dyn PodEventListener>,
    ) -> Result<Box<dyn Subscription>> {
        if let Some(message) = self.cluster.lock().fail_watch_open.clone() {
            return Err(Error::connectivity_msg(message));
        }
        self.cluster.counters.subscriptions.fetch_add(1, Ordering::SeqCst);
        let (steps, pod) = {
            let state = self.cluster.lock();
            (state.watch_script.clone(), state.pods.values().next().cloned())
        };
        let mut pod = pod.unwrap_or_else(|| FakeCluster::pod("missing", &[], "dev", &[]));

        let task = tokio::spawn(async move {
            for (delay, step) in steps {
                tokio::time::sleep(delay).await;
                match step {
                    WatchStep::Phase(phase) => {
                        pod.phase = phase;
                        listener.on_event(&pod);
                    }
                    WatchStep::Close(cause) => {
                        listener.on_close(cause);
                        return;
                    }
                    WatchStep::Vanish => {
                        drop(listener);
                        return;
                    }
                }
            }
            // Stay subscribed until closed
            std::future::pending::<()>().await;
        });

        Ok(Box::new(FakeSubscription {
            cluster: self.cluster.clone(),
            task,
        }))
    }
}

struct FakeChannel {
    cluster: FakeCluster,
    task: tokio::task::JoinHandle<()>,
}

#[async_trait]
impl ExecChannel for FakeChannel {
    async fn close(self: Box<Self>) -> Result<()> {
        self.task.abort();
        self.cluster
            .counters
            .channels_closed
            .fetch_add(1, Ordering::SeqCst);
        match self.cluster.lock().fail_channel_close.clone() {
            Some(message) => Err(Error::connectivity_msg(message)),
            None => Ok(()),
        }
    }
}

struct FakeSubscription {
    cluster: FakeCluster,
    task: tokio::task::JoinHandle<()>,
}

impl Subscription for FakeSubscription {
    fn close(self: Box<Self>) {
        self.task.abort();
        self.cluster
            .counters
            .subscriptions_closed
            .fetch_add(1, Ordering::SeqCst);
    }
}
