mod client;
pub mod resources;

pub use client::KubeClientFactory;
pub use resources::{
    ContainerPortInfo, ContainerSpec, PodInfo, PodPhase, RouteInfo, ServiceInfo, TargetPort,
    SERVER_NAME_ANNOTATION, SERVER_PATH_ANNOTATION, SERVER_PROTOCOL_ANNOTATION,
};

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;

/// Receives signals from a running remote command
pub trait ExecListener: Send + Sync {
    fn on_open(&self) {}

    /// The execution failed; `cause` describes why
    fn on_failure(&self, cause: &str);

    /// The remote channel closed
    fn on_close(&self, reason: Option<&str>);
}

/// Remote execution channel, torn down with [`ExecChannel::close`]
#[async_trait]
pub trait ExecChannel: Send {
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Receives pod events from a watch subscription
pub trait PodEventListener: Send + Sync {
    fn on_event(&self, pod: &PodInfo);

    /// The subscription ended on its own. `cause` is set when it failed.
    fn on_close(&self, cause: Option<String>);
}

/// Live pod watch. Closing it stops event delivery.
pub trait Subscription: Send {
    fn close(self: Box<Self>);
}

/// Namespace-scoped access to the resources a machine needs
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn get_pod(&self, name: &str) -> Result<Option<PodInfo>>;

    async fn list_services(&self) -> Result<Vec<ServiceInfo>>;

    async fn list_routes(&self) -> Result<Vec<RouteInfo>>;

    /// Start `command` in `container`. Every token arrives percent-encoded.
    async fn exec_in_container(
        &self,
        pod: &str,
        container: &str,
        command: Vec<String>,
        listener: Arc<dyn ExecListener>,
    ) -> Result<Box<dyn ExecChannel>>;

    async fn watch_pod(
        &self,
        name: &str,
        listener: Arc<dyn PodEventListener>,
    ) -> Result<Box<dyn Subscription>>;
}

/// Opens a short-lived client per operation.
/// The client is released when the returned box is dropped.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create(&self, namespace: &str) -> Result<Box<dyn ResourceClient>>;
}
