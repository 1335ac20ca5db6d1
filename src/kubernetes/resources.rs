//! Read-only snapshots of the cluster objects a machine correlates
//!
//! The machine logic only ever sees these types. Conversions from the
//! `k8s-openapi` / dynamic objects live here so the client stays thin.

use k8s_openapi::api::core::v1::{Container, Pod, Service, ServicePort};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::DynamicObject;
use std::collections::BTreeMap;
use std::fmt;

/// Route annotation naming the server exposed through the route
pub const SERVER_NAME_ANNOTATION: &str = "server-name";
/// Route annotation holding the path appended to the route host
pub const SERVER_PATH_ANNOTATION: &str = "server-path";
/// Route annotation holding the URL scheme
pub const SERVER_PROTOCOL_ANNOTATION: &str = "server-protocol";

/// Pod lifecycle phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
    Other(String),
}

impl PodPhase {
    pub fn is_running(&self) -> bool {
        matches!(self, PodPhase::Running)
    }
}

impl From<&str> for PodPhase {
    fn from(phase: &str) -> Self {
        match phase {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            "Unknown" => PodPhase::Unknown,
            other => PodPhase::Other(other.to_string()),
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
            PodPhase::Other(other) => other,
        };
        f.write_str(s)
    }
}

/// A port declared by a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerPortInfo {
    pub number: Option<i32>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub ports: Vec<ContainerPortInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodInfo {
    pub name: String,
    /// `None` when the pod carries no labels at all
    pub labels: Option<BTreeMap<String, String>>,
    pub phase: PodPhase,
    pub containers: Vec<ContainerSpec>,
}

impl PodInfo {
    pub fn container(&self, name: &str) -> Option<&ContainerSpec> {
        self.containers.iter().find(|c| c.name == name)
    }
}

/// Service target port, given either numerically or by port name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPort {
    Number(i32),
    Name(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub selector: BTreeMap<String, String>,
    pub target_ports: Vec<TargetPort>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteInfo {
    pub name: String,
    pub target_service: String,
    pub host: String,
    pub annotations: BTreeMap<String, String>,
}

impl RouteInfo {
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

impl From<&Container> for ContainerSpec {
    fn from(container: &Container) -> Self {
        let ports = container
            .ports
            .iter()
            .flatten()
            .map(|p| ContainerPortInfo {
                number: Some(p.container_port),
                name: p.name.clone(),
            })
            .collect();
        Self {
            name: container.name.clone(),
            ports,
        }
    }
}

impl From<&Pod> for PodInfo {
    fn from(pod: &Pod) -> Self {
        let phase = pod
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .map(PodPhase::from)
            .unwrap_or(PodPhase::Unknown);
        let containers = pod
            .spec
            .as_ref()
            .map(|s| s.containers.iter().map(ContainerSpec::from).collect())
            .unwrap_or_default();
        Self {
            name: pod.metadata.name.clone().unwrap_or_default(),
            labels: pod.metadata.labels.clone(),
            phase,
            containers,
        }
    }
}

// An omitted targetPort defaults to the service port number
fn target_port(port: &ServicePort) -> TargetPort {
    match &port.target_port {
        Some(IntOrString::Int(n)) => TargetPort::Number(*n),
        Some(IntOrString::String(s)) => TargetPort::Name(s.clone()),
        None => TargetPort::Number(port.port),
    }
}

impl From<&Service> for ServiceInfo {
    fn from(service: &Service) -> Self {
        let spec = service.spec.as_ref();
        Self {
            name: service.metadata.name.clone().unwrap_or_default(),
            selector: spec.and_then(|s| s.selector.clone()).unwrap_or_default(),
            target_ports: spec
                .and_then(|s| s.ports.as_ref())
                .map(|ports| ports.iter().map(target_port).collect())
                .unwrap_or_default(),
        }
    }
}

impl RouteInfo {
    /// Convert an OpenShift `Route` read as a dynamic object.
    /// Returns `None` when the route has no target service or host.
    pub fn from_dynamic(route: &DynamicObject) -> Option<Self> {
        let spec = route.data.get("spec")?;
        let target_service = spec.get("to")?.get("name")?.as_str()?.to_string();
        let host = spec.get("host")?.as_str()?.to_string();
        Some(Self {
            name: route.metadata.name.clone().unwrap_or_default(),
            target_service,
            host,
            annotations: route.metadata.annotations.clone().unwrap_or_default(),
        })
    }
}
