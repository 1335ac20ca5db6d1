//! Server discovery: pod -> services -> routes

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{Instrument, debug, info};

use super::MachineHandle;
use crate::error::{Error, Result};
use crate::kubernetes::{
    ContainerSpec, PodInfo, SERVER_NAME_ANNOTATION, SERVER_PATH_ANNOTATION,
    SERVER_PROTOCOL_ANNOTATION, ServiceInfo, TargetPort,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    Running,
    Stopped,
    Unknown,
}

/// An externally reachable endpoint of a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub url: String,
    pub status: ServerStatus,
}

/// True when every selector label is present on the pod with the same value.
/// A pod without labels is never selected.
pub fn selects_pod(service: &ServiceInfo, pod: &PodInfo) -> bool {
    let Some(labels) = pod.labels.as_ref() else {
        return false;
    };
    service
        .selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

/// True when any service target port resolves to a port declared by the container
pub fn exposes_container(service: &ServiceInfo, container: &ContainerSpec) -> bool {
    service.target_ports.iter().any(|target| match target {
        TargetPort::Number(n) => container.ports.iter().any(|p| p.number == Some(*n)),
        TargetPort::Name(name) => container
            .ports
            .iter()
            .any(|p| p.name.as_deref() == Some(name.as_str())),
    })
}

impl MachineHandle {
    /// Discover the servers exposed for this machine, keyed by server name.
    ///
    /// A server is published by a route that targets a service selecting this
    /// machine's pod and port, and that carries the `server-name` annotation.
    /// Routes sharing a server name overwrite each other in listing order.
    pub async fn servers(&self) -> Result<BTreeMap<String, ServerEntry>> {
        async {
            let matched = self.matched_services().await?;

            let routes = {
                let client = self.connect().await?;
                client.list_routes().await?
            };

            let mut servers = BTreeMap::new();
            for route in routes {
                if !matched.contains(&route.target_service) {
                    continue;
                }
                let Some(name) = route.annotation(SERVER_NAME_ANNOTATION) else {
                    debug!(route = %route.name, "Route has no server name, skipping");
                    continue;
                };
                let protocol = route.annotation(SERVER_PROTOCOL_ANNOTATION).unwrap_or_default();
                let path = route.annotation(SERVER_PATH_ANNOTATION).unwrap_or_default();
                servers.insert(
                    name.to_string(),
                    ServerEntry {
                        url: format!("{}://{}{}", protocol, route.host, path),
                        status: ServerStatus::Running,
                    },
                );
            }

            info!(servers = servers.len(), "Discovered machine servers");
            self.progress.servers_discovered(&self.name(), servers.len());
            Ok::<_, Error>(servers)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Names of the services that expose this machine's container
    async fn matched_services(&self) -> Result<HashSet<String>> {
        let pod = {
            let client = self.connect().await?;
            client
                .get_pod(&self.pod_name)
                .await?
                .ok_or_else(|| Error::pod_not_found(&self.pod_name, &self.namespace))?
        };

        let container = pod
            .container(&self.container_name)
            .ok_or_else(|| Error::InconsistentState {
                pod: self.pod_name.clone(),
                container: self.container_name.clone(),
            })?;

        let services = {
            let client = self.connect().await?;
            client.list_services().await?
        };

        let matched: HashSet<String> = services
            .into_iter()
            .filter(|s| selects_pod(s, &pod) && exposes_container(s, container))
            .map(|s| s.name)
            .collect();

        debug!(services = ?matched, "Matched services");
        Ok(matched)
    }
}
