use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{
    ApiResource, AttachParams, AttachedProcess, DynamicObject, GroupVersionKind, ListParams,
};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client, Config};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::resources::{PodInfo, RouteInfo, ServiceInfo};
use super::{ClientFactory, ExecChannel, ExecListener, PodEventListener, ResourceClient, Subscription};
use crate::error::{Error, Result};

/// Page size for paginated list requests
const PAGE_SIZE: u32 = 500;

/// Remote status reported by the exec channel when the command failed
const STATUS_FAILURE: &str = "Failure";

/// Builds a fresh `kube::Client` for every operation against one kubeconfig context
pub struct KubeClientFactory {
    kubeconfig: Kubeconfig,
    context: String,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
}

impl KubeClientFactory {
    /// Read the kubeconfig and select `context`, or the kubeconfig's current context
    pub fn new(context: Option<&str>) -> Result<Self> {
        let kubeconfig =
            Kubeconfig::read().map_err(|e| Error::Config(format!("cannot read kubeconfig: {}", e)))?;

        let context = context
            .map(String::from)
            .or_else(|| kubeconfig.current_context.clone())
            .ok_or_else(|| {
                Error::Config("No context specified and no current context in kubeconfig".into())
            })?;

        // Verify context exists
        if !kubeconfig.contexts.iter().any(|c| c.name == context) {
            return Err(Error::Config(format!(
                "Context '{}' not found in kubeconfig",
                context
            )));
        }

        Ok(Self {
            kubeconfig,
            context,
            connect_timeout: None,
            read_timeout: None,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Watches and exec channels stay idle for long stretches; leave this unset
    /// unless every request is expected to answer quickly.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn context(&self) -> &str {
        &self.context
    }
}

#[async_trait]
impl ClientFactory for KubeClientFactory {
    async fn create(&self, namespace: &str) -> Result<Box<dyn ResourceClient>> {
        let mut config = Config::from_custom_kubeconfig(
            self.kubeconfig.clone(),
            &KubeConfigOptions {
                context: Some(self.context.clone()),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| {
            Error::Config(format!(
                "Failed to load kubeconfig for context '{}': {}",
                self.context, e
            ))
        })?;

        config.connect_timeout = self.connect_timeout;
        config.read_timeout = self.read_timeout;

        let client = Client::try_from(config)?;
        trace!(context = %self.context, namespace = %namespace, "Opened cluster client");

        Ok(Box::new(KubeResourceClient {
            client,
            namespace: namespace.to_string(),
        }))
    }
}

/// `ResourceClient` backed by the Kubernetes API (plus OpenShift routes)
pub struct KubeResourceClient {
    client: Client,
    namespace: String,
}

impl KubeResourceClient {
    fn routes_resource() -> ApiResource {
        ApiResource::from_gvk(&GroupVersionKind::gvk("route.openshift.io", "v1", "Route"))
    }

    /// List every object, following continue tokens
    async fn list_all<K>(&self, api: &Api<K>, kind: &str) -> Result<Vec<K>>
    where
        K: Clone + DeserializeOwned + Debug,
    {
        let mut items = Vec::new();
        let mut continue_token: Option<String> = None;
        let mut page_count = 0u32;

        loop {
            let mut params = ListParams::default().limit(PAGE_SIZE);
            if let Some(ref token) = continue_token {
                params = params.continue_token(token);
            }

            let list = api.list(&params).await?;
            items.extend(list.items);
            page_count += 1;

            match list.metadata.continue_ {
                Some(token) if !token.is_empty() => continue_token = Some(token),
                _ => break,
            }
        }

        debug!(
            kind = %kind,
            namespace = %self.namespace,
            pages = page_count,
            total_items = items.len(),
            "Listed resources"
        );

        Ok(items)
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn get_pod(&self, name: &str) -> Result<Option<PodInfo>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let pod = api.get_opt(name).await?;
        Ok(pod.as_ref().map(PodInfo::from))
    }

    async fn list_services(&self) -> Result<Vec<ServiceInfo>> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), &self.namespace);
        let services = self.list_all(&api, "services").await?;
        Ok(services.iter().map(ServiceInfo::from).collect())
    }

    async fn list_routes(&self) -> Result<Vec<RouteInfo>> {
        let api: Api<DynamicObject> = Api::namespaced_with(
            self.client.clone(),
            &self.namespace,
            &Self::routes_resource(),
        );
        let routes = self.list_all(&api, "routes").await?;
        Ok(routes
            .iter()
            .filter_map(|route| {
                let info = RouteInfo::from_dynamic(route);
                if info.is_none() {
                    debug!(route = ?route.metadata.name, "Skipping route without target or host");
                }
                info
            })
            .collect())
    }

    async fn exec_in_container(
        &self,
        pod: &str,
        container: &str,
        command: Vec<String>,
        listener: Arc<dyn ExecListener>,
    ) -> Result<Box<dyn ExecChannel>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true);

        let command = decode_command(command)?;
        let mut process = api.exec(pod, command, &params).await?;
        listener.on_open();

        let mut output = Vec::new();
        if let Some(stdout) = process.stdout() {
            output.push(tokio::spawn(log_output(BufReader::new(stdout), "stdout")));
        }
        if let Some(stderr) = process.stderr() {
            output.push(tokio::spawn(log_output(BufReader::new(stderr), "stderr")));
        }

        let status = process.take_status();
        let status_task = tokio::spawn(async move {
            let status = match status {
                Some(status) => status.await,
                None => None,
            };
            match status {
                Some(s) if s.status.as_deref() == Some(STATUS_FAILURE) => {
                    let cause = s.message.unwrap_or_else(|| "remote command failed".to_string());
                    listener.on_failure(&cause);
                }
                Some(s) => listener.on_close(s.message.as_deref()),
                None => listener.on_close(None),
            }
        });

        Ok(Box::new(KubeExecChannel {
            process,
            status_task,
            output,
        }))
    }

    async fn watch_pod(
        &self,
        name: &str,
        listener: Arc<dyn PodEventListener>,
    ) -> Result<Box<dyn Subscription>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let config = watcher::Config::default().fields(&format!("metadata.name={}", name));
        let pod_name = name.to_string();

        let task = tokio::spawn(async move {
            let mut stream = watcher(api, config).applied_objects().boxed();
            loop {
                match stream.try_next().await {
                    Ok(Some(pod)) => listener.on_event(&PodInfo::from(&pod)),
                    Ok(None) => {
                        debug!(pod = %pod_name, "Pod watch stream ended");
                        listener.on_close(None);
                        break;
                    }
                    Err(e) => {
                        warn!(pod = %pod_name, error = %e, "Pod watch failed");
                        listener.on_close(Some(e.to_string()));
                        break;
                    }
                }
            }
        });

        info!(pod = %name, namespace = %self.namespace, "Watching pod");
        Ok(Box::new(PodWatch { task }))
    }
}

/// Undo the per-token percent-encoding of an exec command.
///
/// `Api::exec` form-encodes every `command` query parameter itself and the
/// apiserver decodes it exactly once, so the tokens must reach kube raw.
fn decode_command(command: Vec<String>) -> Result<Vec<String>> {
    command
        .iter()
        .enumerate()
        .map(|(index, token)| {
            urlencoding::decode(token)
                .map(|decoded| decoded.into_owned())
                .map_err(|e| Error::Encoding {
                    index,
                    reason: e.to_string(),
                })
        })
        .collect()
}

async fn log_output<R>(reader: BufReader<R>, stream: &'static str)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let mut lines = reader.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(stream = stream, "{}", line);
    }
}

struct KubeExecChannel {
    process: AttachedProcess,
    status_task: JoinHandle<()>,
    output: Vec<JoinHandle<()>>,
}

#[async_trait]
impl ExecChannel for KubeExecChannel {
    async fn close(self: Box<Self>) -> Result<()> {
        let KubeExecChannel {
            process,
            status_task,
            output,
        } = *self;

        let result = if status_task.is_finished() {
            process.join().await.map_err(Error::connectivity)
        } else {
            // Still running remotely: tear the channel down, the abort itself is not an error
            process.abort();
            let _ = process.join().await;
            status_task.abort();
            Ok(())
        };

        for task in output {
            let _ = task.await;
        }

        result
    }
}

struct PodWatch {
    task: JoinHandle<()>,
}

impl Subscription for PodWatch {
    fn close(self: Box<Self>) {
        self.task.abort();
    }
}
