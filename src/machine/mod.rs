// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Handle to a single container running inside a pod
//!
//! A [`MachineHandle`] is identified by namespace, pod name and container name.
//! It discovers the servers exposed for the container through services and
//! routes, runs commands in it, and waits for its pod to start running.
//! Every operation opens its own short-lived client from the factory.

mod exec;
mod readiness;
mod servers;

#[cfg(test)]
mod testing;

pub use exec::EXEC_TIMEOUT;
#[cfg(test)]
pub(crate) use exec::encode_command;
pub use servers::{ServerEntry, ServerStatus, exposes_container, selects_pod};

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{Span, info_span};

use crate::error::Result;
use crate::kubernetes::{ClientFactory, ResourceClient};
use crate::progress::{ProgressHandle, create_progress_handle};

/// Runtime surface shared by machines, independent of how they are hosted
#[async_trait]
pub trait Machine: Send + Sync {
    fn properties(&self) -> HashMap<String, String>;

    async fn servers(&self) -> Result<BTreeMap<String, ServerEntry>>;
}

pub struct MachineHandle {
    factory: Arc<dyn ClientFactory>,
    namespace: String,
    pod_name: String,
    container_name: String,
    span: Span,
    progress: ProgressHandle,
}

impl MachineHandle {
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        namespace: impl Into<String>,
        pod_name: impl Into<String>,
        container_name: impl Into<String>,
    ) -> Self {
        let namespace = namespace.into();
        let pod_name = pod_name.into();
        let container_name = container_name.into();
        let span = info_span!(
            "machine",
            namespace = %namespace,
            machine = %format!("{}/{}", pod_name, container_name)
        );
        Self {
            factory,
            namespace,
            pod_name,
            container_name,
            span,
            progress: create_progress_handle(),
        }
    }

    /// Log every operation of this machine under `span` instead of the default one
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Report to a shared progress handle instead of a private one
    pub fn with_progress(mut self, progress: ProgressHandle) -> Self {
        self.progress = progress;
        self
    }

    /// `<pod>/<container>`
    pub fn name(&self) -> String {
        format!("{}/{}", self.pod_name, self.container_name)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn pod_name(&self) -> &str {
        &self.pod_name
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn progress(&self) -> &ProgressHandle {
        &self.progress
    }

    /// Machines carry no properties of their own yet
    pub fn properties(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    // Released when the returned box goes out of scope
    async fn connect(&self) -> Result<Box<dyn ResourceClient>> {
        self.factory.create(&self.namespace).await
    }
}

#[async_trait]
impl Machine for MachineHandle {
    fn properties(&self) -> HashMap<String, String> {
        MachineHandle::properties(self)
    }

    async fn servers(&self) -> Result<BTreeMap<String, ServerEntry>> {
        MachineHandle::servers(self).await
    }
}
