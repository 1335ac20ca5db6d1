// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Error types for machine operations
//!
//! Every operation on a machine handle fails with a single [`Error`] that
//! carries a human-readable message and, where one exists, the underlying cause.
//! Nothing in this crate retries on its own.

use std::time::Duration;

/// Boxed cause carried by transport errors
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A resource expected to exist (the machine's pod) is missing
    #[error("{kind} '{name}' not found in namespace '{namespace}'")]
    ResourceNotFound {
        kind: &'static str,
        name: String,
        namespace: String,
    },

    /// The pod exists but does not declare the machine's container.
    /// The handle was built against stale state and should not be retried.
    #[error("container '{container}' is not declared in pod '{pod}'")]
    InconsistentState { pod: String, container: String },

    /// Transport failure talking to the cluster
    #[error("connectivity error: {message}")]
    Connectivity {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A command token could not be percent-encoded
    #[error("cannot encode command argument #{index}: {reason}")]
    Encoding { index: usize, reason: String },

    /// The pod watch closed before the pod became running
    #[error("watching of machine {machine} is interrupted{}", cause_suffix(.cause))]
    WatchInterrupted {
        machine: String,
        cause: Option<String>,
    },

    /// The readiness wait elapsed without the pod becoming running
    #[error("starting of machine {machine} reached timeout of {}s", .timeout.as_secs())]
    Timeout { machine: String, timeout: Duration },

    /// The outcome of a wait was abandoned before it was resolved
    #[error("starting of machine {machine} was interrupted")]
    Interrupted { machine: String },

    /// Kubeconfig or context could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}

fn cause_suffix(cause: &Option<String>) -> String {
    match cause {
        Some(cause) => format!(": {}", cause),
        None => String::new(),
    }
}

impl Error {
    pub fn pod_not_found(name: &str, namespace: &str) -> Self {
        Error::ResourceNotFound {
            kind: "pod",
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    /// Wrap any transport error, keeping it as the source
    pub fn connectivity<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Connectivity {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Transport failure reported only as a message (e.g. a remote status)
    pub(crate) fn connectivity_msg(message: impl Into<String>) -> Self {
        Error::Connectivity {
            message: message.into(),
            source: None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ResourceNotFound { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        Error::connectivity(err)
    }
}
