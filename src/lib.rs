// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Observe and interact with a single container running in a Kubernetes pod.
//!
//! A [`MachineHandle`] names a container by namespace, pod and container name.
//! It can discover the servers routed to the container, run commands inside
//! it, and wait for its pod to start running. Cluster access goes through the
//! [`kubernetes::ClientFactory`] trait; [`KubeClientFactory`] is the
//! implementation backed by `kube`.

pub mod config;
pub mod error;
pub mod kubernetes;
pub mod machine;
pub mod progress;

pub use error::{Error, Result};
pub use kubernetes::KubeClientFactory;
pub use machine::{Machine, MachineHandle, ServerEntry, ServerStatus};
