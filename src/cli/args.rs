// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use clap::{Parser, Subcommand};
use std::ffi::OsString;

#[derive(Parser, Debug)]
#[command(name = "kube-machine")]
#[command(author, version, about = "Inspect and drive a container running in a Kubernetes pod")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Kubernetes context to use (defaults to the saved config, then kubeconfig)
    #[arg(long, value_name = "CONTEXT", global = true)]
    pub context: Option<String>,

    /// Namespace of the pod
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,

    /// Pod hosting the machine
    #[arg(short, long, global = true)]
    pub pod: Option<String>,

    /// Container inside the pod
    #[arg(short, long, global = true)]
    pub container: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print the servers exposed for the container as JSON
    Servers,

    /// Run a command inside the container
    Exec {
        /// Command and arguments
        #[arg(
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true,
            value_parser = clap::value_parser!(OsString)
        )]
        command: Vec<OsString>,
    },

    /// Wait until the pod is running
    Wait {
        /// Timeout in minutes
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Print the machine properties as JSON
    Properties,
}
