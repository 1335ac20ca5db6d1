// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Progress reporting for machine operations
//!
//! A machine handle reports what it observes (pod phases, subscriptions,
//! exec start/finish) so a front end can display it while an operation waits.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Create a spinner with consistent styling
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Progress update message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MachineEvent {
    /// The pod was observed in a phase
    PhaseObserved { machine: String, phase: String },
    /// A pod watch was opened
    Subscribed { machine: String },
    /// Server discovery finished
    ServersDiscovered { machine: String, count: usize },
    /// A command was dispatched to the container
    ExecStarted { machine: String, args: usize },
    /// The exec wait ended; `released` is false when the bound elapsed
    ExecFinished { machine: String, released: bool },
}

pub struct ProgressReporter {
    sender: broadcast::Sender<MachineEvent>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Subscribe to progress updates
    pub fn subscribe(&self) -> broadcast::Receiver<MachineEvent> {
        self.sender.subscribe()
    }

    pub fn phase_observed(&self, machine: &str, phase: &str) {
        let _ = self.sender.send(MachineEvent::PhaseObserved {
            machine: machine.to_string(),
            phase: phase.to_string(),
        });
    }

    pub fn subscribed(&self, machine: &str) {
        let _ = self.sender.send(MachineEvent::Subscribed {
            machine: machine.to_string(),
        });
    }

    pub fn servers_discovered(&self, machine: &str, count: usize) {
        let _ = self.sender.send(MachineEvent::ServersDiscovered {
            machine: machine.to_string(),
            count,
        });
    }

    pub fn exec_started(&self, machine: &str, args: usize) {
        let _ = self.sender.send(MachineEvent::ExecStarted {
            machine: machine.to_string(),
            args,
        });
    }

    pub fn exec_finished(&self, machine: &str, released: bool) {
        let _ = self.sender.send(MachineEvent::ExecFinished {
            machine: machine.to_string(),
            released,
        });
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to the progress reporter
pub type ProgressHandle = Arc<ProgressReporter>;

/// Create a new progress handle
pub fn create_progress_handle() -> ProgressHandle {
    Arc::new(ProgressReporter::new())
}
