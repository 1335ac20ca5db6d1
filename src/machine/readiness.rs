//! Waiting for the machine's pod to reach the Running phase

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{Instrument, info, warn};

use super::MachineHandle;
use crate::error::{Error, Result};
use crate::kubernetes::{PodEventListener, PodInfo};
use crate::progress::ProgressHandle;

/// Single-assignment outcome: the first `resolve` wins, later ones are ignored
struct OutcomeCell {
    sender: Mutex<Option<oneshot::Sender<Result<()>>>>,
}

impl OutcomeCell {
    fn new() -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Returns true if this call decided the outcome
    fn resolve(&self, outcome: Result<()>) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match sender {
            // A dropped receiver means the waiter already gave up
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }
}

/// Feeds pod watch events into the outcome cell
struct ReadinessListener {
    machine: String,
    outcome: OutcomeCell,
    progress: ProgressHandle,
}

impl PodEventListener for ReadinessListener {
    fn on_event(&self, pod: &PodInfo) {
        info!(machine = %self.machine, phase = %pod.phase, "Machine phase changed");
        self.progress
            .phase_observed(&self.machine, &pod.phase.to_string());
        if pod.phase.is_running() {
            self.outcome.resolve(Ok(()));
        }
    }

    fn on_close(&self, cause: Option<String>) {
        let resolved = self.outcome.resolve(Err(Error::WatchInterrupted {
            machine: self.machine.clone(),
            cause: cause.clone(),
        }));
        if resolved {
            warn!(machine = %self.machine, cause = ?cause, "Machine watch closed before it started");
        }
    }
}

// Saturates instead of overflowing for absurdly large values
fn minutes(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(60))
}

impl MachineHandle {
    /// Wait until the machine's pod is Running, for at most `timeout_minutes`.
    ///
    /// Fails with `ResourceNotFound` when the pod does not exist,
    /// `WatchInterrupted` when the pod watch closes first, and `Timeout` when
    /// the wait elapses. The watch is closed on every path.
    pub async fn wait_running(&self, timeout_minutes: u64) -> Result<()> {
        self.wait_running_for(minutes(timeout_minutes))
            .instrument(self.span.clone())
            .await
    }

    async fn wait_running_for(&self, timeout: Duration) -> Result<()> {
        let machine = self.name();
        info!(machine = %machine, "Waiting machine");

        let client = self.connect().await?;
        let pod = client
            .get_pod(&self.pod_name)
            .await?
            .ok_or_else(|| Error::pod_not_found(&self.pod_name, &self.namespace))?;

        info!(machine = %machine, phase = %pod.phase, "Machine phase");
        self.progress.phase_observed(&machine, &pod.phase.to_string());
        if pod.phase.is_running() {
            return Ok(());
        }

        // The listener holds the only sender, dropping it unresolved reads as an interruption
        let (outcome, rx) = OutcomeCell::new();
        let listener = Arc::new(ReadinessListener {
            machine: machine.clone(),
            outcome,
            progress: Arc::clone(&self.progress),
        });
        let subscription = client.watch_pod(&self.pod_name, listener).await?;
        drop(client);
        self.progress.subscribed(&machine);

        let result = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::Interrupted {
                machine: machine.clone(),
            }),
            Err(_) => Err(Error::Timeout {
                machine: machine.clone(),
                timeout,
            }),
        };

        subscription.close();

        match &result {
            Ok(()) => info!(machine = %machine, "Machine is running"),
            Err(e) => warn!(machine = %machine, error = %e, "Machine did not start"),
        }
        result
    }
}
