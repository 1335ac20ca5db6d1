//! Running commands inside the machine's container

use std::ffi::OsStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{Instrument, debug, info, warn};

use super::MachineHandle;
use crate::error::{Error, Result};
use crate::kubernetes::ExecListener;

/// How long `exec` waits for the remote channel to finish
pub const EXEC_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// One-shot gate released by the first failure or close of the exec channel
#[derive(Default)]
struct ExecGate {
    released: AtomicBool,
    notify: Notify,
}

impl ExecGate {
    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            // Stores a permit if nobody is waiting yet
            self.notify.notify_one();
        }
    }

    /// Returns false when `bound` elapsed before the gate was released
    async fn wait(&self, bound: Duration) -> bool {
        tokio::time::timeout(bound, self.notify.notified())
            .await
            .is_ok()
    }
}

impl ExecListener for ExecGate {
    fn on_open(&self) {
        debug!("Exec channel opened");
    }

    fn on_failure(&self, cause: &str) {
        debug!(cause = %cause, "Exec failed");
        self.release();
    }

    fn on_close(&self, reason: Option<&str>) {
        debug!(reason = ?reason, "Exec channel closed");
        self.release();
    }
}

/// Percent-encode every command token (UTF-8)
pub(crate) fn encode_command<I, S>(command: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    command
        .into_iter()
        .enumerate()
        .map(|(index, token)| {
            let token = token.as_ref();
            token
                .to_str()
                .map(|s| urlencoding::encode(s).into_owned())
                .ok_or_else(|| Error::Encoding {
                    index,
                    reason: format!("{:?} is not valid UTF-8", token),
                })
        })
        .collect()
}

impl MachineHandle {
    /// Run `command` in the container and wait for the remote channel to finish.
    ///
    /// Returns once the channel reports a failure or closes, or after
    /// [`EXEC_TIMEOUT`]. The remote exit status is not observed, and an elapsed
    /// wait is not an error.
    pub async fn exec<I, S>(&self, command: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let encoded = encode_command(command)?;
        self.exec_encoded(encoded, EXEC_TIMEOUT)
            .instrument(self.span.clone())
            .await
    }

    async fn exec_encoded(&self, command: Vec<String>, bound: Duration) -> Result<()> {
        let machine = self.name();
        let args = command.len();
        let gate = Arc::new(ExecGate::default());

        let client = self.connect().await?;
        let channel = client
            .exec_in_container(
                &self.pod_name,
                &self.container_name,
                command,
                Arc::clone(&gate) as Arc<dyn ExecListener>,
            )
            .await?;
        info!(args = args, "Executing command in machine");
        self.progress.exec_started(&machine, args);

        let released = gate.wait(bound).await;
        if !released {
            warn!(
                timeout_secs = bound.as_secs(),
                "Command did not finish in time, closing exec channel"
            );
        }
        self.progress.exec_finished(&machine, released);

        channel.close().await
    }
}
