use crate::error::{AvrError, Result};
use crate::monitor::Activity;
use crate::reconciler::Reconciler;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Producer side of the receive queue
///
/// Cheap to clone; any number of producers may push. Lines are handed to the
/// reconciler one at a time, in the order they were pushed.
#[derive(Clone)]
pub struct LineSender {
    tx: mpsc::UnboundedSender<String>,
}

impl LineSender {
    /// Queue one delimiter-stripped line for parsing
    pub fn push(&self, line: impl Into<String>) -> Result<()> {
        self.tx
            .send(line.into())
            .map_err(|_| AvrError::ConnectionClosed)
    }
}

pub(crate) fn channel() -> (LineSender, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (LineSender { tx }, rx)
}

/// Single consumer: drains the queue into the reconciler until every sender is gone
pub(crate) fn spawn_worker(
    runtime: &Handle,
    mut rx: mpsc::UnboundedReceiver<String>,
    reconciler: Reconciler,
    activity: Activity,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        while let Some(line) = rx.recv().await {
            activity.touch();
            reconciler.apply_line(&line);
        }
        tracing::debug!("Receive queue closed");
    })
}
