use crate::state::Shared;
use crate::transport::CommandSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

pub(crate) struct PollSchedule {
    pub queries: Vec<&'static str>,
    pub period: Duration,
    pub stagger: Duration,
}

/// Periodic status polling, gated on link health
///
/// While healthy: send every query `stagger` apart, then wait one period or
/// until kicked. While unhealthy: send nothing until health returns.
pub(crate) fn spawn_poller(
    runtime: &Handle,
    schedule: PollSchedule,
    sink: CommandSink,
    mut health: watch::Receiver<bool>,
    shared: Arc<Shared>,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        loop {
            while !*health.borrow_and_update() {
                tracing::debug!("Polling suspended");
                if health.changed().await.is_err() {
                    return;
                }
            }

            for (i, query) in schedule.queries.iter().enumerate() {
                if !*health.borrow() {
                    break;
                }
                if i > 0 {
                    sleep(schedule.stagger).await;
                }
                if let Err(e) = sink.send(query) {
                    tracing::warn!("Poll {} failed: {}", query, e);
                }
            }

            tokio::select! {
                _ = sleep(schedule.period) => {}
                _ = shared.poll_kick.notified() => {
                    tracing::debug!("Immediate poll requested");
                }
                changed = health.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    })
}
