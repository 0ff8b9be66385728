//! Link health tracking
//!
//! The monitor sends a poll string on its interval and grades the link by
//! how long ago the last line arrived. Polling of device status is gated on
//! the link being healthy.

use crate::config::MonitorConfig;
use crate::feedback::{Feedback, FeedbackBus};
use crate::transport::CommandSink;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MonitorStatus {
    /// Nothing received yet
    #[default]
    Unknown,
    Ok,
    Warning,
    Error,
}

impl MonitorStatus {
    pub fn is_healthy(self) -> bool {
        self == MonitorStatus::Ok
    }
}

/// Timestamp of the last received line
#[derive(Clone, Default)]
pub(crate) struct Activity {
    last: Arc<Mutex<Option<Instant>>>,
}

impl Activity {
    pub fn touch(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|at| at.elapsed())
    }
}

pub(crate) fn grade(elapsed: Option<Duration>, config: &MonitorConfig) -> MonitorStatus {
    match elapsed {
        None => MonitorStatus::Unknown,
        Some(e) if e < Duration::from_millis(config.time_to_warning_ms) => MonitorStatus::Ok,
        Some(e) if e < Duration::from_millis(config.time_to_error_ms) => MonitorStatus::Warning,
        Some(_) => MonitorStatus::Error,
    }
}

pub(crate) fn spawn_monitor(
    runtime: &Handle,
    config: MonitorConfig,
    sink: CommandSink,
    activity: Activity,
    health: Arc<watch::Sender<bool>>,
    bus: FeedbackBus,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let poll_every = Duration::from_millis(config.poll_interval_ms);
        let mut last_poll: Option<Instant> = None;
        let mut status = MonitorStatus::Unknown;
        let mut ticker = tokio::time::interval(CHECK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if last_poll.map_or(true, |at| at.elapsed() >= poll_every) {
                if let Err(e) = sink.send(&config.poll_string) {
                    tracing::warn!("Monitor poll failed: {}", e);
                }
                last_poll = Some(Instant::now());
            }

            let graded = grade(activity.elapsed(), &config);
            if graded != status {
                tracing::info!("Communication status {:?} -> {:?}", status, graded);
                status = graded;
                bus.publish(Feedback::Online(status));
                health.send_if_modified(|healthy| {
                    let changed = *healthy != status.is_healthy();
                    *healthy = status.is_healthy();
                    changed
                });
            }
        }
    })
}
