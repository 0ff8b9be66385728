use crate::error::{AvrError, Result};
use crate::monitor::MonitorStatus;
use crate::types::{Level, NormalizedLevel, SurroundChannel, SurroundMode};
use tokio::sync::broadcast;

const FEEDBACK_CAPACITY: usize = 256;

/// Value-changed notification
///
/// One variant per observable field. A notification is only published when
/// the new value differs from the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    Power(bool),
    Mute(bool),
    Volume {
        level: Level,
        normalized: NormalizedLevel,
    },
    MaxVolume(Level),
    CurrentInput(Option<String>),
    InputSelection {
        key: String,
        is_selected: bool,
    },
    CurrentSurroundMode(SurroundMode),
    SurroundModeSelection {
        mode: SurroundMode,
        is_selected: bool,
    },
    /// A channel was seen for the first time
    ChannelsChanged,
    ChannelVolume {
        channel: SurroundChannel,
        level: Level,
        normalized: NormalizedLevel,
        is_muted: bool,
    },
    WarmingUp(bool),
    CoolingDown(bool),
    Online(MonitorStatus),
    Zone2(Zone2Feedback),
}

/// Zone 2 value-changed notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Zone2Feedback {
    Power(bool),
    Mute(bool),
    Volume {
        level: Level,
        normalized: NormalizedLevel,
    },
    CurrentInput(Option<String>),
    InputSelection {
        key: String,
        is_selected: bool,
    },
    WarmingUp(bool),
    CoolingDown(bool),
}

impl From<Zone2Feedback> for Feedback {
    fn from(feedback: Zone2Feedback) -> Self {
        Feedback::Zone2(feedback)
    }
}

/// Publishing side of the feedback signals
#[derive(Clone)]
pub(crate) struct FeedbackBus {
    tx: broadcast::Sender<Feedback>,
}

impl FeedbackBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEEDBACK_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, feedback: Feedback) {
        tracing::debug!("Feedback: {:?}", feedback);
        // no subscribers is fine
        let _ = self.tx.send(feedback);
    }

    pub fn publish_all(&self, feedbacks: impl IntoIterator<Item = Feedback>) {
        for feedback in feedbacks {
            self.publish(feedback);
        }
    }

    pub fn subscribe(&self) -> FeedbackReceiver {
        FeedbackReceiver::new(self.tx.subscribe())
    }
}

/// Receiver for feedback notifications
///
/// A subscriber that falls more than the channel capacity behind skips
/// ahead to the oldest event still buffered; [`FeedbackReceiver::missed`]
/// counts what was skipped.
pub struct FeedbackReceiver {
    rx: broadcast::Receiver<Feedback>,
    missed: u64,
}

impl FeedbackReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<Feedback>) -> Self {
        Self { rx, missed: 0 }
    }

    /// Receive the next notification
    ///
    /// Fails with `ConnectionClosed` once the receiver has been shut down.
    pub async fn recv(&mut self) -> Result<Feedback> {
        loop {
            match self.rx.recv().await {
                Ok(feedback) => return Ok(feedback),
                Err(broadcast::error::RecvError::Lagged(n)) => self.skipped(n),
                Err(broadcast::error::RecvError::Closed) => return Err(AvrError::ConnectionClosed),
            }
        }
    }

    /// Try to receive a notification without blocking
    ///
    /// Returns `None` if no message is available.
    pub fn try_recv(&mut self) -> Result<Option<Feedback>> {
        loop {
            match self.rx.try_recv() {
                Ok(feedback) => return Ok(Some(feedback)),
                Err(broadcast::error::TryRecvError::Lagged(n)) => self.skipped(n),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(AvrError::ConnectionClosed)
                }
            }
        }
    }

    /// Notifications dropped because this subscriber fell behind
    pub fn missed(&self) -> u64 {
        self.missed
    }

    fn skipped(&mut self, n: u64) {
        tracing::warn!("Feedback subscriber lagged, skipped {} notifications", n);
        self.missed += n;
    }

    /// Drain every notification that is already queued
    pub fn drain(&mut self) -> Vec<Feedback> {
        let mut out = Vec::new();
        while let Ok(Some(feedback)) = self.try_recv() {
            out.push(feedback);
        }
        out
    }
}
