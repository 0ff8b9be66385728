//! Press-and-hold volume ramping
//!
//! Each ramp-capable target owns one [`RampCoordinator`]. A press starts a
//! background task that steps the level on a fixed interval; a release (or a
//! press in the other direction) retires it. Cancellation is cooperative: the
//! loop re-checks its epoch before every send, so it stops within one tick.

use crate::error::Result;
use crate::types::Level;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;

/// Something whose level can be ramped
pub(crate) trait RampTarget: Send + Sync + 'static {
    /// Last level confirmed by the device
    fn current_level(&self) -> Level;
    /// Inclusive `(min, max)`
    fn bounds(&self) -> (Level, Level);
    /// Encode and transmit `level`
    fn send_level(&self, level: Level) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RampState {
    #[default]
    Idle,
    RampingUp,
    RampingDown,
}

impl Direction {
    fn state(self) -> RampState {
        match self {
            Direction::Up => RampState::RampingUp,
            Direction::Down => RampState::RampingDown,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    state: RampState,
    epoch: u64,
}

struct Inner {
    name: &'static str,
    target: Arc<dyn RampTarget>,
    step: Level,
    interval: Duration,
    slot: Mutex<Slot>,
}

impl Inner {
    fn is_live(&self, epoch: u64) -> bool {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).epoch == epoch
    }
}

/// Ramp state machine for one target
pub(crate) struct RampCoordinator {
    inner: Arc<Inner>,
    runtime: Handle,
}

impl RampCoordinator {
    pub fn new(
        name: &'static str,
        target: Arc<dyn RampTarget>,
        step: Level,
        interval: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                target,
                step: step.max(1),
                interval,
                slot: Mutex::new(Slot::default()),
            }),
            runtime,
        }
    }

    pub fn state(&self) -> RampState {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner).state
    }

    /// Feed one press (`pressed = true`) or release event
    pub fn press(&self, direction: Direction, pressed: bool) {
        let wanted = direction.state();
        let epoch = {
            let mut slot = self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner);
            match (slot.state == wanted, pressed) {
                // already ramping this way
                (true, true) => return,
                (true, false) => {
                    slot.state = RampState::Idle;
                    slot.epoch += 1;
                    return;
                }
                // release of a direction that is not running
                (false, false) => return,
                (false, true) => {
                    slot.state = wanted;
                    slot.epoch += 1;
                    slot.epoch
                }
            }
        };

        tracing::debug!("Ramping {} {:?}", self.inner.name, direction);
        let inner = Arc::clone(&self.inner);
        self.runtime.spawn(run(inner, direction, epoch));
    }

    /// Stop any running ramp
    pub fn stop(&self) {
        let mut slot = self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.state = RampState::Idle;
        slot.epoch += 1;
    }
}

/// Next level on the step grid, strictly past `level`
fn next_level(level: Level, direction: Direction, step: Level) -> Level {
    match direction {
        Direction::Up => (level.div_euclid(step) + 1) * step,
        Direction::Down => (level - 1).div_euclid(step) * step,
    }
}

async fn run(inner: Arc<Inner>, direction: Direction, epoch: u64) {
    let mut level = inner.target.current_level();

    while inner.is_live(epoch) {
        let (min, max) = inner.target.bounds();
        let at_limit = match direction {
            Direction::Up => level >= max,
            Direction::Down => level <= min,
        };
        if at_limit {
            tracing::debug!("Ramp {} reached {}", inner.name, level);
            break;
        }

        let next = next_level(level, direction, inner.step).clamp(min, max);
        if let Err(e) = inner.target.send_level(next) {
            tracing::warn!("Ramp {} failed to send {}: {}", inner.name, next, e);
        }
        level = next;

        tokio::time::sleep(inner.interval).await;
    }
}
