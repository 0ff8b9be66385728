use crate::parser::{parse_line, Response};
use crate::state::{Phase, Shared, Zone};
use std::sync::Arc;

/// Applies received lines to the device state
///
/// Runs on the receive worker only, so lines are applied one at a time in
/// arrival order.
pub(crate) struct Reconciler {
    shared: Arc<Shared>,
    zone2_enabled: bool,
}

impl Reconciler {
    pub fn new(shared: Arc<Shared>, zone2_enabled: bool) -> Self {
        Self {
            shared,
            zone2_enabled,
        }
    }

    /// Classify and apply one line. Never fails; bad lines are logged and dropped.
    pub fn apply_line(&self, line: &str) {
        match parse_line(line) {
            Ok(Some(response)) => self.apply(response),
            Ok(None) => tracing::trace!("Ignoring {:?}", line.trim()),
            Err(e) => tracing::warn!("Dropping {:?}: {}", line.trim(), e),
        }
    }

    fn apply(&self, response: Response) {
        match response {
            Response::Power(on) => {
                let changed = self.shared.mutate(|state, out| state.set_power(on, out));
                if changed {
                    self.power_transition(Zone::Main, on);
                }
            }
            Response::Zone2(z2) => {
                if !self.zone2_enabled {
                    tracing::trace!("Zone 2 disabled, ignoring {:?}", z2);
                    return;
                }
                let transition = self.shared.mutate(|state, out| state.zone2.apply(z2, out));
                if let Some(on) = transition {
                    self.power_transition(Zone::Zone2, on);
                }
            }
            other => self.shared.mutate(|state, out| match other {
                Response::MaxVolume(level) => state.set_max_volume(level, out),
                Response::Volume(level) => state.set_volume(level, out),
                Response::ChannelVolume { channel, level } => {
                    state.set_channel_level(channel, level, out)
                }
                Response::Input(text) => state.set_input(&text, out),
                Response::SurroundMode(text) => state.set_surround_mode(&text, out),
                Response::Mute(on) => state.set_mute(on, out),
                Response::Power(_) | Response::Zone2(_) => {}
            }),
        }
    }

    /// Confirmed on settles any warm-up; confirmed off starts the cool-down.
    fn power_transition(&self, zone: Zone, on: bool) {
        if on {
            self.shared.settle_transient(zone);
            if zone == Zone::Main {
                self.shared.poll_kick.notify_waiters();
            }
        } else {
            self.shared.begin_transient(zone, Phase::Cooling);
        }
    }
}
