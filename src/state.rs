use crate::channels::ChannelRegistry;
use crate::feedback::{Feedback, FeedbackBus, Zone2Feedback};
use crate::protocol::{self, Generation, CHANNEL_MAX, CHANNEL_MIN};
use crate::selection::{SelectableItem, SelectableItems};
use crate::types::{
    ChannelVolume, Level, SurroundChannel, SurroundMode, MAIN_INPUT_TABLE, SURROUND_MODE_TABLE,
};
use crate::zone2::{Zone2Snapshot, Zone2State};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;

/// Which half of a warm-up/cool-down pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Warming,
    Cooling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Zone {
    Main,
    Zone2,
}

/// Warm-up/cool-down flags; at most one is set.
///
/// Every transition bumps the epoch so an expiry timer armed for an older
/// phase cannot clear a newer one.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Transient {
    pub warming: bool,
    pub cooling: bool,
    epoch: u64,
}

impl Transient {
    /// Enter `phase`, returning the epoch to expire and the flags that flipped
    pub fn begin(&mut self, phase: Phase) -> (u64, Vec<(Phase, bool)>) {
        let warming = phase == Phase::Warming;
        let changes = self.assign(warming, !warming);
        (self.epoch, changes)
    }

    /// Steady state reached: clear both flags
    pub fn settle(&mut self) -> Vec<(Phase, bool)> {
        self.assign(false, false)
    }

    /// Clear both flags if no transition happened since `epoch`
    pub fn expire(&mut self, epoch: u64) -> Vec<(Phase, bool)> {
        if epoch != self.epoch {
            return Vec::new();
        }
        self.assign(false, false)
    }

    fn assign(&mut self, warming: bool, cooling: bool) -> Vec<(Phase, bool)> {
        self.epoch += 1;
        let mut changes = Vec::new();
        if self.warming != warming {
            self.warming = warming;
            changes.push((Phase::Warming, warming));
        }
        if self.cooling != cooling {
            self.cooling = cooling;
            changes.push((Phase::Cooling, cooling));
        }
        changes
    }
}

pub(crate) fn transient_feedback(zone: Zone, changes: Vec<(Phase, bool)>) -> Vec<Feedback> {
    changes
        .into_iter()
        .map(|(phase, value)| match (zone, phase) {
            (Zone::Main, Phase::Warming) => Feedback::WarmingUp(value),
            (Zone::Main, Phase::Cooling) => Feedback::CoolingDown(value),
            (Zone::Zone2, Phase::Warming) => Zone2Feedback::WarmingUp(value).into(),
            (Zone::Zone2, Phase::Cooling) => Zone2Feedback::CoolingDown(value).into(),
        })
        .collect()
}

/// Authoritative model of the receiver
#[derive(Debug)]
pub(crate) struct DeviceState {
    pub generation: Generation,
    pub power_is_on: bool,
    pub mute_is_on: bool,
    pub volume_level: Level,
    pub learned_max_volume: Level,
    pub max_volume_override: Option<Level>,
    pub current_input: Option<String>,
    pub current_surround_mode: Option<SurroundMode>,
    pub inputs: SelectableItems<String>,
    pub surround_modes: SelectableItems<SurroundMode>,
    pub channels: ChannelRegistry,
    pub transient: Transient,
    pub zone2: Zone2State,
}

impl DeviceState {
    pub fn new(generation: Generation, max_volume_override: Option<Level>) -> Self {
        Self {
            generation,
            power_is_on: false,
            mute_is_on: false,
            volume_level: 0,
            learned_max_volume: generation.default_max_volume(),
            max_volume_override,
            current_input: None,
            current_surround_mode: None,
            inputs: SelectableItems::new(
                MAIN_INPUT_TABLE.iter().map(|d| (d.key.to_string(), d.name.to_string())),
            ),
            surround_modes: SelectableItems::new(
                SURROUND_MODE_TABLE.iter().map(|d| (d.mode, d.name.to_string())),
            ),
            channels: ChannelRegistry::new(),
            transient: Transient::default(),
            zone2: Zone2State::new(),
        }
    }

    /// Effective master volume ceiling, never above what the encoder accepts
    pub fn max_volume(&self) -> Level {
        let ceiling = self.generation.default_max_volume();
        let max = self.max_volume_override.unwrap_or(self.learned_max_volume);
        let max = max.clamp(0, ceiling);
        max - max.rem_euclid(self.generation.step())
    }

    fn volume_feedback(&self) -> Feedback {
        Feedback::Volume {
            level: self.volume_level,
            normalized: protocol::normalize(self.volume_level, 0, self.max_volume()),
        }
    }

    /// Record a device-reported `MVMAX`
    ///
    /// Only the effective ceiling is observable, so an override or the
    /// clamp can make a new learned value a no-op.
    pub fn set_max_volume(&mut self, level: Level, out: &mut Vec<Feedback>) {
        let old_max = self.max_volume();
        let old_volume = self.volume_feedback();
        self.learned_max_volume = level;

        if self.max_volume() != old_max {
            out.push(Feedback::MaxVolume(self.max_volume()));
        }
        // normalized volume is relative to the ceiling
        let volume = self.volume_feedback();
        if volume != old_volume {
            out.push(volume);
        }
    }

    pub fn set_volume(&mut self, level: Level, out: &mut Vec<Feedback>) {
        if self.volume_level == level {
            return;
        }
        self.volume_level = level;
        out.push(self.volume_feedback());
    }

    pub fn set_mute(&mut self, on: bool, out: &mut Vec<Feedback>) {
        if self.mute_is_on == on {
            return;
        }
        self.mute_is_on = on;
        out.push(Feedback::Mute(on));
    }

    /// Apply a confirmed power state. Returns true when power actually changed.
    ///
    /// Turning off clears everything that is meaningless in standby.
    pub fn set_power(&mut self, on: bool, out: &mut Vec<Feedback>) -> bool {
        if self.power_is_on == on {
            return false;
        }
        self.power_is_on = on;
        out.push(Feedback::Power(on));

        if !on {
            self.set_mute(false, out);
            self.set_volume(0, out);
            for (key, is_selected) in self.inputs.clear() {
                out.push(Feedback::InputSelection { key, is_selected });
            }
            for (mode, is_selected) in self.surround_modes.clear() {
                out.push(Feedback::SurroundModeSelection { mode, is_selected });
            }
            for cv in self.channels.reset_levels() {
                out.push(channel_feedback(cv));
            }
        }
        true
    }

    pub fn set_input(&mut self, text: &str, out: &mut Vec<Feedback>) {
        let key = text.to_string();
        if self.inputs.contains(&key) {
            for (key, is_selected) in self.inputs.select_only(&key) {
                out.push(Feedback::InputSelection { key, is_selected });
            }
        } else {
            tracing::debug!("Unrecognized input {:?}", text);
        }
        if self.current_input.as_deref() != Some(text) {
            self.current_input = Some(key);
            out.push(Feedback::CurrentInput(self.current_input.clone()));
        }
    }

    pub fn set_surround_mode(&mut self, text: &str, out: &mut Vec<Feedback>) {
        let mode = SurroundMode::from_device_text(text);
        let changes = if mode == SurroundMode::Unknown {
            tracing::info!("Unmatched surround mode {:?}", text);
            self.surround_modes.clear()
        } else {
            self.surround_modes.select_only(&mode)
        };
        for (mode, is_selected) in changes {
            out.push(Feedback::SurroundModeSelection { mode, is_selected });
        }
        if self.current_surround_mode != Some(mode) {
            self.current_surround_mode = Some(mode);
            out.push(Feedback::CurrentSurroundMode(mode));
        }
    }

    pub fn set_channel_level(&mut self, channel: SurroundChannel, level: Level, out: &mut Vec<Feedback>) {
        let change = self.channels.set_level(channel, level);
        if change.created {
            out.push(Feedback::ChannelsChanged);
        }
        if change.level_changed {
            if let Some(cv) = self.channels.get(channel) {
                out.push(channel_feedback(cv));
            }
        }
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            power_is_on: self.power_is_on,
            mute_is_on: self.mute_is_on,
            volume_level: self.volume_level,
            max_volume: self.max_volume(),
            current_input: self.current_input.clone(),
            current_surround_mode: self.current_surround_mode,
            inputs: self.inputs.items().to_vec(),
            surround_modes: self.surround_modes.items().to_vec(),
            channels: self.channels.snapshot(),
            is_warming_up: self.transient.warming,
            is_cooling_down: self.transient.cooling,
            zone2: self.zone2.snapshot(),
        }
    }
}

pub(crate) fn channel_feedback(cv: ChannelVolume) -> Feedback {
    Feedback::ChannelVolume {
        channel: cv.channel,
        level: cv.level,
        normalized: protocol::normalize(cv.level, CHANNEL_MIN, CHANNEL_MAX),
        is_muted: cv.is_muted(),
    }
}

/// Point-in-time copy of the receiver state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    pub power_is_on: bool,
    pub mute_is_on: bool,
    pub volume_level: Level,
    pub max_volume: Level,
    pub current_input: Option<String>,
    pub current_surround_mode: Option<SurroundMode>,
    pub inputs: Vec<SelectableItem<String>>,
    pub surround_modes: Vec<SelectableItem<SurroundMode>>,
    pub channels: BTreeMap<SurroundChannel, ChannelVolume>,
    pub is_warming_up: bool,
    pub is_cooling_down: bool,
    pub zone2: Zone2Snapshot,
}

impl DeviceSnapshot {
    /// Full-status JSON document
    pub fn to_json(&self) -> crate::error::Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Warm-up/cool-down durations
#[derive(Debug, Clone, Copy)]
pub(crate) struct Timing {
    pub warming: Duration,
    pub cooling: Duration,
}

/// State shared by the facade, the receive worker and the ramp loops
pub(crate) struct Shared {
    state: Mutex<DeviceState>,
    pub bus: FeedbackBus,
    pub runtime: Handle,
    pub timing: Timing,
    /// Wakes the poller for an immediate burst
    pub poll_kick: Notify,
}

impl Shared {
    pub fn new(state: DeviceState, timing: Timing, runtime: Handle) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            bus: FeedbackBus::new(),
            runtime,
            timing,
            poll_kick: Notify::new(),
        })
    }

    pub fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the state lock, then publish what it produced
    pub fn mutate<R>(&self, f: impl FnOnce(&mut DeviceState, &mut Vec<Feedback>) -> R) -> R {
        let mut out = Vec::new();
        let result = {
            let mut state = self.lock();
            f(&mut state, &mut out)
        };
        self.bus.publish_all(out);
        result
    }

    /// Enter a transient phase and arm its expiry
    pub fn begin_transient(self: &Arc<Self>, zone: Zone, phase: Phase) {
        let (epoch, changes) = self.mutate(|state, out| {
            let (epoch, changes) = transient_of(state, zone).begin(phase);
            out.extend(transient_feedback(zone, changes.clone()));
            (epoch, changes)
        });
        tracing::debug!("{:?} {:?} started: {:?}", zone, phase, changes);

        let duration = match phase {
            Phase::Warming => self.timing.warming,
            Phase::Cooling => self.timing.cooling,
        };
        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            shared.mutate(|state, out| {
                let changes = transient_of(state, zone).expire(epoch);
                out.extend(transient_feedback(zone, changes));
            });
        });
    }

    pub fn settle_transient(&self, zone: Zone) {
        self.mutate(|state, out| {
            let changes = transient_of(state, zone).settle();
            out.extend(transient_feedback(zone, changes));
        });
    }
}

fn transient_of(state: &mut DeviceState, zone: Zone) -> &mut Transient {
    match zone {
        Zone::Main => &mut state.transient,
        Zone::Zone2 => &mut state.zone2.transient,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> DeviceState {
        DeviceState::new(Generation::HalfStep, None)
    }

    #[test]
    fn transient_flags_are_exclusive() {
        let mut t = Transient::default();
        let (_, changes) = t.begin(Phase::Warming);
        assert_eq!(changes, vec![(Phase::Warming, true)]);
        let (_, changes) = t.begin(Phase::Cooling);
        assert_eq!(changes, vec![(Phase::Warming, false), (Phase::Cooling, true)]);
        assert!(!(t.warming && t.cooling));
    }

    #[test]
    fn stale_expiry_is_ignored() {
        let mut t = Transient::default();
        let (old, _) = t.begin(Phase::Warming);
        let (current, _) = t.begin(Phase::Cooling);
        assert!(t.expire(old).is_empty());
        assert!(t.cooling);
        assert_eq!(t.expire(current), vec![(Phase::Cooling, false)]);
    }

    #[test]
    fn repeated_values_produce_no_feedback() {
        let mut s = state();
        let mut out = Vec::new();
        s.set_volume(500, &mut out);
        s.set_volume(500, &mut out);
        s.set_mute(true, &mut out);
        s.set_mute(true, &mut out);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn power_off_cascade() {
        let mut s = state();
        let mut out = Vec::new();
        s.set_power(true, &mut out);
        s.set_volume(500, &mut out);
        s.set_mute(true, &mut out);
        s.set_input("CD", &mut out);
        s.set_surround_mode("STEREO", &mut out);
        s.set_channel_level(SurroundChannel::FrontLeft, 500, &mut out);

        out.clear();
        assert!(s.set_power(false, &mut out));
        assert!(!s.mute_is_on);
        assert_eq!(s.volume_level, 0);
        assert!(s.inputs.selected().is_none());
        assert!(s.surround_modes.selected().is_none());
        assert!(s.channels.get(SurroundChannel::FrontLeft).unwrap().is_muted());
        assert!(out.contains(&Feedback::Power(false)));
        assert!(out.contains(&Feedback::Mute(false)));

        out.clear();
        assert!(!s.set_power(false, &mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn override_caps_max_volume() {
        let mut s = DeviceState::new(Generation::HalfStep, Some(700));
        assert_eq!(s.max_volume(), 700);
        let mut out = Vec::new();
        s.set_max_volume(985, &mut out);
        assert_eq!(s.max_volume(), 700);

        let mut s = state();
        s.set_max_volume(985, &mut out);
        assert_eq!(s.max_volume(), 980);
    }

    #[test]
    fn max_volume_notifies_only_when_effective_ceiling_moves() {
        let mut out = Vec::new();

        // override pins the ceiling; learned values are invisible
        let mut s = DeviceState::new(Generation::HalfStep, Some(700));
        s.set_max_volume(800, &mut out);
        s.set_max_volume(900, &mut out);
        assert!(out.is_empty());

        // 985 clamps to the same 980 ceiling as the default
        let mut s = state();
        s.set_max_volume(985, &mut out);
        assert!(out.is_empty());

        // volume 0 normalizes to 0 under any ceiling
        s.set_max_volume(700, &mut out);
        assert_eq!(out, vec![Feedback::MaxVolume(700)]);

        out.clear();
        s.set_volume(350, &mut out);
        out.clear();
        s.set_max_volume(600, &mut out);
        assert_eq!(
            out,
            vec![
                Feedback::MaxVolume(600),
                Feedback::Volume {
                    level: 350,
                    normalized: protocol::normalize(350, 0, 600),
                },
            ]
        );
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let mut s = state();
        let mut out = Vec::new();
        s.set_input("BD", &mut out);
        let json = s.snapshot().to_json().unwrap();
        assert_eq!(json["currentInput"], "BD");
        assert_eq!(json["powerIsOn"], false);
        assert!(json["inputs"].as_array().unwrap().iter().any(|i| i["isSelected"] == true));
    }
}
