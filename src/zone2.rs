use crate::error::{AvrError, Result};
use crate::feedback::{Feedback, Zone2Feedback};
use crate::parser::Zone2Response;
use crate::protocol::{self, ZONE2_MAX};
use crate::ramp::{RampCoordinator, RampTarget};
use crate::selection::{SelectableItem, SelectableItems};
use crate::state::{Phase, Shared, Transient, Zone};
use crate::transport::CommandSink;
use crate::types::{Level, NormalizedLevel, ZONE2_INPUT_TABLE};
use serde::Serialize;
use std::sync::Arc;

/// Zone 2 slice of the device state
#[derive(Debug)]
pub(crate) struct Zone2State {
    pub power_is_on: bool,
    pub mute_is_on: bool,
    pub volume_level: Level,
    pub current_input: Option<String>,
    pub inputs: SelectableItems<String>,
    pub transient: Transient,
}

impl Zone2State {
    pub fn new() -> Self {
        Self {
            power_is_on: false,
            mute_is_on: false,
            volume_level: 0,
            current_input: None,
            inputs: SelectableItems::new(
                ZONE2_INPUT_TABLE.iter().map(|d| (d.key.to_string(), d.name.to_string())),
            ),
            transient: Transient::default(),
        }
    }

    /// Apply a classified `Z2` line. Returns the new power state when it changed.
    pub fn apply(&mut self, response: Zone2Response, out: &mut Vec<Feedback>) -> Option<bool> {
        match response {
            Zone2Response::Power(on) => return self.set_power(on, out).then_some(on),
            Zone2Response::Mute(on) => self.set_mute(on, out),
            Zone2Response::Volume(level) => self.set_volume(level, out),
            Zone2Response::Input(text) => {
                if self.inputs.contains(&text) {
                    for (key, is_selected) in self.inputs.select_only(&text) {
                        out.push(Zone2Feedback::InputSelection { key, is_selected }.into());
                    }
                }
                if self.current_input.as_deref() != Some(text.as_str()) {
                    self.current_input = Some(text);
                    out.push(Zone2Feedback::CurrentInput(self.current_input.clone()).into());
                }
            }
        }
        None
    }

    fn set_power(&mut self, on: bool, out: &mut Vec<Feedback>) -> bool {
        if self.power_is_on == on {
            return false;
        }
        self.power_is_on = on;
        out.push(Zone2Feedback::Power(on).into());
        if !on {
            self.set_volume(0, out);
            self.set_mute(false, out);
            for (key, is_selected) in self.inputs.clear() {
                out.push(Zone2Feedback::InputSelection { key, is_selected }.into());
            }
        }
        true
    }

    fn set_mute(&mut self, on: bool, out: &mut Vec<Feedback>) {
        if self.mute_is_on != on {
            self.mute_is_on = on;
            out.push(Zone2Feedback::Mute(on).into());
        }
    }

    fn set_volume(&mut self, level: Level, out: &mut Vec<Feedback>) {
        if self.volume_level != level {
            self.volume_level = level;
            tracing::debug!("Zone 2 volume level: {}", level);
            out.push(
                Zone2Feedback::Volume {
                    level,
                    normalized: protocol::normalize(level, 0, ZONE2_MAX),
                }
                .into(),
            );
        }
    }

    /// Get a snapshot of the zone 2 state
    pub fn snapshot(&self) -> Zone2Snapshot {
        Zone2Snapshot {
            power_is_on: self.power_is_on,
            mute_is_on: self.mute_is_on,
            volume_level: self.volume_level,
            current_input: self.current_input.clone(),
            inputs: self.inputs.items().to_vec(),
            is_warming_up: self.transient.warming,
            is_cooling_down: self.transient.cooling,
        }
    }
}

/// Point-in-time copy of zone 2
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone2Snapshot {
    pub power_is_on: bool,
    pub mute_is_on: bool,
    pub volume_level: Level,
    pub current_input: Option<String>,
    pub inputs: Vec<SelectableItem<String>>,
    pub is_warming_up: bool,
    pub is_cooling_down: bool,
}

struct Zone2VolumeTarget {
    shared: Arc<Shared>,
    sink: CommandSink,
}

impl RampTarget for Zone2VolumeTarget {
    fn current_level(&self) -> Level {
        self.shared.lock().zone2.volume_level
    }

    fn bounds(&self) -> (Level, Level) {
        (0, ZONE2_MAX)
    }

    fn send_level(&self, level: Level) -> Result<()> {
        let generation = self.shared.lock().generation;
        self.sink.send(&protocol::zone2_volume(level, generation)?)
    }
}

/// Control surface for the second zone
#[derive(Clone)]
pub struct Zone2 {
    shared: Arc<Shared>,
    sink: CommandSink,
    ramp: Arc<RampCoordinator>,
}

impl Zone2 {
    pub(crate) fn new(shared: Arc<Shared>, sink: CommandSink, ramp_interval: std::time::Duration) -> Self {
        let step = shared.lock().generation.step();
        let target = Arc::new(Zone2VolumeTarget {
            shared: Arc::clone(&shared),
            sink: sink.clone(),
        });
        let ramp = Arc::new(RampCoordinator::new(
            "zone 2 volume",
            target,
            step,
            ramp_interval,
            shared.runtime.clone(),
        ));
        Self { shared, sink, ramp }
    }

    /// Get a snapshot of the zone 2 state
    pub fn snapshot(&self) -> Zone2Snapshot {
        self.shared.lock().zone2.snapshot()
    }

    /// Get the confirmed zone 2 power state
    pub fn power_is_on(&self) -> bool {
        self.shared.lock().zone2.power_is_on
    }

    /// Get the confirmed zone 2 mute state
    pub fn mute_is_on(&self) -> bool {
        self.shared.lock().zone2.mute_is_on
    }

    /// Get the zone 2 volume in fine units
    pub fn volume_level(&self) -> Level {
        self.shared.lock().zone2.volume_level
    }

    /// Get the zone 2 sources with their selection flags
    pub fn inputs(&self) -> Vec<SelectableItem<String>> {
        self.shared.lock().zone2.inputs.items().to_vec()
    }

    /// Turn zone 2 on and start its warm-up period
    pub fn power_on(&self) -> Result<()> {
        self.sink.send(protocol::zone2_power(true))?;
        self.shared.begin_transient(Zone::Zone2, Phase::Warming);
        Ok(())
    }

    /// Turn zone 2 off and start its cool-down period
    pub fn power_off(&self) -> Result<()> {
        self.sink.send(protocol::zone2_power(false))?;
        self.shared.begin_transient(Zone::Zone2, Phase::Cooling);
        Ok(())
    }

    /// Switch zone 2 power based on the last confirmed state
    pub fn power_toggle(&self) -> Result<()> {
        if self.power_is_on() {
            self.power_off()
        } else {
            self.power_on()
        }
    }

    /// Mute zone 2
    pub fn mute_on(&self) -> Result<()> {
        self.sink.send(protocol::zone2_mute(true))
    }

    /// Unmute zone 2
    pub fn mute_off(&self) -> Result<()> {
        self.sink.send(protocol::zone2_mute(false))
    }

    /// Switch zone 2 mute based on the last confirmed state
    pub fn mute_toggle(&self) -> Result<()> {
        if self.mute_is_on() {
            self.mute_off()
        } else {
            self.mute_on()
        }
    }

    /// Set volume from a 0..=65535 control value
    pub fn set_volume(&self, value: NormalizedLevel) -> Result<()> {
        let generation = self.shared.lock().generation;
        let level = protocol::denormalize(value, 0, ZONE2_MAX, generation.step());
        self.sink.send(&protocol::zone2_volume(level, generation)?)
    }

    /// Press (`true`) or release (`false`) zone 2 volume up
    pub fn volume_up(&self, pressed: bool) {
        self.ramp.press(crate::ramp::Direction::Up, pressed);
    }

    /// Press (`true`) or release (`false`) zone 2 volume down
    pub fn volume_down(&self, pressed: bool) {
        self.ramp.press(crate::ramp::Direction::Down, pressed);
    }

    /// Select a zone 2 source by key, then ask the zone to report back
    pub fn select_input(&self, key: &str) -> Result<()> {
        let key = key.trim().to_ascii_uppercase();
        if !self.shared.lock().zone2.inputs.contains(&key) {
            return Err(AvrError::UnknownInput(key));
        }
        self.sink.send(&protocol::zone2_select_input(&key))?;
        self.sink.send("Z2?")
    }
}
