//! Wire grammar: command encoding and numeric payload rules
//!
//! Volume values are carried in fine units (tenths of the value shown on the
//! front panel). A whole-step value travels as two digits (`MV80` = 800), a
//! half-step value as three (`MV805` = 805, `MV085` = 85).

use crate::error::{AvrError, Result};
use crate::types::{Level, SurroundChannel, SurroundMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outbound line terminator
pub const DELIMITER: &str = "\r";

/// Lowest and highest channel trim level (50 = 0 dB)
pub const CHANNEL_MIN: Level = 380;
pub const CHANNEL_MAX: Level = 620;

/// Zone 2 volume ceiling
pub const ZONE2_MAX: Level = 980;

/// Channel reset command
pub const CHANNEL_RESET: &str = "CVZRL";

/// Firmware generation, which decides the volume grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Generation {
    /// Two-digit volumes only, 1 dB steps
    WholeStep,
    /// Two- and three-digit volumes, 0.5 dB steps
    #[default]
    HalfStep,
}

impl Generation {
    /// Grid spacing in fine units
    pub fn step(self) -> Level {
        match self {
            Generation::WholeStep => 10,
            Generation::HalfStep => 5,
        }
    }

    /// Master volume ceiling used until the device reports `MVMAX`
    pub fn default_max_volume(self) -> Level {
        match self {
            Generation::WholeStep => 990,
            Generation::HalfStep => 980,
        }
    }

    pub fn default_ramp_interval(self) -> Duration {
        match self {
            Generation::WholeStep => Duration::from_millis(50),
            Generation::HalfStep => Duration::from_millis(100),
        }
    }
}

/// Parse a volume payload, applying the two-digit scaling rule
///
/// A payload of at most two digits is a whole step and is multiplied by 10;
/// anything longer is already in fine units.
pub fn parse_level(payload: &str) -> Result<Level> {
    let payload = payload.trim();
    if payload.is_empty() || !payload.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AvrError::Malformed(format!("volume payload {:?}", payload)));
    }
    let value: Level = payload
        .parse()
        .map_err(|_| AvrError::Malformed(format!("volume payload {:?}", payload)))?;

    if payload.len() <= 2 {
        Ok(value * 10)
    } else {
        Ok(value)
    }
}

/// Format a validated level using the inverse of [`parse_level`]
fn format_level(level: Level) -> String {
    if level % 10 == 0 {
        format!("{:02}", level / 10)
    } else {
        format!("{:03}", level)
    }
}

fn check_level(what: &'static str, level: Level, min: Level, max: Level, generation: Generation) -> Result<()> {
    if level < min || level > max {
        return Err(AvrError::OutOfRange { what, value: level, min, max });
    }
    let step = generation.step();
    if level % step != 0 {
        return Err(AvrError::InvalidStep { what, value: level, step });
    }
    Ok(())
}

/// `MV<nn|nnn>`
pub fn master_volume(level: Level, generation: Generation) -> Result<String> {
    check_level("master volume", level, 0, generation.default_max_volume(), generation)?;
    Ok(format!("MV{}", format_level(level)))
}

/// `CV<token> <nn|nnn>`
pub fn channel_volume(channel: SurroundChannel, level: Level, generation: Generation) -> Result<String> {
    let token = channel
        .token()
        .ok_or_else(|| AvrError::UnknownChannel(channel.to_string()))?;
    check_level("channel volume", level, CHANNEL_MIN, CHANNEL_MAX, generation)?;
    Ok(format!("CV{} {}", token, format_level(level)))
}

/// `Z2<nn|nnn>`
pub fn zone2_volume(level: Level, generation: Generation) -> Result<String> {
    check_level("zone 2 volume", level, 0, ZONE2_MAX, generation)?;
    Ok(format!("Z2{}", format_level(level)))
}

/// `SI<key>`
pub fn select_input(key: &str) -> String {
    format!("SI{}", key)
}

/// `Z2<KEY>`
pub fn zone2_select_input(key: &str) -> String {
    format!("Z2{}", key.trim().to_ascii_uppercase())
}

/// `MS<command>`
pub fn select_surround_mode(mode: SurroundMode) -> Result<String> {
    let def = mode
        .def()
        .ok_or_else(|| AvrError::UnknownSurroundMode(mode.to_string()))?;
    Ok(format!("MS{}", def.command))
}

/// `PWON`/`PWSTANDBY`, or `ZMON`/`ZMOFF` for main-zone power
pub fn power(on: bool, zone_main: bool) -> &'static str {
    match (on, zone_main) {
        (true, false) => "PWON",
        (false, false) => "PWSTANDBY",
        (true, true) => "ZMON",
        (false, true) => "ZMOFF",
    }
}

/// `MUON`/`MUOFF`
pub fn mute(on: bool) -> &'static str {
    if on {
        "MUON"
    } else {
        "MUOFF"
    }
}

/// `Z2ON`/`Z2OFF`
pub fn zone2_power(on: bool) -> &'static str {
    if on {
        "Z2ON"
    } else {
        "Z2OFF"
    }
}

/// `Z2MUON`/`Z2MUOFF`
pub fn zone2_mute(on: bool) -> &'static str {
    if on {
        "Z2MUON"
    } else {
        "Z2MUOFF"
    }
}

/// Status queries sent by the poller, in order
pub fn status_queries(zone2: bool) -> Vec<&'static str> {
    let mut queries = vec!["PW?", "MV?", "MU?", "SI?", "MS?", "CV?"];
    if zone2 {
        queries.extend(["Z2?", "Z2MU?"]);
    }
    queries
}

/// Scale `value` from `[from_min, from_max]` to `[to_min, to_max]`, clamping at the edges
pub fn scale(value: i64, from_min: i64, from_max: i64, to_min: i64, to_max: i64) -> i64 {
    if from_max <= from_min {
        return to_min;
    }
    let value = value.clamp(from_min, from_max);
    to_min + (value - from_min) * (to_max - to_min) / (from_max - from_min)
}

/// Fine level → 0..=65535
pub fn normalize(level: Level, min: Level, max: Level) -> u16 {
    scale(level as i64, min as i64, max as i64, 0, u16::MAX as i64) as u16
}

/// 0..=65535 → fine level, rounded down onto the step grid
pub fn denormalize(value: u16, min: Level, max: Level, step: Level) -> Level {
    let raw = scale(value as i64, 0, u16::MAX as i64, min as i64, max as i64) as Level;
    let snapped = raw - (raw - min).rem_euclid(step);
    snapped.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_digit_payload_is_scaled() {
        assert_eq!(parse_level("80").unwrap(), 800);
        assert_eq!(parse_level("00").unwrap(), 0);
        assert_eq!(parse_level(" 98 ").unwrap(), 980);
    }

    #[test]
    fn three_digit_payload_is_literal() {
        assert_eq!(parse_level("085").unwrap(), 85);
        assert_eq!(parse_level("805").unwrap(), 805);
    }

    #[test]
    fn single_digit_payload_is_ambiguous_and_scaled() {
        // "5" could mean 0.5 or 5 steps; the length rule reads it as 5 steps
        assert_eq!(parse_level("5").unwrap(), 50);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(matches!(parse_level(""), Err(AvrError::Malformed(_))));
        assert!(matches!(parse_level("8a"), Err(AvrError::Malformed(_))));
        assert!(matches!(parse_level("-5"), Err(AvrError::Malformed(_))));
    }

    #[test]
    fn master_volume_formatting() {
        assert_eq!(master_volume(800, Generation::HalfStep).unwrap(), "MV80");
        assert_eq!(master_volume(805, Generation::HalfStep).unwrap(), "MV805");
        assert_eq!(master_volume(85, Generation::HalfStep).unwrap(), "MV085");
        assert_eq!(master_volume(0, Generation::HalfStep).unwrap(), "MV00");
        assert_eq!(master_volume(50, Generation::WholeStep).unwrap(), "MV05");
    }

    #[test]
    fn encoder_rejects_out_of_range() {
        assert!(matches!(
            master_volume(985, Generation::HalfStep),
            Err(AvrError::OutOfRange { max: 980, .. })
        ));
        assert!(matches!(
            master_volume(-5, Generation::HalfStep),
            Err(AvrError::OutOfRange { .. })
        ));
        assert!(matches!(
            channel_volume(SurroundChannel::FrontLeft, 630, Generation::HalfStep),
            Err(AvrError::OutOfRange { .. })
        ));
        assert!(matches!(
            zone2_volume(990, Generation::HalfStep),
            Err(AvrError::OutOfRange { .. })
        ));
    }

    #[test]
    fn encoder_rejects_off_grid_values() {
        assert!(matches!(
            master_volume(805, Generation::WholeStep),
            Err(AvrError::InvalidStep { step: 10, .. })
        ));
        assert!(matches!(
            master_volume(803, Generation::HalfStep),
            Err(AvrError::InvalidStep { step: 5, .. })
        ));
    }

    #[test]
    fn every_valid_level_survives_encode_then_parse() {
        for generation in [Generation::HalfStep, Generation::WholeStep] {
            let step = generation.step();
            for level in (0..=generation.default_max_volume()).step_by(step as usize) {
                let cmd = master_volume(level, generation).unwrap();
                assert_eq!(parse_level(&cmd[2..]).unwrap(), level, "{}", cmd);
            }
            for level in (CHANNEL_MIN..=CHANNEL_MAX).step_by(step as usize) {
                let cmd = channel_volume(SurroundChannel::Subwoofer, level, generation).unwrap();
                let payload = cmd.split_whitespace().nth(1).unwrap();
                assert_eq!(parse_level(payload).unwrap(), level, "{}", cmd);
            }
        }
    }

    #[test]
    fn channel_command_uses_table_token() {
        assert_eq!(
            channel_volume(SurroundChannel::FrontLeft, 500, Generation::HalfStep).unwrap(),
            "CVFL 50"
        );
        assert_eq!(
            channel_volume(SurroundChannel::Center, 505, Generation::HalfStep).unwrap(),
            "CVC 505"
        );
        assert!(matches!(
            channel_volume(SurroundChannel::Unknown, 500, Generation::HalfStep),
            Err(AvrError::UnknownChannel(_))
        ));
    }

    #[test]
    fn fixed_vocabulary() {
        assert_eq!(power(true, false), "PWON");
        assert_eq!(power(false, false), "PWSTANDBY");
        assert_eq!(power(true, true), "ZMON");
        assert_eq!(mute(false), "MUOFF");
        assert_eq!(zone2_select_input(" net "), "Z2NET");
        assert_eq!(select_surround_mode(SurroundMode::Dts).unwrap(), "MSDTS SURROUND");
        assert!(select_surround_mode(SurroundMode::Unknown).is_err());
    }

    #[test]
    fn normalization_round_trips_on_the_grid() {
        assert_eq!(normalize(0, 0, 980), 0);
        assert_eq!(normalize(980, 0, 980), u16::MAX);
        assert_eq!(denormalize(u16::MAX, 0, 980, 5), 980);
        assert_eq!(denormalize(0, 0, 980, 5), 0);
        assert_eq!(denormalize(u16::MAX / 2, CHANNEL_MIN, CHANNEL_MAX, 5) % 5, 0);
        assert_eq!(normalize(CHANNEL_MIN - 100, CHANNEL_MIN, CHANNEL_MAX), 0);
    }
}
