//! Classification of received lines
//!
//! Prefixes are tested from the most specific to the most generic so that
//! `MVMAX` is never read as `MV`, and `CV` list terminators never reach the
//! channel branch.

use crate::error::{AvrError, Result};
use crate::protocol::parse_level;
use crate::types::{Level, SurroundChannel};

/// A classified line from the receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    MaxVolume(Level),
    Volume(Level),
    ChannelVolume {
        channel: SurroundChannel,
        level: Level,
    },
    /// Raw input text after `SI`, case preserved
    Input(String),
    /// Raw surround mode text after `MS`
    SurroundMode(String),
    Zone2(Zone2Response),
    Power(bool),
    Mute(bool),
}

/// A classified `Z2` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Zone2Response {
    Power(bool),
    Mute(bool),
    Volume(Level),
    Input(String),
}

/// Classify one line
///
/// `Ok(None)` means the line carries nothing this driver tracks (blank
/// lines, list terminators, unknown channels, unknown vocabulary). `Err`
/// means the line was recognised but its payload was malformed.
pub fn parse_line(line: &str) -> Result<Option<Response>> {
    let rx = line.trim();
    if rx.is_empty() {
        return Ok(None);
    }

    if let Some(rest) = rx.strip_prefix("MVMAX") {
        return parse_level(rest).map(|level| Some(Response::MaxVolume(level)));
    }

    if let Some(rest) = rx.strip_prefix("MV") {
        return parse_level(rest).map(|level| Some(Response::Volume(level)));
    }

    if let Some(rest) = rx.strip_prefix("CV") {
        if rx.contains("END") {
            return Ok(None);
        }
        return parse_channel_volume(rest);
    }

    if let Some(rest) = rx.strip_prefix("SI") {
        return Ok(Some(Response::Input(rest.to_string())));
    }

    if let Some(rest) = rx.strip_prefix("MS") {
        return Ok(Some(Response::SurroundMode(rest.to_string())));
    }

    if rx.starts_with("Z2") {
        return Ok(Some(Response::Zone2(parse_zone2(rx))));
    }

    let response = match rx {
        "PWON" | "ZMON" => Some(Response::Power(true)),
        "PWSTANDBY" | "ZMOFF" => Some(Response::Power(false)),
        "MUON" => Some(Response::Mute(true)),
        "MUOFF" => Some(Response::Mute(false)),
        _ => None,
    };
    Ok(response)
}

fn parse_channel_volume(rest: &str) -> Result<Option<Response>> {
    let mut parts = rest.split_whitespace();
    let (Some(token), Some(level)) = (parts.next(), parts.next()) else {
        return Err(AvrError::Malformed(format!("channel volume CV{}", rest)));
    };

    let channel = SurroundChannel::from_token(token);
    if channel == SurroundChannel::Unknown {
        tracing::debug!("Ignoring unknown channel token {:?}", token);
        return Ok(None);
    }

    let level = parse_level(level)?;
    Ok(Some(Response::ChannelVolume { channel, level }))
}

/// Zone 2 lines: four literal flags, otherwise a volume if the remainder is
/// numeric, otherwise an input name.
pub fn parse_zone2(rx: &str) -> Zone2Response {
    match rx {
        "Z2ON" => Zone2Response::Power(true),
        "Z2OFF" => Zone2Response::Power(false),
        "Z2MUON" => Zone2Response::Mute(true),
        "Z2MUOFF" => Zone2Response::Mute(false),
        _ => {
            let rest = rx[2..].trim();
            match parse_level(rest) {
                Ok(level) => Zone2Response::Volume(level),
                Err(_) => Zone2Response::Input(rest.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Option<Response> {
        parse_line(line).unwrap()
    }

    #[test]
    fn max_volume_is_not_read_as_volume() {
        assert_eq!(parse("MVMAX 98"), Some(Response::MaxVolume(980)));
        assert_eq!(parse("MVMAX985"), Some(Response::MaxVolume(985)));
    }

    #[test]
    fn master_volume_scaling() {
        assert_eq!(parse("MV80"), Some(Response::Volume(800)));
        assert_eq!(parse("MV085"), Some(Response::Volume(85)));
        assert_eq!(parse("  MV45\r"), Some(Response::Volume(450)));
    }

    #[test]
    fn malformed_volume_is_an_error() {
        assert!(parse_line("MVabc").is_err());
        assert!(parse_line("MV").is_err());
    }

    #[test]
    fn channel_volume() {
        assert_eq!(
            parse("CVFL 50"),
            Some(Response::ChannelVolume { channel: SurroundChannel::FrontLeft, level: 500 })
        );
        assert_eq!(
            parse("CVsw 455"),
            Some(Response::ChannelVolume { channel: SurroundChannel::Subwoofer, level: 455 })
        );
    }

    #[test]
    fn channel_list_terminator_is_skipped() {
        assert_eq!(parse("CVEND"), None);
        assert_eq!(parse("CVFL END"), None);
    }

    #[test]
    fn unknown_channel_is_dropped_silently() {
        assert_eq!(parse("CVXX 50"), None);
    }

    #[test]
    fn short_channel_line_is_malformed() {
        assert!(parse_line("CVFL").is_err());
        assert!(parse_line("CVFL x").is_err());
    }

    #[test]
    fn input_and_surround_text_keep_case() {
        assert_eq!(parse("SISAT/CBL"), Some(Response::Input("SAT/CBL".to_string())));
        assert_eq!(parse("SIMyInput"), Some(Response::Input("MyInput".to_string())));
        assert_eq!(parse("MSDOLBY ATMOS"), Some(Response::SurroundMode("DOLBY ATMOS".to_string())));
    }

    #[test]
    fn zone2_lines() {
        assert_eq!(parse("Z2ON"), Some(Response::Zone2(Zone2Response::Power(true))));
        assert_eq!(parse("Z2MUOFF"), Some(Response::Zone2(Zone2Response::Mute(false))));
        assert_eq!(parse("Z240"), Some(Response::Zone2(Zone2Response::Volume(400))));
        assert_eq!(parse("Z2405"), Some(Response::Zone2(Zone2Response::Volume(405))));
        assert_eq!(parse("Z2NET"), Some(Response::Zone2(Zone2Response::Input("NET".to_string()))));
    }

    #[test]
    fn fixed_vocabulary() {
        assert_eq!(parse("PWON"), Some(Response::Power(true)));
        assert_eq!(parse("PWSTANDBY"), Some(Response::Power(false)));
        assert_eq!(parse("ZMON"), Some(Response::Power(true)));
        assert_eq!(parse("ZMOFF"), Some(Response::Power(false)));
        assert_eq!(parse("MUON"), Some(Response::Mute(true)));
        assert_eq!(parse("MUOFF"), Some(Response::Mute(false)));
    }

    #[test]
    fn everything_else_is_ignored() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("   "), None);
        assert_eq!(parse("PSTONE CTRL ON"), None);
        assert_eq!(parse("PW"), None);
    }
}
