use crate::error::{AvrError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Volume level in fine protocol units (tenths of a display step)
pub type Level = i32;

/// Volume normalized to the 0..=65535 range used by control surfaces
pub type NormalizedLevel = u16;

/// Surround speaker position
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SurroundChannel {
    FrontLeft,
    Center,
    FrontRight,
    SurroundLeft,
    SurroundRight,
    SurroundBackLeft,
    SurroundBackRight,
    Subwoofer,
    SurroundBack,
    FrontHeightLeft,
    FrontHeightRight,
    FrontWideLeft,
    FrontWideRight,
    TopFrontLeft,
    TopFrontRight,
    TopMiddleLeft,
    TopMiddleRight,
    TopRearLeft,
    TopRearRight,
    RearHeightLeft,
    RearHeightRight,
    FrontDolbyLeft,
    FrontDolbyRight,
    SurroundDolbyLeft,
    SurroundDolbyRight,
    BackDolbyLeft,
    BackDolbyRight,
    SurroundHeightLeft,
    SurroundHeightRight,
    TopSurround,
    CenterHeight,
    Subwoofer2,
    Unknown,
}

/// Wire token for each channel, shared by the encoder and the parser
pub(crate) const CHANNEL_TABLE: &[(SurroundChannel, &str)] = &[
    (SurroundChannel::FrontLeft, "FL"),
    (SurroundChannel::Center, "C"),
    (SurroundChannel::FrontRight, "FR"),
    (SurroundChannel::SurroundLeft, "SL"),
    (SurroundChannel::SurroundRight, "SR"),
    (SurroundChannel::SurroundBackLeft, "SBL"),
    (SurroundChannel::SurroundBackRight, "SBR"),
    (SurroundChannel::Subwoofer, "SW"),
    (SurroundChannel::SurroundBack, "SB"),
    (SurroundChannel::FrontHeightLeft, "FHL"),
    (SurroundChannel::FrontHeightRight, "FHR"),
    (SurroundChannel::FrontWideLeft, "FWL"),
    (SurroundChannel::FrontWideRight, "FWR"),
    (SurroundChannel::TopFrontLeft, "TFL"),
    (SurroundChannel::TopFrontRight, "TFR"),
    (SurroundChannel::TopMiddleLeft, "TML"),
    (SurroundChannel::TopMiddleRight, "TMR"),
    (SurroundChannel::TopRearLeft, "TRL"),
    (SurroundChannel::TopRearRight, "TRR"),
    (SurroundChannel::RearHeightLeft, "RHL"),
    (SurroundChannel::RearHeightRight, "RHR"),
    (SurroundChannel::FrontDolbyLeft, "FDL"),
    (SurroundChannel::FrontDolbyRight, "FDR"),
    (SurroundChannel::SurroundDolbyLeft, "SDL"),
    (SurroundChannel::SurroundDolbyRight, "SDR"),
    (SurroundChannel::BackDolbyLeft, "BDL"),
    (SurroundChannel::BackDolbyRight, "BDR"),
    (SurroundChannel::SurroundHeightLeft, "SHL"),
    (SurroundChannel::SurroundHeightRight, "SHR"),
    (SurroundChannel::TopSurround, "TS"),
    (SurroundChannel::CenterHeight, "CH"),
    (SurroundChannel::Subwoofer2, "SW2"),
];

impl SurroundChannel {
    /// Resolve a wire token (case-insensitive); unknown tokens map to `Unknown`
    pub fn from_token(token: &str) -> Self {
        CHANNEL_TABLE
            .iter()
            .find(|(_, t)| t.eq_ignore_ascii_case(token))
            .map(|(channel, _)| *channel)
            .unwrap_or(SurroundChannel::Unknown)
    }

    /// Wire token, `None` for `Unknown`
    pub fn token(self) -> Option<&'static str> {
        CHANNEL_TABLE
            .iter()
            .find(|(channel, _)| *channel == self)
            .map(|(_, t)| *t)
    }

    /// All addressable channels, in table order
    pub fn all() -> impl Iterator<Item = SurroundChannel> {
        CHANNEL_TABLE.iter().map(|(channel, _)| *channel)
    }
}

impl fmt::Display for SurroundChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Listening mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SurroundMode {
    Direct,
    PureDirect,
    Stereo,
    Standard,
    DolbyDigital,
    Dts,
    MultiChannelStereo,
    RockArena,
    JazzClub,
    MonoMovie,
    Matrix,
    VideoGame,
    Virtual,
    Auto,
    Neural,
    Auro3D,
    Auro2DSurround,
    Left,
    Right,
    Movie,
    Music,
    Game,
    Unknown,
}

/// Static description of one surround mode
#[derive(Debug, Clone, Copy)]
pub struct SurroundModeDef {
    pub mode: SurroundMode,
    pub name: &'static str,
    /// Text sent after `MS` to select the mode
    pub command: &'static str,
    /// Device-reported prefixes that identify the mode
    pub match_strings: &'static [&'static str],
}

/// Surround modes in match order; the first prefix hit wins.
pub const SURROUND_MODE_TABLE: &[SurroundModeDef] = &[
    SurroundModeDef { mode: SurroundMode::Direct, name: "Direct", command: "DIRECT", match_strings: &["DIRECT"] },
    SurroundModeDef { mode: SurroundMode::PureDirect, name: "Pure Direct", command: "PURE DIRECT", match_strings: &["PURE DIRECT"] },
    SurroundModeDef { mode: SurroundMode::Stereo, name: "Stereo", command: "STEREO", match_strings: &["STEREO"] },
    SurroundModeDef { mode: SurroundMode::Standard, name: "Standard", command: "STANDARD", match_strings: &["STANDARD"] },
    SurroundModeDef { mode: SurroundMode::DolbyDigital, name: "Dolby Digital", command: "DOLBY DIGITAL", match_strings: &["DOLBY DIGITAL", "DOLBY"] },
    SurroundModeDef { mode: SurroundMode::Dts, name: "DTS Surround", command: "DTS SURROUND", match_strings: &["DTS SURROUND", "DTS"] },
    SurroundModeDef { mode: SurroundMode::MultiChannelStereo, name: "Multi Channel Stereo", command: "MCH STEREO", match_strings: &["MCH STEREO", "MULTI CH STEREO"] },
    SurroundModeDef { mode: SurroundMode::RockArena, name: "Rock Arena", command: "ROCK ARENA", match_strings: &["ROCK ARENA"] },
    SurroundModeDef { mode: SurroundMode::JazzClub, name: "Jazz Club", command: "JAZZ CLUB", match_strings: &["JAZZ CLUB"] },
    SurroundModeDef { mode: SurroundMode::MonoMovie, name: "Mono Movie", command: "MONO MOVIE", match_strings: &["MONO MOVIE"] },
    SurroundModeDef { mode: SurroundMode::Matrix, name: "Matrix", command: "MATRIX", match_strings: &["MATRIX"] },
    SurroundModeDef { mode: SurroundMode::VideoGame, name: "Video Game", command: "VIDEO GAME", match_strings: &["VIDEO GAME"] },
    SurroundModeDef { mode: SurroundMode::Virtual, name: "Virtual", command: "VIRTUAL", match_strings: &["VIRTUAL"] },
    SurroundModeDef { mode: SurroundMode::Auto, name: "Auto", command: "AUTO", match_strings: &["AUTO"] },
    SurroundModeDef { mode: SurroundMode::Neural, name: "Neural:X", command: "NEURAL:X", match_strings: &["NEURAL"] },
    SurroundModeDef { mode: SurroundMode::Auro3D, name: "Auro-3D", command: "AURO3D", match_strings: &["AURO3D"] },
    SurroundModeDef { mode: SurroundMode::Auro2DSurround, name: "Auro-2D Surround", command: "AURO2DSURR", match_strings: &["AURO2DSURR"] },
    SurroundModeDef { mode: SurroundMode::Left, name: "Left", command: "LEFT", match_strings: &["LEFT"] },
    SurroundModeDef { mode: SurroundMode::Right, name: "Right", command: "RIGHT", match_strings: &["RIGHT"] },
    SurroundModeDef { mode: SurroundMode::Movie, name: "Movie", command: "MOVIE", match_strings: &["MOVIE"] },
    SurroundModeDef { mode: SurroundMode::Music, name: "Music", command: "MUSIC", match_strings: &["MUSIC"] },
    SurroundModeDef { mode: SurroundMode::Game, name: "Game", command: "GAME", match_strings: &["GAME"] },
];

impl SurroundMode {
    /// Static definition, `None` for `Unknown`
    pub fn def(self) -> Option<&'static SurroundModeDef> {
        SURROUND_MODE_TABLE.iter().find(|d| d.mode == self)
    }

    /// Identify the mode from device-reported text
    ///
    /// Returns `Unknown` when no match string is a prefix of `text`.
    pub fn from_device_text(text: &str) -> Self {
        SURROUND_MODE_TABLE
            .iter()
            .find(|d| d.match_strings.iter().any(|m| text.starts_with(m)))
            .map(|d| d.mode)
            .unwrap_or(SurroundMode::Unknown)
    }

    /// All selectable modes, in table order
    pub fn all() -> impl Iterator<Item = SurroundMode> {
        SURROUND_MODE_TABLE.iter().map(|d| d.mode)
    }
}

impl fmt::Display for SurroundMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for SurroundMode {
    type Err = AvrError;

    /// Parse a mode key such as `"DolbyDigital"` (case-insensitive)
    fn from_str(s: &str) -> Result<Self> {
        SurroundMode::all()
            .find(|mode| mode.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| AvrError::UnknownSurroundMode(s.to_string()))
    }
}

/// Static description of one input source
#[derive(Debug, Clone, Copy)]
pub struct InputDef {
    /// Wire token, also the input key
    pub key: &'static str,
    pub name: &'static str,
}

pub const MAIN_INPUT_TABLE: &[InputDef] = &[
    InputDef { key: "PHONO", name: "Phono" },
    InputDef { key: "CD", name: "CD" },
    InputDef { key: "DVD", name: "DVD" },
    InputDef { key: "BD", name: "Blu-ray" },
    InputDef { key: "TV", name: "TV Audio" },
    InputDef { key: "SAT/CBL", name: "CBL/SAT" },
    InputDef { key: "MPLAY", name: "Media Player" },
    InputDef { key: "GAME", name: "Game" },
    InputDef { key: "TUNER", name: "Tuner" },
    InputDef { key: "8K", name: "8K" },
    InputDef { key: "AUX1", name: "AUX1" },
    InputDef { key: "AUX2", name: "AUX2" },
    InputDef { key: "AUX3", name: "AUX3" },
    InputDef { key: "AUX4", name: "AUX4" },
    InputDef { key: "AUX5", name: "AUX5" },
    InputDef { key: "AUX6", name: "AUX6" },
    InputDef { key: "AUX7", name: "AUX7" },
    InputDef { key: "NET", name: "Network" },
    InputDef { key: "BT", name: "Bluetooth" },
];

pub const ZONE2_INPUT_TABLE: &[InputDef] = &[
    InputDef { key: "SOURCE", name: "Main Source" },
    InputDef { key: "DVD", name: "DVD" },
    InputDef { key: "BD", name: "BD" },
    InputDef { key: "TV", name: "TV" },
    InputDef { key: "SAT/CBL", name: "SAT/CBL" },
    InputDef { key: "MPLAY", name: "MPLAY" },
    InputDef { key: "GAME", name: "GAME" },
    InputDef { key: "8K", name: "8K" },
    InputDef { key: "AUX1", name: "AUX1" },
    InputDef { key: "AUX2", name: "AUX2" },
    InputDef { key: "CD", name: "CD" },
    InputDef { key: "NET", name: "NET" },
    InputDef { key: "BT", name: "BT" },
];

/// Per-channel volume view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelVolume {
    pub channel: SurroundChannel,
    pub level: Level,
}

impl ChannelVolume {
    pub fn new(channel: SurroundChannel) -> Self {
        Self { channel, level: 0 }
    }

    /// Channels carry no separate mute bit on the wire
    pub fn is_muted(&self) -> bool {
        self.level == 0
    }
}

/// Check the static tables for duplicate keys and tokens
pub fn validate_tables() -> Result<()> {
    check_unique("channel token", CHANNEL_TABLE.iter().map(|(_, t)| t.to_ascii_uppercase()))?;
    check_unique("channel", CHANNEL_TABLE.iter().map(|(c, _)| c.to_string()))?;
    check_unique("surround mode", SURROUND_MODE_TABLE.iter().map(|d| d.mode.to_string()))?;
    check_unique("surround command", SURROUND_MODE_TABLE.iter().map(|d| d.command.to_string()))?;
    check_unique("input", MAIN_INPUT_TABLE.iter().map(|d| d.key.to_string()))?;
    check_unique("zone 2 input", ZONE2_INPUT_TABLE.iter().map(|d| d.key.to_string()))?;

    if CHANNEL_TABLE.iter().any(|(c, _)| *c == SurroundChannel::Unknown)
        || SURROUND_MODE_TABLE.iter().any(|d| d.mode == SurroundMode::Unknown)
    {
        return Err(AvrError::Config("Unknown sentinel registered in a table".to_string()));
    }

    Ok(())
}

fn check_unique(what: &str, keys: impl Iterator<Item = String>) -> Result<()> {
    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(key.clone()) {
            return Err(AvrError::Config(format!("Duplicate {} in table: {}", what, key)));
        }
    }
    Ok(())
}
