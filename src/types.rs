use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of zones on the amplifier
pub const ZONE_COUNT: usize = 6;

/// Volume value (0..=63)
pub type Volume = u8;

/// Input / power sub-state code (0..=7)
pub type InputCode = u8;

/// Zone number, always in `1..=ZONE_COUNT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Zone(u8);

impl Zone {
    /// Create a zone from its 1-based number
    pub fn new(number: u8) -> Option<Self> {
        (1..=ZONE_COUNT as u8).contains(&number).then_some(Self(number))
    }

    /// 1-based zone number
    pub fn number(self) -> u8 {
        self.0
    }

    /// 0-based slot in per-zone arrays
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }

    /// Iterate over every zone in order
    pub fn all() -> impl Iterator<Item = Zone> {
        (1..=ZONE_COUNT as u8).map(Zone)
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a single zone as reported by the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoneStatus {
    pub volume: Volume,
    pub mute: bool,
    pub input: InputCode,
}

/// Per-zone fields of one decoded status frame
pub type ZoneSnapshot = [ZoneStatus; ZONE_COUNT];

/// Reconciled state of the whole amplifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemStatus {
    pub zones: ZoneSnapshot,

    /// True while status frames keep arriving within the watchdog window
    pub on: bool,
}

impl SystemStatus {
    /// State of one zone
    pub fn zone(&self, zone: Zone) -> ZoneStatus {
        self.zones[zone.index()]
    }

    /// Wire representation sent to subscribers
    pub fn to_message(&self) -> StatusMessage {
        StatusMessage {
            volume: self.zones.map(|z| z.volume),
            mute: self.zones.map(|z| u8::from(z.mute)),
            input: self.zones.map(|z| z.input),
            on: self.on,
        }
    }
}

/// JSON snapshot published to subscribers
///
/// Mute is carried as `0`/`1` to match what existing clients parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub volume: [Volume; ZONE_COUNT],
    pub mute: [u8; ZONE_COUNT],
    pub input: [InputCode; ZONE_COUNT],
    pub on: bool,
}
