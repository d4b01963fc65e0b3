use crate::error::{BridgeError, Result};
use crate::types::{Volume, Zone, ZONE_COUNT};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Toggle zone power
pub const POWER: u8 = 0;
/// One volume step up
pub const VOLUME_UP: u8 = 4;
/// One volume step down
pub const VOLUME_DOWN: u8 = 36;
/// Highest command code the zone pad accepts
pub const MAX_COMMAND: u8 = 63;

/// Input code reported while a zone is powered on
pub const INPUT_ON: u8 = 1;

/// How the raw 6-bit volume field maps to a volume value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VolumeTransform {
    /// Field carries attenuation: `volume = full_scale - raw`
    Attenuation { full_scale: u8 },
    /// Field carries the level directly
    Raw,
}

impl VolumeTransform {
    pub fn apply(self, raw: u8, mask: u8) -> Volume {
        match self {
            Self::Attenuation { full_scale } => full_scale.wrapping_sub(raw) & mask,
            Self::Raw => raw & mask,
        }
    }
}

impl Default for VolumeTransform {
    fn default() -> Self {
        Self::Attenuation { full_scale: 48 }
    }
}

/// Byte layout of one firmware variant
///
/// Covers both directions: how status frames are delimited and unpacked, and
/// how outbound zone commands are encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareProfile {
    /// Delimiter that starts every frame
    pub header: [u8; 4],
    pub status_footer: u8,
    pub log_footer: u8,

    /// Bytes per zone in the status payload
    pub zone_stride: usize,
    /// Offset of the mute/input byte within a zone's slice
    pub flags_offset: usize,
    /// Offset of the volume byte within a zone's slice
    pub volume_offset: usize,

    pub mute_mask: u8,
    pub input_mask: u8,
    pub volume_mask: u8,
    pub volume_transform: VolumeTransform,

    /// First byte of every outbound command
    pub command_opcode: u8,
    /// Added to the zone number to get the output channel
    pub channel_offset: u8,

    /// Pending frame size at which an unterminated frame is dropped
    pub max_frame_len: usize,
}

impl Default for HardwareProfile {
    fn default() -> Self {
        Self {
            header: [0xE0, 0xC0, 0x00, 0x81],
            status_footer: 0xEA,
            log_footer: 0xEF,
            zone_stride: 3,
            flags_offset: 0,
            volume_offset: 2,
            mute_mask: 0b0001_0000,
            input_mask: 0b0000_0111,
            volume_mask: 0b0011_1111,
            volume_transform: VolumeTransform::default(),
            command_opcode: b'S',
            channel_offset: 0,
            max_frame_len: 256,
        }
    }
}

impl HardwareProfile {
    /// Size of a status payload, footer excluded
    pub fn status_len(&self) -> usize {
        self.zone_stride * ZONE_COUNT
    }

    /// Output channel addressed for a zone
    pub fn channel(&self, zone: Zone) -> u8 {
        zone.number().wrapping_add(self.channel_offset)
    }

    /// Check that the per-zone offsets fit inside the stride
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.zone_stride == 0 {
            return Err("zone_stride must be at least 1".to_string());
        }
        if self.flags_offset >= self.zone_stride || self.volume_offset >= self.zone_stride {
            return Err(format!(
                "flags_offset ({}) and volume_offset ({}) must be below zone_stride ({})",
                self.flags_offset, self.volume_offset, self.zone_stride
            ));
        }
        if self.max_frame_len <= self.status_len() {
            return Err(format!(
                "max_frame_len ({}) must exceed the status payload ({})",
                self.max_frame_len,
                self.status_len()
            ));
        }
        Ok(())
    }
}

/// A command pulse sequence addressed to one zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareCommand {
    pub zone: Zone,
    pub code: u8,
}

impl HardwareCommand {
    pub fn new(zone: Zone, code: u8) -> Self {
        Self { zone, code }
    }

    pub fn power(zone: Zone) -> Self {
        Self::new(zone, POWER)
    }

    pub fn volume_up(zone: Zone) -> Self {
        Self::new(zone, VOLUME_UP)
    }

    pub fn volume_down(zone: Zone) -> Self {
        Self::new(zone, VOLUME_DOWN)
    }

    /// Bytes written to the link: `[opcode, channel, code]`
    pub fn encode(&self, profile: &HardwareProfile) -> [u8; 3] {
        [profile.command_opcode, profile.channel(self.zone), self.code]
    }
}

/// Fire-and-forget queue of commands toward the hardware writer
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<HardwareCommand>,
}

impl CommandSender {
    pub fn new(tx: mpsc::UnboundedSender<HardwareCommand>) -> Self {
        Self { tx }
    }

    /// Queue a command. Fails only once the writer has gone away.
    pub fn send(&self, command: HardwareCommand) -> Result<()> {
        tracing::debug!("Zone {}: command {}", command.zone, command.code);
        self.tx.send(command).map_err(|_| {
            BridgeError::Transport(format!(
                "hardware link closed, dropped command {} for zone {}",
                command.code, command.zone
            ))
        })
    }
}
