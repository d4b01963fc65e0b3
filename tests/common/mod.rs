#![allow(dead_code)]

use elan_bridge::{
    remap_missing_code, Bridge, BridgeHandle, BridgeSettings, CommandSender, HardwareCommand,
    HardwareProfile, Zone, POWER, VOLUME_DOWN, VOLUME_UP, ZONE_COUNT,
};
use tokio::sync::mpsc;

pub const HEADER: [u8; 4] = [0xE0, 0xC0, 0x00, 0x81];
pub const STATUS_FOOTER: u8 = 0xEA;

pub fn zone(n: u8) -> Zone {
    Zone::new(n).unwrap()
}

/// Start a bridge with the default profile and return its command queue
pub fn start_bridge() -> (BridgeHandle, mpsc::UnboundedReceiver<HardwareCommand>) {
    let (hw_tx, hw_rx) = mpsc::unbounded_channel();
    let (bridge, handle) = Bridge::new(
        HardwareProfile::default(),
        BridgeSettings::default(),
        CommandSender::new(hw_tx),
    )
    .unwrap();
    bridge.spawn();
    (handle, hw_rx)
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<HardwareCommand>) -> Vec<HardwareCommand> {
    let mut out = Vec::new();
    while let Ok(cmd) = rx.try_recv() {
        out.push(cmd);
    }
    out
}

/// Stand-in for the amplifier behind the link controller
///
/// Reacts to commands the way the real unit does, including skipping the
/// volume codes it never reports, and renders status frames in the default
/// wire layout.
#[derive(Debug, Clone, Default)]
pub struct FakeAmp {
    pub volume: [u8; ZONE_COUNT],
    pub mute: [bool; ZONE_COUNT],
    pub input: [u8; ZONE_COUNT],
}

impl FakeAmp {
    pub fn with_zone(mut self, zone: Zone, volume: u8, input: u8) -> Self {
        self.volume[zone.index()] = volume;
        self.input[zone.index()] = input;
        self
    }

    pub fn apply(&mut self, command: HardwareCommand) {
        let i = command.zone.index();
        match command.code {
            POWER => self.input[i] = if self.input[i] == 0 { 1 } else { 0 },
            VOLUME_UP if self.volume[i] < 48 => {
                self.volume[i] += 1;
                if remap_missing_code(self.volume[i]) != self.volume[i] {
                    self.volume[i] += 1;
                }
            }
            VOLUME_DOWN if self.volume[i] > 0 => {
                self.volume[i] -= 1;
                if remap_missing_code(self.volume[i]) != self.volume[i] {
                    self.volume[i] -= 1;
                }
            }
            _ => {}
        }
    }

    pub fn frame(&self) -> Vec<u8> {
        let mut frame = HEADER.to_vec();
        for i in 0..ZONE_COUNT {
            frame.push(self.input[i] | (u8::from(self.mute[i]) << 4));
            frame.push(0x00);
            frame.push(48 - self.volume[i]);
        }
        frame.push(STATUS_FOOTER);
        frame
    }
}
