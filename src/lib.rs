//! Bridge between an Elan six-zone amplifier and live WebSocket subscribers
//!
//! The amplifier is reachable only through a link controller on a serial port
//! that streams binary status frames and accepts three-byte zone commands.
//! This library provides:
//!
//! - Frame decoding of the serial byte stream, resynchronizing after bad frames
//! - A reconciled status snapshot with change detection and a presence
//!   watchdog that infers power-off from silence
//! - Slider-style volume ramps built from discrete up/down pulses, tolerant of
//!   volume codes the hardware never reports
//! - Validation and routing of subscriber requests
//! - Snapshot broadcast to subscribers with lazy disconnect cleanup
//!
//! # Quick Start
//!
//! ```no_run
//! use elan_bridge::{server, Bridge, BridgeSettings, CommandSender, HardwareProfile, SerialLink};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let profile = HardwareProfile::default();
//!     let (hw_tx, hw_rx) = mpsc::unbounded_channel();
//!     let (bridge, handle) =
//!         Bridge::new(profile.clone(), BridgeSettings::default(), CommandSender::new(hw_tx))?;
//!
//!     SerialLink::open("/dev/ttyACM0", 921_600)?.start(profile, handle.clone(), hw_rx)?;
//!     bridge.spawn();
//!
//!     let listener = server::bind("0.0.0.0:1338").await?;
//!     server::serve(listener, handle).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Driving the bridge directly
//!
//! Anything that can produce bytes and text can use a [`BridgeHandle`]:
//!
//! ```no_run
//! use elan_bridge::{Bridge, BridgeSettings, ClientRequest, CommandSender, HardwareProfile};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (hw_tx, mut hw_rx) = mpsc::unbounded_channel();
//!     let (bridge, handle) = Bridge::new(
//!         HardwareProfile::default(),
//!         BridgeSettings::default(),
//!         CommandSender::new(hw_tx),
//!     )?;
//!     bridge.spawn();
//!
//!     let mut updates = handle.subscribe().await?;
//!     println!("Initial state: {}", updates.recv().await?);
//!
//!     // Ramp zone 2 toward volume 20
//!     handle.request(ClientRequest::Text("0:2:20".to_string())).await?;
//!     while let Some(command) = hw_rx.recv().await {
//!         println!("Zone {} <- {}", command.zone, command.code);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Decoder**: splits the serial stream into status, log and error events
//! - **Store**: single owner of the system snapshot and the power watchdog
//! - **Ramp**: per-zone cancellable pulse sequencer
//! - **Router**: subscriber request grammar and dispatch
//! - **Hub**: snapshot fan-out to subscribers
//! - **Bridge**: event loop that owns all of the above
//! - **Serial** / **Server**: thin transports for the hardware and subscribers

mod bridge;
mod config;
mod decoder;
mod error;
mod hub;
mod protocol;
mod ramp;
mod router;
mod serial;
pub mod server;
mod store;
mod subscription;
mod types;

// Public exports
pub use bridge::{Bridge, BridgeHandle, BridgeSettings, DEFAULT_HEARTBEAT_INTERVAL};
pub use config::{Config, SerialConfig, ServerConfig, TimingConfig};
pub use decoder::{DecodedEvent, FrameDecoder};
pub use error::{BridgeError, CommandError, ProtocolError, RampError, Result};
pub use hub::BroadcastHub;
pub use protocol::{
    CommandSender, HardwareCommand, HardwareProfile, VolumeTransform, INPUT_ON, MAX_COMMAND,
    POWER, VOLUME_DOWN, VOLUME_UP,
};
pub use ramp::{remap_missing_code, RampController, RampSettings, RampTick, StepOutcome};
pub use router::{ClientRequest, CommandRouter, Request, MAX_SLIDER_VOLUME};
pub use serial::SerialLink;
pub use store::{StatusStore, DEFAULT_WATCHDOG_WINDOW};
pub use subscription::Subscription;
pub use types::{
    InputCode, StatusMessage, SystemStatus, Volume, Zone, ZoneSnapshot, ZoneStatus, ZONE_COUNT,
};
