use crate::bridge::BridgeHandle;
use crate::error::{BridgeError, Result};
use crate::protocol::{HardwareCommand, HardwareProfile};
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;

const READ_TIMEOUT: Duration = Duration::from_millis(200);
const READ_CHUNK: usize = 256;

/// Serial connection to the link controller
pub struct SerialLink {
    path: String,
    reader: Box<dyn SerialPort>,
    writer: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Open the port at `path`
    pub fn open(path: impl Into<String>, baud_rate: u32) -> Result<Self> {
        let path = path.into();
        tracing::info!("Opening serial link {} at {} baud", path, baud_rate);

        let reader = serialport::new(&path, baud_rate).timeout(READ_TIMEOUT).open()?;
        let writer = reader.try_clone()?;

        Ok(Self {
            path,
            reader,
            writer,
        })
    }

    /// Start pumping bytes into the bridge and commands out to the port
    ///
    /// Both halves run on dedicated OS threads since the port is synchronous.
    /// They are detached from the runtime and end with the process.
    pub fn start(
        self,
        profile: HardwareProfile,
        bridge: BridgeHandle,
        commands: mpsc::UnboundedReceiver<HardwareCommand>,
    ) -> Result<(JoinHandle<()>, JoinHandle<()>)> {
        let Self {
            path,
            mut reader,
            mut writer,
        } = self;

        let read_path = path.clone();
        let read_handle = thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || {
                if let Err(e) = pump_bytes(&mut reader, &bridge) {
                    tracing::error!("Serial read from {} stopped: {}", read_path, e);
                }
            })?;

        let write_handle = thread::Builder::new()
            .name("serial-writer".to_string())
            .spawn(move || {
                let mut commands = commands;
                write_commands(&mut writer, &profile, &mut commands);
                tracing::info!("Command queue for {} closed", path);
            })?;

        Ok((read_handle, write_handle))
    }
}

/// Forward everything read from `reader` to the bridge until either side fails
fn pump_bytes<R: Read + ?Sized>(reader: &mut R, bridge: &BridgeHandle) -> Result<()> {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => bridge.feed(buf[..n].to_vec())?,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(BridgeError::Io(e)),
        }
    }
}

/// Encode and write queued commands; failed writes are logged and dropped
fn write_commands<W: Write + ?Sized>(
    writer: &mut W,
    profile: &HardwareProfile,
    commands: &mut mpsc::UnboundedReceiver<HardwareCommand>,
) {
    while let Some(command) = commands.blocking_recv() {
        let bytes = command.encode(profile);
        if let Err(e) = writer.write_all(&bytes).and_then(|_| writer.flush()) {
            let err = BridgeError::Transport(format!(
                "write of command {} for zone {} failed: {}",
                command.code, command.zone, e
            ));
            tracing::error!("{}", err);
        }
    }
}
