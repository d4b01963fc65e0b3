use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur while running the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// WebSocket error on a subscriber connection
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Serial port could not be opened or cloned
    #[error("Serial error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration parsed but is not usable
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// The bridge event loop has shut down
    #[error("Bridge closed")]
    BridgeClosed,

    /// Hardware write failed; the command is dropped, not retried
    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Ramp(#[from] RampError),
}

/// A frame from the hardware link that was discarded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Header immediately followed by another header
    #[error("empty frame")]
    Truncated,

    /// Footer byte is neither the status nor the log footer
    #[error("unknown footer 0x{footer:02X} after {len} payload bytes")]
    UnknownFooter { footer: u8, len: usize },

    /// Status footer with a payload of the wrong size
    #[error("status payload is {actual} bytes, expected {expected}")]
    BadLength { expected: usize, actual: usize },

    /// No terminator seen within the maximum frame length
    #[error("no frame terminator within {limit} bytes")]
    Oversized { limit: usize },
}

/// A subscriber request that was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("malformed command: {0:?}")]
    Malformed(String),

    #[error("unsupported message encoding")]
    UnsupportedEncoding,
}

/// A volume ramp that stopped before reaching its target
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RampError {
    /// Step budget exhausted; the zone is left at its last observed volume
    #[error("zone {zone}: hit the step limit trying to reach volume {target} (at {current})")]
    RecursionLimitExceeded { zone: u8, target: u8, current: u8 },
}
