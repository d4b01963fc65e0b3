use crate::error::{BridgeError, ProtocolError, Result};
use crate::protocol::HardwareProfile;
use crate::types::{ZoneSnapshot, ZoneStatus, ZONE_COUNT};

/// One unit of meaning recovered from the hardware byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    /// Status frame with the per-zone fields unpacked
    Status(ZoneSnapshot),

    /// Diagnostic text emitted by the link firmware
    Log(String),

    /// Frame that was discarded
    Error(ProtocolError),
}

/// Continuous scanner that splits the serial byte stream into frames
///
/// Frames start with the profile's 4-byte header. Payload length is not
/// carried on the wire, so a frame ends either at a status footer sitting
/// exactly after a full status payload, or at the next header. A log frame
/// is therefore only reported once the following header has arrived.
pub struct FrameDecoder {
    profile: HardwareProfile,
    buf: Vec<u8>,
    in_frame: bool,
}

impl FrameDecoder {
    /// Fails with [`BridgeError::InvalidConfig`] when the profile's zone
    /// layout does not fit inside a status payload
    pub fn new(profile: HardwareProfile) -> Result<Self> {
        profile.validate().map_err(BridgeError::InvalidConfig)?;
        Ok(Self {
            profile,
            buf: Vec::new(),
            in_frame: false,
        })
    }

    /// Consume a chunk of bytes and return every frame it completed
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<DecodedEvent> {
        self.buf.extend_from_slice(bytes);

        let mut events = Vec::new();
        loop {
            if !self.in_frame && !self.seek_header() {
                break;
            }
            match self.next_frame() {
                Some(event) => events.push(event),
                None => break,
            }
        }
        events
    }

    /// Drop bytes up to and including the next header.
    ///
    /// Returns false when no complete header is buffered; the tail that could
    /// still be the start of one is kept.
    fn seek_header(&mut self) -> bool {
        match self.find_header() {
            Some(pos) => {
                self.buf.drain(..pos + self.profile.header.len());
                self.in_frame = true;
                true
            }
            None => {
                let keep = self.profile.header.len() - 1;
                if self.buf.len() > keep {
                    let skipped = self.buf.len() - keep;
                    self.buf.drain(..skipped);
                }
                false
            }
        }
    }

    fn next_frame(&mut self) -> Option<DecodedEvent> {
        let status_len = self.profile.status_len();
        let next_header = self.find_header();

        // A header inside the status window means the frame was cut short
        if let Some(end) = next_header.filter(|&end| end <= status_len) {
            return Some(self.take_frame(end));
        }

        if self.buf.len() > status_len && self.buf[status_len] == self.profile.status_footer {
            let frame: Vec<u8> = self.buf.drain(..=status_len).collect();
            self.in_frame = false;
            return Some(DecodedEvent::Status(self.decode_status(&frame[..status_len])));
        }

        if let Some(end) = next_header {
            return Some(self.take_frame(end));
        }

        let limit = self.profile.max_frame_len;
        if self.buf.len() >= limit {
            let keep = self.profile.header.len() - 1;
            let dropped = self.buf.len() - keep;
            self.buf.drain(..dropped);
            self.in_frame = false;
            return Some(DecodedEvent::Error(ProtocolError::Oversized { limit }));
        }

        None
    }

    /// Remove `buf[..end]` as one frame, leaving the following header in place
    fn take_frame(&mut self, end: usize) -> DecodedEvent {
        let frame: Vec<u8> = self.buf.drain(..end).collect();
        self.in_frame = false;
        self.classify(&frame)
    }

    fn classify(&self, frame: &[u8]) -> DecodedEvent {
        let Some((&footer, payload)) = frame.split_last() else {
            return DecodedEvent::Error(ProtocolError::Truncated);
        };

        if footer == self.profile.status_footer {
            let expected = self.profile.status_len();
            if payload.len() == expected {
                DecodedEvent::Status(self.decode_status(payload))
            } else {
                DecodedEvent::Error(ProtocolError::BadLength {
                    expected,
                    actual: payload.len(),
                })
            }
        } else if footer == self.profile.log_footer {
            DecodedEvent::Log(String::from_utf8_lossy(payload).into_owned())
        } else {
            DecodedEvent::Error(ProtocolError::UnknownFooter {
                footer,
                len: payload.len(),
            })
        }
    }

    fn decode_status(&self, payload: &[u8]) -> ZoneSnapshot {
        let p = &self.profile;
        let mut zones = [ZoneStatus::default(); ZONE_COUNT];
        for (i, zone) in zones.iter_mut().enumerate() {
            let base = i * p.zone_stride;
            let flags = payload[base + p.flags_offset];
            let raw_volume = payload[base + p.volume_offset];
            *zone = ZoneStatus {
                volume: p.volume_transform.apply(raw_volume, p.volume_mask),
                mute: flags & p.mute_mask != 0,
                input: flags & p.input_mask,
            };
        }
        zones
    }

    fn find_header(&self) -> Option<usize> {
        let header = &self.profile.header;
        self.buf.windows(header.len()).position(|w| w == header)
    }
}
