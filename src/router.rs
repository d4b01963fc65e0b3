use crate::error::CommandError;
use crate::protocol::{CommandSender, HardwareCommand, MAX_COMMAND};
use crate::ramp::RampController;
use crate::store::StatusStore;
use crate::types::{Volume, Zone};

/// Highest volume a slider request may ask for
pub const MAX_SLIDER_VOLUME: Volume = 48;

/// Message received from a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    Text(String),
    Binary(Vec<u8>),
}

/// A validated subscriber request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// `command:zone` - send a zone pad command as-is
    Direct { command: u8, zone: Zone },

    /// `_:zone:volume` - ramp the zone toward a volume
    Slider { zone: Zone, volume: Volume },
}

impl Request {
    /// Parse the colon-delimited request grammar
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let malformed = || CommandError::Malformed(text.to_string());
        let fields: Vec<&str> = text.split(':').collect();

        match fields.as_slice() {
            [command, zone] => {
                let command = parse_field(command)
                    .filter(|&c| c <= MAX_COMMAND)
                    .ok_or_else(malformed)?;
                let zone = parse_zone(zone).ok_or_else(malformed)?;
                Ok(Self::Direct { command, zone })
            }
            [_, zone, volume] => {
                let zone = parse_zone(zone).ok_or_else(malformed)?;
                let volume = parse_field(volume)
                    .filter(|&v| v <= MAX_SLIDER_VOLUME)
                    .ok_or_else(malformed)?;
                Ok(Self::Slider { zone, volume })
            }
            _ => Err(malformed()),
        }
    }

    /// Zone addressed by either request shape
    pub fn zone(&self) -> Zone {
        match self {
            Self::Direct { zone, .. } | Self::Slider { zone, .. } => *zone,
        }
    }
}

fn parse_field(field: &str) -> Option<u8> {
    field.trim().parse::<u8>().ok()
}

fn parse_zone(field: &str) -> Option<Zone> {
    parse_field(field).and_then(Zone::new)
}

/// Validates subscriber requests and turns them into hardware activity
pub struct CommandRouter {
    hardware: CommandSender,
}

impl CommandRouter {
    pub fn new(hardware: CommandSender) -> Self {
        Self { hardware }
    }

    /// Dispatch one subscriber message
    ///
    /// Any ramp running on the addressed zone is cancelled before anything is
    /// sent, so a stale step can never follow the new command.
    pub fn handle(
        &self,
        message: &ClientRequest,
        store: &StatusStore,
        ramps: &mut RampController,
    ) -> Result<Request, CommandError> {
        let ClientRequest::Text(text) = message else {
            return Err(CommandError::UnsupportedEncoding);
        };
        let request = Request::parse(text)?;
        ramps.cancel(request.zone());

        match request {
            Request::Direct { command, zone } => {
                if let Err(e) = self.hardware.send(HardwareCommand::new(zone, command)) {
                    tracing::error!("Zone {}: {}", zone, e);
                }
            }
            Request::Slider { zone, volume } => {
                // start() replaces the job itself; the cancel above has already run
                ramps.start(zone, volume, store.zone(zone));
            }
        }

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{HardwareCommand, INPUT_ON, VOLUME_UP};
    use crate::ramp::{RampSettings, RampTick};
    use crate::types::ZoneStatus;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    fn zone(n: u8) -> Zone {
        Zone::new(n).unwrap()
    }

    struct Harness {
        router: CommandRouter,
        store: StatusStore,
        ramps: RampController,
        sent: mpsc::UnboundedReceiver<HardwareCommand>,
        _ticks: mpsc::UnboundedReceiver<RampTick>,
    }

    fn harness() -> Harness {
        let (hw_tx, sent) = mpsc::unbounded_channel();
        let (tick_tx, ticks) = mpsc::unbounded_channel();
        let hardware = CommandSender::new(hw_tx);
        let mut store = StatusStore::default();
        store.apply(
            [ZoneStatus {
                volume: 10,
                mute: false,
                input: INPUT_ON,
            }; 6],
            Instant::now(),
        );
        Harness {
            router: CommandRouter::new(hardware.clone()),
            store,
            ramps: RampController::new(RampSettings::default(), hardware, tick_tx),
            sent,
            _ticks: ticks,
        }
    }

    fn text(s: &str) -> ClientRequest {
        ClientRequest::Text(s.to_string())
    }

    #[test]
    fn test_parse_grammar() {
        assert_eq!(
            Request::parse("5:3"),
            Ok(Request::Direct {
                command: 5,
                zone: zone(3)
            })
        );
        assert_eq!(
            Request::parse("x:2:48"),
            Ok(Request::Slider {
                zone: zone(2),
                volume: 48
            })
        );
        assert_eq!(
            Request::parse("0:6:4"),
            Ok(Request::Slider {
                zone: zone(6),
                volume: 4
            })
        );
        assert_eq!(Request::parse("63:4").unwrap().zone(), zone(4));
        assert_eq!(Request::parse(" 1 : 5 : 12 ").unwrap().zone(), zone(5));
    }

    #[test]
    fn test_parse_rejects_out_of_range_and_bad_shapes() {
        for bad in [
            "64:1", "5:0", "5:7", "-1:2", "abc:2", "5:3:99", "5:0:10", "5:3:-4", "5", "",
            "1:2:3:4", "5:3:",
        ] {
            assert_eq!(
                Request::parse(bad),
                Err(CommandError::Malformed(bad.to_string())),
                "{bad:?} should be rejected"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_command_goes_out_verbatim_and_cancels_ramp() {
        let mut h = harness();
        h.router.handle(&text("_:3:30"), &h.store, &mut h.ramps).unwrap();
        assert!(h.ramps.is_active(zone(3)));
        while h.sent.try_recv().is_ok() {}

        h.router.handle(&text("5:3"), &h.store, &mut h.ramps).unwrap();
        assert!(!h.ramps.is_active(zone(3)));
        assert_eq!(h.sent.try_recv().unwrap(), HardwareCommand::new(zone(3), 5));
        assert!(h.sent.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slider_starts_ramp_from_observed_volume() {
        let mut h = harness();
        let request = h.router.handle(&text("5:3:4"), &h.store, &mut h.ramps).unwrap();
        assert_eq!(
            request,
            Request::Slider {
                zone: zone(3),
                volume: 4
            }
        );
        // 4 remaps to 3; zone is at 10 so the first pulse is down
        assert_eq!(h.sent.try_recv().unwrap(), HardwareCommand::volume_down(zone(3)));
        assert!(h.ramps.is_active(zone(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_requests_touch_nothing() {
        let mut h = harness();
        h.router.handle(&text("_:2:20"), &h.store, &mut h.ramps).unwrap();
        assert_eq!(h.sent.try_recv().unwrap().code, VOLUME_UP);

        assert_eq!(
            h.router.handle(&text("5:2:99"), &h.store, &mut h.ramps),
            Err(CommandError::Malformed("5:2:99".to_string()))
        );
        assert_eq!(
            h.router.handle(&ClientRequest::Binary(vec![1, 2]), &h.store, &mut h.ramps),
            Err(CommandError::UnsupportedEncoding)
        );
        assert!(h.ramps.is_active(zone(2)));
        assert!(h.sent.try_recv().is_err());
    }
}
