use crate::decoder::{DecodedEvent, FrameDecoder};
use crate::error::{BridgeError, CommandError, Result};
use crate::hub::BroadcastHub;
use crate::protocol::{CommandSender, HardwareProfile};
use crate::ramp::{RampController, RampSettings, RampTick, StepOutcome};
use crate::router::{ClientRequest, CommandRouter, Request};
use crate::store::{StatusStore, DEFAULT_WATCHDOG_WINDOW};
use crate::subscription::Subscription;
use crate::types::SystemStatus;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

/// Snapshot republished on this period even when nothing changed
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Timing knobs for the event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Silence after which the amplifier is considered off
    pub watchdog_window: Duration,

    pub heartbeat_interval: Duration,

    pub ramp: RampSettings,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            watchdog_window: DEFAULT_WATCHDOG_WINDOW,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            ramp: RampSettings::default(),
        }
    }
}

enum BridgeEvent {
    Bytes(Vec<u8>),
    Request {
        request: ClientRequest,
        reply: Option<oneshot::Sender<std::result::Result<Request, CommandError>>>,
    },
    Subscribe(oneshot::Sender<Subscription>),
    Unsubscribe(Uuid),
    Status(oneshot::Sender<SystemStatus>),
}

/// Cloneable entry point into a running [`Bridge`]
///
/// The loop stops once every handle has been dropped.
#[derive(Clone)]
pub struct BridgeHandle {
    tx: mpsc::UnboundedSender<BridgeEvent>,
}

impl BridgeHandle {
    fn send(&self, event: BridgeEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| BridgeError::BridgeClosed)
    }

    /// Hand raw bytes from the hardware link to the decoder
    pub fn feed(&self, bytes: Vec<u8>) -> Result<()> {
        self.send(BridgeEvent::Bytes(bytes))
    }

    /// Submit a subscriber request without waiting for the verdict
    ///
    /// Rejections are logged by the loop.
    pub fn submit(&self, request: ClientRequest) -> Result<()> {
        self.send(BridgeEvent::Request {
            request,
            reply: None,
        })
    }

    /// Submit a subscriber request and wait until it has been dispatched
    pub async fn request(&self, request: ClientRequest) -> Result<Request> {
        let (tx, rx) = oneshot::channel();
        self.send(BridgeEvent::Request {
            request,
            reply: Some(tx),
        })?;
        let verdict = rx.await.map_err(|_| BridgeError::BridgeClosed)?;
        Ok(verdict?)
    }

    /// Join the broadcast; the first message is the current snapshot
    pub async fn subscribe(&self) -> Result<Subscription> {
        let (tx, rx) = oneshot::channel();
        self.send(BridgeEvent::Subscribe(tx))?;
        rx.await.map_err(|_| BridgeError::BridgeClosed)
    }

    pub fn unsubscribe(&self, id: Uuid) -> Result<()> {
        self.send(BridgeEvent::Unsubscribe(id))
    }

    /// Current reconciled snapshot
    pub async fn status(&self) -> Result<SystemStatus> {
        let (tx, rx) = oneshot::channel();
        self.send(BridgeEvent::Status(tx))?;
        rx.await.map_err(|_| BridgeError::BridgeClosed)
    }
}

/// Event loop owning every piece of mutable state
///
/// Hardware bytes, subscriber requests, ramp timers and the periodic checks
/// are all serialized through [`run`](Self::run), so a zone's ramp can never
/// be touched by two operations at once.
pub struct Bridge {
    settings: BridgeSettings,
    decoder: FrameDecoder,
    store: StatusStore,
    ramps: RampController,
    router: CommandRouter,
    hub: BroadcastHub,
    events: mpsc::UnboundedReceiver<BridgeEvent>,
    ticks: mpsc::UnboundedReceiver<RampTick>,
}

impl Bridge {
    /// Build the loop; outbound hardware commands are queued on `hardware`
    ///
    /// The profile is validated here, so a bad layout is rejected before the
    /// loop can ever index past a status payload.
    pub fn new(
        profile: HardwareProfile,
        settings: BridgeSettings,
        hardware: CommandSender,
    ) -> Result<(Self, BridgeHandle)> {
        let decoder = FrameDecoder::new(profile)?;
        let (tx, events) = mpsc::unbounded_channel();
        let (tick_tx, ticks) = mpsc::unbounded_channel();

        let bridge = Self {
            settings,
            decoder,
            store: StatusStore::new(settings.watchdog_window),
            ramps: RampController::new(settings.ramp, hardware.clone(), tick_tx),
            router: CommandRouter::new(hardware),
            hub: BroadcastHub::new(),
            events,
            ticks,
        };
        Ok((bridge, BridgeHandle { tx }))
    }

    /// Spawn the loop on the current runtime
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        let start = Instant::now();
        let mut presence = interval_at(
            start + self.settings.watchdog_window,
            self.settings.watchdog_window,
        );
        presence.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat = interval_at(
            start + self.settings.heartbeat_interval,
            self.settings.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Bridge running");
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                Some(tick) = self.ticks.recv() => self.handle_tick(tick),
                _ = presence.tick() => {
                    if self.store.check_presence(Instant::now()) {
                        self.hub.publish(&self.store.status());
                    }
                }
                _ = heartbeat.tick() => {
                    let delivered = self.hub.publish(&self.store.status());
                    tracing::trace!("Heartbeat sent to {} subscriber(s)", delivered);
                }
            }
        }
        tracing::info!("All handles dropped, bridge stopped");
    }

    fn handle_event(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::Bytes(bytes) => self.handle_bytes(&bytes),
            BridgeEvent::Request { request, reply } => {
                let verdict = self.router.handle(&request, &self.store, &mut self.ramps);
                match &verdict {
                    Ok(parsed) => tracing::debug!("Dispatched {:?}", parsed),
                    Err(e) => tracing::warn!("Rejected subscriber request: {}", e),
                }
                if let Some(reply) = reply {
                    let _ = reply.send(verdict);
                }
            }
            BridgeEvent::Subscribe(reply) => {
                let subscription = self.hub.join(&self.store.status());
                if let Err(subscription) = reply.send(subscription) {
                    self.hub.leave(subscription.id());
                }
            }
            BridgeEvent::Unsubscribe(id) => self.hub.leave(id),
            BridgeEvent::Status(reply) => {
                let _ = reply.send(self.store.status());
            }
        }
    }

    fn handle_bytes(&mut self, bytes: &[u8]) {
        for event in self.decoder.feed(bytes) {
            match event {
                DecodedEvent::Status(zones) => {
                    let (status, changed) = self.store.apply(zones, Instant::now());
                    if changed {
                        tracing::debug!("Status changed: {:?}", status.to_message());
                        self.hub.publish(&status);
                    }
                }
                DecodedEvent::Log(text) => tracing::info!("Link: {}", text),
                DecodedEvent::Error(e) => tracing::warn!("Discarded frame: {}", e),
            }
        }
    }

    fn handle_tick(&mut self, tick: RampTick) {
        let current = self.store.zone(tick.zone).volume;
        if let StepOutcome::Stepped(command) = self.ramps.on_tick(tick, current) {
            tracing::trace!("Zone {}: ramp step {}", tick.zone, command.code);
        }
    }
}
