use crate::error::RampError;
use crate::protocol::{CommandSender, HardwareCommand, INPUT_ON};
use crate::types::{Volume, Zone, ZoneStatus, ZONE_COUNT};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Tuning for slider-driven volume ramps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampSettings {
    /// Delay between two volume pulses
    pub step_interval: Duration,

    /// Delay before the first pulse when the zone had to be powered on
    pub power_grace: Duration,

    /// Extra pulses allowed on top of the distance, to cover volume codes the
    /// hardware skips
    pub margin: u32,

    /// Highest volume a ramp may target
    pub ceiling: Volume,
}

impl Default for RampSettings {
    fn default() -> Self {
        Self {
            step_interval: Duration::from_millis(250),
            power_grace: Duration::from_millis(250),
            margin: 6,
            ceiling: 33,
        }
    }
}

/// Map a volume the hardware never reports back onto the neighbour it does
///
/// The amplifier's feedback skips every third code, so a ramp aimed at one of
/// them would never see its target.
pub fn remap_missing_code(volume: Volume) -> Volume {
    match volume {
        4 => 3,
        7 => 6,
        10 => 9,
        13 => 12,
        16 => 15,
        19 => 18,
        22 => 21,
        25 => 24,
        28 => 27,
        31 => 30,
        34 => 33,
        38 => 37,
        41 => 40,
        44 => 43,
        47 => 46,
        other => other,
    }
}

/// Timer event asking the controller to take the next step for a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampTick {
    pub zone: Zone,
    generation: u64,
}

/// What a step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// A pulse was sent and the next step is scheduled
    Stepped(HardwareCommand),
    /// Observed volume equals the target; the job is finished
    Reached,
    /// The step budget ran out; the job is dropped
    Aborted(RampError),
    /// Power toggle sent; the first step waits out the grace period
    PoweringOn,
    /// No job, or the tick belongs to a job that has since been replaced
    Stale,
}

struct RampJob {
    target: Volume,
    remaining_steps: u32,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Per-zone step sequencer turning an absolute target into up/down pulses
///
/// Holds at most one job per zone. Steps are driven by [`RampTick`]s that a
/// spawned timer delivers on `tick_tx`; the owner feeds them back through
/// [`on_tick`](Self::on_tick) together with the zone's observed volume.
pub struct RampController {
    settings: RampSettings,
    jobs: [Option<RampJob>; ZONE_COUNT],
    next_generation: u64,
    tick_tx: mpsc::UnboundedSender<RampTick>,
    hardware: CommandSender,
}

impl RampController {
    pub fn new(
        settings: RampSettings,
        hardware: CommandSender,
        tick_tx: mpsc::UnboundedSender<RampTick>,
    ) -> Self {
        Self {
            settings,
            jobs: Default::default(),
            next_generation: 0,
            tick_tx,
            hardware,
        }
    }

    /// Whether a ramp is in progress for the zone
    pub fn is_active(&self, zone: Zone) -> bool {
        self.jobs[zone.index()].is_some()
    }

    /// Effective target for a requested volume: clamped, then remapped
    pub fn effective_target(&self, requested: Volume) -> Volume {
        remap_missing_code(requested.min(self.settings.ceiling))
    }

    /// Begin ramping `zone` toward `requested`, replacing any running job
    ///
    /// A zone that is not powered on gets a power toggle first, and the first
    /// step waits out the grace period. Otherwise the first step runs now.
    pub fn start(&mut self, zone: Zone, requested: Volume, current: ZoneStatus) -> StepOutcome {
        self.cancel(zone);

        let target = self.effective_target(requested);
        let remaining_steps = u32::from(target.abs_diff(current.volume)) + self.settings.margin;
        let generation = self.next_generation;
        self.next_generation += 1;

        tracing::debug!(
            "Zone {}: ramp to {} (requested {}) from {}, budget {}",
            zone,
            target,
            requested,
            current.volume,
            remaining_steps
        );

        let mut job = RampJob {
            target,
            remaining_steps,
            generation,
            timer: None,
        };

        if current.input != INPUT_ON {
            tracing::info!("Zone {} is off (input {}), powering on before ramp", zone, current.input);
            if let Err(e) = self.hardware.send(HardwareCommand::power(zone)) {
                tracing::error!("Zone {}: {}", zone, e);
            }
            let tick = RampTick { zone, generation };
            job.timer = Some(schedule(&self.tick_tx, tick, self.settings.power_grace));
            self.jobs[zone.index()] = Some(job);
            return StepOutcome::PoweringOn;
        }

        self.jobs[zone.index()] = Some(job);
        self.step(zone, current.volume)
    }

    /// Handle a timer event with the zone's currently observed volume
    pub fn on_tick(&mut self, tick: RampTick, current: Volume) -> StepOutcome {
        match self.jobs[tick.zone.index()].as_mut() {
            Some(job) if job.generation == tick.generation => {
                job.timer = None;
            }
            _ => {
                tracing::trace!("Zone {}: ignoring stale ramp tick", tick.zone);
                return StepOutcome::Stale;
            }
        }
        self.step(tick.zone, current)
    }

    /// Stop the zone's ramp, if any. Safe to call when idle.
    pub fn cancel(&mut self, zone: Zone) {
        if let Some(job) = self.jobs[zone.index()].take() {
            if let Some(timer) = job.timer {
                timer.abort();
            }
            tracing::debug!("Zone {}: cancelled ramp to {}", zone, job.target);
        }
    }

    fn step(&mut self, zone: Zone, current: Volume) -> StepOutcome {
        let slot = &mut self.jobs[zone.index()];
        let Some(job) = slot.as_mut() else {
            return StepOutcome::Stale;
        };

        if current == job.target {
            tracing::debug!("Zone {}: ramp reached {}", zone, job.target);
            *slot = None;
            return StepOutcome::Reached;
        }

        if job.remaining_steps == 0 {
            let err = RampError::RecursionLimitExceeded {
                zone: zone.number(),
                target: job.target,
                current,
            };
            tracing::error!("{}", err);
            *slot = None;
            return StepOutcome::Aborted(err);
        }

        let command = if job.target > current {
            HardwareCommand::volume_up(zone)
        } else {
            HardwareCommand::volume_down(zone)
        };
        job.remaining_steps -= 1;

        let tick = RampTick {
            zone,
            generation: job.generation,
        };
        job.timer = Some(schedule(&self.tick_tx, tick, self.settings.step_interval));

        if let Err(e) = self.hardware.send(command) {
            tracing::error!("Zone {}: {}", zone, e);
        }
        StepOutcome::Stepped(command)
    }
}

impl Drop for RampController {
    fn drop(&mut self) {
        for zone in Zone::all() {
            self.cancel(zone);
        }
    }
}

fn schedule(tx: &mpsc::UnboundedSender<RampTick>, tick: RampTick, delay: Duration) -> JoinHandle<()> {
    let tx = tx.clone();
    tokio::spawn(async move {
        sleep(delay).await;
        let _ = tx.send(tick);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{POWER, VOLUME_DOWN, VOLUME_UP};

    const TABLED: [Volume; 15] = [4, 7, 10, 13, 16, 19, 22, 25, 28, 31, 34, 38, 41, 44, 47];

    struct Harness {
        ramp: RampController,
        ticks: mpsc::UnboundedReceiver<RampTick>,
        sent: mpsc::UnboundedReceiver<HardwareCommand>,
    }

    fn harness() -> Harness {
        let (hw_tx, sent) = mpsc::unbounded_channel();
        let (tick_tx, ticks) = mpsc::unbounded_channel();
        Harness {
            ramp: RampController::new(RampSettings::default(), CommandSender::new(hw_tx), tick_tx),
            ticks,
            sent,
        }
    }

    fn zone(n: u8) -> Zone {
        Zone::new(n).unwrap()
    }

    fn on(volume: Volume) -> ZoneStatus {
        ZoneStatus {
            volume,
            mute: false,
            input: INPUT_ON,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<HardwareCommand>) -> Vec<u8> {
        let mut codes = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            codes.push(cmd.code);
        }
        codes
    }

    #[test]
    fn test_remap_is_idempotent() {
        for v in TABLED {
            let once = remap_missing_code(v);
            assert_ne!(once, v);
            assert_eq!(remap_missing_code(once), once);
        }
        for v in (0..=63).filter(|v| !TABLED.contains(v)) {
            assert_eq!(remap_missing_code(v), v);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_equal_to_current_emits_nothing() {
        let mut h = harness();
        let outcome = h.ramp.start(zone(1), 12, on(12));
        assert_eq!(outcome, StepOutcome::Reached);
        assert!(!h.ramp.is_active(zone(1)));
        assert!(drain(&mut h.sent).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_up_with_feedback_reaches_target() {
        let mut h = harness();
        let z = zone(2);
        let mut current: Volume = 5;

        let mut outcome = h.ramp.start(z, 20, on(current));
        let mut emitted = Vec::new();
        while let StepOutcome::Stepped(cmd) = outcome {
            emitted.push(cmd.code);
            current += 1;
            let tick = h.ticks.recv().await.unwrap();
            outcome = h.ramp.on_tick(tick, current);
        }

        assert_eq!(outcome, StepOutcome::Reached);
        assert_eq!(current, 20);
        assert!(emitted.iter().all(|&c| c == VOLUME_UP));
        assert_eq!(emitted.len(), 15);
        assert!(emitted.len() <= (20 - 5) + 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_down_from_loud_zone() {
        let mut h = harness();
        let z = zone(4);
        let mut current: Volume = 30;

        let mut outcome = h.ramp.start(z, 22, on(current));
        let mut emitted = Vec::new();
        while let StepOutcome::Stepped(cmd) = outcome {
            emitted.push(cmd.code);
            current -= 1;
            let tick = h.ticks.recv().await.unwrap();
            outcome = h.ramp.on_tick(tick, current);
        }

        assert_eq!(outcome, StepOutcome::Reached);
        // 22 is a missing code, the ramp stops at 21
        assert_eq!(current, 21);
        assert_eq!(emitted, vec![VOLUME_DOWN; 9]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_aborts() {
        let mut h = harness();
        let z = zone(3);

        // hardware never moves, so the target is structurally unreachable
        let mut outcome = h.ramp.start(z, 10, on(0));
        let mut emitted = 0;
        while let StepOutcome::Stepped(_) = outcome {
            emitted += 1;
            let tick = h.ticks.recv().await.unwrap();
            outcome = h.ramp.on_tick(tick, 0);
        }

        assert_eq!(
            outcome,
            StepOutcome::Aborted(RampError::RecursionLimitExceeded {
                zone: 3,
                target: 9,
                current: 0
            })
        );
        assert_eq!(emitted, 9 + 6);
        assert_eq!(drain(&mut h.sent).len(), 9 + 6);
        assert!(!h.ramp.is_active(z));
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_is_clamped_before_remap() {
        let h = harness();
        assert_eq!(h.ramp.effective_target(48), 33);
        assert_eq!(h.ramp.effective_target(34), 33);
        assert_eq!(h.ramp.effective_target(4), 3);
        assert_eq!(h.ramp.effective_target(20), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_powered_off_zone_gets_power_then_steps_after_grace() {
        let mut h = harness();
        let z = zone(5);
        let off = ZoneStatus::default();

        let started = tokio::time::Instant::now();
        assert_eq!(h.ramp.start(z, 6, off), StepOutcome::PoweringOn);
        assert_eq!(drain(&mut h.sent), vec![POWER]);
        assert!(h.ramp.is_active(z));

        let tick = h.ticks.recv().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert_eq!(h.ramp.on_tick(tick, 0), StepOutcome::Stepped(HardwareCommand::volume_up(z)));
        assert_eq!(drain(&mut h.sent), vec![VOLUME_UP]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_pending_timer() {
        let mut h = harness();
        let z = zone(2);

        h.ramp.start(z, 30, on(0));
        assert_eq!(drain(&mut h.sent), vec![VOLUME_UP]);

        h.ramp.cancel(z);
        h.ramp.cancel(z);
        assert!(!h.ramp.is_active(z));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(h.ticks.try_recv().is_err());
        assert!(drain(&mut h.sent).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_from_replaced_job_is_ignored() {
        let mut h = harness();
        let z = zone(1);

        h.ramp.start(z, 30, on(0));
        let old_tick = h.ticks.recv().await.unwrap();

        h.ramp.start(z, 2, on(0));
        drain(&mut h.sent);

        assert_eq!(h.ramp.on_tick(old_tick, 0), StepOutcome::Stale);
        assert!(drain(&mut h.sent).is_empty());
        assert!(h.ramp.is_active(z));
    }
}
