//! Per-zone heating controller
//!
//! One zone pairs a baking-stone ("plate") thermocouple with a filament
//! ("heater") thermocouple and drives a zero-cross SSR. The plate is the
//! controlled variable; the filament is monitored only for wear
//! accumulation. Control is float PID with derivative on measurement and
//! time-proportioning output over a one-second window.

pub mod tune;

use libm::fabsf;
use log::warn;

use crate::clock::elapsed_ms;
use crate::config;
use crate::traits::{ProbeError, SwitchOutput, TemperatureProbe};

use self::tune::{RelayTuner, TuneStep};

/// Output scale shared by the PID, the allocator, and the SSR driver
pub const DUTY_MAX: f32 = 255.0;

/// PID gains for one zone
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

/// Per-zone fault bits
///
/// Any set bit forces the zone's duty to zero and, at the oven level, a
/// latched transition to the Error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ZoneFaults(u8);

impl ZoneFaults {
    /// Probe rejected (NaN, negative, or beyond the physical ceiling)
    pub const SENSOR: u8 = 1 << 0;
    /// Temperature rising with zero duty for longer than the timeout
    pub const RUNAWAY: u8 = 1 << 1;
    /// Plate above the absolute ceiling
    pub const OVERHEAT: u8 = 1 << 2;

    pub const fn none() -> Self {
        Self(0)
    }

    pub fn set(&mut self, bit: u8) {
        self.0 |= bit;
    }

    pub fn clear(&mut self, bit: u8) {
        self.0 &= !bit;
    }

    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub fn any(self) -> bool {
        self.0 != 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Closed-loop controller for one heating zone.
///
/// `tick` runs at 1 Hz; `drive` runs every main-loop iteration to keep the
/// sub-second PWM resolution.
pub struct ZoneController<P, O> {
    plate_probe: P,
    heater_probe: P,
    ssr: O,
    label: &'static str,

    plate_c: f32,
    heater_c: f32,
    soak: f32,
    trend: f32,
    duty: u8,
    faults: ZoneFaults,

    gains: PidGains,
    integrator: f32,
    last_input: f32,
    out: f32,
    first_sample: bool,

    tuner: Option<RelayTuner>,

    runaway_ref_ms: u32,
    window_start_ms: u32,
    window_on_ms: u32,
    // 256 means "no duty driven yet"; any real duty differs and reloads
    // the on-time.
    last_driven: u16,
}

fn accept(reading: Result<f32, ProbeError>, ceiling_c: f32) -> Option<f32> {
    match reading {
        Ok(v) if !v.is_nan() && v >= 0.0 && v <= ceiling_c => Some(v),
        _ => None,
    }
}

impl<P: TemperatureProbe, O: SwitchOutput> ZoneController<P, O> {
    pub fn new(plate_probe: P, heater_probe: P, mut ssr: O, label: &'static str) -> Self {
        ssr.set_on(false);
        Self {
            plate_probe,
            heater_probe,
            ssr,
            label,
            plate_c: 0.0,
            heater_c: 0.0,
            soak: 0.0,
            trend: 0.0,
            duty: 0,
            faults: ZoneFaults::none(),
            gains: crate::settings::DEFAULT_GAINS,
            integrator: 0.0,
            last_input: 0.0,
            out: 0.0,
            first_sample: true,
            tuner: None,
            runaway_ref_ms: 0,
            window_start_ms: 0,
            window_on_ms: 0,
            last_driven: 256,
        }
    }

    /// Run one control cycle.
    ///
    /// Reads both probes, updates the filters and the soak estimate, runs
    /// either the PID or the active autotune session, and checks the
    /// runaway and overheat conditions. `wear` is the persisted filament
    /// life for this zone and decays in place; the return value reports
    /// whether it decayed this tick.
    pub fn tick(&mut self, target_c: f32, wear: &mut f32, now_ms: u32) -> bool {
        let plate_raw = accept(self.plate_probe.read_celsius(), config::PLATE_MAX_C);
        let heater_raw = accept(
            self.heater_probe.read_celsius(),
            config::HEATER_LIMIT_C + config::HEATER_PROBE_MARGIN_C,
        );
        let (rp, rh) = match (plate_raw, heater_raw) {
            (Some(rp), Some(rh)) => (rp, rh),
            _ => {
                if !self.faults.contains(ZoneFaults::SENSOR) {
                    warn!("{}: probe rejected, output forced off", self.label);
                }
                self.faults.set(ZoneFaults::SENSOR);
                self.duty = 0;
                self.out = 0.0;
                self.ssr.set_on(false);
                return false;
            }
        };
        self.faults.clear(ZoneFaults::SENSOR);
        self.heater_c = rh;

        if self.first_sample {
            self.plate_c = rp;
            self.last_input = rp;
            self.runaway_ref_ms = now_ms;
            self.first_sample = false;
        }

        let prev = self.plate_c;
        self.plate_c = 0.8 * self.plate_c + 0.2 * rp;
        self.trend = 0.9 * self.trend + 0.1 * (self.plate_c - prev);

        let step = 1.0 / config::STONE_THICKNESS_MM;
        if target_c > 50.0 && fabsf(target_c - self.plate_c) < config::READY_BAND_C {
            self.soak = (self.soak + step).min(100.0);
        } else {
            self.soak = (self.soak - step * 0.5).max(0.0);
        }

        let mut tune_done: Option<Option<PidGains>> = None;
        if let Some(tuner) = self.tuner.as_mut() {
            match tuner.update(self.plate_c) {
                TuneStep::Running(out) => self.out = f32::from(out),
                TuneStep::Done(gains) => tune_done = Some(Some(gains)),
                TuneStep::Failed(err) => {
                    warn!("{}: autotune failed: {:?}", self.label, err);
                    tune_done = Some(None);
                }
            }
        } else {
            let error = target_c - self.plate_c;
            self.integrator = (self.integrator + self.gains.ki * error).clamp(0.0, DUTY_MAX);

            // Derivative on the measurement, not the error, so setpoint
            // changes do not kick the output.
            let d_input = self.plate_c - self.last_input;
            let output = self.gains.kp * error + self.integrator - self.gains.kd * d_input;
            self.out = output.clamp(0.0, DUTY_MAX);
            self.last_input = self.plate_c;
        }
        if let Some(result) = tune_done {
            if let Some(gains) = result {
                self.set_tunings(gains.kp, gains.ki, gains.kd);
            }
            self.stop_tune();
        }
        self.duty = self.out as u8;

        if self.duty == 0 && self.trend > config::RUNAWAY_TREND_C_PER_S {
            if elapsed_ms(now_ms, self.runaway_ref_ms) > config::RUNAWAY_TIMEOUT_MS {
                if !self.faults.contains(ZoneFaults::RUNAWAY) {
                    warn!("{}: thermal runaway with zero duty", self.label);
                }
                self.faults.set(ZoneFaults::RUNAWAY);
            }
        } else {
            self.runaway_ref_ms = now_ms;
        }

        let limit = config::HEATER_LIMIT_C;
        let mut damaged = false;
        if self.heater_c > limit + 40.0 {
            *wear = (*wear - 0.01).max(0.0);
            damaged = true;
        } else if self.heater_c > limit + 20.0 {
            *wear = (*wear - 0.002).max(0.0);
            damaged = true;
        }

        if self.plate_c > config::PLATE_MAX_C {
            self.faults.set(ZoneFaults::OVERHEAT);
        }

        damaged
    }

    /// Time-proportional SSR drive over a one-second window.
    ///
    /// Called every main-loop iteration; the on-time is recomputed only
    /// when the commanded duty changes.
    pub fn drive(&mut self, duty: u8, now_ms: u32) {
        if u16::from(duty) != self.last_driven {
            self.window_on_ms = u32::from(duty) * 1000 / 255;
            self.last_driven = u16::from(duty);
        }
        if elapsed_ms(now_ms, self.window_start_ms) >= 1000 {
            self.window_start_ms = now_ms;
        }
        self.ssr
            .set_on(elapsed_ms(now_ms, self.window_start_ms) < self.window_on_ms);
    }

    /// Clear faults and control state; tunings and wear are untouched.
    pub fn reset(&mut self, now_ms: u32) {
        self.faults = ZoneFaults::none();
        self.duty = 0;
        self.out = 0.0;
        self.soak = 0.0;
        self.trend = 0.0;
        self.plate_c = 0.0;
        self.heater_c = 0.0;
        self.first_sample = true;
        self.integrator = 0.0;
        self.last_input = 0.0;
        self.runaway_ref_ms = now_ms;
        self.window_start_ms = now_ms;
        self.ssr.set_on(false);
    }

    /// Open a fresh autotune session; it oscillates around the plate
    /// temperature it sees on its first tick.
    ///
    /// Any prior session is released first; at most one session exists per
    /// zone.
    pub fn start_tune(&mut self) {
        self.tuner = Some(RelayTuner::new());
    }

    /// Release the session without applying gains
    pub fn stop_tune(&mut self) {
        self.tuner = None;
    }

    pub fn is_tuning(&self) -> bool {
        self.tuner.is_some()
    }

    pub fn set_tunings(&mut self, kp: f32, ki: f32, kd: f32) {
        self.gains = PidGains { kp, ki, kd };
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn plate_c(&self) -> f32 {
        self.plate_c
    }

    pub fn heater_c(&self) -> f32 {
        self.heater_c
    }

    pub fn trend(&self) -> f32 {
        self.trend
    }

    pub fn soak(&self) -> f32 {
        self.soak
    }

    pub fn duty(&self) -> u8 {
        self.duty
    }

    pub fn faults(&self) -> ZoneFaults {
        self.faults
    }

    /// Raw PID output before the power allocator
    pub fn pid_out(&self) -> f32 {
        self.out
    }

    /// SSR access for state inspection
    pub fn ssr(&self) -> &O {
        &self.ssr
    }

    #[cfg(test)]
    pub(crate) fn plate_probe_mut(&mut self) -> &mut P {
        &mut self.plate_probe
    }
}
