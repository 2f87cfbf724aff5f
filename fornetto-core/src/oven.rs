//! Oven-level supervisor
//!
//! Owns both zone controllers, the persisted settings, and the safety
//! contactor. Sequences preheat, bake, rest and cooldown, drives the
//! autotune stages, and latches any zone fault into the Error state with
//! the contactor de-energized.
//!
//! The supervisor is driven from the single cooperative main loop:
//! `handle_event` for user input, then `service` every iteration.
//! `service` runs the 1 Hz control tick when due, updates the SSR drivers
//! unconditionally, and gives the persistence policy a chance to commit.

use libm::fabsf;
use log::{info, warn};

use crate::clock::{elapsed_ms, Cadence};
use crate::config::{self, msg, PowerLimit, Recipe, POWER_LIMITS, RECIPES};
use crate::persist::PersistenceManager;
use crate::power;
use crate::settings::Settings;
use crate::state::{OvenState, Prompt};
use crate::traits::{SettingsStore, SwitchOutput, TemperatureProbe};
use crate::zone::ZoneController;

/// A short-lived status-line message
#[derive(Debug, Clone, Copy)]
pub(crate) struct Banner {
    pub text: &'static str,
    pub since_ms: u32,
    pub for_ms: u32,
}

/// Read-only snapshot of the core state for the display renderer and the
/// telemetry serializer.
#[derive(Debug, Clone, Copy)]
pub struct StatusView {
    pub state: OvenState,
    pub up_set_c: f32,
    pub lo_set_c: f32,
    pub up_plate_c: f32,
    pub lo_plate_c: f32,
    pub up_heater_c: f32,
    pub lo_heater_c: f32,
    pub up_duty: u8,
    pub lo_duty: u8,
    pub soak_min: f32,
    pub limit_w: i32,
    pub limit_label: &'static str,
    pub recipe_name: &'static str,
    pub bake_remaining_s: Option<u32>,
    pub up_wear: f32,
    pub lo_wear: f32,
    /// Either filament is near end of life
    pub maintenance: bool,
    pub prompt: Option<Prompt>,
    pub message: &'static str,
}

pub struct OvenSupervisor<P, O, C, S> {
    pub(crate) up: ZoneController<P, O>,
    pub(crate) lo: ZoneController<P, O>,
    pub(crate) contactor: C,
    pub(crate) store: S,
    pub(crate) persist: PersistenceManager,

    pub(crate) state: OvenState,
    pub(crate) baking: bool,
    pub(crate) prompt: Option<Prompt>,
    pub(crate) tune_stage: u8,
    pub(crate) recipe: Recipe,
    pub(crate) bake_secs: u16,

    tick_gate: Cadence,
    pub(crate) bake_start_ms: u32,
    bake_done_ms: u32,
    pub(crate) boost_start_ms: u32,
    rest_start_ms: u32,
    pub(crate) last_activity_ms: u32,
    cool_stable_start: Option<u32>,
    cool_hold_start: u32,

    pub(crate) target_up: u8,
    pub(crate) target_lo: u8,
    pub(crate) banner: Option<Banner>,
}

impl<P, O, C, S> OvenSupervisor<P, O, C, S>
where
    P: TemperatureProbe,
    O: SwitchOutput,
    C: SwitchOutput,
    S: SettingsStore,
{
    /// Build the supervisor with the contactor de-energized and the
    /// persisted settings applied. Call [`power_on`](Self::power_on) once
    /// boot (splash, boot-button hint) is done.
    pub fn new(
        up: ZoneController<P, O>,
        lo: ZoneController<P, O>,
        mut contactor: C,
        mut store: S,
        now_ms: u32,
    ) -> Self {
        contactor.set_on(false);
        let persist = PersistenceManager::load(&mut store);
        let mut oven = Self {
            up,
            lo,
            contactor,
            store,
            persist,
            state: OvenState::Idle,
            baking: false,
            prompt: None,
            tune_stage: 0,
            recipe: RECIPES[0],
            bake_secs: 0,
            tick_gate: Cadence::new(1000),
            bake_start_ms: now_ms,
            bake_done_ms: now_ms,
            boost_start_ms: now_ms,
            rest_start_ms: now_ms,
            last_activity_ms: now_ms,
            cool_stable_start: None,
            cool_hold_start: now_ms,
            target_up: 0,
            target_lo: 0,
            banner: None,
        };
        oven.apply_stored_tunings();
        oven.refresh_recipe();
        oven
    }

    /// Energize the contactor and start counting inactivity
    pub fn power_on(&mut self, now_ms: u32) {
        self.contactor.set_on(true);
        self.last_activity_ms = now_ms;
        info!("oven: powered on");
    }

    /// One main-loop iteration: control tick (1 Hz), output drive (every
    /// call), persistence commit check.
    pub fn service(&mut self, now_ms: u32) {
        self.control_tick(now_ms);
        self.drive_outputs(now_ms);
        self.persist.tick(self.state, now_ms, &mut self.store);
    }

    /// The 1 Hz control tick. Gated internally; calling more often is
    /// harmless.
    pub fn control_tick(&mut self, now_ms: u32) {
        if !self.tick_gate.due(now_ms) {
            return;
        }

        if self.state == OvenState::Tuning {
            self.tuning_tick(now_ms);
            return;
        }

        if self.state == OvenState::Idle && self.prompt.is_none() {
            self.set_state(OvenState::Preheat);
            self.up.reset(now_ms);
            self.lo.reset(now_ms);
        }

        let heating = self.state.is_heating() && self.prompt.is_none();
        let (up_target, lo_target) = if heating {
            (self.recipe.up_c, self.recipe.lo_c)
        } else {
            (0.0, 0.0)
        };

        let damaged_up = {
            let s = self.persist.settings_mut();
            self.up.tick(up_target, &mut s.up_wear, now_ms)
        };
        let damaged_lo = {
            let s = self.persist.settings_mut();
            self.lo.tick(lo_target, &mut s.lo_wear, now_ms)
        };
        if damaged_up || damaged_lo {
            self.persist.note_wear(now_ms);
        }

        let ready = fabsf(self.up.plate_c() - self.recipe.up_c) < config::READY_BAND_C
            && fabsf(self.lo.plate_c() - self.recipe.lo_c) < config::READY_BAND_C
            && self.up.soak().min(self.lo.soak()) > config::SOAK_READY_MIN;

        if !self.baking && matches!(self.state, OvenState::Preheat | OvenState::Ready) {
            self.set_state(if ready { OvenState::Ready } else { OvenState::Preheat });
            // A sharp lower-plate drop while ready means the dough just
            // went in.
            if ready && self.lo.trend() < config::BAKE_TREND_C_PER_S {
                self.start_bake(now_ms);
            }
            if elapsed_ms(now_ms, self.last_activity_ms) > config::REST_TIMEOUT_MS {
                self.set_state(OvenState::Rest);
                self.rest_start_ms = now_ms;
            }
        }

        if self.baking
            && elapsed_ms(now_ms, self.bake_start_ms) >= u32::from(self.bake_secs) * 1000
        {
            self.baking = false;
            self.set_state(OvenState::BakeDone);
            self.bake_done_ms = now_ms;
        }
        if self.state == OvenState::BakeDone
            && elapsed_ms(now_ms, self.bake_done_ms) > config::BAKE_DONE_MSG_MS
        {
            self.set_state(OvenState::Preheat);
        }

        // Cool-confirmed is a two-step debounce: both plates under the
        // line, continuously, for the stability window.
        let cooled_now = self.up.plate_c() < config::COOL_COMPLETE_C
            && self.lo.plate_c() < config::COOL_COMPLETE_C;
        if !cooled_now {
            self.cool_stable_start = None;
        } else if self.cool_stable_start.is_none() {
            self.cool_stable_start = Some(now_ms);
        }
        let cool_confirmed = matches!(
            self.cool_stable_start,
            Some(t) if elapsed_ms(now_ms, t) > config::COOL_STABLE_MS
        );

        if self.state == OvenState::Rest
            && (elapsed_ms(now_ms, self.rest_start_ms) > config::REST_TIMEOUT_MS || cool_confirmed)
        {
            self.set_state(OvenState::Cooling);
            self.cool_hold_start = now_ms;
        } else if self.state == OvenState::Cooling {
            if cool_confirmed {
                if elapsed_ms(now_ms, self.cool_hold_start) > config::COOL_OFF_DELAY_MS {
                    self.set_state(OvenState::Shutdown);
                    self.up.reset(now_ms);
                    self.lo.reset(now_ms);
                    self.cool_stable_start = None;
                    self.persist.mark_dirty(now_ms);
                }
            } else {
                // Reheated: restart the dwell once cool again.
                self.cool_hold_start = now_ms;
            }
        }

        if self.up.faults().any() || self.lo.faults().any() {
            self.trip_error(now_ms);
            return;
        }

        self.apply_power_budget(now_ms);
    }

    /// Drive both SSRs from the last allocated duties. Runs every loop
    /// iteration; the PWM resolution depends on it.
    pub fn drive_outputs(&mut self, now_ms: u32) {
        if self.state == OvenState::Error {
            self.up.drive(0, now_ms);
            self.lo.drive(0, now_ms);
            return;
        }
        let mut up_duty = self.target_up;
        let mut lo_duty = self.target_lo;
        if self.state == OvenState::Tuning {
            // Only the zone under test may heat.
            if self.tune_stage == 1 {
                lo_duty = 0;
            }
            if self.tune_stage == 3 {
                up_duty = 0;
            }
        }
        self.up.drive(up_duty, now_ms);
        self.lo.drive(lo_duty, now_ms);
    }

    fn tuning_tick(&mut self, now_ms: u32) {
        match self.tune_stage {
            0 => {
                self.up.start_tune();
                self.tune_stage = 1;
                info!("tune: upper zone session started");
            }
            1 if !self.up.is_tuning() => {
                let gains = self.up.gains();
                self.persist.settings_mut().up_gains = gains;
                self.persist.mark_dirty(now_ms);
                self.tune_stage = 2;
                info!("tune: upper gains stored");
            }
            2 => {
                self.lo.start_tune();
                self.tune_stage = 3;
                info!("tune: lower zone session started");
            }
            3 if !self.lo.is_tuning() => {
                let gains = self.lo.gains();
                self.persist.settings_mut().lo_gains = gains;
                self.persist.mark_dirty(now_ms);
                self.tune_stage = 0;
                self.set_state(OvenState::Shutdown);
                info!("tune: lower gains stored, done");
            }
            _ => {}
        }

        if self.tune_stage == 1 {
            let s = self.persist.settings_mut();
            self.up.tick(config::TUNE_TARGET_C, &mut s.up_wear, now_ms);
            let s = self.persist.settings_mut();
            self.lo.tick(0.0, &mut s.lo_wear, now_ms);
        }
        if self.tune_stage == 3 {
            let s = self.persist.settings_mut();
            self.lo.tick(config::TUNE_TARGET_C, &mut s.lo_wear, now_ms);
            let s = self.persist.settings_mut();
            self.up.tick(0.0, &mut s.up_wear, now_ms);
        }

        // The safety net stays armed while tuning.
        if self.up.faults().any() || self.lo.faults().any() {
            self.up.stop_tune();
            self.lo.stop_tune();
            self.trip_error(now_ms);
            return;
        }

        // The allocator is bypassed while tuning: targets follow the raw
        // session output; the idle zone is zeroed at the driver layer.
        self.target_up = self.up.duty();
        self.target_lo = self.lo.duty();
    }

    pub(crate) fn start_bake(&mut self, now_ms: u32) {
        self.baking = true;
        self.bake_secs = self.recipe.bake_secs;
        self.bake_start_ms = now_ms;
        self.boost_start_ms = now_ms;
        self.last_activity_ms = now_ms;
        self.set_state(OvenState::Baking);
        info!("bake: {} for {} s", self.recipe.name, self.bake_secs);
    }

    /// Latch a fault: zones reset, duties zeroed, contactor de-energized,
    /// settings flushed - all within the current tick.
    pub(crate) fn trip_error(&mut self, now_ms: u32) {
        warn!(
            "safety stop: up faults {:#04x}, lo faults {:#04x}",
            self.up.faults().bits(),
            self.lo.faults().bits()
        );
        self.set_state(OvenState::Error);
        self.up.reset(now_ms);
        self.lo.reset(now_ms);
        self.target_up = 0;
        self.target_lo = 0;
        self.contactor.set_on(false);
        self.persist.mark_dirty(now_ms);
        self.persist
            .tick(OvenState::Error, now_ms, &mut self.store);
    }

    fn apply_power_budget(&mut self, now_ms: u32) {
        let limit = self.power_limit().watts;
        let boosting =
            self.baking && elapsed_ms(now_ms, self.boost_start_ms) < config::BOOST_MS;
        let (up_duty, lo_duty) = power::allocate(self.up.duty(), self.lo.duty(), limit, boosting);
        if self.up.faults().any() || self.lo.faults().any() || self.state == OvenState::Error {
            self.target_up = 0;
            self.target_lo = 0;
        } else {
            self.target_up = up_duty;
            self.target_lo = lo_duty;
        }
    }

    pub(crate) fn set_state(&mut self, next: OvenState) {
        if next != self.state {
            info!("oven: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    pub(crate) fn apply_stored_tunings(&mut self) {
        let s = *self.persist.settings();
        self.up.set_tunings(s.up_gains.kp, s.up_gains.ki, s.up_gains.kd);
        self.lo.set_tunings(s.lo_gains.kp, s.lo_gains.ki, s.lo_gains.kd);
    }

    pub(crate) fn refresh_recipe(&mut self) {
        let idx = self.persist.settings().recipe_idx as usize % RECIPES.len();
        self.recipe = RECIPES[idx];
    }

    pub(crate) fn power_limit(&self) -> PowerLimit {
        POWER_LIMITS[self.persist.settings().limit_idx as usize % POWER_LIMITS.len()]
    }

    pub(crate) fn show_banner(&mut self, text: &'static str, now_ms: u32, for_ms: u32) {
        self.banner = Some(Banner {
            text,
            since_ms: now_ms,
            for_ms,
        });
    }

    pub fn state(&self) -> OvenState {
        self.state
    }

    pub fn is_baking(&self) -> bool {
        self.baking
    }

    pub fn prompt(&self) -> Option<Prompt> {
        self.prompt
    }

    pub fn tune_stage(&self) -> u8 {
        self.tune_stage
    }

    pub fn settings(&self) -> &Settings {
        self.persist.settings()
    }

    pub fn up(&self) -> &ZoneController<P, O> {
        &self.up
    }

    pub fn lo(&self) -> &ZoneController<P, O> {
        &self.lo
    }

    pub fn contactor(&self) -> &C {
        &self.contactor
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Snapshot for the display renderer and telemetry serializer
    pub fn view(&self, now_ms: u32) -> StatusView {
        let settings = self.persist.settings();
        let limit = self.power_limit();
        let heating = self.state.is_heating() && self.prompt.is_none();
        let (up_set, lo_set) = if self.state == OvenState::Tuning {
            (config::TUNE_TARGET_C, config::TUNE_TARGET_C)
        } else if heating {
            (self.recipe.up_c, self.recipe.lo_c)
        } else {
            (0.0, 0.0)
        };

        let bake_remaining_s = if self.state == OvenState::Baking {
            let run_ms = elapsed_ms(now_ms, self.bake_start_ms);
            Some((u32::from(self.bake_secs) * 1000).saturating_sub(run_ms) / 1000)
        } else {
            None
        };

        let message = match self.banner {
            Some(b) if elapsed_ms(now_ms, b.since_ms) < b.for_ms => b.text,
            _ => match self.state {
                OvenState::Idle => "",
                OvenState::Preheat => msg::PREHEAT,
                OvenState::Ready => self.recipe.ready_msg,
                OvenState::Baking => msg::BAKING,
                OvenState::BakeDone => msg::BAKE_DONE,
                OvenState::Rest => msg::REST,
                OvenState::Cooling => msg::COOL,
                OvenState::Shutdown => msg::DONE,
                OvenState::Error => msg::ERROR,
                OvenState::Tuning => msg::TUNING,
            },
        };

        StatusView {
            state: self.state,
            up_set_c: up_set,
            lo_set_c: lo_set,
            up_plate_c: self.up.plate_c(),
            lo_plate_c: self.lo.plate_c(),
            up_heater_c: self.up.heater_c(),
            lo_heater_c: self.lo.heater_c(),
            up_duty: self.target_up,
            lo_duty: self.target_lo,
            soak_min: self.up.soak().min(self.lo.soak()),
            limit_w: limit.watts,
            limit_label: limit.label,
            recipe_name: self.recipe.name,
            bake_remaining_s,
            up_wear: settings.up_wear,
            lo_wear: settings.lo_wear,
            maintenance: settings.up_wear < config::WEAR_MAINT_THRESHOLD
                || settings.lo_wear < config::WEAR_MAINT_THRESHOLD,
            prompt: self.prompt,
            message,
        }
    }
}
