//! User input routing
//!
//! The rotary-plus-press control arrives as three debounced events from
//! the input device. Routing depends on the open prompt and the oven
//! state: the knob cycles recipes, a short press cycles the wall-power
//! limit, and a long press is the context action (open a prompt, or clear
//! a latched error).

use log::info;

use crate::oven::OvenSupervisor;
use crate::settings::Settings;
use crate::state::{ConfirmKind, OvenState, Prompt};
use crate::traits::{SettingsStore, SwitchOutput, TemperatureProbe};

/// A debounced event from the rotary input device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputEvent {
    /// One detent, +1 clockwise / -1 counter-clockwise
    Rotate(i8),
    ShortPress,
    /// Held for at least 2 s
    LongPress,
}

impl<P, O, C, S> OvenSupervisor<P, O, C, S>
where
    P: TemperatureProbe,
    O: SwitchOutput,
    C: SwitchOutput,
    S: SettingsStore,
{
    pub fn handle_event(&mut self, event: InputEvent, now_ms: u32) {
        self.last_activity_ms = now_ms;
        match event {
            InputEvent::Rotate(dir) => self.on_rotate(dir, now_ms),
            InputEvent::ShortPress => self.on_short_press(now_ms),
            InputEvent::LongPress => self.on_long_press(now_ms),
        }
    }

    /// Open a confirmation prompt (selection starts on "no").
    ///
    /// Also the boot hook: holding the switch at power-on opens the
    /// StartTune prompt before the main loop begins.
    pub fn open_prompt(&mut self, kind: ConfirmKind) {
        self.prompt = Some(Prompt::new(kind));
    }

    fn on_rotate(&mut self, dir: i8, now_ms: u32) {
        if let Some(p) = self.prompt.as_mut() {
            p.yes = !p.yes;
            return;
        }
        if matches!(self.state, OvenState::Error | OvenState::Tuning) {
            return;
        }
        let count = crate::config::RECIPES.len() as i8;
        let s = self.persist.settings_mut();
        s.recipe_idx = (s.recipe_idx as i8 + dir).rem_euclid(count) as u8;
        self.persist.mark_dirty(now_ms);
        self.refresh_recipe();
        info!("recipe: {}", self.recipe.name);
    }

    fn on_short_press(&mut self, now_ms: u32) {
        if let Some(p) = self.prompt.take() {
            if p.yes {
                self.run_prompt_action(p.kind, now_ms);
            }
            return;
        }
        if matches!(self.state, OvenState::Error | OvenState::Tuning) {
            return;
        }
        let count = crate::config::POWER_LIMITS.len() as u8;
        let s = self.persist.settings_mut();
        s.limit_idx = (s.limit_idx + 1) % count;
        self.persist.mark_dirty(now_ms);
        info!("power limit: {}", self.power_limit().label);
    }

    fn on_long_press(&mut self, now_ms: u32) {
        match self.state {
            OvenState::Tuning => self.open_prompt(ConfirmKind::CancelTune),
            OvenState::Error => {
                // The only way out of a latched fault.
                self.set_state(OvenState::Idle);
                self.contactor.set_on(true);
                self.show_banner("System Reset", now_ms, 1000);
            }
            OvenState::Idle => self.open_prompt(ConfirmKind::FactoryReset),
            _ => {}
        }
    }

    fn run_prompt_action(&mut self, kind: ConfirmKind, now_ms: u32) {
        match kind {
            ConfirmKind::CancelTune => {
                self.up.stop_tune();
                self.lo.stop_tune();
                self.up.reset(now_ms);
                self.lo.reset(now_ms);
                self.tune_stage = 0;
                self.set_state(OvenState::Shutdown);
                self.persist.mark_dirty(now_ms);
                self.show_banner("Canceled", now_ms, 2000);
            }
            ConfirmKind::StartTune => {
                self.up.reset(now_ms);
                self.lo.reset(now_ms);
                self.tune_stage = 0;
                self.set_state(OvenState::Tuning);
                self.show_banner("Tuning Start", now_ms, 2000);
            }
            ConfirmKind::FactoryReset => {
                *self.persist.settings_mut() = Settings::default();
                self.persist.save_now(&mut self.store);
                self.apply_stored_tunings();
                self.refresh_recipe();
                self.up.reset(now_ms);
                self.lo.reset(now_ms);
                self.set_state(OvenState::Shutdown);
                self.show_banner("Factory Reset", now_ms, 2000);
            }
        }
    }
}
