//! Oven-level state machine types
//!
//! The ordinal values are part of the telemetry contract (`ST:` field) and
//! must not be reordered.

/// Oven states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OvenState {
    /// Power-on resting point; leaves for Preheat once no prompt is open
    Idle = 0,
    /// Heating both plates toward the recipe targets
    Preheat = 1,
    /// Both plates in band and the stone soaked through
    Ready = 2,
    /// Dough in, bake timer running
    Baking = 3,
    /// Bake timer expired, message showing
    BakeDone = 4,
    /// No user activity; heaters off, waiting before cooldown
    Rest = 5,
    /// Heaters off, waiting for the plates to fall below the cool line
    Cooling = 6,
    /// Terminal off state
    Shutdown = 7,
    /// Latched safety fault; contactor de-energized
    Error = 8,
    /// PID autotune in progress
    Tuning = 9,
}

impl OvenState {
    /// Telemetry ordinal, in declaration order
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// States in which the zones are given the recipe targets.
    ///
    /// An open confirmation prompt also suppresses heating; that is the
    /// supervisor's call since prompts live outside this enum.
    pub fn is_heating(self) -> bool {
        !matches!(
            self,
            OvenState::Rest | OvenState::Cooling | OvenState::Shutdown | OvenState::Error
        )
    }

    pub fn is_error(self) -> bool {
        matches!(self, OvenState::Error)
    }
}

/// Actions that require a yes/no confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfirmKind {
    CancelTune,
    StartTune,
    FactoryReset,
}

/// An open confirmation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Prompt {
    pub kind: ConfirmKind,
    /// Current selection; prompts open on "no"
    pub yes: bool,
}

impl Prompt {
    pub fn new(kind: ConfirmKind) -> Self {
        Self { kind, yes: false }
    }

    pub fn title(&self) -> &'static str {
        match self.kind {
            ConfirmKind::CancelTune => "Cancel?",
            ConfirmKind::StartTune => "Tune?",
            ConfirmKind::FactoryReset => "Reset?",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_follow_declaration_order() {
        let order = [
            OvenState::Idle,
            OvenState::Preheat,
            OvenState::Ready,
            OvenState::Baking,
            OvenState::BakeDone,
            OvenState::Rest,
            OvenState::Cooling,
            OvenState::Shutdown,
            OvenState::Error,
            OvenState::Tuning,
        ];
        for (i, s) in order.iter().enumerate() {
            assert_eq!(s.ordinal(), i as u8);
        }
    }

    #[test]
    fn heating_predicate() {
        assert!(OvenState::Idle.is_heating());
        assert!(OvenState::Preheat.is_heating());
        assert!(OvenState::Ready.is_heating());
        assert!(OvenState::Baking.is_heating());
        assert!(OvenState::BakeDone.is_heating());
        assert!(OvenState::Tuning.is_heating());
        assert!(!OvenState::Rest.is_heating());
        assert!(!OvenState::Cooling.is_heating());
        assert!(!OvenState::Shutdown.is_heating());
        assert!(!OvenState::Error.is_heating());
        assert!(OvenState::Error.is_error());
        assert!(!OvenState::Idle.is_error());
    }

    #[test]
    fn prompts_default_to_no() {
        let p = Prompt::new(ConfirmKind::FactoryReset);
        assert!(!p.yes);
        assert_eq!(p.title(), "Reset?");
    }
}
