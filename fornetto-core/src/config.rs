//! Compile-time configuration
//!
//! Single source of truth for the hardware constants, the built-in recipe
//! table, and the selectable wall-power limits. The oven has no runtime
//! configuration surface beyond the persisted settings block.

/// Upper element rating in watts
pub const RATED_UP_W: i32 = 850;
/// Lower element rating in watts
pub const RATED_LO_W: i32 = 570;

/// Baking-stone thickness, used by the soak estimator
pub const STONE_THICKNESS_MM: f32 = 4.0;

/// Absolute plate ceiling; above this the oven latches a fault
pub const PLATE_MAX_C: f32 = 650.0;
/// Filament damage limit; wear accumulates above this
pub const HEATER_LIMIT_C: f32 = 820.0;
/// Extra headroom accepted from the filament probe before the reading is
/// treated as a sensor fault
pub const HEATER_PROBE_MARGIN_C: f32 = 100.0;
/// Both plates below this count as "cool"
pub const COOL_COMPLETE_C: f32 = 100.0;

/// Plate must be within this band of the target for ready/soak purposes
pub const READY_BAND_C: f32 = 5.0;
/// Minimum soak (both zones) before the stone counts as heated through
pub const SOAK_READY_MIN: f32 = 95.0;
/// A lower-plate trend below this while Ready means dough went in
pub const BAKE_TREND_C_PER_S: f32 = -2.0;
/// A trend above this with zero duty suggests a shorted SSR
pub const RUNAWAY_TREND_C_PER_S: f32 = 1.5;
/// Either wear below this surfaces the maintenance banner
pub const WEAR_MAINT_THRESHOLD: f32 = 20.0;

/// Autotune oscillates the plate around this target
pub const TUNE_TARGET_C: f32 = 350.0;

/// Sustained runaway trend required before the fault latches
pub const RUNAWAY_TIMEOUT_MS: u32 = 30_000;
/// No user activity for this long sends the oven to Rest
pub const REST_TIMEOUT_MS: u32 = 30 * 60 * 1000;
/// Dirty settings are committed after this much idle time
pub const STORE_IDLE_TIMEOUT_MS: u32 = 30_000;
/// Lower-zone power bias window at the start of a bake
pub const BOOST_MS: u32 = 30_000;
/// How long the bake-done message is shown before returning to Preheat
pub const BAKE_DONE_MSG_MS: u32 = 3_000;
/// Both plates must stay cool this long before cooling is confirmed
pub const COOL_STABLE_MS: u32 = 2_000;
/// Confirmed-cool dwell in Cooling before shutdown
pub const COOL_OFF_DELAY_MS: u32 = 3_000;

/// A baking program
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Recipe {
    pub name: &'static str,
    /// Upper plate target (°C)
    pub up_c: f32,
    /// Lower plate target (°C)
    pub lo_c: f32,
    /// Shown when both plates are ready
    pub ready_msg: &'static str,
    /// Nominal bake duration
    pub bake_secs: u16,
}

/// Built-in recipes, cycled with the rotary knob
pub const RECIPES: [Recipe; 2] = [
    Recipe {
        name: "Napoli",
        up_c: 500.0,
        lo_c: 430.0,
        ready_msg: "Pizza Time",
        bake_secs: 90,
    },
    Recipe {
        name: "Romana",
        up_c: 330.0,
        lo_c: 310.0,
        ready_msg: "Crispy Romana",
        bake_secs: 180,
    },
];

/// A selectable circuit-breaker budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PowerLimit {
    pub label: &'static str,
    pub watts: i32,
}

/// Wall-power budgets, cycled with a short press
pub const POWER_LIMITS: [PowerLimit; 3] = [
    PowerLimit { label: "1.4kW", watts: 1420 },
    PowerLimit { label: "1.0kW", watts: 1000 },
    PowerLimit { label: "0.7kW", watts: 700 },
];

/// Status-line messages
pub mod msg {
    pub const PREHEAT: &str = "Soaking...";
    pub const BAKING: &str = "Baking...";
    pub const BAKE_DONE: &str = "Buon appetito!";
    pub const REST: &str = "I'll be back";
    pub const COOL: &str = "I'll be cool";
    pub const DONE: &str = "Well done. Ciao!";
    pub const ERROR: &str = "Safety Stop";
    pub const TUNING: &str = "Auto Tuning...";
}
