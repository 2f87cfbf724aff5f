//! fornetto bench firmware
//!
//! Runs the oven control core against a simulated dual-zone thermal plant
//! with the exact cooperative main-loop discipline of the real firmware:
//! pet the watchdog, sample the clock, run the 1 Hz control tick, drive
//! the SSR outputs every iteration, refresh the display view, let the
//! persistence policy commit, and emit one telemetry line per simulated
//! second on stdout. No input device is attached to the bench; the
//! boot-time tune prompt hook stands in for the rotary control.
//!
//! Configuration is environment-only:
//!
//! - `FORNETTO_SIM_SECS`    simulated runtime (default 3600)
//! - `FORNETTO_STORE`       settings block path (default fornetto-eeprom.bin)
//! - `FORNETTO_DOUGH_AT_S`  dough-insertion time (default 1200, 0 disables)
//! - `FORNETTO_TUNE_AT_BOOT` opens the StartTune prompt before the loop,
//!   standing in for holding the switch at power-on

mod bench;

use anyhow::Context;
use log::{debug, info};

use fornetto_core::clock::Cadence;
use fornetto_core::oven::OvenSupervisor;
use fornetto_core::state::ConfirmKind;
use fornetto_core::telemetry;
use fornetto_core::traits::Watchdog;
use fornetto_core::zone::ZoneController;

use crate::bench::{FileStore, SimPlant, SimWatchdog};

/// Loop pacing: 20 iterations per simulated second keeps the sub-second
/// time-proportional SSR windows meaningful.
const STEP_MS: u32 = 50;

fn env_u32(name: &str, default: u32) -> anyhow::Result<u32> {
    match std::env::var(name) {
        Ok(v) => v
            .parse()
            .with_context(|| format!("{name} must be an integer, got {v:?}")),
        Err(_) => Ok(default),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let sim_secs = env_u32("FORNETTO_SIM_SECS", 3600)?;
    let dough_at_s = env_u32("FORNETTO_DOUGH_AT_S", 1200)?;
    let store_path =
        std::env::var("FORNETTO_STORE").unwrap_or_else(|_| "fornetto-eeprom.bin".into());
    let tune_at_boot = std::env::var("FORNETTO_TUNE_AT_BOOT").is_ok();

    let mut plant = SimPlant::new();
    let store = FileStore::new(&store_path);

    let up = ZoneController::new(
        plant.up.plate_probe(),
        plant.up.heater_probe(),
        plant.up.ssr_switch(),
        "upper",
    );
    let lo = ZoneController::new(
        plant.lo.plate_probe(),
        plant.lo.heater_probe(),
        plant.lo.ssr_switch(),
        "lower",
    );
    let contactor = bench::SimSwitch::new();

    let mut oven = OvenSupervisor::new(up, lo, contactor, store, 0);

    // Boot splash: surface the filament wear the way the panel does.
    info!(
        "heater health: up {:.1}% lo {:.1}% (store {store_path})",
        oven.settings().up_wear,
        oven.settings().lo_wear,
    );
    if tune_at_boot {
        info!("switch held at power-on: opening tune prompt");
        oven.open_prompt(ConfirmKind::StartTune);
    }
    oven.power_on(0);

    let mut watchdog = SimWatchdog::new();
    let mut telemetry_gate = Cadence::new(1000);
    let mut display_gate = Cadence::new(1000);
    let mut last_state = oven.state();
    let mut dough_dropped = dough_at_s == 0;

    let end_ms = sim_secs.saturating_mul(1000);
    let mut now_ms: u32 = 0;
    while now_ms < end_ms {
        watchdog.pet();
        now_ms += STEP_MS;
        plant.step(STEP_MS);

        if !dough_dropped && now_ms >= dough_at_s.saturating_mul(1000) {
            info!("bench: dough in");
            plant.drop_dough();
            dough_dropped = true;
        }

        oven.service(now_ms);

        let view = oven.view(now_ms);
        let refresh = display_gate.due(now_ms) || view.state != last_state;
        if refresh {
            match view.bake_remaining_s {
                Some(rem) => debug!(
                    "panel: {} {} | U{:.0} L{:.0} | Bake: {rem}s | {}",
                    view.recipe_name,
                    view.limit_label,
                    view.up_plate_c,
                    view.lo_plate_c,
                    view.message,
                ),
                None => debug!(
                    "panel: {} {} | U{:.0} L{:.0} | soak {:.0}% | {}{}",
                    view.recipe_name,
                    view.limit_label,
                    view.up_plate_c,
                    view.lo_plate_c,
                    view.soak_min,
                    view.message,
                    if view.maintenance { " !! MAINT !!" } else { "" },
                ),
            }
            last_state = view.state;
        }
        if telemetry_gate.due(now_ms) {
            println!("{}", telemetry::format_line(&view));
        }
    }

    info!("bench: simulation complete in state {:?}", oven.state());
    Ok(())
}
