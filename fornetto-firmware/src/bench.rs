//! Simulated bench hardware
//!
//! Stands in for the out-of-scope collaborators: thermocouples, SSRs, the
//! mains contactor, the EEPROM, and the hardware watchdog. Each zone is a
//! two-pole thermal plant (fast filament, slow stone) driven by the SSR
//! state the core commands.

use std::cell::Cell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use log::{trace, warn};

use fornetto_core::settings::BLOCK_LEN;
use fornetto_core::traits::{
    ProbeError, SettingsStore, StoreError, SwitchOutput, TemperatureProbe, Watchdog,
};

const AMBIENT_C: f32 = 22.0;
/// Filament time constant, seconds
const FILAMENT_TAU_S: f32 = 8.0;
/// Filament-to-stone coupling time constant, seconds
const COUPLING_TAU_S: f32 = 90.0;
/// Stone-to-ambient loss time constant, seconds
const LOSS_TAU_S: f32 = 600.0;

pub struct SimProbe(Rc<Cell<f32>>);

impl TemperatureProbe for SimProbe {
    fn read_celsius(&mut self) -> Result<f32, ProbeError> {
        Ok(self.0.get())
    }
}

pub struct SimSwitch(Rc<Cell<bool>>);

impl SimSwitch {
    /// A free-standing output (the contactor)
    pub fn new() -> Self {
        Self(Rc::new(Cell::new(false)))
    }
}

impl SwitchOutput for SimSwitch {
    fn set_on(&mut self, on: bool) {
        self.0.set(on);
    }

    fn is_on(&self) -> bool {
        self.0.get()
    }
}

/// One heating zone of the plant
pub struct ZonePlant {
    plate_c: Rc<Cell<f32>>,
    filament_c: Rc<Cell<f32>>,
    ssr: Rc<Cell<bool>>,
    /// Temperature the filament approaches at full power
    filament_max_c: f32,
}

impl ZonePlant {
    fn new(filament_max_c: f32) -> Self {
        Self {
            plate_c: Rc::new(Cell::new(AMBIENT_C)),
            filament_c: Rc::new(Cell::new(AMBIENT_C)),
            ssr: Rc::new(Cell::new(false)),
            filament_max_c,
        }
    }

    pub fn plate_probe(&self) -> SimProbe {
        SimProbe(self.plate_c.clone())
    }

    pub fn heater_probe(&self) -> SimProbe {
        SimProbe(self.filament_c.clone())
    }

    pub fn ssr_switch(&self) -> SimSwitch {
        SimSwitch(self.ssr.clone())
    }

    fn step(&mut self, dt_s: f32) {
        let drive_c = if self.ssr.get() {
            self.filament_max_c
        } else {
            AMBIENT_C
        };
        let filament = self.filament_c.get();
        let filament = filament + dt_s * (drive_c - filament) / FILAMENT_TAU_S;
        self.filament_c.set(filament);

        let plate = self.plate_c.get();
        let plate = plate
            + dt_s * ((filament - plate) / COUPLING_TAU_S - (plate - AMBIENT_C) / LOSS_TAU_S);
        self.plate_c.set(plate);
    }

    /// Pull heat out of the stone (dough insertion)
    fn chill(&mut self, delta_c: f32) {
        self.plate_c.set(self.plate_c.get() - delta_c);
    }
}

/// The whole bench plant
pub struct SimPlant {
    pub up: ZonePlant,
    pub lo: ZonePlant,
}

impl SimPlant {
    pub fn new() -> Self {
        Self {
            // Maxima sit below the probe ceilings but above the wear
            // thresholds, so a long preheat visibly ages the filaments.
            up: ZonePlant::new(880.0),
            lo: ZonePlant::new(850.0),
        }
    }

    pub fn step(&mut self, dt_ms: u32) {
        let dt_s = dt_ms as f32 / 1000.0;
        self.up.step(dt_s);
        self.lo.step(dt_s);
    }

    /// A cold pizza lands on the stone. The drop is abrupt compared to a
    /// real insertion; the dip and the recovery are what the bench is
    /// after.
    pub fn drop_dough(&mut self) {
        self.lo.chill(60.0);
        self.up.chill(15.0);
    }
}

/// File-backed stand-in for the EEPROM block
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsStore for FileStore {
    fn read_block(&mut self, buf: &mut [u8]) -> Result<(), StoreError> {
        let raw = fs::read(&self.path).map_err(|_| StoreError::Read)?;
        if raw.len() < buf.len() {
            return Err(StoreError::Read);
        }
        buf.copy_from_slice(&raw[..buf.len()]);
        Ok(())
    }

    fn write_block(&mut self, data: &[u8]) -> Result<(), StoreError> {
        debug_assert_eq!(data.len(), BLOCK_LEN);
        fs::write(&self.path, data).map_err(|e| {
            warn!("settings store write to {:?} failed: {e}", self.path);
            StoreError::Write
        })
    }
}

/// Watchdog stand-in: complains when real time between pets nears the
/// 8 s hardware budget.
pub struct SimWatchdog {
    last_pet: Option<Instant>,
}

impl SimWatchdog {
    pub fn new() -> Self {
        Self { last_pet: None }
    }
}

impl Watchdog for SimWatchdog {
    fn pet(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_pet {
            let gap = now.duration_since(last);
            if gap.as_secs() >= 8 {
                warn!("watchdog would have fired: {} ms between pets", gap.as_millis());
            } else {
                trace!("watchdog pet after {} ms", gap.as_millis());
            }
        }
        self.last_pet = Some(now);
    }
}
