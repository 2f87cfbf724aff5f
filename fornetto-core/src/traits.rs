//! Hardware abstraction traits
//!
//! The thermocouple front-end, the SSR/contactor outputs, the non-volatile
//! settings store, and the hardware watchdog are external collaborators.
//! The core only sees these seams.

/// Errors that can occur when sampling a temperature probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProbeError {
    /// Thermocouple disconnected (open circuit)
    OpenCircuit,
    /// Bus or conversion failure
    BusFault,
}

/// A single thermocouple channel.
///
/// A returned `Ok` value is the raw reading in degrees Celsius and may
/// still be NaN or outside the physical range of the probe; the zone
/// controller performs its own plausibility checks.
pub trait TemperatureProbe {
    fn read_celsius(&mut self) -> Result<f32, ProbeError>;
}

/// A digital on/off power output.
///
/// Used for the zero-cross SSRs (driven under time-proportional
/// modulation) and for the mains-isolating contactor (HIGH = energized).
pub trait SwitchOutput {
    /// Assert or de-assert the output
    fn set_on(&mut self, on: bool);

    /// Current commanded level
    fn is_on(&self) -> bool;
}

/// Errors from the non-volatile settings store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// Read failed or returned short data
    Read,
    /// Write failed
    Write,
}

/// Non-volatile storage for the settings block.
///
/// The block always lives at offset 0 and is read and written whole.
/// Implementations handle the medium (EEPROM, flash page, file).
pub trait SettingsStore {
    /// Fill `buf` with the stored block starting at offset 0
    fn read_block(&mut self, buf: &mut [u8]) -> Result<(), StoreError>;

    /// Overwrite the stored block starting at offset 0
    fn write_block(&mut self, data: &[u8]) -> Result<(), StoreError>;
}

/// Hardware watchdog.
///
/// Pet once per main-loop iteration; the 8 s hardware timeout is the
/// backstop for a stalled loop.
pub trait Watchdog {
    fn pet(&mut self);
}
