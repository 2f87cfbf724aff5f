//! Settings write-back policy
//!
//! Non-volatile media wear out; settings changes are therefore batched
//! behind a dirty flag and committed only after an idle timeout, except in
//! Shutdown and Error where the write happens immediately. A RAM shadow of
//! the last-persisted block suppresses writes that would store identical
//! bytes. Store failures are non-fatal: writes are idempotent and the next
//! change retries.

use log::{info, warn};

use crate::clock::elapsed_ms;
use crate::config::STORE_IDLE_TIMEOUT_MS;
use crate::settings::{Settings, BLOCK_LEN};
use crate::state::OvenState;
use crate::traits::SettingsStore;

/// Wear must drift this far from its last-saved value before it alone
/// marks the block dirty.
const WEAR_SAVE_STEP: f32 = 1.0;

pub struct PersistenceManager {
    settings: Settings,
    shadow: [u8; BLOCK_LEN],
    dirty: bool,
    dirty_since_ms: u32,
    saved_up_wear: f32,
    saved_lo_wear: f32,
}

impl PersistenceManager {
    /// Load the block, or initialize the store with defaults when it is
    /// blank or carries a foreign schema.
    pub fn load<S: SettingsStore>(store: &mut S) -> Self {
        let mut raw = [0u8; BLOCK_LEN];
        let settings = match store.read_block(&mut raw) {
            Ok(()) => match Settings::decode(&raw) {
                Ok(s) => s,
                Err(e) => {
                    info!("settings block invalid ({:?}), writing defaults", e);
                    Self::write_defaults(store)
                }
            },
            Err(e) => {
                info!("settings read failed ({:?}), writing defaults", e);
                Self::write_defaults(store)
            }
        };
        Self {
            settings,
            shadow: settings.encode(),
            dirty: false,
            dirty_since_ms: 0,
            saved_up_wear: settings.up_wear,
            saved_lo_wear: settings.lo_wear,
        }
    }

    fn write_defaults<S: SettingsStore>(store: &mut S) -> Settings {
        let defaults = Settings::default();
        if let Err(e) = store.write_block(&defaults.encode()) {
            warn!("settings default write failed: {:?}", e);
        }
        defaults
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Mutable access; the caller marks the block dirty after changing it.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn mark_dirty(&mut self, now_ms: u32) {
        self.dirty = true;
        self.dirty_since_ms = now_ms;
    }

    /// Gate wear-driven dirtiness on whole-degree movement, so slow decay
    /// does not chew through store endurance.
    pub fn note_wear(&mut self, now_ms: u32) {
        let up_moved = libm::fabsf(self.settings.up_wear - self.saved_up_wear) >= WEAR_SAVE_STEP;
        let lo_moved = libm::fabsf(self.settings.lo_wear - self.saved_lo_wear) >= WEAR_SAVE_STEP;
        if up_moved || lo_moved {
            self.saved_up_wear = self.settings.up_wear;
            self.saved_lo_wear = self.settings.lo_wear;
            self.mark_dirty(now_ms);
        }
    }

    /// Commit if dirty and either the idle timeout expired or the oven is
    /// in a state that may lose power next (Shutdown, Error).
    pub fn tick<S: SettingsStore>(&mut self, state: OvenState, now_ms: u32, store: &mut S) {
        if !self.dirty {
            return;
        }
        let timeout = elapsed_ms(now_ms, self.dirty_since_ms) > STORE_IDLE_TIMEOUT_MS;
        let urgent = matches!(state, OvenState::Shutdown | OvenState::Error);
        if timeout || urgent {
            self.dirty = false;
            self.commit(store);
        }
    }

    /// Commit immediately, bypassing the dirty timer (factory reset path)
    pub fn save_now<S: SettingsStore>(&mut self, store: &mut S) {
        self.dirty = false;
        self.saved_up_wear = self.settings.up_wear;
        self.saved_lo_wear = self.settings.lo_wear;
        self.commit(store);
    }

    fn commit<S: SettingsStore>(&mut self, store: &mut S) {
        let block = self.settings.encode();
        if block == self.shadow {
            return;
        }
        match store.write_block(&block) {
            Ok(()) => self.shadow = block,
            Err(e) => warn!("settings write failed: {:?}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoreError;

    struct MemStore {
        block: Option<[u8; BLOCK_LEN]>,
        writes: usize,
    }

    impl MemStore {
        fn blank() -> Self {
            Self { block: None, writes: 0 }
        }

        fn with(settings: &Settings) -> Self {
            Self {
                block: Some(settings.encode()),
                writes: 0,
            }
        }
    }

    impl SettingsStore for MemStore {
        fn read_block(&mut self, buf: &mut [u8]) -> Result<(), StoreError> {
            match self.block {
                Some(b) => {
                    buf[..BLOCK_LEN].copy_from_slice(&b);
                    Ok(())
                }
                None => Err(StoreError::Read),
            }
        }

        fn write_block(&mut self, data: &[u8]) -> Result<(), StoreError> {
            let mut b = [0u8; BLOCK_LEN];
            b.copy_from_slice(&data[..BLOCK_LEN]);
            self.block = Some(b);
            self.writes += 1;
            Ok(())
        }
    }

    #[test]
    fn blank_store_gets_default_block() {
        let mut store = MemStore::blank();
        let mgr = PersistenceManager::load(&mut store);
        assert_eq!(store.writes, 1);
        assert_eq!(*mgr.settings(), Settings::default());
        assert_eq!(store.block.unwrap(), Settings::default().encode());
    }

    #[test]
    fn foreign_magic_gets_default_block() {
        let mut bad = Settings::default().encode();
        bad[0] = 0;
        let mut store = MemStore::blank();
        store.block = Some(bad);
        let mgr = PersistenceManager::load(&mut store);
        assert_eq!(store.writes, 1);
        assert_eq!(*mgr.settings(), Settings::default());
    }

    #[test]
    fn stored_block_roundtrips() {
        let mut s = Settings::default();
        s.recipe_idx = 1;
        s.up_wear = 73.0;
        let mut store = MemStore::with(&s);
        let mgr = PersistenceManager::load(&mut store);
        assert_eq!(store.writes, 0);
        assert_eq!(*mgr.settings(), s);
    }

    #[test]
    fn commit_waits_for_idle_timeout() {
        let mut store = MemStore::blank();
        let mut mgr = PersistenceManager::load(&mut store);
        mgr.settings_mut().limit_idx = 2;
        mgr.mark_dirty(10_000);

        mgr.tick(OvenState::Preheat, 20_000, &mut store);
        assert_eq!(store.writes, 1); // still only the init write

        mgr.tick(OvenState::Preheat, 40_100, &mut store);
        assert_eq!(store.writes, 2);
        assert_eq!(Settings::decode(&store.block.unwrap()).unwrap().limit_idx, 2);
    }

    #[test]
    fn error_state_flushes_immediately() {
        let mut store = MemStore::blank();
        let mut mgr = PersistenceManager::load(&mut store);
        mgr.settings_mut().recipe_idx = 1;
        mgr.mark_dirty(10_000);
        mgr.tick(OvenState::Error, 10_001, &mut store);
        assert_eq!(store.writes, 2);
    }

    #[test]
    fn unchanged_block_is_not_rewritten() {
        let mut store = MemStore::blank();
        let mut mgr = PersistenceManager::load(&mut store);
        // Dirty without an actual change: the shadow compare suppresses
        // the write.
        mgr.mark_dirty(10_000);
        mgr.tick(OvenState::Shutdown, 10_001, &mut store);
        assert_eq!(store.writes, 1);
    }

    #[test]
    fn wear_gate_requires_whole_degree() {
        let mut store = MemStore::blank();
        let mut mgr = PersistenceManager::load(&mut store);

        mgr.settings_mut().up_wear = 99.5;
        mgr.note_wear(1_000);
        mgr.tick(OvenState::Error, 1_001, &mut store);
        assert_eq!(store.writes, 1);

        mgr.settings_mut().up_wear = 99.0;
        mgr.note_wear(2_000);
        mgr.tick(OvenState::Error, 2_001, &mut store);
        assert_eq!(store.writes, 2);

        // The gate re-bases on the saved value.
        mgr.settings_mut().up_wear = 98.5;
        mgr.note_wear(3_000);
        mgr.tick(OvenState::Error, 3_001, &mut store);
        assert_eq!(store.writes, 2);
    }

    #[test]
    fn save_now_syncs_shadow() {
        let mut store = MemStore::blank();
        let mut mgr = PersistenceManager::load(&mut store);
        mgr.settings_mut().recipe_idx = 1;
        mgr.save_now(&mut store);
        assert_eq!(store.writes, 2);
        // A later flush with no further change writes nothing.
        mgr.mark_dirty(50_000);
        mgr.tick(OvenState::Shutdown, 50_001, &mut store);
        assert_eq!(store.writes, 2);
    }
}
