//! In-memory store for deterministic testing.
//!
//! Supports fault injection driven by a seeded RNG so that failing runs can
//! be replayed exactly:
//! - Read, write and sync errors
//! - Refused growth
//! - A hard size cap past which growth silently stops

#![allow(clippy::cast_possible_truncation)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Store, StoreError};

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of a read error (0.0 - 1.0).
    pub read_error_rate: f64,
    /// Probability of a write error (0.0 - 1.0).
    pub write_error_rate: f64,
    /// Probability of a sync error (0.0 - 1.0).
    pub sync_error_rate: f64,
    /// Probability that `allocate_more` fails (0.0 - 1.0).
    pub grow_error_rate: f64,
}

impl FaultConfig {
    /// Create a fault config with no faults (for baseline testing).
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    /// Create a fault config where every write fails.
    #[must_use]
    pub const fn failing_writes() -> Self {
        Self {
            read_error_rate: 0.0,
            write_error_rate: 1.0,
            sync_error_rate: 0.0,
            grow_error_rate: 0.0,
        }
    }

    /// Create a fault config with low fault rates (for stress testing).
    #[must_use]
    pub const fn low_faults() -> Self {
        Self {
            read_error_rate: 0.001,
            write_error_rate: 0.001,
            sync_error_rate: 0.001,
            grow_error_rate: 0.001,
        }
    }
}

/// Statistics about store operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub reads: u64,
    pub writes: u64,
    pub syncs: u64,
    /// Calls to `allocate_more`, successful or not.
    pub grows: u64,
    pub injected_read_errors: u64,
    pub injected_write_errors: u64,
    pub injected_sync_errors: u64,
    pub injected_grow_errors: u64,
}

/// A store backed by a growable byte vector.
pub struct MemoryStore {
    bytes: Vec<u8>,
    /// Growth past this size is silently refused.
    size_limit: Option<u64>,
    fault_config: FaultConfig,
    rng: StdRng,
    stats: StoreStats,
}

impl MemoryStore {
    /// Create an empty store with no faults.
    #[must_use]
    pub fn new() -> Self {
        Self::with_faults(0, FaultConfig::no_faults())
    }

    /// Create an empty store with the given fault config and RNG seed.
    #[must_use]
    pub fn with_faults(seed: u64, fault_config: FaultConfig) -> Self {
        Self {
            bytes: Vec::new(),
            size_limit: None,
            fault_config,
            rng: StdRng::seed_from_u64(seed),
            stats: StoreStats::default(),
        }
    }

    /// Cap the size the store may grow to.
    #[must_use]
    pub const fn with_size_limit(mut self, limit: u64) -> Self {
        self.size_limit = Some(limit);
        self
    }

    /// Replace the fault config, e.g. to start failing after setup.
    pub fn set_fault_config(&mut self, fault_config: FaultConfig) {
        self.fault_config = fault_config;
    }

    /// Get statistics about store operations.
    #[must_use]
    pub const fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Raw contents, for inspecting on-disk layout in tests.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable raw contents, for corrupting a store in tests.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn should_inject_fault(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < rate
    }

    fn check_bounds(&self, offset: u64, len: usize) -> Result<usize, StoreError> {
        let size = self.size();
        match offset.checked_add(len as u64) {
            Some(end) if end <= size => Ok(offset as usize),
            _ => Err(StoreError::OutOfBounds { offset, len, size }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StoreError> {
        self.stats.reads += 1;
        let start = self.check_bounds(offset, buf.len())?;

        if self.should_inject_fault(self.fault_config.read_error_rate) {
            self.stats.injected_read_errors += 1;
            return Err(StoreError::InjectedFault(
                "simulated read error".to_string(),
            ));
        }

        buf.copy_from_slice(&self.bytes[start..start + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: u64, bytes: &[u8]) -> Result<(), StoreError> {
        self.stats.writes += 1;
        let start = self.check_bounds(offset, bytes.len())?;

        if self.should_inject_fault(self.fault_config.write_error_rate) {
            self.stats.injected_write_errors += 1;
            return Err(StoreError::InjectedFault(
                "simulated write error".to_string(),
            ));
        }

        self.bytes[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn allocate_more(&mut self, new_size: u64) -> Result<u64, StoreError> {
        self.stats.grows += 1;

        if self.should_inject_fault(self.fault_config.grow_error_rate) {
            self.stats.injected_grow_errors += 1;
            return Err(StoreError::InjectedFault(
                "simulated allocation error".to_string(),
            ));
        }

        let target = self
            .size_limit
            .map_or(new_size, |limit| new_size.min(limit));
        if target > self.size() {
            self.bytes.resize(target as usize, 0);
        }
        Ok(self.size())
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        self.stats.syncs += 1;

        if self.should_inject_fault(self.fault_config.sync_error_rate) {
            self.stats.injected_sync_errors += 1;
            return Err(StoreError::InjectedFault(
                "simulated sync error".to_string(),
            ));
        }

        Ok(())
    }
}
