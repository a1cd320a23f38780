//! External collaborator boundaries (spec §3 "External collaborators", §6):
//! the options container, the plugin registry, and the allocator handle are
//! all owned by a host application in the full system this crate is one
//! engine inside of. This module defines the trait boundary each one plugs
//! into and a minimal concrete implementation of each, so the codec is
//! directly usable in tests, examples, and single-binary callers without a
//! real registry.

use std::collections::HashMap;

use crate::encoder::Strategy;
use crate::error::{DeflateError, DeflateResult};

/// A typed key/value source the codec queries for its tunables (spec §6
/// "Options"). Implementations may back this with a config file, a registry
/// lookup, or (as here) a plain in-memory map — the codec only ever reads
/// through this trait, never a concrete container type.
pub trait OptionsSource {
    fn get_int(&self, key: &str) -> Option<i64>;
    fn get_uint(&self, key: &str) -> Option<u64>;
    fn get_str(&self, key: &str) -> Option<&str>;
}

/// In-memory `OptionsSource` with the documented defaults (spec §6), usable
/// standalone without a real registry.
#[derive(Debug, Clone)]
pub struct DeflateOptions {
    ints: HashMap<String, i64>,
    uints: HashMap<String, u64>,
    strs: HashMap<String, String>,
}

impl Default for DeflateOptions {
    fn default() -> Self {
        let mut uints = HashMap::new();
        uints.insert("deflate.window_bits".to_string(), 15);
        uints.insert("limits.max_output_bytes".to_string(), 0);
        uints.insert("limits.max_memory_bytes".to_string(), 0);
        uints.insert("limits.max_window_bytes".to_string(), 0);
        uints.insert("limits.max_expansion_ratio".to_string(), 0);

        let mut ints = HashMap::new();
        ints.insert("deflate.level".to_string(), 6);

        let mut strs = HashMap::new();
        strs.insert("deflate.strategy".to_string(), "default".to_string());

        Self { ints, uints, strs }
    }
}

impl DeflateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: i64) -> Self {
        self.ints.insert("deflate.level".to_string(), level);
        self
    }

    pub fn with_window_bits(mut self, window_bits: u64) -> Self {
        self.uints.insert("deflate.window_bits".to_string(), window_bits);
        self
    }

    pub fn with_strategy(mut self, strategy: &str) -> Self {
        self.strs.insert("deflate.strategy".to_string(), strategy.to_string());
        self
    }

    pub fn with_uint(mut self, key: &str, value: u64) -> Self {
        self.uints.insert(key.to_string(), value);
        self
    }

    /// Reads `deflate.level` clamped to `0..=9` (spec §6).
    pub fn level(&self) -> DeflateResult<u8> {
        let v = self.get_int("deflate.level").unwrap_or(6);
        if !(0..=9).contains(&v) {
            return Err(DeflateError::InvalidArgument("deflate.level out of range 0..9"));
        }
        Ok(v as u8)
    }

    /// Reads `deflate.window_bits` in `8..=15` (spec §6).
    pub fn window_bits(&self) -> DeflateResult<u8> {
        let v = self.get_uint("deflate.window_bits").unwrap_or(15);
        if !(8..=15).contains(&v) {
            return Err(DeflateError::InvalidArgument("deflate.window_bits out of range 8..15"));
        }
        Ok(v as u8)
    }

    /// Reads `deflate.strategy`, falling back to `Default` on anything
    /// unrecognized (spec §6: "Unknown strings silently fall back").
    pub fn strategy(&self) -> Strategy {
        Strategy::from_option_str(self.get_str("deflate.strategy").unwrap_or("default"))
    }

    pub fn max_output_bytes(&self) -> u64 {
        self.get_uint("limits.max_output_bytes").unwrap_or(0)
    }

    pub fn max_expansion_ratio(&self) -> f64 {
        self.get_uint("limits.max_expansion_ratio").unwrap_or(0) as f64
    }

    pub fn max_memory_bytes(&self) -> u64 {
        self.get_uint("limits.max_memory_bytes").unwrap_or(0)
    }

    pub fn max_window_bytes(&self) -> u64 {
        self.get_uint("limits.max_window_bytes").unwrap_or(0)
    }
}

impl OptionsSource for DeflateOptions {
    fn get_int(&self, key: &str) -> Option<i64> {
        self.ints.get(key).copied()
    }

    fn get_uint(&self, key: &str) -> Option<u64> {
        self.uints.get(key).copied()
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.strs.get(key).map(String::as_str)
    }
}

/// A handle through which the codec could be looked up and driven by a host
/// plugin registry (spec §3 "External collaborators", §6 `create_encoder`/
/// `create_decoder`). This crate exposes the boundary only: a real registry
/// would resolve codec names to factories and manage handle lifetimes; nothing
/// here is required for the codec itself to function standalone.
pub trait Registry {
    type Handle;

    fn create_encoder(&self, options: &dyn OptionsSource) -> DeflateResult<Self::Handle>;
    fn create_decoder(&self, options: &dyn OptionsSource) -> DeflateResult<Self::Handle>;
    fn destroy(&self, handle: Self::Handle);
}

/// Memory accounting boundary (spec §5 "resource model", §6 memory limits):
/// every allocation the codec performs over its lifetime should be charged
/// against a budget supplied by the host, so a single decoder/encoder
/// instance can be capped independent of the process-wide allocator.
pub trait AllocatorHandle {
    fn alloc(&mut self, bytes: usize) -> DeflateResult<()>;
    fn free(&mut self, bytes: usize);
    fn budget(&self) -> u64;
    fn used(&self) -> u64;
}

/// A trivial `AllocatorHandle` that delegates to the process allocator and
/// just tracks a running total against an optional budget (`0` = unlimited),
/// sufficient to exercise the memory-limit bookkeeping without a real
/// allocator-handle implementation.
#[derive(Debug, Clone)]
pub struct GlobalAllocator {
    budget: u64,
    used: u64,
}

impl GlobalAllocator {
    pub fn new(budget: u64) -> Self {
        Self { budget, used: 0 }
    }
}

impl AllocatorHandle for GlobalAllocator {
    fn alloc(&mut self, bytes: usize) -> DeflateResult<()> {
        let requested = self.used + bytes as u64;
        if self.budget != 0 && requested > self.budget {
            return Err(DeflateError::Memory {
                requested: requested as usize,
                budget: self.budget as usize,
            });
        }
        self.used = requested;
        Ok(())
    }

    fn free(&mut self, bytes: usize) {
        self.used = self.used.saturating_sub(bytes as u64);
    }

    fn budget(&self) -> u64 {
        self.budget
    }

    fn used(&self) -> u64 {
        self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let opts = DeflateOptions::default();
        assert_eq!(opts.level().unwrap(), 6);
        assert_eq!(opts.window_bits().unwrap(), 15);
        assert_eq!(opts.strategy(), Strategy::Default);
        assert_eq!(opts.max_output_bytes(), 0);
    }

    #[test]
    fn unknown_strategy_falls_back_to_default() {
        let opts = DeflateOptions::new().with_strategy("bogus");
        assert_eq!(opts.strategy(), Strategy::Default);
    }

    #[test]
    fn out_of_range_level_is_invalid_argument() {
        let opts = DeflateOptions::new().with_level(42);
        assert!(matches!(opts.level(), Err(DeflateError::InvalidArgument(_))));
    }

    #[test]
    fn global_allocator_enforces_budget() {
        let mut alloc = GlobalAllocator::new(100);
        assert!(alloc.alloc(50).is_ok());
        assert!(alloc.alloc(60).is_err());
        alloc.free(50);
        assert!(alloc.alloc(60).is_ok());
    }

    #[test]
    fn zero_budget_means_unlimited() {
        let mut alloc = GlobalAllocator::new(0);
        assert!(alloc.alloc(usize::MAX / 2).is_ok());
    }
}
