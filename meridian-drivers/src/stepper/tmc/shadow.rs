//! Register shadow cache
//!
//! Remembers the last value written to each register so unchanged writes
//! can be skipped. A register is only recorded once its write succeeded.

use heapless::FnvIndexMap;

/// Number of registers a driver may shadow
pub const SHADOW_CAPACITY: usize = 16;

/// Last written value per register address
#[derive(Debug, Default)]
pub struct RegisterShadow {
    values: FnvIndexMap<u8, u32, SHADOW_CAPACITY>,
}

impl RegisterShadow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value written to `register`
    pub fn get(&self, register: u8) -> Option<u32> {
        self.values.get(&register).copied()
    }

    /// A write of `value` would change the register
    pub fn is_stale(&self, register: u8, value: u32) -> bool {
        self.get(register) != Some(value)
    }

    /// Record a completed write
    ///
    /// Returns false if the cache is full, in which case the register is
    /// simply written every time.
    pub fn record(&mut self, register: u8, value: u32) -> bool {
        self.values.insert(register, value).is_ok()
    }

    /// Forget one register, forcing its next write
    pub fn invalidate(&mut self, register: u8) {
        self.values.remove(&register);
    }

    /// Forget everything, e.g. after the chip lost power
    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_register_is_stale() {
        let shadow = RegisterShadow::new();
        assert!(shadow.is_stale(0x10, 0));
        assert_eq!(shadow.get(0x10), None);
    }

    #[test]
    fn test_record_and_compare() {
        let mut shadow = RegisterShadow::new();
        assert!(shadow.record(0x6C, 0x1001_0045));
        assert!(!shadow.is_stale(0x6C, 0x1001_0045));
        assert!(shadow.is_stale(0x6C, 0x1401_0045));

        assert!(shadow.record(0x6C, 0x1401_0045));
        assert_eq!(shadow.get(0x6C), Some(0x1401_0045));
        assert_eq!(shadow.len(), 1);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let mut shadow = RegisterShadow::new();
        shadow.record(0x00, 1);
        shadow.record(0x10, 2);

        shadow.invalidate(0x00);
        assert!(shadow.is_stale(0x00, 1));
        assert!(!shadow.is_stale(0x10, 2));

        shadow.clear();
        assert!(shadow.is_empty());
    }

    #[test]
    fn test_full_cache_rejects_new_registers() {
        let mut shadow = RegisterShadow::new();
        for register in 0..SHADOW_CAPACITY as u8 {
            assert!(shadow.record(register, 0));
        }
        assert!(!shadow.record(0x70, 0));
        assert!(shadow.is_stale(0x70, 0));
        // Existing entries can still be updated
        assert!(shadow.record(0, 5));
    }
}
