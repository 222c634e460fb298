use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

pub const PROTON: f64 = 1.00727646677;

#[inline]
pub fn neutral_mass(mz: f64, z: i32) -> f64 {
    (mz * z.abs() as f64) - z as f64 * PROTON
}

#[inline]
pub fn mass_charge_ratio(neutral_mass: f64, z: i32) -> f64 {
    (neutral_mass + z as f64 * PROTON) / z.abs() as f64
}

#[inline]
pub fn ppm_error(query: f64, reference: f64) -> f64 {
    (query - reference) / reference * 1e6
}

/// The reserved "not assigned" unique id value.
pub const INVALID_UNIQUE_ID: u64 = 0;

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a process-unique, non-zero 64-bit identifier.
///
/// Draws entropy from a v4 UUID and mixes in a monotone counter so that
/// identifiers minted in the same process never collide even if the
/// entropy source were to repeat.
pub fn unique_id() -> u64 {
    let (hi, lo) = Uuid::new_v4().as_u64_pair();
    let count = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let id = hi ^ lo.rotate_left(17) ^ count.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    if id == INVALID_UNIQUE_ID {
        // Zero is reserved; retry rather than hand it out.
        unique_id()
    } else {
        id
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mass_arithmetic() {
        let mz = 500.5;
        let mass = neutral_mass(mz, 2);
        assert!((mass_charge_ratio(mass, 2) - mz).abs() < 1e-9);
        let mass = neutral_mass(1001.0, 1);
        assert!((mass - (1001.0 - PROTON)).abs() < 1e-9);
    }

    #[test]
    fn test_unique_ids_distinct() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            let id = unique_id();
            assert_ne!(id, INVALID_UNIQUE_ID);
            assert!(seen.insert(id));
        }
    }
}
