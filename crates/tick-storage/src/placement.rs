//! Redundant placement across storage locations.
//!
//! Each write picks a fresh uniform-random subset of the configured locations.
//! No placement table is kept: the reader finds copies by scanning every
//! location, so it never needs to know where a given batch went.

use rand::seq::SliceRandom;
use rand::Rng;
use std::path::PathBuf;

/// Number of locations a write with `redundancy` receives out of `available`.
pub fn replica_count(redundancy: i32, available: usize) -> usize {
    if redundancy <= 0 {
        0
    } else {
        (redundancy as usize).min(available)
    }
}

/// Choose `min(redundancy, locations.len())` distinct locations at random.
///
/// Returns an empty selection when `redundancy <= 0`.
pub fn select_locations<'a, R: Rng + ?Sized>(
    locations: &'a [PathBuf],
    redundancy: i32,
    rng: &mut R,
) -> Vec<&'a PathBuf> {
    let count = replica_count(redundancy, locations.len());
    locations.choose_multiple(rng, count).collect()
}
