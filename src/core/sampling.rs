// Seeded row permutations and bootstrap draws for split, fold and bag.
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::core::error::{Error, ErrorKind};

/// Uses `seed` when given, otherwise draws one from the OS.
pub fn resolve_seed(seed: Option<u64>) -> Result<u64, Error> {
    if let Some(seed) = seed {
        return Ok(seed);
    }
    let mut bytes = [0u8; 8];
    getrandom::fill(&mut bytes).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message(format!("failed to draw a random seed: {err}"))
    })?;
    Ok(u64::from_le_bytes(bytes))
}

pub fn rng(seed: u64) -> Xoshiro256PlusPlus {
    Xoshiro256PlusPlus::seed_from_u64(seed)
}

/// Row positions `0..rows`, Fisher-Yates shuffled when `shuffle` is set.
pub fn permutation(rows: usize, shuffle: bool, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..rows).collect();
    if shuffle {
        let mut rng = rng(seed);
        for i in (1..order.len()).rev() {
            let j = rng.gen_range(0..=i);
            order.swap(i, j);
        }
    }
    order
}

/// `count` positions drawn uniformly with replacement from `0..rows`.
pub fn bootstrap(rows: usize, count: usize, seed: u64) -> Vec<usize> {
    if rows == 0 {
        return Vec::new();
    }
    let mut rng = rng(seed);
    (0..count).map(|_| rng.gen_range(0..rows)).collect()
}
