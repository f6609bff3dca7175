use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Screen resolutions whose pixel counts form the default key sets.
pub const RESOLUTIONS: [(u32, u32); 3] = [(1920, 1080), (2560, 1440), (3840, 2160)];

/// Canonical unsorted input: one key array per key set and one shared payload.
///
/// The payload holds each element's original index, so a sorted payload
/// doubles as a stability witness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceData {
    key_sets: Vec<Vec<u32>>,
    payload: Vec<u32>,
}

impl SourceData {
    /// Builds source data from explicit key sets.
    pub fn from_key_sets(key_sets: Vec<Vec<u32>>) -> Self {
        let max = key_sets.iter().map(Vec::len).max().unwrap_or(0);
        Self {
            key_sets,
            payload: (0..max as u32).collect(),
        }
    }

    /// One key set per entry of [`RESOLUTIONS`], each a shuffled `0..width*height`.
    pub fn resolutions(seed: u64) -> Self {
        let sizes: Vec<u32> = RESOLUTIONS.iter().map(|&(w, h)| w * h).collect();
        Self::shuffled(&sizes, seed)
    }

    /// Key sets holding a seeded shuffle of `0..n` for every `n` in `sizes`.
    pub fn shuffled(sizes: &[u32], seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let key_sets = sizes
            .iter()
            .map(|&n| {
                let mut keys: Vec<u32> = (0..n).collect();
                keys.shuffle(&mut rng);
                keys
            })
            .collect();
        Self::from_key_sets(key_sets)
    }

    /// Key sets of uniformly random keys, duplicates included.
    pub fn random(sizes: &[u32], seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let key_sets = sizes
            .iter()
            .map(|&n| (0..n).map(|_| rng.r#gen::<u32>()).collect())
            .collect();
        Self::from_key_sets(key_sets)
    }

    #[inline]
    pub fn key_set_count(&self) -> usize {
        self.key_sets.len()
    }

    /// Keys of key set `index`. Panics when out of range.
    #[inline]
    pub fn keys(&self, index: usize) -> &[u32] {
        &self.key_sets[index]
    }

    #[inline]
    pub fn payload(&self) -> &[u32] {
        &self.payload
    }

    /// Sizes of every key set, in key set order.
    pub fn key_counts(&self) -> Vec<u32> {
        self.key_sets.iter().map(|k| k.len() as u32).collect()
    }

    pub fn max_key_count(&self) -> u32 {
        self.key_sets.iter().map(|k| k.len() as u32).max().unwrap_or(0)
    }
}
