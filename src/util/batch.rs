use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{Error, Result};

/// Endless mini-batch index stream over `num_samples` rows.
///
/// The first pass walks rows in their natural order. Whenever the next batch
/// would run past the end, a fresh permutation is drawn and the head resets,
/// so the leftover rows of that pass are skipped.
#[derive(Debug, Clone)]
pub struct CyclicBatches {
    indices: Vec<usize>,
    head: usize,
    batch_size: usize,
    rng: StdRng,
}

impl CyclicBatches {
    pub fn new(num_samples: usize, batch_size: usize, seed: u64) -> Result<Self> {
        if num_samples == 0 {
            return Err(Error::EmptyDataset("mini-batch source"));
        }
        if batch_size == 0 || batch_size > num_samples {
            return Err(Error::Config(format!(
                "batch size {batch_size} must be within 1..={num_samples}"
            )));
        }

        Ok(Self {
            indices: (0..num_samples).collect(),
            head: 0,
            batch_size,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn next_batch(&mut self) -> Vec<usize> {
        if self.head + self.batch_size > self.indices.len() {
            self.indices.shuffle(&mut self.rng);
            self.head = 0;
        }
        let selected = self.indices[self.head..self.head + self.batch_size].to_vec();
        self.head += self.batch_size;
        selected
    }
}

impl Iterator for CyclicBatches {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_pass_is_sequential() {
        let mut batches = CyclicBatches::new(7, 3, 0).unwrap();
        assert_eq!(batches.next_batch(), vec![0, 1, 2]);
        assert_eq!(batches.next_batch(), vec![3, 4, 5]);
    }

    #[test]
    fn exhausted_pass_reshuffles_and_drops_remainder() {
        let mut batches = CyclicBatches::new(7, 3, 0).unwrap();
        batches.next_batch();
        batches.next_batch();

        // Only one row left, so a new permutation starts.
        let third = batches.next_batch();
        assert_eq!(third.len(), 3);
        let mut seen = third.clone();
        seen.extend(batches.next_batch());
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 6, "batches within a pass never repeat rows");
    }

    #[test]
    fn same_seed_gives_same_stream() {
        let a: Vec<_> = CyclicBatches::new(10, 4, 9).unwrap().take(6).collect();
        let b: Vec<_> = CyclicBatches::new(10, 4, 9).unwrap().take(6).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_oversized_batches() {
        assert!(matches!(CyclicBatches::new(3, 4, 0), Err(Error::Config(_))));
        assert!(matches!(
            CyclicBatches::new(0, 1, 0),
            Err(Error::EmptyDataset(_))
        ));
    }
}
