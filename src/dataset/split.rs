//! Seeded train/test partition of row indices.

use crate::error::{IdsError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Shuffle `0..n` with `seed` and cut off `ceil(n * test_size)` rows for test.
/// Both partitions are non-empty.
pub fn train_test_split(n: usize, test_size: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if n < 2 {
        return Err(IdsError::Dataset(format!(
            "need at least 2 complete rows to split, got {}",
            n
        )));
    }
    if !(0.0..1.0).contains(&test_size) || test_size == 0.0 {
        return Err(IdsError::Dataset(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }

    let mut idx: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    idx.shuffle(&mut rng);

    // 10 * 0.3 is 3.0000000000000004 in f64; don't let that round up to 4
    let n_test = ((n as f64) * test_size - 1e-9).ceil() as usize;
    let n_test = n_test.clamp(1, n - 1);
    let test = idx.split_off(n - n_test);
    Ok((idx, test))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_cover_all_rows() {
        let (train, test) = train_test_split(10, 0.3, 42).unwrap();
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 7);
        let mut all: Vec<usize> = train.iter().chain(test.iter()).copied().collect();
        all.sort();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn same_seed_same_split() {
        assert_eq!(
            train_test_split(50, 0.3, 7).unwrap(),
            train_test_split(50, 0.3, 7).unwrap()
        );
    }

    #[test]
    fn tiny_inputs() {
        let (train, test) = train_test_split(2, 0.9, 1).unwrap();
        assert_eq!((train.len(), test.len()), (1, 1));
        assert!(train_test_split(1, 0.3, 1).is_err());
        assert!(train_test_split(10, 0.0, 1).is_err());
    }
}
