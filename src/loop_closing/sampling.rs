//! Random index sampling for RANSAC.

use rand::Rng;

/// Draw `count` distinct integers uniformly from the inclusive range
/// `[min, max]`, without replacement.
///
/// Returns `None` if the range is empty or holds fewer than `count` values.
pub fn random_distinct_indices<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    min: usize,
    max: usize,
) -> Option<Vec<usize>> {
    if min > max {
        return None;
    }
    let range = max - min + 1;
    if count > range {
        return None;
    }

    let indices = rand::seq::index::sample(rng, range, count)
        .into_iter()
        .map(|idx| idx + min)
        .collect();
    Some(indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_indices_distinct_and_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let indices = random_distinct_indices(&mut rng, 3, 4, 9).unwrap();
            assert_eq!(indices.len(), 3);
            assert!(indices.iter().all(|&i| (4..=9).contains(&i)));
            assert_eq!(indices.iter().collect::<HashSet<_>>().len(), 3);
        }
    }

    #[test]
    fn test_whole_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut indices = random_distinct_indices(&mut rng, 3, 0, 2).unwrap();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_too_few_values() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(random_distinct_indices(&mut rng, 3, 0, 1).is_none());
        assert!(random_distinct_indices(&mut rng, 1, 5, 4).is_none());
    }
}
