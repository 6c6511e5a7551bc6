use std::collections::HashSet;

use rand::Rng;
use thiserror::Error;

/// Symbols used for page ids and hash seeds
pub const HEX_ALPHABET: &[u8] = b"0123456789abcdef";

/// Identifier space must be at least this many times larger than the requested population
pub const SPACE_SAFETY_FACTOR: u128 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdSpaceError {
    #[error("id space of {space} ids cannot hold {requested} distinct ids of length {length}")]
    Exhausted {
        requested: usize,
        length: usize,
        space: u128,
    },
}

/// Number of distinct strings of `length` symbols, saturating at `u128::MAX`
pub fn space_size(alphabet: &[u8], length: usize) -> u128 {
    let base = alphabet.len() as u128;
    let mut size: u128 = 1;
    for _ in 0..length {
        size = size.saturating_mul(base);
    }
    size
}

/// Draws one uniformly random string of `length` symbols from `alphabet`
pub fn random_id<R: Rng + ?Sized>(alphabet: &[u8], length: usize, rng: &mut R) -> String {
    (0..length)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect()
}

/// Produces `n` distinct ids by rejection sampling.
/// Ids in `taken` are never returned and count against the space.
pub fn generate<R: Rng + ?Sized>(
    n: usize,
    length: usize,
    alphabet: &[u8],
    taken: &HashSet<String>,
    rng: &mut R,
) -> Result<HashSet<String>, IdSpaceError> {
    let space = space_size(alphabet, length);
    let population = (n + taken.len()) as u128;
    if alphabet.is_empty() || space < population.saturating_mul(SPACE_SAFETY_FACTOR) {
        return Err(IdSpaceError::Exhausted {
            requested: n,
            length,
            space,
        });
    }

    let mut ids = HashSet::with_capacity(n);
    while ids.len() < n {
        let id = random_id(alphabet, length, rng);
        if !taken.contains(&id) {
            ids.insert(id);
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_generates_distinct_ids_of_fixed_length() {
        let mut rng = StdRng::seed_from_u64(7);
        let ids = generate(500, 6, HEX_ALPHABET, &HashSet::new(), &mut rng).unwrap();
        assert_eq!(ids.len(), 500);
        assert!(ids.iter().all(|id| id.len() == 6));
        assert!(ids.iter().all(|id| id.bytes().all(|b| HEX_ALPHABET.contains(&b))));
    }

    #[test]
    fn test_space_too_small() {
        let mut rng = StdRng::seed_from_u64(7);
        // 16 ids of length 1 exist, 9 * 2 > 16
        let result = generate(9, 1, HEX_ALPHABET, &HashSet::new(), &mut rng);
        assert!(matches!(result, Err(IdSpaceError::Exhausted { space: 16, .. })));
    }

    #[test]
    fn test_taken_ids_are_avoided() {
        let mut rng = StdRng::seed_from_u64(1);
        let taken: HashSet<String> = ["0", "1", "2", "3"].iter().map(|s| s.to_string()).collect();
        let ids = generate(4, 1, HEX_ALPHABET, &taken, &mut rng).unwrap();
        assert!(ids.is_disjoint(&taken));
    }

    #[test]
    fn test_zero_ids() {
        let mut rng = StdRng::seed_from_u64(1);
        let ids = generate(0, 4, HEX_ALPHABET, &HashSet::new(), &mut rng).unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_space_size_saturates() {
        assert_eq!(space_size(HEX_ALPHABET, 4), 65536);
        assert_eq!(space_size(HEX_ALPHABET, 64), u128::MAX);
    }
}
