/// Runs the puzzle hash chain: `d = seed`, then `iterations` times
/// `d = hex(md5("{d}_{i}"))` with `i` counting from zero.
pub fn iterate_digest(seed: &str, iterations: u64) -> String {
    let mut digest = seed.to_owned();
    for i in 0..iterations {
        digest = format!("{:x}", md5::compute(format!("{}_{}", digest, i)));
    }
    digest
}

/// Page id a CPU seed resolves to: the first `id_length` characters of the final digest
pub fn cpu_target(seed: &str, iterations: u64, id_length: usize) -> String {
    iterate_digest(seed, iterations).chars().take(id_length).collect()
}

/// Character a core seed resolves to: the first character of the final digest
pub fn core_target(seed: &str, iterations: u64) -> Option<char> {
    iterate_digest(seed, iterations).chars().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(iterate_digest("abc123", 3), "b197d198fbe3beb9efa54a9e17350af1");
        assert_eq!(iterate_digest("abc123", 1), "855036969c8b26336d1df7d65f5edae8");
        assert_eq!(iterate_digest("", 1), "a764b4bf13a360c7ac2a35ec4ca96c95");
        assert_eq!(iterate_digest("seed", 5), "4296eaf0b597f37b79c268c53e9eaa8e");
    }

    #[test]
    fn test_zero_iterations_is_identity() {
        assert_eq!(iterate_digest("abc123", 0), "abc123");
        assert_eq!(core_target("", 0), None);
    }

    #[test]
    fn test_targets() {
        assert_eq!(core_target("abc123", 3), Some('b'));
        assert_eq!(cpu_target("abc123", 3, 6), "b197d1");
        assert_eq!(cpu_target("abc123", 3, 64).len(), 32);
    }

    #[test]
    fn test_deterministic() {
        let first = iterate_digest("0123456789abcdef", 250);
        let second = iterate_digest("0123456789abcdef", 250);
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
    }
}
