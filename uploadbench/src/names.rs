//! Random container and object names.
//!
//! Names consist of a shared prefix followed by random symbols. Containers use a lowercase
//! alphabet because storage services reject uppercase container names, while object names may use
//! the full alphanumeric range. Collisions are avoided probabilistically: 25 symbols out of 62 give
//! roughly 148 bits of entropy per object name.

use rand::Rng;

/// Symbols allowed in object names.
pub const OBJECT_NAME_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Symbols allowed in container names.
pub const CONTAINER_NAME_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Number of random symbols appended to the prefix of an object name.
pub const OBJECT_NAME_ENTROPY: usize = 25;

/// Number of random symbols appended to the prefix of a container name.
pub const CONTAINER_NAME_ENTROPY: usize = 20;

/// Returns `length` symbols drawn uniformly, with replacement, from `charset`.
///
/// # Panics
///
/// Panics if `charset` is empty and `length` is not zero.
pub fn random_name<R: Rng + ?Sized>(rng: &mut R, length: usize, charset: &[u8]) -> String {
    (0..length)
        .map(|_| char::from(charset[rng.random_range(0..charset.len())]))
        .collect()
}

/// Generates the name of the benchmark container.
pub fn container_name<R: Rng + ?Sized>(rng: &mut R, prefix: &str) -> String {
    let mut name = prefix.to_owned();
    name.push_str(&random_name(rng, CONTAINER_NAME_ENTROPY, CONTAINER_NAME_CHARSET));
    name
}

/// Generates the name of a single uploaded object.
pub fn object_name<R: Rng + ?Sized>(rng: &mut R, prefix: &str) -> String {
    let mut name = prefix.to_owned();
    name.push_str(&random_name(rng, OBJECT_NAME_ENTROPY, OBJECT_NAME_CHARSET));
    name
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[test]
    fn names_have_requested_length_and_charset() {
        let mut rng = SmallRng::seed_from_u64(42);
        for length in [0, 1, 20, 25, 100] {
            for charset in [OBJECT_NAME_CHARSET, CONTAINER_NAME_CHARSET] {
                let name = random_name(&mut rng, length, charset);
                assert_eq!(name.len(), length);
                assert!(name.bytes().all(|b| charset.contains(&b)), "{name}");
            }
        }
    }

    #[test]
    fn container_names_are_lowercase() {
        let mut rng = SmallRng::seed_from_u64(7);
        let name = container_name(&mut rng, "bench");

        assert_eq!(name.len(), "bench".len() + CONTAINER_NAME_ENTROPY);
        assert!(name.starts_with("bench"));
        assert!(
            name.bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        );
    }

    #[test]
    fn same_seed_same_names() {
        let mut a = SmallRng::seed_from_u64(1);
        let mut b = SmallRng::seed_from_u64(1);
        assert_eq!(object_name(&mut a, "p"), object_name(&mut b, "p"));
        assert_eq!(container_name(&mut a, "p"), container_name(&mut b, "p"));
    }

    #[test]
    fn object_names_do_not_collide() {
        let mut rng = SmallRng::seed_from_u64(3);
        let names: HashSet<_> = (0..10_000).map(|_| object_name(&mut rng, "bench")).collect();
        assert_eq!(names.len(), 10_000);
    }
}
