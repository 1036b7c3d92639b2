//! The random payload uploaded by every worker.

use bytes::Bytes;
use bytesize::ByteSize;
use rand::RngCore;

use crate::error::{BenchmarkError, Result};

/// The largest payload a benchmark may upload, 256 MiB.
pub const MAX_PAYLOAD_SIZE: u64 = 256 * 1024 * 1024;

/// Verifies that a payload of `size` bytes may be generated.
pub fn check_size(size: u64) -> Result<()> {
    if size > MAX_PAYLOAD_SIZE {
        return Err(BenchmarkError::PayloadTooLarge {
            requested: ByteSize::b(size),
            max: ByteSize::b(MAX_PAYLOAD_SIZE),
        });
    }
    Ok(())
}

/// Generates `size` random bytes.
///
/// The returned buffer is immutable and cheap to clone, so a single payload can be shared by all
/// workers of a run.
pub fn generate<R: RngCore + ?Sized>(rng: &mut R, size: u64) -> Result<Bytes> {
    check_size(size)?;

    // `check_size` bounds the size well below `usize::MAX` on all supported targets.
    let mut buf = vec![0; size as usize];
    rng.fill_bytes(&mut buf);
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[test]
    fn generates_exact_size() {
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(generate(&mut rng, 0).unwrap().len(), 0);
        assert_eq!(generate(&mut rng, 10 * 1024).unwrap().len(), 10 * 1024);
    }

    #[test]
    fn payload_is_not_zeroed() {
        let mut rng = SmallRng::seed_from_u64(0);
        let payload = generate(&mut rng, 4096).unwrap();
        assert!(payload.iter().any(|b| *b != 0));
    }

    #[test]
    fn ceiling_is_inclusive() {
        assert!(check_size(MAX_PAYLOAD_SIZE).is_ok());
        assert!(matches!(
            check_size(MAX_PAYLOAD_SIZE + 1),
            Err(BenchmarkError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn oversized_payload_is_rejected_before_allocation() {
        let mut rng = SmallRng::seed_from_u64(0);
        let err = generate(&mut rng, 300 * 1024 * 1024).unwrap_err();
        assert!(matches!(
            err,
            BenchmarkError::PayloadTooLarge {
                requested: ByteSize(314_572_800),
                max: ByteSize(MAX_PAYLOAD_SIZE),
            }
        ));
    }
}
