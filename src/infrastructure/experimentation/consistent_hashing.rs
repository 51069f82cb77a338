//! Consistent hashing for in-house rollout assignment
//!
//! Ensures the same subject always lands in the same bucket for a given
//! test, across processes and restarts.

use crate::domain::experimentation::{ExperimentationTestName, SubjectId};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Consistent hasher for rollout assignments
#[derive(Debug, Clone, Copy)]
pub struct ConsistentHasher;

impl ConsistentHasher {
    /// Generate a deterministic bucket (0-99) for a subject and test
    ///
    /// FNV-1a over the subject bytes and test name; buckets must stay
    /// identical across toolchain versions, which `DefaultHasher` does not
    /// guarantee.
    pub fn hash_assignment(subject_id: &SubjectId, test_name: &ExperimentationTestName) -> u8 {
        let mut hash = FNV_OFFSET_BASIS;

        let bytes = subject_id
            .as_uuid()
            .as_bytes()
            .iter()
            .chain(b":")
            .chain(test_name.as_str().as_bytes());

        for byte in bytes {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }

        (hash % 100) as u8
    }

    /// Whether a bucket falls inside a rollout of `percent` (0-100)
    pub fn in_rollout(hash: u8, percent: u8) -> bool {
        hash < percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn name(value: &str) -> ExperimentationTestName {
        ExperimentationTestName::new(value).unwrap()
    }

    #[test]
    fn test_consistent_hash_same_input() {
        let subject = SubjectId::new();
        let hash1 = ConsistentHasher::hash_assignment(&subject, &name("exp-1"));
        let hash2 = ConsistentHasher::hash_assignment(&subject, &name("exp-1"));
        assert_eq!(hash1, hash2, "Same inputs should produce same hash");
    }

    #[test]
    fn test_hash_is_stable_for_known_subject() {
        let subject = SubjectId::from_uuid(Uuid::nil());

        // Fixed buckets: changing the hash reassigns every subject
        assert_eq!(ConsistentHasher::hash_assignment(&subject, &name("banner")), 55);
        assert_eq!(ConsistentHasher::hash_assignment(&subject, &name("new-checkout")), 4);
    }

    #[test]
    fn test_hash_distribution() {
        let mut buckets = [0u32; 10];

        for _ in 0..1000 {
            let hash = ConsistentHasher::hash_assignment(&SubjectId::new(), &name("exp-1"));
            buckets[(hash / 10) as usize] += 1;
        }

        // Each bucket should have roughly 100 items
        for count in buckets {
            assert!(count > 50, "Bucket has too few items: {}", count);
            assert!(count < 150, "Bucket has too many items: {}", count);
        }
    }

    #[test]
    fn test_in_rollout() {
        assert!(ConsistentHasher::in_rollout(0, 1));
        assert!(ConsistentHasher::in_rollout(49, 50));
        assert!(!ConsistentHasher::in_rollout(50, 50));
        assert!(!ConsistentHasher::in_rollout(0, 0));
        assert!(ConsistentHasher::in_rollout(99, 100));
    }

    #[test]
    fn test_50_50_split() {
        let mut treatment = 0;

        for _ in 0..1000 {
            let hash = ConsistentHasher::hash_assignment(&SubjectId::new(), &name("ab-test"));
            if ConsistentHasher::in_rollout(hash, 50) {
                treatment += 1;
            }
        }

        let control = 1000 - treatment;
        let diff = (control as i32 - treatment as i32).abs();
        assert!(
            diff < 150,
            "Split is too uneven: control={}, treatment={}",
            control,
            treatment
        );
    }
}
