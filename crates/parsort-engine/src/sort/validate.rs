//! Host-side checks of read-back sort results.

use super::error::ValidationError;

/// Checks that `sorted` is non-decreasing and a permutation of `source`.
pub fn verify_sorted(source: &[u32], sorted: &[u32]) -> Result<(), ValidationError> {
    if source.len() != sorted.len() {
        return Err(ValidationError::LengthMismatch {
            expected: source.len(),
            actual: sorted.len(),
        });
    }

    if let Some(index) = sorted.windows(2).position(|w| w[0] > w[1]) {
        return Err(ValidationError::OutOfOrder {
            index,
            value: sorted[index],
            next: sorted[index + 1],
        });
    }

    let mut expected = source.to_vec();
    expected.sort_unstable();
    if expected != sorted {
        return Err(ValidationError::NotAPermutation);
    }

    Ok(())
}

/// Checks that the sorted `(key, payload)` pairs are exactly the source pairs.
pub fn verify_payload(
    source_keys: &[u32],
    source_payload: &[u32],
    sorted_keys: &[u32],
    sorted_payload: &[u32],
) -> Result<(), ValidationError> {
    if sorted_payload.len() != sorted_keys.len() {
        return Err(ValidationError::LengthMismatch {
            expected: sorted_keys.len(),
            actual: sorted_payload.len(),
        });
    }

    let mut pairs: Vec<(u32, u32)> = source_keys
        .iter()
        .copied()
        .zip(source_payload.iter().copied())
        .collect();
    pairs.sort_unstable();

    let mut seen = vec![false; pairs.len()];
    for (index, (&key, &payload)) in sorted_keys.iter().zip(sorted_payload).enumerate() {
        let first = pairs.partition_point(|&p| p < (key, payload));
        let slot = (first..pairs.len())
            .take_while(|&i| pairs[i] == (key, payload))
            .find(|&i| !seen[i]);

        match slot {
            Some(i) => seen[i] = true,
            None => return Err(ValidationError::PayloadMismatch { index, key, payload }),
        }
    }

    Ok(())
}

/// Checks that equal keys kept their source order.
///
/// Requires a payload holding each element's original index.
pub fn verify_stable(sorted_keys: &[u32], sorted_payload: &[u32]) -> Result<(), ValidationError> {
    for index in 1..sorted_keys.len().min(sorted_payload.len()) {
        let key = sorted_keys[index];
        if sorted_keys[index - 1] == key && sorted_payload[index - 1] > sorted_payload[index] {
            return Err(ValidationError::Unstable { index, key });
        }
    }
    Ok(())
}

/// Runs every applicable check on one sort result.
///
/// `source_payload` must hold original indices for the stability check to
/// be meaningful.
pub fn verify_output(
    source_keys: &[u32],
    source_payload: &[u32],
    sorted_keys: &[u32],
    sorted_payload: Option<&[u32]>,
) -> Result<(), ValidationError> {
    verify_sorted(source_keys, sorted_keys)?;

    if let Some(sorted_payload) = sorted_payload {
        let source_payload = &source_payload[..source_keys.len()];
        verify_payload(source_keys, source_payload, sorted_keys, sorted_payload)?;
        verify_stable(sorted_keys, sorted_payload)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_sorted_permutation() {
        assert_eq!(verify_sorted(&[3, 1, 2], &[1, 2, 3]), Ok(()));
        assert_eq!(verify_sorted(&[], &[]), Ok(()));
    }

    #[test]
    fn reports_first_inversion() {
        assert_eq!(
            verify_sorted(&[3, 1, 2], &[1, 3, 2]),
            Err(ValidationError::OutOfOrder { index: 1, value: 3, next: 2 })
        );
    }

    #[test]
    fn rejects_changed_multiset() {
        assert_eq!(verify_sorted(&[3, 1, 2], &[1, 1, 2]), Err(ValidationError::NotAPermutation));
        assert!(matches!(
            verify_sorted(&[1, 2], &[1]),
            Err(ValidationError::LengthMismatch { expected: 2, actual: 1 })
        ));
    }

    // ── payload ───────────────────────────────────────────────────────────

    #[test]
    fn payload_must_follow_its_key() {
        let keys = [5, 3, 5];
        let payload = [0, 1, 2];
        assert_eq!(verify_payload(&keys, &payload, &[3, 5, 5], &[1, 0, 2]), Ok(()));
        assert_eq!(
            verify_payload(&keys, &payload, &[3, 5, 5], &[0, 1, 2]),
            Err(ValidationError::PayloadMismatch { index: 0, key: 3, payload: 0 })
        );
    }

    #[test]
    fn duplicated_pair_is_rejected() {
        assert!(matches!(
            verify_payload(&[5, 5], &[0, 1], &[5, 5], &[0, 0]),
            Err(ValidationError::PayloadMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn stability_checks_equal_runs_only() {
        assert_eq!(verify_stable(&[1, 1, 2], &[4, 7, 0]), Ok(()));
        assert_eq!(
            verify_stable(&[1, 1, 2], &[7, 4, 0]),
            Err(ValidationError::Unstable { index: 1, key: 1 })
        );
    }
}
