//! The fixed-size token grid and its length normalization contract.
//!
//! Every token sequence crossing the model boundary is exactly
//! [`GRID_LEN`] elements long; shorter sequences are right-padded with
//! class 0 and longer ones truncated at the moment of entry. The 21x21
//! matrix shape exists only at the I/O boundary.

/// Side length of the output grid.
pub const GRID_SIDE: usize = 21;

/// Flat length of the output grid (21 * 21).
pub const GRID_LEN: usize = GRID_SIDE * GRID_SIDE;

/// Normalize a token sequence to exactly [`GRID_LEN`] elements.
///
/// Right-pads with 0 or truncates to the first [`GRID_LEN`] tokens.
#[must_use]
pub fn normalize_tokens(tokens: &[u32]) -> Vec<u32> {
    let mut out = tokens.to_vec();
    out.truncate(GRID_LEN);
    out.resize(GRID_LEN, 0);
    out
}

/// Reshape a normalized token sequence into [`GRID_SIDE`] rows.
#[must_use]
pub fn to_matrix(tokens: &[u32]) -> Vec<Vec<u32>> {
    debug_assert_eq!(tokens.len(), GRID_LEN);
    tokens.chunks(GRID_SIDE).map(<[u32]>::to_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_sequences_are_right_padded() {
        let out = normalize_tokens(&[1, 2, 1]);
        assert_eq!(out.len(), GRID_LEN);
        assert_eq!(&out[..3], &[1, 2, 1]);
        assert!(out[3..].iter().all(|&t| t == 0));
    }

    #[test]
    fn long_sequences_are_truncated() {
        let long: Vec<u32> = (0..500).map(|i| i % 3).collect();
        let out = normalize_tokens(&long);
        assert_eq!(out.len(), GRID_LEN);
        assert_eq!(out, long[..GRID_LEN].to_vec());
    }

    #[test]
    fn exact_length_is_untouched() {
        let exact: Vec<u32> = (0..GRID_LEN as u32).map(|i| i % 3).collect();
        assert_eq!(normalize_tokens(&exact), exact);
    }

    #[test]
    fn empty_sequence_becomes_all_zero() {
        let out = normalize_tokens(&[]);
        assert_eq!(out, vec![0u32; GRID_LEN]);
    }

    #[test]
    fn matrix_has_grid_shape() {
        let rows = to_matrix(&vec![2u32; GRID_LEN]);
        assert_eq!(rows.len(), GRID_SIDE);
        assert!(rows.iter().all(|r| r.len() == GRID_SIDE));
    }
}
