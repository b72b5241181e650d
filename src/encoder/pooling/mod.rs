
/// Lower bound on the per-row token count used as the pooling divisor
pub const TOKEN_COUNT_FLOOR: f32 = 1e-9;

/// Lower bound on the vector norm used as the normalization divisor
pub const NORM_FLOOR: f32 = 1e-12;

/// Attention-weighted mean over the token axis.
///
/// `hidden` is a row-major `[batch, seq_len, hidden_size]` tensor and
/// `attention_mask` a row-major `[batch, seq_len]` matrix. Rows whose mask is
/// all zero pool to the zero vector.
#[inline]
pub fn mean_pool(
    hidden: &[f32],
    attention_mask: &[i64],
    batch: usize,
    seq_len: usize,
    hidden_size: usize,
) -> Vec<Vec<f32>> {
    debug_assert_eq!(hidden.len(), batch * seq_len * hidden_size);
    debug_assert_eq!(attention_mask.len(), batch * seq_len);

    (0..batch)
        .map(|row| {
            let mut sum = vec![0.0_f32; hidden_size];
            let mut count = 0.0_f32;

            for token in 0..seq_len {
                let weight = attention_mask[row * seq_len + token] as f32;
                if weight == 0.0 {
                    continue;
                }
                count += weight;

                let offset = (row * seq_len + token) * hidden_size;
                for (acc, value) in sum.iter_mut().zip(&hidden[offset..offset + hidden_size]) {
                    *acc += value * weight;
                }
            }

            let divisor = count.max(TOKEN_COUNT_FLOOR);
            sum.iter_mut().for_each(|value| *value /= divisor);
            sum
        })
        .collect()
}

/// Scale `vector` to unit L2 norm in place
#[inline]
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt().max(NORM_FLOOR);
    vector.iter_mut().for_each(|value| *value /= norm);
}

#[inline]
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}
