/// Byte value that represents zero amplitude in an unsigned 8-bit buffer.
pub const BYTE_MIDPOINT: f32 = 128.0;

/// Root-mean-square loudness of an unsigned 8-bit time-domain buffer.
///
/// Each byte is normalized to `(value - 128) / 128`, so the result lands in
/// `[0, 1]`. An empty or all-silent buffer measures `0.0`.
pub fn rms_u8(samples: &[u8]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum = samples
        .iter()
        .map(|&value| {
            let normalized = (value as f32 - BYTE_MIDPOINT) / BYTE_MIDPOINT;
            normalized * normalized
        })
        .sum::<f32>();
    (sum / samples.len() as f32).sqrt().clamp(0.0, 1.0)
}

/// Converts a float sample in `[-1, 1]` to the unsigned byte domain.
pub fn to_byte_sample(sample: f32) -> u8 {
    if !sample.is_finite() {
        return BYTE_MIDPOINT as u8;
    }
    let scaled = (sample.clamp(-1.0, 1.0) + 1.0) * BYTE_MIDPOINT;
    scaled.floor().clamp(0.0, 255.0) as u8
}
