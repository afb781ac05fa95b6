// ============================================================================
// Volume stage
// ============================================================================

/// Scale one sample, rounding and saturating to the 16-bit range
pub fn scale_sample(sample: i16, volume: f32) -> i16 {
    super::saturate_i16(sample as f64 * volume as f64)
}

/// Scale interleaved samples in place.
///
/// Applied to every chunk before any other stage; values that would leave
/// the 16-bit range are clamped rather than wrapped.
pub fn apply_volume(samples: &mut [i16], volume: f32) {
    if volume == 1.0 {
        return;
    }
    for sample in samples.iter_mut() {
        *sample = scale_sample(*sample, volume);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unity_volume_is_identity() {
        let original = vec![i16::MIN, -1234, -1, 0, 1, 1234, i16::MAX];
        let mut samples = original.clone();
        apply_volume(&mut samples, 1.0);
        assert_eq!(samples, original);
    }

    #[test]
    fn test_half_volume() {
        let mut samples = vec![100, -100, 100, -100];
        apply_volume(&mut samples, 0.5);
        assert_eq!(samples, vec![50, -50, 50, -50]);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(scale_sample(3, 0.5), 2);
        assert_eq!(scale_sample(-3, 0.5), -2);
        assert_eq!(scale_sample(10, 0.26), 3);
    }

    #[test]
    fn test_boost_saturates_instead_of_wrapping() {
        let mut samples = vec![30000, -30000, 100];
        apply_volume(&mut samples, 2.0);
        assert_eq!(samples, vec![i16::MAX, i16::MIN, 200]);
    }

    #[test]
    fn test_mute() {
        let mut samples = vec![i16::MAX, i16::MIN, 7];
        apply_volume(&mut samples, 0.0);
        assert_eq!(samples, vec![0, 0, 0]);
    }
}
