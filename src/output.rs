//! Output stage: native-rate sample loop, per-channel mute mask, one-pole
//! low-pass filter and the fixed-point resampler.
//!
//! One native sample pair is 24 internal cycles. The resampler subtracts a
//! precomputed ratio (native cycles per host sample, 22.10 fixed point) from
//! a running counter and, once it underflows, emits a linear blend of the
//! previous and current native pairs weighted by the fractional remainder.

use crate::chip::Ym3438;

/// Output scale applied when the low-pass filter is bypassed.
const OUTPUT_FACTOR: i32 = 11;

/// Output scale applied ahead of the low-pass filter.
const OUTPUT_FACTOR_F: i32 = 12;

/// Single-pole IIR low-pass cutoff coefficient (5894 Hz).
const FILTER_CUTOFF: f64 = 0.512331301282628;
const FILTER_CUTOFF_I: f64 = 1.0 - FILTER_CUTOFF;

/// Fractional bits of the resampler ratio.
pub(crate) const RSM_FRAC: i32 = 10;

impl Ym3438 {
    /// Generate one stereo sample pair at the host rate.
    ///
    /// Runs the pipeline for as many native samples as the rate ratio
    /// requires, draining due queued writes before every internal cycle, and
    /// returns the resampled pair.
    pub fn generate(&mut self) -> (i32, i32) {
        while self.sample_cnt >= self.rate_ratio {
            self.old_samples = self.samples;
            self.samples = [0; 2];
            for _ in 0..24 {
                // The quarter-cycle index selects which channel the analog
                // stage is holding, so the mute mask is indexed by it.
                let mute = match self.cycles >> 2 {
                    0 => self.mute[1],                                // Ch 2
                    1 => self.mute[5 + usize::from(self.dac_enable)], // Ch 6, DAC
                    2 => self.mute[3],                                // Ch 4
                    3 => self.mute[0],                                // Ch 1
                    4 => self.mute[4],                                // Ch 5
                    5 => self.mute[2],                                // Ch 3
                    _ => false,
                };
                let (mol, mor) = self.clock();
                if !mute {
                    self.samples[0] += i32::from(mol);
                    self.samples[1] += i32::from(mor);
                }
                self.drain_due_writes();
            }

            if self.output_filter {
                self.samples[0] = (f64::from(self.old_samples[0])
                    + FILTER_CUTOFF_I
                        * f64::from(self.samples[0] * OUTPUT_FACTOR_F - self.old_samples[0]))
                    as i32;
                self.samples[1] = (f64::from(self.old_samples[1])
                    + FILTER_CUTOFF_I
                        * f64::from(self.samples[1] * OUTPUT_FACTOR_F - self.old_samples[1]))
                    as i32;
            } else {
                self.samples[0] *= OUTPUT_FACTOR;
                self.samples[1] *= OUTPUT_FACTOR;
            }

            self.sample_cnt -= self.rate_ratio;
        }

        let left = blend(
            self.old_samples[0],
            self.samples[0],
            self.sample_cnt,
            self.rate_ratio,
        );
        let right = blend(
            self.old_samples[1],
            self.samples[1],
            self.sample_cnt,
            self.rate_ratio,
        );
        self.sample_cnt += 1 << RSM_FRAC;
        (left, right)
    }

    /// Generate a block of stereo samples at the host rate.
    ///
    /// Both slices are filled up to the length of the shorter one.
    pub fn generate_stream(&mut self, left: &mut [i32], right: &mut [i32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (sl, sr) = self.generate();
            *l = sl;
            *r = sr;
        }
    }

    /// Mute or unmute one channel (0..=5 the FM channels, 6 the DAC
    /// channel) without disturbing the simulation underneath.
    pub fn set_channel_mute(&mut self, channel: usize, mute: bool) {
        if channel < self.mute.len() {
            self.mute[channel] = mute;
        }
    }

    /// Whether a channel is currently muted.
    pub fn is_channel_muted(&self, channel: usize) -> bool {
        channel < self.mute.len() && self.mute[channel]
    }

    /// Enable or bypass the output low-pass filter.
    pub fn set_output_filter(&mut self, enabled: bool) {
        self.output_filter = enabled;
    }
}

/// Linear blend of two native samples by the fractional sample position.
#[inline]
fn blend(old: i32, new: i32, cnt: i32, ratio: i32) -> i32 {
    ((i64::from(old) * i64::from(ratio - cnt) + i64::from(new) * i64::from(cnt))
        / i64::from(ratio)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_blend_is_linear_interpolation() {
        // f = 0.25 between 1000 and 2000 must land on 1250.
        assert_eq!(blend(1000, 2000, 256, 1024), 1250);
        assert_eq!(blend(1000, 2000, 0, 1024), 1000);
        assert_eq!(blend(1000, 2000, 1024, 1024), 2000);
        assert_eq!(blend(-500, 500, 512, 1024), 0);
    }

    #[test]
    fn test_generate_blends_native_pairs() {
        let mut chip = Ym3438::new();
        chip.rate_ratio = 1 << RSM_FRAC;
        chip.sample_cnt = 256;
        chip.old_samples = [1000, -1000];
        chip.samples = [2000, -2000];
        let (left, right) = chip.generate();
        assert_eq!(left, 1250);
        assert_eq!(right, -1250);
        assert_eq!(chip.sample_cnt, 256 + (1 << RSM_FRAC));
    }

    #[test]
    fn test_filter_step_response() {
        // One filter step toward a silent input decays by the cutoff factor.
        let previous = 1000.0f64;
        let filtered = previous + FILTER_CUTOFF_I * (0.0 - previous);
        assert_relative_eq!(filtered, FILTER_CUTOFF * previous, max_relative = 1e-12);
    }

    #[test]
    fn test_mute_mask_bounds() {
        let mut chip = Ym3438::new();
        chip.set_channel_mute(6, true);
        assert!(chip.is_channel_muted(6));
        chip.set_channel_mute(99, true); // out of range, ignored
        assert!(!chip.is_channel_muted(99));
    }

    #[test]
    fn test_stream_fills_both_slices() {
        let mut chip = Ym3438::new();
        let mut left = [123i32; 32];
        let mut right = [123i32; 32];
        chip.generate_stream(&mut left, &mut right);
        // Nothing keyed on: the stream is silence, not the sentinel.
        assert!(left.iter().all(|&s| s == 0));
        assert!(right.iter().all(|&s| s == 0));
    }
}
