//! Low-frequency oscillator shared by all channels.
//!
//! An 8-bit divider compares against one of eight fixed period masks; every
//! expiry bumps the phase counter. The AM value is a triangle fold of the
//! counter and the PM value its raw top bits, both forced to zero while the
//! LFO is disabled (the enable is applied as an AND mask over the counter).

use crate::chip::Ym3438;
use crate::tables::LFO_CYCLES;

impl Ym3438 {
    /// Advance the LFO divider and phase counter by one cycle.
    pub(crate) fn update_lfo(&mut self) {
        if self.lfo_quotient & LFO_CYCLES[self.lfo_freq as usize]
            == LFO_CYCLES[self.lfo_freq as usize]
        {
            self.lfo_quotient = 0;
            self.lfo_cnt = self.lfo_cnt.wrapping_add(1);
        } else {
            self.lfo_quotient = self.lfo_quotient.wrapping_add(self.lfo_inc);
        }
        self.lfo_cnt &= self.lfo_en;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_lfo_holds_counter_at_zero() {
        let mut chip = Ym3438::new();
        chip.lfo_cnt = 0x25;
        chip.lfo_en = 0;
        chip.update_lfo();
        assert_eq!(chip.lfo_cnt, 0);
    }

    #[test]
    fn test_enabled_lfo_advances() {
        let mut chip = Ym3438::new();
        chip.lfo_en = 0x7f;
        chip.lfo_freq = 7; // fastest: period mask 5
        chip.lfo_inc = 1;
        let start = chip.lfo_cnt;
        for _ in 0..64 {
            chip.update_lfo();
        }
        assert_ne!(chip.lfo_cnt, start);
    }

    #[test]
    fn test_am_is_triangle_pm_is_sawtooth() {
        let mut chip = Ym3438::new();
        // Rising half: counter below 0x40 folds through XOR.
        chip.lfo_cnt = 0x10;
        chip.cycles = 0;
        chip.clock();
        assert_eq!(chip.lfo_pm, 0x10 >> 2);
        assert_eq!(chip.lfo_am, (0x10 ^ 0x3f) << 1);
    }
}
