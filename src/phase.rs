//! Phase generator: per-slot increment computation and 20-bit accumulation.

use crate::chip::Ym3438;
use crate::tables::{PG_DETUNE, PG_LFO_SH1, PG_LFO_SH2};

impl Ym3438 {
    /// Compute the phase increment for the slot on the current cycle.
    ///
    /// The staged F-number is widened, vibrato is applied as two table-driven
    /// shifts of its high bits, detune is added or subtracted from the key
    /// code, and the result is scaled by the operator multiple. Everything is
    /// masked, never clamped - the wraparound is the hardware's pitch
    /// behaviour.
    pub(crate) fn update_phase_increment(&mut self) {
        let channel = self.channel() as usize;
        let slot = self.cycles as usize;
        let mut fnum = u32::from(self.pg_fnum);
        let fnum_h = fnum >> 4;
        let lfo = self.lfo_pm;
        let mut lfo_l = lfo & 0x0f;
        let pms = self.pms[channel] as usize;
        let dt = self.dt[slot];
        let dt_l = dt & 0x03;
        let mut detune: u8 = 0;
        let mut kcode = self.pg_kcode;

        fnum <<= 1;
        // Apply LFO
        if lfo_l & 0x08 != 0 {
            lfo_l ^= 0x0f;
        }
        let mut fm = (fnum_h >> PG_LFO_SH1[pms][lfo_l as usize])
            + (fnum_h >> PG_LFO_SH2[pms][lfo_l as usize]);
        if pms > 5 {
            fm <<= pms - 5;
        }
        fm >>= 2;
        if lfo & 0x10 != 0 {
            fnum = fnum.wrapping_sub(fm);
        } else {
            fnum += fm;
        }
        fnum &= 0xfff;

        let mut basefreq = (fnum << self.pg_block) >> 2;

        // Apply detune
        if dt_l != 0 {
            if kcode > 0x1c {
                kcode = 0x1c;
            }
            let block = kcode >> 2;
            let note = kcode & 0x03;
            let sum = block + 9 + (u8::from(dt_l == 3) | (dt_l & 0x02));
            let sum_h = sum >> 1;
            let sum_l = sum & 0x01;
            detune = (PG_DETUNE[((sum_l << 2) | note) as usize] >> (9 - sum_h)) as u8;
        }
        if dt & 0x04 != 0 {
            basefreq = basefreq.wrapping_sub(u32::from(detune));
        } else {
            basefreq += u32::from(detune);
        }
        basefreq &= 0x1ffff;

        self.pg_inc[slot] = (basefreq * u32::from(self.multi[slot])) >> 1;
        self.pg_inc[slot] &= 0xfffff;
    }

    /// Step the phase accumulators for the slots in the reset/step stages.
    ///
    /// The increment is masked two cycles before the step consumes it; the
    /// accumulator itself only resets on a key-on transition (or the phase
    /// reset test bit) and otherwise wraps mod 2^20.
    pub(crate) fn advance_phase(&mut self) {
        // Mask increment
        let slot = ((self.cycles + 20) % 24) as usize;
        if self.pg_reset[slot] {
            self.pg_inc[slot] = 0;
        }
        // Phase step
        let slot = ((self.cycles + 19) % 24) as usize;
        if self.pg_reset[slot] || self.mode_test_21[3] != 0 {
            self.pg_phase[slot] = 0;
        }
        self.pg_phase[slot] = (self.pg_phase[slot] + self.pg_inc[slot]) & 0xfffff;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_accumulator_wraps_at_2_pow_20() {
        let mut chip = Ym3438::new();
        // Slot 0 is stepped on the cycle where (cycles + 19) % 24 == 0.
        chip.cycles = 5;
        chip.pg_phase[0] = 0xfffff;
        chip.pg_inc[0] = 3;
        chip.advance_phase();
        assert_eq!(chip.pg_phase[0], 2); // wrapped, not clamped
    }

    #[test]
    fn test_key_on_reset_zeroes_phase() {
        let mut chip = Ym3438::new();
        chip.cycles = 5;
        chip.pg_phase[0] = 0x12345;
        chip.pg_reset[0] = true;
        chip.pg_inc[0] = 7;
        chip.advance_phase();
        // Increment was masked on the earlier stage only for slot
        // (cycles + 20) % 24; the step stage still adds the live increment
        // after zeroing the accumulator.
        assert_eq!(chip.pg_phase[0], 7);
    }

    #[test]
    fn test_increment_scales_with_multiple() {
        let mut chip = Ym3438::new();
        chip.pg_fnum = 0x269;
        chip.pg_block = 4;
        chip.pg_kcode = 4 << 2;
        chip.cycles = 0;
        chip.multi[0] = 1;
        chip.update_phase_increment();
        let base = chip.pg_inc[0];
        chip.multi[0] = 4; // MUL=2 stored doubled
        chip.update_phase_increment();
        assert_eq!(chip.pg_inc[0], base * 4);
        assert_eq!(base, (((0x269 << 1) << 4) >> 2) >> 1);
    }
}
