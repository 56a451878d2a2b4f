//! Envelope generator: ADSR state machine, SSG-EG latches, rate arithmetic
//! and the per-cycle output with AM and total level applied.
//!
//! One global 12-bit timer shared by all slots drives the rates: a
//! quotient-of-3 counter gates timer additions, and a bit-walk over the
//! timer value extracts the shift that must match an operator's computed
//! rate for it to step this revolution. Rates 48..63 step multiple times per
//! tick via `EG_STEP_HI`; rates 44..47 use the sum sub-cases. All level
//! arithmetic is 10-bit masked; the one documented saturation is the
//! envelope-off state pinning the level at 0x3ff.

use crate::chip::Ym3438;
use crate::tables::{EG_AM_SHIFT, EG_STEP_HI};

/// ADSR state of one operator slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgState {
    /// Level decreasing toward zero attenuation.
    Attack,
    /// Attenuation increasing toward the sustain level.
    Decay,
    /// Attenuation increasing at the sustain rate.
    Sustain,
    /// Key released, attenuation increasing toward silence.
    Release,
}

impl Ym3438 {
    /// Recompute the SSG-EG latches for the slot on the current cycle.
    ///
    /// Runs before the ADSR update consumes them: reset/repeat fire when the
    /// level crosses half scale, hold-up arms while the key is held in the
    /// hold shapes, and the direction latch folds into the inversion flag.
    pub(crate) fn update_ssg_eg(&mut self) {
        let slot = self.cycles as usize;
        let mut direction = false;
        self.eg_ssg_pgrst_latch[slot] = false;
        self.eg_ssg_repeat_latch[slot] = false;
        self.eg_ssg_hold_up_latch[slot] = false;
        if self.ssg_eg[slot] & 0x08 != 0 {
            direction = self.eg_ssg_dir[slot];
            if self.eg_level[slot] & 0x200 != 0 {
                // Reset
                if self.ssg_eg[slot] & 0x03 == 0x00 {
                    self.eg_ssg_pgrst_latch[slot] = true;
                }
                // Repeat
                if self.ssg_eg[slot] & 0x01 == 0x00 {
                    self.eg_ssg_repeat_latch[slot] = true;
                }
                // Inverse
                if self.ssg_eg[slot] & 0x03 == 0x02 {
                    direction = !direction;
                }
                if self.ssg_eg[slot] & 0x03 == 0x03 {
                    direction = true;
                }
            }
            // Hold up
            if self.eg_kon_latch[slot]
                && matches!(self.ssg_eg[slot] & 0x07, 0x05 | 0x03)
            {
                self.eg_ssg_hold_up_latch[slot] = true;
            }
            direction = direction && self.eg_kon[slot];
        }
        self.eg_ssg_dir[slot] = direction;
        self.eg_ssg_enable[slot] = self.ssg_eg[slot] & 0x08 != 0;
        self.eg_ssg_inv[slot] =
            (self.eg_ssg_dir[slot] ^ (self.ssg_eg[slot] & 0x0c == 0x0c)) && self.eg_kon[slot];
    }

    /// Run the ADSR state machine for the slot in the +22 pipeline stage.
    pub(crate) fn update_adsr(&mut self) {
        let slot = ((self.cycles + 22) % 24) as usize;

        let nkon = self.eg_kon_latch[slot];
        let okon = self.eg_kon[slot];
        let mut nextstate = self.eg_state[slot];
        let mut inc: i16 = 0;

        self.eg_read[0] = u32::from(self.eg_read_inc);
        self.eg_read_inc = self.eg_inc > 0;

        // Reset phase generator
        self.pg_reset[slot] = (nkon && !okon) || self.eg_ssg_pgrst_latch[slot];

        // KeyOn/Off
        let kon_event = (nkon && !okon) || (okon && self.eg_ssg_repeat_latch[slot]);
        let koff_event = okon && !nkon;

        let mut level = self.eg_level[slot] as i16;
        let mut ssg_level = level;

        if self.eg_ssg_inv[slot] {
            // Inverse
            ssg_level = (512 - level) & 0x3ff;
        }
        if koff_event {
            level = ssg_level;
        }
        let eg_off = if self.eg_ssg_enable[slot] {
            level >> 9 != 0
        } else {
            level & 0x3f0 == 0x3f0
        };
        let mut nextlevel = level;
        if kon_event {
            nextstate = EgState::Attack;
            // Instant attack
            if self.eg_rate_max {
                nextlevel = 0;
            } else if self.eg_state[slot] == EgState::Attack
                && level != 0
                && self.eg_inc != 0
                && nkon
            {
                inc = (!level << self.eg_inc) >> 5;
            }
        } else {
            match self.eg_state[slot] {
                EgState::Attack => {
                    if level == 0 {
                        nextstate = EgState::Decay;
                    } else if self.eg_inc != 0 && !self.eg_rate_max && nkon {
                        inc = (!level << self.eg_inc) >> 5;
                    }
                }
                EgState::Decay => {
                    if level >> 4 == i16::from(self.eg_sl[1]) << 1 {
                        nextstate = EgState::Sustain;
                    } else if !eg_off && self.eg_inc != 0 {
                        inc = 1 << (self.eg_inc - 1);
                        if self.eg_ssg_enable[slot] {
                            inc <<= 2;
                        }
                    }
                }
                EgState::Sustain | EgState::Release => {
                    if !eg_off && self.eg_inc != 0 {
                        inc = 1 << (self.eg_inc - 1);
                        if self.eg_ssg_enable[slot] {
                            inc <<= 2;
                        }
                    }
                }
            }
            if !nkon {
                nextstate = EgState::Release;
            }
        }
        if self.eg_kon_csm[slot] {
            nextlevel |= i16::from(self.eg_tl[1]) << 3;
        }

        // Envelope off
        if !kon_event
            && !self.eg_ssg_hold_up_latch[slot]
            && self.eg_state[slot] != EgState::Attack
            && eg_off
        {
            nextstate = EgState::Release;
            nextlevel = 0x3ff;
        }

        nextlevel += inc;

        self.eg_kon[slot] = self.eg_kon_latch[slot];
        self.eg_level[slot] = (nextlevel as u16) & 0x3ff;
        self.eg_state[slot] = nextstate;
    }

    /// Derive the step increment and next rate selection for this cycle.
    pub(crate) fn prepare_envelope(&mut self) {
        let slot = self.cycles as usize;
        let mut inc: u8 = 0;

        // Prepare increment
        let rate = ((self.eg_rate << 1) + self.eg_ksv).min(0x3f);

        let sum = ((rate >> 2) + self.eg_shift_lock) & 0x0f;
        if self.eg_rate != 0 && self.eg_quotient == 2 {
            if rate < 48 {
                match sum {
                    12 => inc = 1,
                    13 => inc = (rate >> 1) & 0x01,
                    14 => inc = rate & 0x01,
                    _ => {}
                }
            } else {
                inc = (EG_STEP_HI[(rate & 0x03) as usize][self.eg_timer_low_lock as usize]
                    + (rate >> 2)
                    - 11)
                    .min(4);
            }
        }
        self.eg_inc = inc;
        self.eg_rate_max = rate >> 1 == 0x1f;

        // Prepare rate & ksv
        let mut rate_sel = self.eg_state[slot];
        if (self.eg_kon[slot] && self.eg_ssg_repeat_latch[slot])
            || (!self.eg_kon[slot] && self.eg_kon_latch[slot])
        {
            rate_sel = EgState::Attack;
        }
        self.eg_rate = match rate_sel {
            EgState::Attack => self.ar[slot],
            EgState::Decay => self.dr[slot],
            EgState::Sustain => self.sr[slot],
            EgState::Release => (self.rr[slot] << 1) | 0x01,
        };
        self.eg_ksv = self.pg_kcode >> (self.ks[slot] ^ 0x03);
        if self.am[slot] {
            self.eg_lfo_am = self.lfo_am >> EG_AM_SHIFT[self.ams[self.channel() as usize] as usize];
        } else {
            self.eg_lfo_am = 0;
        }
        // Delay TL & SL value
        self.eg_tl[1] = self.eg_tl[0];
        self.eg_tl[0] = self.tl[slot];
        self.eg_sl[1] = self.eg_sl[0];
        self.eg_sl[0] = self.sl[slot];
    }

    /// Produce the attenuation the operator stage will consume, with SSG
    /// inversion, AM and total level applied.
    pub(crate) fn compute_envelope_output(&mut self) {
        let slot = ((self.cycles + 23) % 24) as usize;

        let mut level = self.eg_level[slot];

        if self.eg_ssg_inv[slot] {
            // Inverse
            level = 512u16.wrapping_sub(level);
        }
        if self.mode_test_21[5] != 0 {
            level = 0;
        }
        level &= 0x3ff;

        // Apply AM LFO
        level += u16::from(self.eg_lfo_am);

        // Apply TL; channel 3's slot data is one channel in flight here, so
        // the CSM exemption matches on channel index 3
        if !(self.mode_csm && self.channel() == 3) {
            level += u16::from(self.eg_tl[0]) << 3;
        }
        level = level.min(0x3ff);
        self.eg_out[slot] = level;
    }
}
