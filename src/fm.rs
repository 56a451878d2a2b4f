//! FM operator network, channel accumulator and the analog output stage.
//!
//! Operators multiply in the log domain: a quarter-wave log-sine lookup is
//! added to the envelope attenuation, pushed through the exponential ROM and
//! sign-adjusted by the phase quadrant. The routing between operators is a
//! static table over (operator position, algorithm); there is nothing to
//! dispatch on, the topology set is fixed in silicon.

use crate::chip::Ym3438;
use crate::config::ChipMode;
use crate::tables::{EXP_ROM, FM_ALGORITHM, LOGSIN_ROM};

/// Sign-extend `value` from `bit_index` (the sign bit position).
#[inline]
fn sign_extend(bit_index: u32, value: i16) -> i16 {
    (value & ((1 << bit_index) - 1)) - (value & (1 << bit_index))
}

impl Ym3438 {
    /// Gather the modulation input for the slot entering the operator stage.
    ///
    /// The routing matrix selects among operator 1's two delayed outputs,
    /// operator 2's delayed output and the previous slot's raw output.
    /// Operator 1 feeds back on itself shifted by `10 - feedback`; all other
    /// operators take their combined modulation shifted right once.
    pub(crate) fn prepare_modulation(&mut self) {
        let slot = ((self.cycles + 6) % 24) as usize;
        let channel = self.channel() as usize;
        let op = slot / 6;
        let connect = self.connect[channel] as usize;
        let prevslot = ((self.cycles + 18) % 24) as usize;

        // Calculate modulation
        let mut mod1: i16 = 0;
        let mut mod2: i16 = 0;

        if FM_ALGORITHM[op][0][connect] != 0 {
            mod2 |= self.fm_op1[channel][0];
        }
        if FM_ALGORITHM[op][1][connect] != 0 {
            mod1 |= self.fm_op1[channel][1];
        }
        if FM_ALGORITHM[op][2][connect] != 0 {
            mod1 |= self.fm_op2[channel];
        }
        if FM_ALGORITHM[op][3][connect] != 0 {
            mod2 |= self.fm_out[prevslot];
        }
        if FM_ALGORITHM[op][4][connect] != 0 {
            mod1 |= self.fm_out[prevslot];
        }
        let mut modulation = mod1 + mod2;
        if op == 0 {
            // Feedback
            modulation >>= 10 - self.fb[channel];
            if self.fb[channel] == 0 {
                modulation = 0;
            }
        } else {
            modulation >>= 1;
        }
        self.fm_mod[slot] = modulation as u16;

        // Capture operator history for the slot leaving the stage
        let slot = ((self.cycles + 18) % 24) as usize;
        if slot / 6 == 0 {
            // OP1
            self.fm_op1[channel][1] = self.fm_op1[channel][0];
            self.fm_op1[channel][0] = self.fm_out[slot];
        }
        if slot / 6 == 2 {
            // OP2
            self.fm_op2[channel] = self.fm_out[slot];
        }
    }

    /// Produce the operator output for the slot in the +19 pipeline stage.
    pub(crate) fn generate_operator_output(&mut self) {
        let slot = ((self.cycles + 19) % 24) as usize;
        // Calculate phase
        let phase = ((u32::from(self.fm_mod[slot]) + (self.pg_phase[slot] >> 10)) & 0x3ff) as u16;
        let quarter = if phase & 0x100 != 0 {
            (phase ^ 0xff) & 0xff
        } else {
            phase & 0xff
        };
        let mut level = LOGSIN_ROM[quarter as usize];
        // Apply envelope
        level += self.eg_out[slot] << 2;
        // Transform
        level = level.min(0x1fff);
        let mut output =
            ((u32::from(EXP_ROM[((level & 0xff) ^ 0xff) as usize] | 0x400) << 2) >> (level >> 8))
                as i16;
        if phase & 0x200 != 0 {
            output = (!output ^ (i16::from(self.mode_test_21[4]) << 13)).wrapping_add(1);
        } else {
            output ^= i16::from(self.mode_test_21[4]) << 13;
        }
        // Truncate to 14 bits
        output = sign_extend(13, output);
        self.fm_out[slot] = output;
    }

    /// Fold operator outputs into the per-channel accumulator.
    ///
    /// The accumulator restarts at the first operator position of each
    /// channel group and clamps to the 9-bit DAC range; the DAC test bypass
    /// replaces all contributions with a constant 1.
    pub(crate) fn accumulate_channel(&mut self) {
        let slot = ((self.cycles + 18) % 24) as usize;
        let channel = self.channel() as usize;
        let op = slot / 6;
        let test_dac = self.mode_test_2c[5] != 0;
        let mut acc = self.ch_acc[channel];
        let mut add = i16::from(test_dac);
        if op == 0 && !test_dac {
            acc = 0;
        }
        if FM_ALGORITHM[op][5][self.connect[channel] as usize] != 0 && !test_dac {
            add += self.fm_out[slot] >> 5;
        }
        let sum = (acc + add).clamp(-256, 255);

        if op == 0 || test_dac {
            self.ch_out[channel] = self.ch_acc[channel];
        }
        self.ch_acc[channel] = sum;
    }

    /// Drive the analog stage: hold-register capture, DAC injection and the
    /// per-variant stereo gating.
    pub(crate) fn update_channel_output(&mut self) {
        let cycles = self.cycles;
        let test_dac = self.mode_test_2c[5] != 0;
        let mut channel = self.channel() as usize;
        self.ch_read = self.ch_lock;
        if cycles < 12 {
            // Ch 4,5,6
            channel += 1;
        }
        if cycles & 3 == 0 {
            if !test_dac {
                // Lock value
                self.ch_lock = self.ch_out[channel];
            }
            self.ch_lock_l = self.pan_l[channel];
            self.ch_lock_r = self.pan_r[channel];
        }
        // Ch 6
        let out = if (cycles >> 2 == 1 && self.dac_enable) || test_dac {
            sign_extend(8, self.dac_data)
        } else {
            self.ch_lock
        };
        self.mol = 0;
        self.mor = 0;
        if self.mode.contains(ChipMode::YM2612) {
            let out_en = cycles & 3 == 3 || test_dac;
            // YM2612 DAC discontinuity: non-negative levels sit one step up,
            // gated levels collapse to the sign, and the result is amplified.
            let mut out = out;
            let mut sign = out >> 8;
            if out >= 0 {
                out += 1;
                sign += 1;
            }
            self.mol = if self.ch_lock_l && out_en { out } else { sign };
            self.mor = if self.ch_lock_r && out_en { out } else { sign };
            self.mol *= 3;
            self.mor *= 3;
        } else {
            let out_en = cycles & 3 != 0 || test_dac;
            if self.ch_lock_l && out_en {
                self.mol = out;
            }
            if self.ch_lock_r && out_en {
                self.mor = out;
            }
        }
    }
}
