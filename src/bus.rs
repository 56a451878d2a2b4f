//! Register/bus interface: write latching, busy flag, register decode,
//! status and test readback, pins.
//!
//! Writes are not applied immediately. `write` only stages the byte and
//! raises a one-bit request; the next internal cycle edge-detects the
//! request (the low two bits of a small shift register reading `01`),
//! committing the value exactly as the one-cycle write pulse does on the
//! bus. Register decode then matches exact address offsets per operator and
//! per channel - addresses that match nothing are silently ignored, the
//! hardware has no validation layer.

use crate::chip::Ym3438;
use crate::config::ChipMode;
use crate::tables::{CH_OFFSET, FN_NOTE, OP_OFFSET};

/// Status hold time after a read, in internal cycles (YM2612 revisions).
const STATUS_TIME_YM2612: u32 = 300_000;

/// Status hold time after a read, in internal cycles (discrete YM3438).
const STATUS_TIME_YM3438: u32 = 40_000_000;

impl Ym3438 {
    /// Write a byte to one of the four bus ports.
    ///
    /// Even ports latch an address, odd ports latch data; ports 2/3 select
    /// register bank 1 (channels 4..6). The write takes effect over the
    /// following internal cycles, exactly as on the real bus.
    pub fn write(&mut self, port: u32, data: u8) {
        let port = port & 3;
        self.write_data = (((port << 7) & 0x100) as u16) | u16::from(data);
        if port & 1 != 0 {
            // Data
            self.write_d |= 1;
        } else {
            // Address
            self.write_a |= 1;
        }
    }

    /// Read the status byte (or test-point data when test mode is engaged).
    ///
    /// Port 0 always answers; other ports only on revisions carrying
    /// [`ChipMode::READ_MODE`]. The status byte holds busy in bit 7 and the
    /// timer B/A overflow flags in bits 1/0. Each read re-arms a hold
    /// counter; once it runs out, reads return zero.
    pub fn read(&mut self, port: u32) -> u8 {
        if port & 3 == 0 || self.mode.contains(ChipMode::READ_MODE) {
            if self.mode_test_21[6] != 0 {
                // Read test data
                let slot = ((self.cycles + 18) % 24) as usize;
                let mut testdata = (((self.pg_read & 0x01) << 15)
                    | ((self.eg_read[self.mode_test_21[0] as usize] & 0x01) << 14))
                    as u16;
                if self.mode_test_2c[4] != 0 {
                    testdata |= (self.ch_read & 0x1ff) as u16;
                } else {
                    testdata |= (self.fm_out[slot] & 0x3fff) as u16;
                }
                if self.mode_test_21[7] != 0 {
                    self.status = (testdata & 0xff) as u8;
                } else {
                    self.status = (testdata >> 8) as u8;
                }
            } else {
                self.status = (u8::from(self.busy) << 7)
                    | (u8::from(self.timer_b.overflow_flag) << 1)
                    | u8::from(self.timer_a.overflow_flag);
            }
            self.status_time = if self.mode.contains(ChipMode::YM2612) {
                STATUS_TIME_YM2612
            } else {
                STATUS_TIME_YM3438
            };
        }
        if self.status_time != 0 {
            self.status
        } else {
            0
        }
    }

    /// Drive the TEST input pin.
    pub fn set_test_pin(&mut self, value: u32) {
        self.pin_test_in = (value & 1) as u8;
    }

    /// Sample the TEST output pin.
    pub fn read_test_pin(&self) -> u32 {
        if self.mode_test_2c[7] == 0 {
            return 0;
        }
        u32::from(self.cycles == 23)
    }

    /// Sample the /IRQ pin: high while either timer overflow flag is set.
    pub fn read_irq_pin(&self) -> u32 {
        u32::from(self.timer_a.overflow_flag || self.timer_b.overflow_flag)
    }

    /// Edge-detect staged bus writes and run the busy counter.
    pub(crate) fn update_bus_latches(&mut self) {
        // Write signal check
        self.write_a_en = (self.write_a & 0x03) == 0x01;
        self.write_d_en = (self.write_d & 0x03) == 0x01;
        self.write_a <<= 1;
        self.write_d <<= 1;
        // Busy counter (5-bit, saturating at the 32-cycle ceiling)
        self.busy = self.write_busy;
        self.write_busy_cnt += u8::from(self.write_busy);
        self.write_busy =
            (self.write_busy && (self.write_busy_cnt >> 5) == 0) || self.write_d_en;
        self.write_busy_cnt &= 0x1f;
    }

    /// Commit a latched write into the register file.
    ///
    /// Operator registers decode against `OP_OFFSET` on the current decode
    /// lane (`cycles % 12`), channel registers against `CH_OFFSET` on the
    /// current channel, so a committed data byte lands over the following
    /// revolution rather than instantaneously.
    pub(crate) fn apply_register_write(&mut self) {
        let mut slot = (self.cycles % 12) as usize;
        let channel = self.channel() as usize;

        // Update registers
        if self.write_fm_data {
            // Slot
            if OP_OFFSET[slot] == self.address & 0x107 {
                if self.address & 0x08 != 0 {
                    // OP2, OP4
                    slot += 12;
                }
                match self.address & 0xf0 {
                    0x30 => {
                        // DT, MULTI
                        self.multi[slot] = self.data & 0x0f;
                        if self.multi[slot] == 0 {
                            self.multi[slot] = 1;
                        } else {
                            self.multi[slot] <<= 1;
                        }
                        self.dt[slot] = (self.data >> 4) & 0x07;
                    }
                    0x40 => {
                        // TL
                        self.tl[slot] = self.data & 0x7f;
                    }
                    0x50 => {
                        // KS, AR
                        self.ar[slot] = self.data & 0x1f;
                        self.ks[slot] = (self.data >> 6) & 0x03;
                    }
                    0x60 => {
                        // AM, DR
                        self.dr[slot] = self.data & 0x1f;
                        self.am[slot] = self.data & 0x80 != 0;
                    }
                    0x70 => {
                        // SR
                        self.sr[slot] = self.data & 0x1f;
                    }
                    0x80 => {
                        // SL, RR
                        self.rr[slot] = self.data & 0x0f;
                        self.sl[slot] = (self.data >> 4) & 0x0f;
                        self.sl[slot] |= (self.sl[slot] + 1) & 0x10;
                    }
                    0x90 => {
                        // SSG-EG
                        self.ssg_eg[slot] = self.data & 0x0f;
                    }
                    _ => {}
                }
            }

            // Channel
            if CH_OFFSET[channel] == self.address & 0x103 {
                match self.address & 0xfc {
                    0xa0 => {
                        self.fnum[channel] =
                            u16::from(self.data) | (u16::from(self.reg_a4) & 0x07) << 8;
                        self.block[channel] = (self.reg_a4 >> 3) & 0x07;
                        self.kcode[channel] = (self.block[channel] << 2)
                            | FN_NOTE[(self.fnum[channel] >> 7) as usize];
                    }
                    0xa4 => {
                        self.reg_a4 = self.data;
                    }
                    0xa8 => {
                        self.fnum_3ch[channel] =
                            u16::from(self.data) | (u16::from(self.reg_ac) & 0x07) << 8;
                        self.block_3ch[channel] = (self.reg_ac >> 3) & 0x07;
                        self.kcode_3ch[channel] = (self.block_3ch[channel] << 2)
                            | FN_NOTE[(self.fnum_3ch[channel] >> 7) as usize];
                    }
                    0xac => {
                        self.reg_ac = self.data;
                    }
                    0xb0 => {
                        self.connect[channel] = self.data & 0x07;
                        self.fb[channel] = (self.data >> 3) & 0x07;
                    }
                    0xb4 => {
                        self.pms[channel] = self.data & 0x07;
                        self.ams[channel] = (self.data >> 4) & 0x03;
                        self.pan_l[channel] = self.data & 0x80 != 0;
                        self.pan_r[channel] = self.data & 0x40 != 0;
                    }
                    _ => {}
                }
            }
        }

        if self.write_a_en || self.write_d_en {
            // Data
            if self.write_a_en {
                self.write_fm_data = false;
            }
            if self.write_fm_address && self.write_d_en {
                self.write_fm_data = true;
            }

            // Address
            if self.write_a_en {
                if self.write_data & 0xf0 != 0 {
                    // FM write
                    self.address = self.write_data;
                    self.write_fm_address = true;
                } else {
                    // SSG write
                    self.write_fm_address = false;
                }
            }

            // FM mode registers respond to bank 0 data only
            if self.write_d_en && self.write_data & 0x100 == 0 {
                match self.write_fm_mode_a {
                    0x21 => {
                        // LSI test 1
                        for (i, bit) in self.mode_test_21.iter_mut().enumerate() {
                            *bit = ((self.write_data >> i) & 0x01) as u8;
                        }
                    }
                    0x22 => {
                        // LFO control
                        if (self.write_data >> 3) & 0x01 != 0 {
                            self.lfo_en = 0x7f;
                        } else {
                            self.lfo_en = 0;
                        }
                        self.lfo_freq = (self.write_data & 0x07) as u8;
                    }
                    0x24 => {
                        // Timer A, upper 8 bits
                        self.timer_a.period =
                            (self.timer_a.period & 0x03) | ((self.write_data & 0xff) << 2);
                    }
                    0x25 => {
                        // Timer A, lower 2 bits
                        self.timer_a.period =
                            (self.timer_a.period & 0x3fc) | (self.write_data & 0x03);
                    }
                    0x26 => {
                        // Timer B
                        self.timer_b.period = self.write_data & 0xff;
                    }
                    0x27 => {
                        // CSM, timer control
                        self.mode_ch3 = ((self.write_data & 0xc0) >> 6) as u8;
                        self.mode_csm = self.mode_ch3 == 2;
                        self.timer_a.load = self.write_data & 0x01 != 0;
                        self.timer_a.enable = (self.write_data >> 2) & 0x01 != 0;
                        self.timer_a.reset = (self.write_data >> 4) & 0x01 != 0;
                        self.timer_b.load = (self.write_data >> 1) & 0x01 != 0;
                        self.timer_b.enable = (self.write_data >> 3) & 0x01 != 0;
                        self.timer_b.reset = (self.write_data >> 5) & 0x01 != 0;
                    }
                    0x28 => {
                        // Key on/off
                        for (i, op) in self.mode_kon_operator.iter_mut().enumerate() {
                            *op = (self.write_data >> (4 + i)) & 0x01 != 0;
                        }
                        if self.write_data & 0x03 == 0x03 {
                            // Invalid channel select
                            self.mode_kon_channel = 0xff;
                        } else {
                            self.mode_kon_channel =
                                ((self.write_data & 0x03) + ((self.write_data >> 2) & 1) * 3) as u8;
                        }
                    }
                    0x2a => {
                        // DAC data
                        self.dac_data &= 0x01;
                        self.dac_data |= ((self.write_data ^ 0x80) << 1) as i16;
                    }
                    0x2b => {
                        // DAC enable
                        self.dac_enable = self.write_data >> 7 != 0;
                    }
                    0x2c => {
                        // LSI test 2
                        for (i, bit) in self.mode_test_2c.iter_mut().enumerate() {
                            *bit = ((self.write_data >> i) & 0x01) as u8;
                        }
                        self.dac_data &= 0x1fe;
                        self.dac_data |= i16::from(self.mode_test_2c[3]);
                        self.eg_custom_timer =
                            self.mode_test_2c[7] == 0 && self.mode_test_2c[6] != 0;
                    }
                    _ => {}
                }
            }

            // Address
            if self.write_a_en {
                self.write_fm_mode_a = self.write_data & 0x1ff;
            }
        }

        if self.write_fm_data {
            self.data = (self.write_data & 0xff) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn write_committed(chip: &mut Ym3438, port: u32, data: u8) {
        chip.write(port, data);
        for _ in 0..24 {
            chip.clock();
        }
    }

    #[test]
    fn test_busy_flag_sets_and_clears() {
        let mut chip = Ym3438::new();
        chip.write(1, 0x00);
        chip.clock();
        chip.clock();
        assert_eq!(chip.read(0) & 0x80, 0x80);
        // The busy counter saturates out after 32 internal cycles.
        for _ in 0..40 {
            chip.clock();
        }
        assert_eq!(chip.read(0) & 0x80, 0x00);
    }

    #[test]
    fn test_operator_register_decode() {
        let mut chip = Ym3438::new();
        // Ch1 OP1 total level
        write_committed(&mut chip, 0, 0x40);
        write_committed(&mut chip, 1, 0x55);
        assert_eq!(chip.tl[0], 0x55);
        // Ch1 OP2 lands 12 slots up (address bit 3)
        write_committed(&mut chip, 0, 0x48);
        write_committed(&mut chip, 1, 0x23);
        assert_eq!(chip.tl[12], 0x23);
        // Bank 1: Ch4 OP1
        write_committed(&mut chip, 2, 0x40);
        write_committed(&mut chip, 3, 0x11);
        assert_eq!(chip.tl[3], 0x11);
    }

    #[test]
    fn test_multiple_zero_reads_back_as_one() {
        let mut chip = Ym3438::new();
        write_committed(&mut chip, 0, 0x30);
        write_committed(&mut chip, 1, 0x70); // DT=7, MUL=0
        assert_eq!(chip.multi[0], 1);
        assert_eq!(chip.dt[0], 7);
        write_committed(&mut chip, 1, 0x03); // MUL=3 stored doubled
        assert_eq!(chip.multi[0], 6);
    }

    #[test]
    fn test_sustain_level_fifteen_extends() {
        let mut chip = Ym3438::new();
        write_committed(&mut chip, 0, 0x80);
        write_committed(&mut chip, 1, 0xf0); // SL=15, RR=0
        assert_eq!(chip.sl[0], 0x1f);
    }

    #[test]
    fn test_unmatched_address_is_ignored() {
        let mut chip = Ym3438::new();
        let before = chip.clone();
        write_committed(&mut chip, 0, 0x1f); // hole in the register map
        write_committed(&mut chip, 1, 0xff);
        assert_eq!(chip.tl, before.tl);
        assert_eq!(chip.fnum, before.fnum);
        assert_eq!(chip.multi, before.multi);
    }

    #[test]
    fn test_frequency_write_updates_kcode() {
        let mut chip = Ym3438::new();
        write_committed(&mut chip, 0, 0xa4);
        write_committed(&mut chip, 1, 0x22); // block 4, fnum high 2
        write_committed(&mut chip, 0, 0xa0);
        write_committed(&mut chip, 1, 0x69);
        assert_eq!(chip.fnum[0], 0x269);
        assert_eq!(chip.block[0], 4);
        assert_eq!(chip.kcode[0], (4 << 2) | FN_NOTE[0x269 >> 7]);
    }

    #[test]
    fn test_status_port_gating() {
        let cfg = Config {
            mode: ChipMode::empty(),
            ..Config::default()
        };
        let mut chip = Ym3438::with_config(cfg).unwrap();
        chip.write(1, 0x00);
        chip.clock();
        chip.clock();
        // Without READ_MODE only port 0 responds; the hold counter armed by
        // a port-0 read still echoes on other ports.
        assert_eq!(chip.read(0) & 0x80, 0x80);

        let mut chip = Ym3438::new();
        chip.write(1, 0x00);
        chip.clock();
        chip.clock();
        assert_eq!(chip.read(2) & 0x80, 0x80);
    }

    #[test]
    fn test_irq_pin_follows_timer_flags() {
        let mut chip = Ym3438::new();
        assert_eq!(chip.read_irq_pin(), 0);
        chip.timer_a.overflow_flag = true;
        assert_eq!(chip.read_irq_pin(), 1);
    }
}
