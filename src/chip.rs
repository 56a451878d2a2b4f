//! Chip state and the 24-cycle pipeline scheduler.
//!
//! The YM3438 processes its 24 operator slots (6 channels x 4 operators)
//! round-robin: one internal cycle advances one sub-step of every generator,
//! and 24 cycles complete a full revolution producing one native-rate sample
//! pair. Generator stages read and write slots at fixed cycle-relative
//! offsets (+6, +18, +19, +20, +22, +23 mod 24); these offsets encode the
//! real pipeline latency between stages on the die and are load-bearing for
//! bit-exact output. State is kept in flat parallel arrays indexed by slot
//! for the same reason - the hardware has no per-operator object, only
//! shift-register lanes.

use crate::config::{ChipMode, Config};
use crate::envelope::EgState;
use crate::queue::WriteQueue;
use crate::timer::TimerState;
use crate::{Result, RSM_FRAC};

/// Number of internal cycles per native sample (one pipeline revolution).
pub(crate) const NUM_CYCLES: u32 = 24;

/// Number of FM channels.
pub(crate) const NUM_CHANNELS: usize = 6;

/// Number of operator slots (6 channels x 4 operators).
pub(crate) const NUM_SLOTS: usize = 24;

/// Cycle-accurate YM3438/OPN2 emulator.
///
/// A single `Ym3438` models one chip: register file, 24-slot phase and
/// envelope pipelines, LFO, FM operator network, timers, DAC channel and the
/// output resampler. It is mutated exclusively through register writes and
/// clock/generation calls; every operation is a pure function of the current
/// state, so identical inputs always produce identical output streams.
/// Instances are fully self-contained and may run on separate threads.
///
/// # Example
///
/// ```
/// use ym3438::Ym3438;
///
/// let mut chip = Ym3438::new();
/// chip.write_buffered(0, 0x22); // LFO register
/// chip.write_buffered(1, 0x08); // LFO on
/// let (left, right) = chip.generate();
/// assert_eq!((left, right), (0, 0)); // nothing keyed on yet
/// ```
#[derive(Clone)]
pub struct Ym3438 {
    /// Revision behaviour flags (per instance, fixed after construction).
    pub(crate) mode: ChipMode,
    /// Output low-pass toggle.
    pub(crate) output_filter: bool,
    pub(crate) sample_rate: u32,
    pub(crate) clock_rate: u32,

    /// Position in the 24-cycle pipeline revolution.
    pub(crate) cycles: u32,
    /// Per-cycle left/right output of the analog stage.
    pub(crate) mol: i16,
    pub(crate) mor: i16,

    // Bus staging
    pub(crate) write_data: u16,
    pub(crate) write_a: u8,
    pub(crate) write_d: u8,
    pub(crate) write_a_en: bool,
    pub(crate) write_d_en: bool,
    pub(crate) write_busy: bool,
    pub(crate) write_busy_cnt: u8,
    pub(crate) write_fm_address: bool,
    pub(crate) write_fm_data: bool,
    pub(crate) write_fm_mode_a: u16,
    pub(crate) address: u16,
    pub(crate) data: u8,
    pub(crate) pin_test_in: u8,
    pub(crate) busy: bool,

    // LFO
    pub(crate) lfo_en: u8,
    pub(crate) lfo_freq: u8,
    pub(crate) lfo_pm: u8,
    pub(crate) lfo_am: u8,
    pub(crate) lfo_cnt: u8,
    pub(crate) lfo_inc: u8,
    pub(crate) lfo_quotient: u8,

    // Phase generator
    pub(crate) pg_fnum: u16,
    pub(crate) pg_block: u8,
    pub(crate) pg_kcode: u8,
    pub(crate) pg_inc: [u32; NUM_SLOTS],
    pub(crate) pg_phase: [u32; NUM_SLOTS],
    pub(crate) pg_reset: [bool; NUM_SLOTS],
    pub(crate) pg_read: u32,

    // Envelope generator
    pub(crate) eg_cycle: u8,
    pub(crate) eg_cycle_stop: bool,
    pub(crate) eg_shift: u8,
    pub(crate) eg_shift_lock: u8,
    pub(crate) eg_timer_low_lock: u8,
    pub(crate) eg_timer: u16,
    pub(crate) eg_timer_inc: u8,
    pub(crate) eg_quotient: u16,
    pub(crate) eg_custom_timer: bool,
    pub(crate) eg_rate: u8,
    pub(crate) eg_ksv: u8,
    pub(crate) eg_inc: u8,
    pub(crate) eg_rate_max: bool,
    pub(crate) eg_sl: [u8; 2],
    pub(crate) eg_lfo_am: u8,
    pub(crate) eg_tl: [u8; 2],
    pub(crate) eg_state: [EgState; NUM_SLOTS],
    pub(crate) eg_level: [u16; NUM_SLOTS],
    pub(crate) eg_out: [u16; NUM_SLOTS],
    pub(crate) eg_kon: [bool; NUM_SLOTS],
    pub(crate) eg_kon_csm: [bool; NUM_SLOTS],
    pub(crate) eg_kon_latch: [bool; NUM_SLOTS],
    pub(crate) eg_ssg_enable: [bool; NUM_SLOTS],
    pub(crate) eg_ssg_pgrst_latch: [bool; NUM_SLOTS],
    pub(crate) eg_ssg_repeat_latch: [bool; NUM_SLOTS],
    pub(crate) eg_ssg_hold_up_latch: [bool; NUM_SLOTS],
    pub(crate) eg_ssg_dir: [bool; NUM_SLOTS],
    pub(crate) eg_ssg_inv: [bool; NUM_SLOTS],
    pub(crate) eg_read: [u32; 2],
    pub(crate) eg_read_inc: bool,

    // FM operator network
    pub(crate) fm_op1: [[i16; 2]; NUM_CHANNELS],
    pub(crate) fm_op2: [i16; NUM_CHANNELS],
    pub(crate) fm_out: [i16; NUM_SLOTS],
    pub(crate) fm_mod: [u16; NUM_SLOTS],

    // Channel accumulator
    pub(crate) ch_acc: [i16; NUM_CHANNELS],
    pub(crate) ch_out: [i16; NUM_CHANNELS],
    pub(crate) ch_lock: i16,
    pub(crate) ch_lock_l: bool,
    pub(crate) ch_lock_r: bool,
    pub(crate) ch_read: i16,

    // Timers
    pub(crate) timer_a: TimerState,
    pub(crate) timer_b: TimerState,
    pub(crate) timer_b_subcnt: u8,

    // Mode registers
    pub(crate) mode_test_21: [u8; 8],
    pub(crate) mode_test_2c: [u8; 8],
    pub(crate) mode_ch3: u8,
    pub(crate) mode_kon_channel: u8,
    pub(crate) mode_kon_operator: [bool; 4],
    pub(crate) mode_kon: [bool; NUM_SLOTS],
    pub(crate) mode_csm: bool,
    pub(crate) mode_kon_csm: bool,
    pub(crate) dac_enable: bool,
    pub(crate) dac_data: i16,

    // Operator parameters
    pub(crate) ks: [u8; NUM_SLOTS],
    pub(crate) ar: [u8; NUM_SLOTS],
    pub(crate) sr: [u8; NUM_SLOTS],
    pub(crate) dt: [u8; NUM_SLOTS],
    pub(crate) multi: [u8; NUM_SLOTS],
    pub(crate) sl: [u8; NUM_SLOTS],
    pub(crate) rr: [u8; NUM_SLOTS],
    pub(crate) dr: [u8; NUM_SLOTS],
    pub(crate) am: [bool; NUM_SLOTS],
    pub(crate) tl: [u8; NUM_SLOTS],
    pub(crate) ssg_eg: [u8; NUM_SLOTS],

    // Channel parameters
    pub(crate) fnum: [u16; NUM_CHANNELS],
    pub(crate) block: [u8; NUM_CHANNELS],
    pub(crate) kcode: [u8; NUM_CHANNELS],
    pub(crate) fnum_3ch: [u16; NUM_CHANNELS],
    pub(crate) block_3ch: [u8; NUM_CHANNELS],
    pub(crate) kcode_3ch: [u8; NUM_CHANNELS],
    pub(crate) reg_a4: u8,
    pub(crate) reg_ac: u8,
    pub(crate) connect: [u8; NUM_CHANNELS],
    pub(crate) fb: [u8; NUM_CHANNELS],
    pub(crate) pan_l: [bool; NUM_CHANNELS],
    pub(crate) pan_r: [bool; NUM_CHANNELS],
    pub(crate) ams: [u8; NUM_CHANNELS],
    pub(crate) pms: [u8; NUM_CHANNELS],
    pub(crate) status: u8,
    pub(crate) status_time: u32,

    // Output / resampler
    pub(crate) mute: [bool; 7],
    pub(crate) rate_ratio: i32,
    pub(crate) sample_cnt: i32,
    pub(crate) old_samples: [i32; 2],
    pub(crate) samples: [i32; 2],

    // Timed write queue
    pub(crate) queue: WriteQueue,
}

impl Ym3438 {
    /// Create a chip with the default configuration (NTSC Mega Drive clock,
    /// 44.1 kHz output, discrete YM3438 behaviour).
    pub fn new() -> Self {
        let mut chip = Self::zeroed();
        chip.mode = ChipMode::default();
        chip.reset();
        chip
    }

    /// Create a chip with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Ym3438Error::ConfigError`](crate::Ym3438Error::ConfigError)
    /// when either rate is zero.
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        let mut chip = Self::zeroed();
        chip.mode = config.mode;
        chip.output_filter = config.output_filter;
        chip.sample_rate = config.sample_rate;
        chip.clock_rate = config.clock_rate;
        chip.reset();
        Ok(chip)
    }

    /// Reset to power-on state, keeping the instance configuration.
    ///
    /// All envelope levels and outputs come up at maximum attenuation in the
    /// Release state, every operator multiple reads back as 1 and both pan
    /// bits of every channel are enabled, matching the documented power-on
    /// defaults. Channel mutes are cleared as well.
    pub fn reset(&mut self) {
        let mode = self.mode;
        let output_filter = self.output_filter;
        let sample_rate = self.sample_rate;
        let clock_rate = self.clock_rate;
        *self = Self::zeroed();
        self.mode = mode;
        self.output_filter = output_filter;
        self.sample_rate = sample_rate;
        self.clock_rate = clock_rate;

        for slot in 0..NUM_SLOTS {
            self.eg_out[slot] = 0x3ff;
            self.eg_level[slot] = 0x3ff;
            self.eg_state[slot] = EgState::Release;
            self.multi[slot] = 1;
        }
        for ch in 0..NUM_CHANNELS {
            self.pan_l[ch] = true;
            self.pan_r[ch] = true;
        }

        // 144 master clocks per native sample pair.
        self.rate_ratio =
            (((144 * u64::from(self.sample_rate)) << RSM_FRAC) / u64::from(self.clock_rate)) as i32;
    }

    /// Reset with new clocks, keeping the variant and filter selection.
    ///
    /// # Errors
    ///
    /// Returns [`Ym3438Error::ConfigError`](crate::Ym3438Error::ConfigError)
    /// when either rate is zero.
    pub fn reset_with_clocks(&mut self, sample_rate: u32, clock_rate: u32) -> Result<()> {
        Config {
            sample_rate,
            clock_rate,
            mode: self.mode,
            output_filter: self.output_filter,
        }
        .validate()?;
        self.sample_rate = sample_rate;
        self.clock_rate = clock_rate;
        self.reset();
        Ok(())
    }

    /// Host sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Chip master clock in Hz.
    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    /// Revision behaviour flags of this instance.
    pub fn mode(&self) -> ChipMode {
        self.mode
    }

    /// Channel currently in the pipeline, always derived from the cycle
    /// counter.
    #[inline]
    pub(crate) fn channel(&self) -> u32 {
        self.cycles % 6
    }

    /// Advance the pipeline by one internal cycle.
    ///
    /// Executes one sub-step of every generator in the fixed hardware order
    /// and returns the raw per-cycle stereo pair of the analog stage. 24
    /// calls complete one pipeline revolution (one native-rate sample).
    pub fn clock(&mut self) -> (i16, i16) {
        let slot = self.cycles;
        self.lfo_inc = self.mode_test_21[1];
        self.pg_read >>= 1;
        self.eg_read[1] >>= 1;
        self.eg_cycle += 1;
        // Lock envelope generator timer value
        if self.cycles == 1 && self.eg_quotient == 2 {
            if self.eg_cycle_stop {
                self.eg_shift_lock = 0;
            } else {
                self.eg_shift_lock = self.eg_shift + 1;
            }
            self.eg_timer_low_lock = (self.eg_timer & 0x03) as u8;
        }
        // Cycle specific functions
        match self.cycles {
            0 => {
                self.lfo_pm = self.lfo_cnt >> 2;
                if self.lfo_cnt & 0x40 != 0 {
                    self.lfo_am = self.lfo_cnt & 0x3f;
                } else {
                    self.lfo_am = self.lfo_cnt ^ 0x3f;
                }
                self.lfo_am <<= 1;
            }
            1 => {
                self.eg_quotient += 1;
                self.eg_quotient %= 3;
                self.eg_cycle = 0;
                self.eg_cycle_stop = true;
                self.eg_shift = 0;
                self.eg_timer_inc |= (self.eg_quotient >> 1) as u8;
                self.eg_timer += u16::from(self.eg_timer_inc);
                self.eg_timer_inc = (self.eg_timer >> 12) as u8;
                self.eg_timer &= 0xfff;
            }
            2 => {
                self.pg_read = self.pg_phase[21] & 0x3ff;
                self.eg_read[1] = u32::from(self.eg_out[0]);
            }
            13 => {
                self.eg_cycle = 0;
                self.eg_cycle_stop = true;
                self.eg_shift = 0;
                self.eg_timer += u16::from(self.eg_timer_inc);
                self.eg_timer_inc = (self.eg_timer >> 12) as u8;
                self.eg_timer &= 0xfff;
            }
            23 => self.lfo_inc |= 1,
            _ => {}
        }
        // The test-bit clear is an 8-bit lane: shifts past bit 7 fall off.
        self.eg_timer &= !u16::from(
            self.mode_test_21[5]
                .checked_shl(u32::from(self.eg_cycle))
                .unwrap_or(0),
        );
        if ((self.eg_timer >> self.eg_cycle) & 1 != 0
            || (self.pin_test_in != 0 && self.eg_custom_timer))
            && self.eg_cycle_stop
        {
            self.eg_shift = self.eg_cycle;
            self.eg_cycle_stop = false;
        }

        self.update_bus_latches();

        self.update_timer_a();
        self.update_timer_b();
        self.update_key_on();

        self.update_channel_output();
        self.accumulate_channel();

        self.prepare_modulation();
        self.generate_operator_output();

        self.advance_phase();
        self.update_phase_increment();

        self.update_adsr();
        self.compute_envelope_output();
        self.update_ssg_eg();
        self.prepare_envelope();

        // Stage fnum & block for the slot entering the phase pipeline
        if self.mode_ch3 != 0 {
            // Channel 3 special mode: per-operator frequency overrides
            match slot {
                1 => self.stage_frequency_3ch(1), // OP1
                7 => self.stage_frequency_3ch(0), // OP3
                13 => self.stage_frequency_3ch(2), // OP2
                _ => self.stage_frequency(), // OP4
            }
        } else {
            self.stage_frequency();
        }

        self.update_lfo();
        self.apply_register_write();
        self.cycles = (self.cycles + 1) % NUM_CYCLES;

        if self.status_time != 0 {
            self.status_time -= 1;
        }

        (self.mol, self.mor)
    }

    /// Latch the next channel's frequency settings into the phase pipeline.
    #[inline]
    fn stage_frequency(&mut self) {
        let ch = ((self.channel() + 1) % 6) as usize;
        self.pg_fnum = self.fnum[ch];
        self.pg_block = self.block[ch];
        self.pg_kcode = self.kcode[ch];
    }

    /// Latch a channel-3 special mode per-operator frequency override.
    #[inline]
    fn stage_frequency_3ch(&mut self, op: usize) {
        self.pg_fnum = self.fnum_3ch[op];
        self.pg_block = self.block_3ch[op];
        self.pg_kcode = self.kcode_3ch[op];
    }

    /// Latch key-on commands into the envelope pipeline.
    ///
    /// The operator bits written to register 0x28 are applied on the cycle
    /// whose index equals the selected channel, one slot lane at a time; CSM
    /// forces all four operators of channel 3 on while the timer strobe is
    /// held.
    fn update_key_on(&mut self) {
        let slot = self.cycles as usize;
        let ch = self.channel() as usize;
        // Key On
        self.eg_kon_latch[slot] = self.mode_kon[slot];
        self.eg_kon_csm[slot] = false;
        if self.channel() == 2 && self.mode_kon_csm {
            // CSM Key On
            self.eg_kon_latch[slot] = true;
            self.eg_kon_csm[slot] = true;
        }
        if self.cycles == u32::from(self.mode_kon_channel) {
            // OP1
            self.mode_kon[ch] = self.mode_kon_operator[0];
            // OP2
            self.mode_kon[ch + 12] = self.mode_kon_operator[1];
            // OP3
            self.mode_kon[ch + 6] = self.mode_kon_operator[2];
            // OP4
            self.mode_kon[ch + 18] = self.mode_kon_operator[3];
        }
    }

    /// All-zero state with an all-zero configuration; callers fill in the
    /// configuration and power-on defaults afterwards.
    fn zeroed() -> Self {
        Self {
            mode: ChipMode::empty(),
            output_filter: true,
            sample_rate: crate::config::DEFAULT_SAMPLE_RATE,
            clock_rate: crate::config::DEFAULT_CLOCK_RATE,
            cycles: 0,
            mol: 0,
            mor: 0,
            write_data: 0,
            write_a: 0,
            write_d: 0,
            write_a_en: false,
            write_d_en: false,
            write_busy: false,
            write_busy_cnt: 0,
            write_fm_address: false,
            write_fm_data: false,
            write_fm_mode_a: 0,
            address: 0,
            data: 0,
            pin_test_in: 0,
            busy: false,
            lfo_en: 0,
            lfo_freq: 0,
            lfo_pm: 0,
            lfo_am: 0,
            lfo_cnt: 0,
            lfo_inc: 0,
            lfo_quotient: 0,
            pg_fnum: 0,
            pg_block: 0,
            pg_kcode: 0,
            pg_inc: [0; NUM_SLOTS],
            pg_phase: [0; NUM_SLOTS],
            pg_reset: [false; NUM_SLOTS],
            pg_read: 0,
            eg_cycle: 0,
            eg_cycle_stop: false,
            eg_shift: 0,
            eg_shift_lock: 0,
            eg_timer_low_lock: 0,
            eg_timer: 0,
            eg_timer_inc: 0,
            eg_quotient: 0,
            eg_custom_timer: false,
            eg_rate: 0,
            eg_ksv: 0,
            eg_inc: 0,
            eg_rate_max: false,
            eg_sl: [0; 2],
            eg_lfo_am: 0,
            eg_tl: [0; 2],
            eg_state: [EgState::Attack; NUM_SLOTS],
            eg_level: [0; NUM_SLOTS],
            eg_out: [0; NUM_SLOTS],
            eg_kon: [false; NUM_SLOTS],
            eg_kon_csm: [false; NUM_SLOTS],
            eg_kon_latch: [false; NUM_SLOTS],
            eg_ssg_enable: [false; NUM_SLOTS],
            eg_ssg_pgrst_latch: [false; NUM_SLOTS],
            eg_ssg_repeat_latch: [false; NUM_SLOTS],
            eg_ssg_hold_up_latch: [false; NUM_SLOTS],
            eg_ssg_dir: [false; NUM_SLOTS],
            eg_ssg_inv: [false; NUM_SLOTS],
            eg_read: [0; 2],
            eg_read_inc: false,
            fm_op1: [[0; 2]; NUM_CHANNELS],
            fm_op2: [0; NUM_CHANNELS],
            fm_out: [0; NUM_SLOTS],
            fm_mod: [0; NUM_SLOTS],
            ch_acc: [0; NUM_CHANNELS],
            ch_out: [0; NUM_CHANNELS],
            ch_lock: 0,
            ch_lock_l: false,
            ch_lock_r: false,
            ch_read: 0,
            timer_a: TimerState::default(),
            timer_b: TimerState::default(),
            timer_b_subcnt: 0,
            mode_test_21: [0; 8],
            mode_test_2c: [0; 8],
            mode_ch3: 0,
            mode_kon_channel: 0,
            mode_kon_operator: [false; 4],
            mode_kon: [false; NUM_SLOTS],
            mode_csm: false,
            mode_kon_csm: false,
            dac_enable: false,
            dac_data: 0,
            ks: [0; NUM_SLOTS],
            ar: [0; NUM_SLOTS],
            sr: [0; NUM_SLOTS],
            dt: [0; NUM_SLOTS],
            multi: [0; NUM_SLOTS],
            sl: [0; NUM_SLOTS],
            rr: [0; NUM_SLOTS],
            dr: [0; NUM_SLOTS],
            am: [false; NUM_SLOTS],
            tl: [0; NUM_SLOTS],
            ssg_eg: [0; NUM_SLOTS],
            fnum: [0; NUM_CHANNELS],
            block: [0; NUM_CHANNELS],
            kcode: [0; NUM_CHANNELS],
            fnum_3ch: [0; NUM_CHANNELS],
            block_3ch: [0; NUM_CHANNELS],
            kcode_3ch: [0; NUM_CHANNELS],
            reg_a4: 0,
            reg_ac: 0,
            connect: [0; NUM_CHANNELS],
            fb: [0; NUM_CHANNELS],
            pan_l: [false; NUM_CHANNELS],
            pan_r: [false; NUM_CHANNELS],
            ams: [0; NUM_CHANNELS],
            pms: [0; NUM_CHANNELS],
            status: 0,
            status_time: 0,
            mute: [false; 7],
            rate_ratio: 0,
            sample_cnt: 0,
            old_samples: [0; 2],
            samples: [0; 2],
            queue: WriteQueue::default(),
        }
    }
}

impl Default for Ym3438 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Ym3438 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ym3438")
            .field("mode", &self.mode)
            .field("sample_rate", &self.sample_rate)
            .field("clock_rate", &self.clock_rate)
            .field("cycles", &self.cycles)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_on_defaults() {
        let chip = Ym3438::new();
        for slot in 0..NUM_SLOTS {
            assert_eq!(chip.eg_level[slot], 0x3ff);
            assert_eq!(chip.eg_out[slot], 0x3ff);
            assert_eq!(chip.eg_state[slot], EgState::Release);
            assert_eq!(chip.multi[slot], 1);
        }
        for ch in 0..NUM_CHANNELS {
            assert!(chip.pan_l[ch]);
            assert!(chip.pan_r[ch]);
        }
    }

    #[test]
    fn test_channel_is_derived_from_cycle() {
        let mut chip = Ym3438::new();
        for _ in 0..NUM_CYCLES * 3 {
            assert_eq!(chip.channel(), chip.cycles % 6);
            chip.clock();
        }
    }

    #[test]
    fn test_reset_keeps_configuration() {
        let mut chip = Ym3438::with_config(Config {
            sample_rate: 48_000,
            clock_rate: 8_000_000,
            mode: ChipMode::YM2612,
            output_filter: false,
        })
        .unwrap();
        chip.clock();
        chip.reset();
        assert_eq!(chip.sample_rate(), 48_000);
        assert_eq!(chip.clock_rate(), 8_000_000);
        assert_eq!(chip.mode(), ChipMode::YM2612);
        assert_eq!(chip.cycles, 0);
    }

    #[test]
    fn test_reset_with_clocks_recomputes_ratio() {
        let mut chip = Ym3438::new();
        let old_ratio = chip.rate_ratio;
        chip.reset_with_clocks(96_000, 7_670_454).unwrap();
        assert!(chip.rate_ratio > old_ratio);
        assert!(chip.reset_with_clocks(0, 1).is_err());
    }

    #[test]
    fn test_silent_chip_outputs_zero() {
        let mut chip = Ym3438::new();
        for _ in 0..NUM_CYCLES * 8 {
            assert_eq!(chip.clock(), (0, 0));
        }
    }
}
