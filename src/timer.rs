//! Timers A (10-bit) and B (8-bit) with load-lock latching and the CSM
//! key-on strobe.
//!
//! The enable/load configuration written to register 0x27 is not consumed
//! immediately: it is locked at cycle 2 of the revolution, and the counter
//! ticks at cycle 1 (timer B through a 16-step subcounter), emulating the
//! latch delay of the silicon. Overflow flags are sticky, gated by the
//! enable bit and cleared only by an explicit reset pulse.

use crate::chip::Ym3438;

/// Free-running counter state shared by timers A and B.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TimerState {
    /// Counter value.
    pub(crate) cnt: u16,
    /// Reload value from the period registers.
    pub(crate) period: u16,
    /// Load bit as locked at cycle 2.
    pub(crate) load_lock: bool,
    /// Load bit as last written.
    pub(crate) load: bool,
    /// Overflow flag enable.
    pub(crate) enable: bool,
    /// Pending flag reset request.
    pub(crate) reset: bool,
    /// Reload the counter on the next update.
    pub(crate) load_latch: bool,
    /// Sticky overflow flag visible in the status byte.
    pub(crate) overflow_flag: bool,
    /// Raw overflow of the last tick.
    pub(crate) overflow: bool,
}

impl Ym3438 {
    /// Advance timer A by one cycle; drives the CSM key-on strobe.
    pub(crate) fn update_timer_a(&mut self) {
        let mut load = self.timer_a.overflow;
        if self.cycles == 2 {
            // Lock load value
            load |= !self.timer_a.load_lock && self.timer_a.load;
            self.timer_a.load_lock = self.timer_a.load;
            if self.mode_csm {
                // CSM KeyOn
                self.mode_kon_csm = load;
            } else {
                self.mode_kon_csm = false;
            }
        }
        // Load counter
        let mut time = if self.timer_a.load_latch {
            self.timer_a.period
        } else {
            self.timer_a.cnt
        };
        self.timer_a.load_latch = load;
        // Increase counter
        if (self.cycles == 1 && self.timer_a.load_lock) || self.mode_test_21[2] != 0 {
            time += 1;
        }
        // Set overflow flag
        if self.timer_a.reset {
            self.timer_a.reset = false;
            self.timer_a.overflow_flag = false;
        } else {
            self.timer_a.overflow_flag |= self.timer_a.overflow && self.timer_a.enable;
        }
        self.timer_a.overflow = time >> 10 != 0;
        self.timer_a.cnt = time & 0x3ff;
    }

    /// Advance timer B by one cycle (counts 16 times slower than timer A).
    pub(crate) fn update_timer_b(&mut self) {
        let mut load = self.timer_b.overflow;
        if self.cycles == 2 {
            // Lock load value
            load |= !self.timer_b.load_lock && self.timer_b.load;
            self.timer_b.load_lock = self.timer_b.load;
        }
        // Load counter
        let mut time = if self.timer_b.load_latch {
            self.timer_b.period
        } else {
            self.timer_b.cnt
        };
        self.timer_b.load_latch = load;
        // Increase counter
        if self.cycles == 1 {
            self.timer_b_subcnt += 1;
        }
        if (self.timer_b_subcnt == 0x10 && self.timer_b.load_lock) || self.mode_test_21[2] != 0 {
            time += 1;
        }
        self.timer_b_subcnt &= 0x0f;
        // Set overflow flag
        if self.timer_b.reset {
            self.timer_b.reset = false;
            self.timer_b.overflow_flag = false;
        } else {
            self.timer_b.overflow_flag |= self.timer_b.overflow && self.timer_b.enable;
        }
        self.timer_b.overflow = time >> 8 != 0;
        self.timer_b.cnt = time & 0xff;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_committed(chip: &mut Ym3438, port: u32, data: u8) {
        chip.write(port, data);
        for _ in 0..24 {
            chip.clock();
        }
    }

    fn run_revolutions(chip: &mut Ym3438, n: u32) {
        for _ in 0..n * 24 {
            chip.clock();
        }
    }

    #[test]
    fn test_timer_a_overflow_sets_flag_and_irq() {
        let mut chip = Ym3438::new();
        // Period 0x3fe: two ticks to overflow.
        write_committed(&mut chip, 0, 0x24);
        write_committed(&mut chip, 1, 0xff);
        write_committed(&mut chip, 0, 0x25);
        write_committed(&mut chip, 1, 0x02);
        write_committed(&mut chip, 0, 0x27);
        write_committed(&mut chip, 1, 0x05); // load + enable A
        run_revolutions(&mut chip, 8);
        assert!(chip.timer_a.overflow_flag);
        assert_eq!(chip.read_irq_pin(), 1);
        assert_eq!(chip.read(0) & 0x01, 0x01);
    }

    #[test]
    fn test_timer_a_reset_pulse_clears_flag() {
        let mut chip = Ym3438::new();
        write_committed(&mut chip, 0, 0x24);
        write_committed(&mut chip, 1, 0xff);
        write_committed(&mut chip, 0, 0x25);
        write_committed(&mut chip, 1, 0x03);
        write_committed(&mut chip, 0, 0x27);
        write_committed(&mut chip, 1, 0x05);
        run_revolutions(&mut chip, 8);
        assert!(chip.timer_a.overflow_flag);
        // Stop the timer and pulse the reset bit.
        write_committed(&mut chip, 0, 0x27);
        write_committed(&mut chip, 1, 0x10);
        assert!(!chip.timer_a.overflow_flag);
        assert!(!chip.timer_a.reset); // the pulse self-clears
    }

    #[test]
    fn test_timer_b_counts_sixteen_times_slower() {
        let mut chip = Ym3438::new();
        write_committed(&mut chip, 0, 0x26);
        write_committed(&mut chip, 1, 0xff);
        write_committed(&mut chip, 0, 0x27);
        write_committed(&mut chip, 1, 0x0a); // load + enable B
        // One timer B tick needs 16 revolutions; the first overflow follows
        // right after the reload of 0xff.
        run_revolutions(&mut chip, 40);
        assert!(chip.timer_b.overflow_flag);
        assert_eq!(chip.read(0) & 0x02, 0x02);
    }

    #[test]
    fn test_csm_strobe_fires_once_per_overflow() {
        let mut chip = Ym3438::new();
        write_committed(&mut chip, 0, 0x24);
        write_committed(&mut chip, 1, 0xff);
        write_committed(&mut chip, 0, 0x25);
        write_committed(&mut chip, 1, 0x00); // period 0x3fc: overflow every 4 revolutions
        write_committed(&mut chip, 0, 0x27);
        write_committed(&mut chip, 1, 0x85); // CSM mode, load + enable A
        let mut strobes = 0;
        let mut overflows = 0;
        let mut saw_csm_kon = false;
        let mut prev_strobe = chip.mode_kon_csm;
        let mut prev_overflow = chip.timer_a.overflow;
        for _ in 0..24 * 64 {
            chip.clock();
            if chip.mode_kon_csm && !prev_strobe {
                strobes += 1;
            }
            if chip.timer_a.overflow && !prev_overflow {
                overflows += 1;
            }
            // The strobe latches channel 3 operators on while held.
            saw_csm_kon |= chip.eg_kon_csm[2];
            prev_strobe = chip.mode_kon_csm;
            prev_overflow = chip.timer_a.overflow;
        }
        // One rising edge per overflow: the strobe must have cleared in
        // between for the counts to match.
        assert!(overflows > 0, "timer A never overflowed");
        assert_eq!(strobes, overflows);
        assert!(saw_csm_kon);
    }
}
