//! Chip variant selection and per-instance configuration.
//!
//! The silicon exists in several revisions with observably different output
//! stages: the YM2612 found in early Mega Drives drives a 9-bit multiplexed
//! DAC with a distortion ("ladder effect") the discrete YM3438 does not
//! have, and later board revisions answer status reads on every port. Both
//! quirks are selected here, per instance, so independent chips can emulate
//! different revisions concurrently.

use bitflags::bitflags;

use crate::{Result, Ym3438Error};

bitflags! {
    /// Chip revision behaviour flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChipMode: u32 {
        /// YM2612 output stage: 9-bit DAC quirk, short status hold time.
        const YM2612 = 0x01;
        /// Status byte readable on any port, not just port 0.
        const READ_MODE = 0x02;
    }
}

impl Default for ChipMode {
    /// Discrete YM3438 behaviour with relaxed status reads.
    fn default() -> Self {
        ChipMode::READ_MODE
    }
}

/// Default Mega Drive master clock for the FM block (NTSC, 7.67 MHz).
pub const DEFAULT_CLOCK_RATE: u32 = 7_670_454;

/// Default audio sample rate (44.1 kHz).
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Per-instance chip configuration, applied at construction and on reset.
///
/// # Example
///
/// ```
/// use ym3438::{ChipMode, Config, Ym3438};
///
/// let config = Config {
///     mode: ChipMode::YM2612 | ChipMode::READ_MODE,
///     ..Config::default()
/// };
/// let chip = Ym3438::with_config(config).unwrap();
/// assert_eq!(chip.sample_rate(), 44_100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Host sample rate in Hz.
    pub sample_rate: u32,
    /// Chip master clock in Hz (144 master clocks per native sample).
    pub clock_rate: u32,
    /// Revision behaviour flags.
    pub mode: ChipMode,
    /// Single-pole low-pass on the summed output, modelling the analog
    /// output filter. May be toggled later with
    /// [`Ym3438::set_output_filter`](crate::Ym3438::set_output_filter).
    pub output_filter: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            clock_rate: DEFAULT_CLOCK_RATE,
            mode: ChipMode::default(),
            output_filter: true,
        }
    }
}

impl Config {
    /// Check the configuration for values the resampler cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Ym3438Error::ConfigError(
                "sample rate must be non-zero".into(),
            ));
        }
        if self.clock_rate == 0 {
            return Err(Ym3438Error::ConfigError(
                "clock rate must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
        assert_eq!(Config::default().mode, ChipMode::READ_MODE);
    }

    #[test]
    fn test_zero_rates_are_rejected() {
        let cfg = Config {
            sample_rate: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = Config {
            clock_rate: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }
}
