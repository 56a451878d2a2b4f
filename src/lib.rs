//! Cycle-accurate Yamaha YM3438/OPN2 FM synthesizer emulator
//!
//! A gate-level-faithful emulation of the six-channel FM sound chip used in
//! the Sega Mega Drive / Genesis, modelled after the die rather than the
//! datasheet: register writes travel through the real bus latches, the 24
//! operator slots advance round-robin through a pipelined phase/envelope/
//! operator network with the silicon's stage latencies, and output is
//! bit-identical to the chip, not merely "sounds right".
//!
//! # Features
//! - Full OPN2 register map with exact address decode and busy/status
//!   semantics
//! - 24-slot pipeline: phase generator, ADSR + SSG-EG envelopes, LFO,
//!   FM operator network, channel accumulator
//! - Timers A/B with CSM key-on strobe, IRQ and test pins
//! - YM2612 vs. discrete YM3438 output stage selection per instance
//! - Timed write queue preserving write-to-sample ordering
//! - Arbitrary host sample rates via fixed-point resampling, optional
//!   analog-style low-pass
//! - Per-channel mute mask (6 FM channels + DAC)
//!
//! # Crate feature flags
//! - `export-wav` (opt-in): WAV rendering helper (enables optional `hound`
//!   dep)
//!
//! # Quick start
//! ```
//! use ym3438::Ym3438;
//!
//! let mut chip = Ym3438::new();
//! // Key on channel 1 with the power-on patch (silent, but exercises the
//! // whole pipeline deterministically).
//! chip.write_buffered(0, 0x28);
//! chip.write_buffered(1, 0xf0);
//! let mut left = [0i32; 64];
//! let mut right = [0i32; 64];
//! chip.generate_stream(&mut left, &mut right);
//! ```
//!
//! ## Selecting the chip revision
//! ```
//! use ym3438::{ChipMode, Config, Ym3438};
//!
//! let mut chip = Ym3438::with_config(Config {
//!     sample_rate: 48_000,
//!     clock_rate: 7_670_454,
//!     mode: ChipMode::YM2612 | ChipMode::READ_MODE,
//!     output_filter: true,
//! })
//! .unwrap();
//! let _sample = chip.generate();
//! ```

#![warn(missing_docs)]

mod bus;
mod chip;
mod config;
mod envelope;
mod fm;
mod lfo;
mod output;
mod phase;
mod queue;
mod tables;
mod timer;

/// Audio export helpers (requires the `export-wav` feature).
pub mod export;

pub(crate) use output::RSM_FRAC;

/// Error type for chip configuration and export operations.
///
/// The chip itself is a pure state machine with no failure modes: any byte
/// on any port is accepted and unrecognized register addresses are no-ops,
/// exactly as on the hardware. Errors only arise at the configuration
/// boundary and in the optional export helpers.
#[derive(thiserror::Error, Debug)]
pub enum Ym3438Error {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Error writing audio file
    #[error("Audio file write error: {0}")]
    AudioFileError(String),

    /// IO error from filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for emulator operations
pub type Result<T> = std::result::Result<T, Ym3438Error>;

// Public API exports
pub use chip::Ym3438;
pub use config::{ChipMode, Config, DEFAULT_CLOCK_RATE, DEFAULT_SAMPLE_RATE};
