//! WAV file export functionality

use std::path::Path;

use crate::{Result, Ym3438, Ym3438Error};

/// Render a number of host-rate samples from a chip into a stereo WAV file.
///
/// The chip is advanced in place, so queued writes are consumed in
/// generation order; call this with a freshly configured chip (or mid-song)
/// and it picks up from the current state. Samples are scaled down to the
/// 16-bit WAV range.
///
/// # Arguments
///
/// * `chip` - chip instance to render from
/// * `sample_count` - number of stereo sample pairs to render
/// * `output_path` - path where the WAV file will be written
///
/// # Errors
///
/// Returns [`Ym3438Error::AudioFileError`] when the encoder rejects the
/// stream or the file cannot be written.
///
/// # Examples
///
/// ```no_run
/// use ym3438::{export::render_to_wav, Ym3438};
///
/// # fn main() -> ym3438::Result<()> {
/// let mut chip = Ym3438::new();
/// chip.write_buffered(0, 0x28);
/// chip.write_buffered(1, 0xf0); // key on channel 1
/// render_to_wav(&mut chip, 44_100, "one_second.wav")?;
/// # Ok(())
/// # }
/// ```
pub fn render_to_wav<P: AsRef<Path>>(
    chip: &mut Ym3438,
    sample_count: usize,
    output_path: P,
) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: chip.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(output_path, spec)
        .map_err(|e| Ym3438Error::AudioFileError(e.to_string()))?;

    for _ in 0..sample_count {
        let (left, right) = chip.generate();
        for sample in [left, right] {
            // Native output exceeds 16 bits slightly; drop two LSBs.
            let scaled = (sample >> 2).clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
            writer
                .write_sample(scaled)
                .map_err(|e| Ym3438Error::AudioFileError(e.to_string()))?;
        }
    }

    writer
        .finalize()
        .map_err(|e| Ym3438Error::AudioFileError(e.to_string()))
}
