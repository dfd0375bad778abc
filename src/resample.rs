//! Sample-rate conversion for interleaved 16-bit PCM.
//!
//! Matching rates are a straight copy. Everything else goes through a
//! band-limited sinc resampler at its highest quality settings; the quality
//! tier is fixed and not exposed to callers.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Frames fed to the resampler per call.
const CHUNK_FRAMES: usize = 1024;

/// Full-scale magnitude used when normalizing i16 to float.
const I16_FULL_SCALE: f32 = 32768.0;

/// Scale applied when converting normalized float back to i16.
const I16_MAX_SCALE: f32 = 32767.0;

#[derive(thiserror::Error, Debug)]
pub enum ResampleError {
    #[error("Invalid resample configuration: {0}")]
    Configuration(String),
    #[error("Failed to create resampler: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),
    #[error("Error during resampling: {0}")]
    Execution(#[from] rubato::ResampleError),
}

/// Resample interleaved PCM from `source_rate` to `target_rate`.
///
/// `channels` describes the interleaving of `samples`; no channel mixing is
/// performed. The number of returned frames comes from what the resampler
/// actually produced, capped at `round(frames * target_rate / source_rate)`.
pub fn resample(
    samples: &[i16],
    source_rate: u32,
    target_rate: u32,
    channels: usize,
) -> Result<Vec<i16>, ResampleError> {
    if source_rate == target_rate {
        return Ok(samples.to_vec());
    }

    validate(samples.len(), source_rate, target_rate, channels)?;
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let input = deinterleave(samples, channels);
    let frames = input[0].len();
    let expected = expected_frames(frames, source_rate, target_rate);

    log::debug!(
        "Resampling {frames} frames x {channels} ch from {source_rate} Hz to {target_rate} Hz (expecting ~{expected})"
    );

    let ratio = target_rate as f64 / source_rate as f64;
    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, best_quality(), CHUNK_FRAMES, channels)?;

    // Output is aligned with the input, so nothing is trimmed from the front.
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected); channels];

    let mut pos = 0;
    while pos < frames {
        let needed = resampler.input_frames_next();
        let end = (pos + needed).min(frames);
        let chunk: Vec<&[f32]> = input.iter().map(|ch| &ch[pos..end]).collect();
        let produced = if end - pos == needed {
            resampler.process(&chunk, None)?
        } else {
            resampler.process_partial(Some(chunk.as_slice()), None)?
        };
        append_planar(&mut output, produced);
        pos = end;
    }

    // Drain the filter tail with silence until the expected length is covered.
    while output[0].len() < expected {
        let produced = resampler.process_partial(None::<&[&[f32]]>, None)?;
        if produced.first().map_or(true, |ch| ch.is_empty()) {
            break;
        }
        append_planar(&mut output, produced);
    }

    let available = output[0].len().min(expected);
    log::debug!("Resampling completed. Output size: {available} frames");

    Ok(interleave(&output, available))
}

/// Output frame estimate used to size the conversion, rounded to nearest.
pub fn expected_frames(frames: usize, source_rate: u32, target_rate: u32) -> usize {
    (frames as f64 * target_rate as f64 / source_rate as f64).round() as usize
}

/// Normalize an i16 sample to `[-1.0, 1.0]`.
pub fn to_float(sample: i16) -> f32 {
    sample as f32 / I16_FULL_SCALE
}

/// Convert a normalized sample back to i16, hard-clamping first so overshoot
/// saturates instead of wrapping.
pub fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * I16_MAX_SCALE) as i16
}

pub(crate) fn best_quality() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    }
}

fn validate(
    len: usize,
    source_rate: u32,
    target_rate: u32,
    channels: usize,
) -> Result<(), ResampleError> {
    if source_rate == 0 || target_rate == 0 {
        return Err(ResampleError::Configuration(format!(
            "sample rates must be positive (source {source_rate}, target {target_rate})"
        )));
    }
    if channels == 0 {
        return Err(ResampleError::Configuration(
            "channel count must be positive".to_string(),
        ));
    }
    if len % channels != 0 {
        return Err(ResampleError::Configuration(format!(
            "{len} samples do not divide into {channels} channels"
        )));
    }
    Ok(())
}

fn deinterleave(samples: &[i16], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            planar[ch].push(to_float(sample));
        }
    }
    planar
}

fn append_planar(dst: &mut [Vec<f32>], src: Vec<Vec<f32>>) {
    for (d, s) in dst.iter_mut().zip(src) {
        d.extend_from_slice(&s);
    }
}

fn interleave(planar: &[Vec<f32>], frames: usize) -> Vec<i16> {
    let mut out = Vec::with_capacity(frames * planar.len());
    for i in 0..frames {
        for ch in planar {
            out.push(to_i16(ch[i]));
        }
    }
    out
}
