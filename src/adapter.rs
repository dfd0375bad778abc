//! Turns a synthesis request into an engine call plus an optional resample.
//!
//! Engine failures, including panics, stop here and come back as
//! [`BridgeError::Synthesis`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::BridgeError;
use crate::resample::{self, ResampleError};
use crate::session::VoiceSession;
use crate::{SpeechEngine, SynthesisResult};

/// Sample rate and interleaving the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl OutputFormat {
    pub fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
        }
    }
}

/// A single synthesis call.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub text: &'a str,
    /// `None` returns audio at the voice's native rate.
    pub target: Option<OutputFormat>,
}

impl<'a> SynthesisRequest<'a> {
    pub fn native(text: &'a str) -> Self {
        Self { text, target: None }
    }

    pub fn resampled(text: &'a str, target: OutputFormat) -> Self {
        Self {
            text,
            target: Some(target),
        }
    }
}

/// Audio handed back for a request.
#[derive(Debug, Clone, Default)]
pub struct SynthesisOutput {
    /// Interleaved 16-bit PCM at `sample_rate`.
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Rate the voice generated at before any conversion.
    pub native_sample_rate: u32,
    /// Length of the synthesized speech. Informational only.
    pub duration_secs: f64,
}

/// Run `request` against the session's engine.
///
/// Empty engine output is a success with no samples; the resampler is
/// skipped for it.
pub fn synthesize(
    session: &mut VoiceSession,
    request: &SynthesisRequest<'_>,
) -> Result<SynthesisOutput, BridgeError> {
    let engine = session.engine_mut()?;

    log::info!("Starting synthesis for text: {:?}", request.text);
    let result = invoke_engine(engine, request.text)?;
    let duration_secs = result.duration_secs();
    log::info!(
        "Synthesis completed. Buffer size: {}, audio duration: {duration_secs:.3}s",
        result.samples.len()
    );

    let native_sample_rate = result.sample_rate;
    if result.samples.is_empty() {
        log::warn!("Synthesis produced empty audio buffer");
        let (sample_rate, channels) = request
            .target
            .map_or((native_sample_rate, 1), |t| (t.sample_rate, t.channels));
        return Ok(SynthesisOutput {
            sample_rate,
            channels,
            native_sample_rate,
            ..Default::default()
        });
    }

    let Some(target) = request.target else {
        return Ok(SynthesisOutput {
            samples: result.samples,
            sample_rate: native_sample_rate,
            channels: 1,
            native_sample_rate,
            duration_secs,
        });
    };

    if target.sample_rate == 0 || target.channels == 0 {
        return Err(ResampleError::Configuration(format!(
            "unsupported output format {} Hz x {} ch",
            target.sample_rate, target.channels
        ))
        .into());
    }

    log::info!(
        "Original sample rate: {native_sample_rate}, Target sample rate: {}",
        target.sample_rate
    );
    let samples = resample::resample(
        &result.samples,
        native_sample_rate,
        target.sample_rate,
        target.channels as usize,
    )
    .map_err(|e| {
        log::error!("{e}");
        BridgeError::from(e)
    })?;

    Ok(SynthesisOutput {
        samples,
        sample_rate: target.sample_rate,
        channels: target.channels,
        native_sample_rate,
        duration_secs,
    })
}

fn invoke_engine(
    engine: &mut (dyn SpeechEngine + Send),
    text: &str,
) -> Result<SynthesisResult, BridgeError> {
    match panic::catch_unwind(AssertUnwindSafe(|| engine.synthesize(text))) {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => {
            log::error!("Error synthesizing speech: {e}");
            Err(BridgeError::Synthesis(e.to_string()))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::error!("Engine panicked during synthesis: {message}");
            Err(BridgeError::Synthesis(message))
        }
    }
}

/// Best-effort text for a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineError;

    enum Behavior {
        Samples(Vec<i16>),
        Fail,
        Panic,
    }

    struct ScriptedEngine {
        rate: u32,
        behavior: Behavior,
    }

    impl SpeechEngine for ScriptedEngine {
        fn sample_rate(&self) -> u32 {
            self.rate
        }

        fn synthesize(&mut self, text: &str) -> Result<SynthesisResult, EngineError> {
            match &self.behavior {
                Behavior::Samples(_) if text.is_empty() => Ok(SynthesisResult {
                    samples: Vec::new(),
                    sample_rate: self.rate,
                }),
                Behavior::Samples(samples) => Ok(SynthesisResult {
                    samples: samples.clone(),
                    sample_rate: self.rate,
                }),
                Behavior::Fail => Err("phonemizer exploded".into()),
                Behavior::Panic => panic!("inference crashed"),
            }
        }
    }

    fn session(behavior: Behavior) -> VoiceSession {
        VoiceSession::from_engine(ScriptedEngine {
            rate: 48000,
            behavior,
        })
    }

    fn ramp(len: usize) -> Vec<i16> {
        (0..len).map(|i| ((i % 200) as i16 - 100) * 100).collect()
    }

    #[test]
    fn native_request_returns_engine_samples() {
        let samples = ramp(48000);
        let mut s = session(Behavior::Samples(samples.clone()));
        let output = s.synthesize("hello").unwrap();
        assert_eq!(output.samples, samples);
        assert_eq!(output.sample_rate, 48000);
        assert_eq!(output.native_sample_rate, 48000);
        assert!((output.duration_secs - 1.0).abs() < 1e-9);
    }

    #[test]
    fn same_rate_target_is_exact_copy() {
        let samples = ramp(48000);
        let mut s = session(Behavior::Samples(samples.clone()));
        let request = SynthesisRequest::resampled("hello", OutputFormat::mono(48000));
        let output = s.synthesize_request(&request).unwrap();
        assert_eq!(output.samples, samples);
    }

    #[test]
    fn lower_target_rate_shrinks_output() {
        let mut s = session(Behavior::Samples(ramp(48000)));
        let request = SynthesisRequest::resampled("hello", OutputFormat::mono(16000));
        let output = s.synthesize_request(&request).unwrap();
        assert!(output.samples.len().abs_diff(16000) <= 1);
        assert!(output.samples.len() <= 16000);
        assert_eq!(output.sample_rate, 16000);
        assert_eq!(output.native_sample_rate, 48000);
    }

    #[test]
    fn empty_text_is_success_without_samples() {
        let mut s = session(Behavior::Samples(ramp(10)));
        let request = SynthesisRequest::resampled("", OutputFormat::mono(16000));
        let output = s.synthesize_request(&request).unwrap();
        assert!(output.samples.is_empty());
        assert_eq!(output.duration_secs, 0.0);
    }

    #[test]
    fn engine_error_becomes_synthesis_failure() {
        let mut s = session(Behavior::Fail);
        let err = s.synthesize("hello").unwrap_err();
        assert!(matches!(err, BridgeError::Synthesis(ref m) if m.contains("phonemizer")));
    }

    #[test]
    fn engine_panic_is_contained() {
        let mut s = session(Behavior::Panic);
        let err = s.synthesize("hello").unwrap_err();
        assert!(matches!(err, BridgeError::Synthesis(ref m) if m.contains("inference crashed")));
        // The session stays usable after a contained panic.
        assert!(s.is_initialized());
    }

    #[test]
    fn zero_channel_target_is_configuration_failure() {
        let mut s = session(Behavior::Samples(ramp(100)));
        let request = SynthesisRequest::resampled(
            "hello",
            OutputFormat {
                sample_rate: 16000,
                channels: 0,
            },
        );
        let err = s.synthesize_request(&request).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Resample(ResampleError::Configuration(_))
        ));
    }

    #[test]
    fn odd_sample_count_cannot_be_read_as_stereo() {
        let mut s = session(Behavior::Samples(ramp(101)));
        let request = SynthesisRequest::resampled(
            "hello",
            OutputFormat {
                sample_rate: 16000,
                channels: 2,
            },
        );
        assert_eq!(s.synthesize_request(&request).unwrap_err().status(), -3);
    }
}
