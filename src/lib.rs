//! # piper-bridge
//!
//! A C-callable bridge around a neural text-to-speech voice with an optional
//! sample-rate conversion stage.
//!
//! ## Features
//!
//! - **Voice sessions**: load a Piper voice once, synthesize many times
//! - **Resampling**: deliver 16-bit PCM at any rate the caller asks for
//! - **Stable ABI**: opaque session handles and self-describing output buffers
//!   (see `include/piper_bridge.h`)
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! piper-bridge = { version = "2026.2", features = ["piper"] }
//! ```
//!
//! ```ignore
//! use piper_bridge::{OutputFormat, SessionConfigBuilder, SynthesisRequest, VoiceSession};
//!
//! let config = SessionConfigBuilder::default()
//!     .model_path("voices/en_US-lessac-medium.onnx")
//!     .build()?;
//! let mut session = VoiceSession::initialize(&config)?;
//!
//! let request = SynthesisRequest::resampled("Hello, world!", OutputFormat::mono(16000));
//! let output = session.synthesize_request(&request)?;
//! println!("{} samples at {} Hz", output.samples.len(), output.sample_rate);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Threading
//!
//! A session is not safe for concurrent synthesis; serialize calls per handle
//! or use one handle per thread. Separate sessions share no mutable state in
//! this crate. Piper inference itself has no process-wide state, and
//! phonemization runs `espeak-ng` as a child process per call.

pub mod adapter;
pub mod buffer;
pub mod engines;
pub mod error;
pub mod ffi;
pub mod logging;
pub mod resample;
pub mod session;

pub use adapter::{OutputFormat, SynthesisOutput, SynthesisRequest};
pub use buffer::PcmBuffer;
pub use error::BridgeError;
pub use session::{SessionConfig, SessionConfigBuilder, VoiceSession};

/// Raw audio produced by a [`SpeechEngine`].
///
/// Samples are interleaved signed 16-bit PCM at the engine's native rate.
#[derive(Debug, Clone, Default)]
pub struct SynthesisResult {
    /// Raw audio samples
    pub samples: Vec<i16>,
    /// Sample rate the engine generated at
    pub sample_rate: u32,
}

impl SynthesisResult {
    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Error type returned by engines; the bridge only needs its message.
pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// A loaded text-to-speech voice.
///
/// This is the seam to the external engine: phonemization and neural
/// inference live behind it, the bridge only drives it.
pub trait SpeechEngine {
    /// Native sample rate of the loaded voice.
    fn sample_rate(&self) -> u32;

    /// Synthesize speech from the given text.
    ///
    /// Empty text must yield an empty result, not an error.
    fn synthesize(&mut self, text: &str) -> Result<SynthesisResult, EngineError>;
}
