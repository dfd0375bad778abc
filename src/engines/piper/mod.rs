//! Piper text-to-speech engine implementation.
//!
//! Piper voices are VITS models exported to ONNX, each paired with a JSON
//! config describing its sample rate, speakers and phoneme table. The engine
//! uses espeak-ng for phonemization.
//!
//! # System Requirements
//!
//! **espeak-ng** must be installed, or its binary and data directory passed
//! to [`PiperEngine::with_espeak`]:
//! - **Linux**: `sudo apt-get install espeak-ng`
//! - **macOS**: `brew install espeak-ng`
//! - **Windows**: Download installer from <https://espeak-ng.org/download>
//!
//! # Voice Layout
//!
//! ```text
//! voices/
//! ├── en_US-lessac-medium.onnx        # VITS model
//! └── en_US-lessac-medium.onnx.json   # sample rate, speakers, phoneme_id_map
//! ```
//!
//! Voices: <https://huggingface.co/rhasspy/piper-voices>
//!
//! # Synthesis
//!
//! Text is split into sentences, each sentence is phonemized and run through
//! the model on its own, peak-normalized to 16-bit PCM, and followed by
//! 0.2 s of silence. Output is mono at the voice's native rate.

pub mod config;
pub mod engine;
pub mod model;
pub mod phonemizer;

pub use config::VoiceConfig;
pub use engine::{PiperEngine, PiperModelParams};
pub use model::PiperError;
