//! Speech synthesis engines.
//!
//! This module contains implementations of [`SpeechEngine`](crate::SpeechEngine).
//!
//! # Available Engines
//!
//! Enable engines via Cargo features:
//! - `piper` - Piper VITS voices (ONNX format, espeak-ng required)

#[cfg(feature = "piper")]
pub mod piper;
