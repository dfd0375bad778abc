use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::{EngineError, SpeechEngine, SynthesisResult};

use super::model::{resolve_speaker, PiperError, PiperModel};
use super::phonemizer::{phonemize, EspeakConfig};

/// Parameters for configuring Piper model loading.
#[derive(Debug, Clone, Default)]
pub struct PiperModelParams {
    /// Voice config path. `None` uses `<model>.json`.
    pub config_path: Option<PathBuf>,
    /// Embedded speaker. `None` uses the model default.
    pub speaker_id: Option<i64>,
    /// Number of CPU threads to use for inference.
    /// `None` uses the ORT default (typically all available cores).
    pub num_threads: Option<usize>,
}

/// Piper text-to-speech engine.
///
/// Runs a Piper VITS voice through ONNX Runtime, with espeak-ng for
/// phonemization.
///
/// # Quick Start
///
/// ```rust,no_run
/// use piper_bridge::engines::piper::PiperEngine;
/// use piper_bridge::SpeechEngine;
/// use std::path::PathBuf;
///
/// let mut engine = PiperEngine::new();
/// engine.load_model(&PathBuf::from("voices/en_US-lessac-medium.onnx"))?;
/// let result = engine.synthesize("Hello, world!")?;
/// # Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
/// ```
pub struct PiperEngine {
    model: Option<PiperModel>,
    model_path: Option<PathBuf>,
    espeak: EspeakConfig,
    language: Option<String>,
    speaker_id: Option<i64>,
}

impl Default for PiperEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PiperEngine {
    /// Create a new engine that uses `espeak-ng` from PATH.
    pub fn new() -> Self {
        Self::with_espeak(None, None)
    }

    /// Create a new engine with explicit espeak-ng binary and data paths.
    ///
    /// Either path can be `None` to fall back to the system default.
    pub fn with_espeak(bin_path: Option<PathBuf>, data_path: Option<PathBuf>) -> Self {
        Self {
            model: None,
            model_path: None,
            espeak: EspeakConfig {
                bin_path,
                data_path,
            },
            language: None,
            speaker_id: None,
        }
    }

    /// Load a voice with default parameters.
    pub fn load_model(&mut self, model_path: &Path) -> Result<(), PiperError> {
        self.load_model_with_params(model_path, PiperModelParams::default())
    }

    /// Load a voice, replacing any previously loaded one.
    ///
    /// On failure the engine is left unloaded.
    pub fn load_model_with_params(
        &mut self,
        model_path: &Path,
        params: PiperModelParams,
    ) -> Result<(), PiperError> {
        self.unload_model();

        let model = PiperModel::load(
            model_path,
            params.config_path.as_deref(),
            params.num_threads,
        )?;
        self.speaker_id = resolve_speaker(params.speaker_id, model.config().num_speakers)?;
        self.model = Some(model);
        self.model_path = Some(model_path.to_path_buf());
        Ok(())
    }

    /// Unload the current voice and free associated resources.
    pub fn unload_model(&mut self) {
        self.model = None;
        self.model_path = None;
        self.speaker_id = None;
    }

    /// Override the espeak-ng voice from the model config.
    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = Some(language.into());
    }

    /// espeak-ng voice used for phonemization.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref().or_else(|| {
            self.model
                .as_ref()
                .map(|m| m.config().espeak.voice.as_str())
        })
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }
}

impl Drop for PiperEngine {
    fn drop(&mut self) {
        self.unload_model();
    }
}

impl SpeechEngine for PiperEngine {
    fn sample_rate(&self) -> u32 {
        self.model.as_ref().map_or(0, |m| m.sample_rate())
    }

    fn synthesize(&mut self, text: &str) -> Result<SynthesisResult, EngineError> {
        let model = self.model.as_mut().ok_or(PiperError::ModelNotLoaded)?;
        let voice = self
            .language
            .as_deref()
            .unwrap_or(model.config().espeak.voice.as_str())
            .to_string();

        let start = Instant::now();
        let sentences = phonemize(text, &voice, &self.espeak)?;
        log::debug!(
            "Phonemized into {} sentence(s) with voice {voice}",
            sentences.len()
        );

        let samples = model.synthesize_sentences(&sentences, self.speaker_id)?;
        let result = SynthesisResult {
            samples,
            sample_rate: model.sample_rate(),
        };

        let elapsed = start.elapsed().as_secs_f64();
        let audio_secs = result.duration_secs();
        if audio_secs > 0.0 {
            log::debug!(
                "Real-time factor: {:.3} (infer={elapsed:.3}s, audio={audio_secs:.3}s)",
                elapsed / audio_secs
            );
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unloaded_engine_refuses_to_synthesize() {
        let mut engine = PiperEngine::new();
        assert_eq!(engine.sample_rate(), 0);
        let err = engine.synthesize("hello").unwrap_err();
        assert!(err.to_string().contains("Model not loaded"));
    }

    #[test]
    fn language_override_wins() {
        let mut engine = PiperEngine::new();
        assert_eq!(engine.language(), None);
        engine.set_language("cmn");
        assert_eq!(engine.language(), Some("cmn"));
    }

    #[test]
    fn failed_load_leaves_engine_unloaded() {
        let mut engine = PiperEngine::new();
        assert!(engine
            .load_model(Path::new("/nonexistent/voice.onnx"))
            .is_err());
        assert!(engine.model_path().is_none());
        assert_eq!(engine.sample_rate(), 0);
    }
}
