//! Voice sessions: load a voice, synthesize with it, release it.

use std::path::PathBuf;

use derive_builder::Builder;

use crate::adapter::{self, SynthesisOutput, SynthesisRequest};
use crate::error::BridgeError;
use crate::SpeechEngine;

/// Everything needed to bring up a voice session.
///
/// Empty paths mean "not given": an empty `espeak_data_path` uses the
/// system espeak-ng data, an empty `config_path` looks for `<model>.json`.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct SessionConfig {
    /// Directory with the shared espeak-ng linguistic data.
    #[builder(default)]
    pub espeak_data_path: PathBuf,
    /// Voice model (`.onnx`).
    pub model_path: PathBuf,
    /// Voice metadata (`.onnx.json`).
    #[builder(default)]
    pub config_path: PathBuf,
    /// Embedded speaker to use. `None` selects the model's default speaker.
    #[builder(default, setter(strip_option))]
    pub speaker_id: Option<i64>,
    /// Phonemizer language/voice override, e.g. `"cmn"` or `"en-us"`.
    #[builder(default, setter(strip_option))]
    pub language: Option<String>,
    /// Inference threads. `None` uses the runtime default.
    #[builder(default, setter(strip_option))]
    pub num_threads: Option<usize>,
}

impl SessionConfig {
    /// Build a config from C-style arguments: negative speaker ids mean the
    /// default speaker and an empty language means no override.
    pub fn from_raw_parts(
        espeak_data_path: &str,
        model_path: &str,
        config_path: &str,
        speaker_id: i64,
        language: &str,
    ) -> Self {
        Self {
            espeak_data_path: PathBuf::from(espeak_data_path),
            model_path: PathBuf::from(model_path),
            config_path: PathBuf::from(config_path),
            speaker_id: (speaker_id >= 0).then_some(speaker_id),
            language: (!language.is_empty()).then(|| language.to_string()),
            num_threads: None,
        }
    }
}

/// A loaded voice.
///
/// Synthesis borrows the session mutably; it must not be shared between
/// threads without external serialization.
pub struct VoiceSession {
    engine: Option<Box<dyn SpeechEngine + Send>>,
}

impl VoiceSession {
    /// Load the Piper voice described by `config`.
    ///
    /// Nothing is retained on failure; the cause is logged and returned.
    #[cfg(feature = "piper")]
    pub fn initialize(config: &SessionConfig) -> Result<Self, BridgeError> {
        use crate::engines::piper::{PiperEngine, PiperModelParams};

        log::info!("Initializing voice from {}", config.model_path.display());

        let data_path = (!config.espeak_data_path.as_os_str().is_empty())
            .then(|| config.espeak_data_path.clone());
        let mut engine = PiperEngine::with_espeak(None, data_path);

        let params = PiperModelParams {
            config_path: (!config.config_path.as_os_str().is_empty())
                .then(|| config.config_path.clone()),
            speaker_id: config.speaker_id,
            num_threads: config.num_threads,
        };

        engine
            .load_model_with_params(&config.model_path, params)
            .map_err(|e| {
                log::error!("Error loading voice: {e}");
                BridgeError::Initialization(e.to_string())
            })?;

        if let Some(language) = config.language.as_deref() {
            log::info!("Setting voice language to: {language}");
            engine.set_language(language);
        }

        Ok(Self::from_engine(engine))
    }

    /// Wrap an already loaded engine.
    pub fn from_engine(engine: impl SpeechEngine + Send + 'static) -> Self {
        Self {
            engine: Some(Box::new(engine)),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    /// Sample rate the voice generates at.
    pub fn native_sample_rate(&self) -> Result<u32, BridgeError> {
        self.engine
            .as_ref()
            .map(|engine| engine.sample_rate())
            .ok_or(BridgeError::NotInitialized)
    }

    /// Synthesize at the voice's native rate.
    pub fn synthesize(&mut self, text: &str) -> Result<SynthesisOutput, BridgeError> {
        self.synthesize_request(&SynthesisRequest::native(text))
    }

    /// Synthesize and, if the request asks for it, resample.
    pub fn synthesize_request(
        &mut self,
        request: &SynthesisRequest<'_>,
    ) -> Result<SynthesisOutput, BridgeError> {
        adapter::synthesize(self, request)
    }

    /// Release the engine. Later synthesis calls fail with `NotInitialized`.
    pub fn unload(&mut self) {
        if self.engine.take().is_some() {
            log::debug!("Voice engine released");
        }
    }

    /// Release the engine and the session.
    pub fn terminate(mut self) {
        self.unload();
    }

    pub(crate) fn engine_mut(
        &mut self,
    ) -> Result<&mut (dyn SpeechEngine + Send + 'static), BridgeError> {
        self.engine.as_deref_mut().ok_or(BridgeError::NotInitialized)
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.unload();
    }
}
