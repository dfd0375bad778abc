use std::collections::HashMap;
use std::path::Path;

use ndarray::Array2;
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use super::config::{resolve_config_path, VoiceConfig};

/// Peak value of 16-bit PCM output.
const MAX_WAV_VALUE: f32 = 32767.0;

/// Floor on the normalization peak so near-silent sentences are not blown up.
const MIN_AUDIO_PEAK: f32 = 0.01;

/// Silence appended after every sentence.
pub const SENTENCE_SILENCE_SECS: f32 = 0.2;

const PAD: char = '_';
const BOS: char = '^';
const EOS: char = '$';

#[derive(thiserror::Error, Debug)]
pub enum PiperError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error(
        "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
         macOS: `brew install espeak-ng`, Windows: https://espeak-ng.org/download"
    )]
    EspeakNotFound,
    #[error("Phonemization failed: {0}")]
    PhonemizerFailed(String),
    #[error("Speaker {id} not found; model has {num_speakers} speaker(s)")]
    SpeakerNotFound { id: i64, num_speakers: u32 },
    #[error("Model not loaded. Call load_model() first.")]
    ModelNotLoaded,
    #[error("Invalid voice config: {0}")]
    Config(String),
}

/// Internal Piper ONNX model state.
pub struct PiperModel {
    session: Session,
    config: VoiceConfig,
    phoneme_ids: HashMap<char, Vec<i64>>,
    /// True for multi-speaker graphs that take a `sid` input
    has_sid_input: bool,
}

impl PiperModel {
    /// Load a Piper voice.
    ///
    /// The config is read first so a bad path fails before ONNX Runtime is
    /// touched. `config_path` defaults to `<model_path>.json`.
    pub fn load(
        model_path: &Path,
        config_path: Option<&Path>,
        num_threads: Option<usize>,
    ) -> Result<Self, PiperError> {
        let config_path = resolve_config_path(model_path, config_path);
        log::info!("Loading voice config from {}", config_path.display());
        let config = VoiceConfig::load(&config_path)?;
        let phoneme_ids = config.phoneme_ids()?;

        if !model_path.is_file() {
            return Err(PiperError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Voice model not found at {}", model_path.display()),
            )));
        }

        log::info!("Loading Piper model from {}", model_path.display());
        let session = init_session(model_path, num_threads)?;
        let has_sid_input = session.inputs().iter().any(|input| input.name() == "sid");

        log::info!(
            "Voice loaded: sample_rate={}, speakers={}, sid_input={}",
            config.audio.sample_rate,
            config.num_speakers,
            has_sid_input
        );

        Ok(Self {
            session,
            config,
            phoneme_ids,
            has_sid_input,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.audio.sample_rate
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    /// Synthesize each phonemized sentence and join them with sentence silence.
    pub fn synthesize_sentences(
        &mut self,
        sentences: &[Vec<char>],
        speaker_id: Option<i64>,
    ) -> Result<Vec<i16>, PiperError> {
        let silence = (SENTENCE_SILENCE_SECS * self.sample_rate() as f32) as usize;
        let mut combined = Vec::new();

        for phonemes in sentences {
            let ids = phonemes_to_ids(phonemes, &self.phoneme_ids);
            let audio = self.infer(&ids, speaker_id)?;
            if audio.is_empty() {
                continue;
            }
            combined.extend(audio_to_pcm(&audio));
            combined.resize(combined.len() + silence, 0);
        }

        Ok(combined)
    }

    /// Run ONNX inference on one sentence of phoneme ids.
    fn infer(&mut self, ids: &[i64], speaker_id: Option<i64>) -> Result<Vec<f32>, PiperError> {
        let input = Array2::from_shape_vec((1, ids.len()), ids.to_vec())?;
        let input_lengths = ndarray::arr1(&[ids.len() as i64]);
        let inference = &self.config.inference;
        let scales = ndarray::arr1(&[
            inference.noise_scale,
            inference.length_scale,
            inference.noise_w,
        ]);

        let output = if self.has_sid_input {
            let sid = ndarray::arr1(&[speaker_id.unwrap_or(0)]);
            let inputs = inputs![
                "input" => TensorRef::from_array_view(input.view())?,
                "input_lengths" => TensorRef::from_array_view(input_lengths.view())?,
                "scales" => TensorRef::from_array_view(scales.view())?,
                "sid" => TensorRef::from_array_view(sid.view())?,
            ];
            self.session.run(inputs)?
        } else {
            let inputs = inputs![
                "input" => TensorRef::from_array_view(input.view())?,
                "input_lengths" => TensorRef::from_array_view(input_lengths.view())?,
                "scales" => TensorRef::from_array_view(scales.view())?,
            ];
            self.session.run(inputs)?
        };

        let first_output = output
            .iter()
            .next()
            .ok_or_else(|| PiperError::Ort(ort::Error::new("No output from model")))?;
        let waveform = first_output.1.try_extract_array::<f32>()?;

        Ok(waveform.iter().copied().collect())
    }
}

/// Map phonemes to model ids: `^`, then each phoneme followed by `_`, then `$`.
///
/// Phonemes missing from the map are dropped.
pub fn phonemes_to_ids(phonemes: &[char], map: &HashMap<char, Vec<i64>>) -> Vec<i64> {
    let pad = map.get(&PAD);
    let mut ids = Vec::with_capacity(phonemes.len() * 2 + 2);

    if let Some(bos) = map.get(&BOS) {
        ids.extend_from_slice(bos);
    }
    if let Some(pad) = pad {
        ids.extend_from_slice(pad);
    }

    for ch in phonemes {
        match map.get(ch) {
            Some(phoneme_ids) => {
                ids.extend_from_slice(phoneme_ids);
                if let Some(pad) = pad {
                    ids.extend_from_slice(pad);
                }
            }
            None => log::debug!("Missing phoneme {ch:?} in id map"),
        }
    }

    if let Some(eos) = map.get(&EOS) {
        ids.extend_from_slice(eos);
    }
    ids
}

/// Peak-normalize float audio into 16-bit PCM.
pub fn audio_to_pcm(audio: &[f32]) -> Vec<i16> {
    let peak = audio.iter().fold(0.0f32, |max, s| max.max(s.abs()));
    let scale = MAX_WAV_VALUE / peak.max(MIN_AUDIO_PEAK);
    audio
        .iter()
        .map(|&s| (s * scale).clamp(-MAX_WAV_VALUE, MAX_WAV_VALUE) as i16)
        .collect()
}

/// Pick the `sid` to feed the model, validating it against the speaker count.
///
/// Multi-speaker voices default to speaker 0; single-speaker voices take no
/// speaker id at all.
pub fn resolve_speaker(
    requested: Option<i64>,
    num_speakers: u32,
) -> Result<Option<i64>, PiperError> {
    let multi = num_speakers > 1;
    match requested {
        None => Ok(multi.then_some(0)),
        Some(id) if id >= 0 && id < i64::from(num_speakers.max(1)) => Ok(multi.then_some(id)),
        Some(id) => Err(PiperError::SpeakerNotFound { id, num_speakers }),
    }
}

fn init_session(onnx_path: &Path, num_threads: Option<usize>) -> Result<Session, PiperError> {
    let providers = vec![CPUExecutionProvider::default().build()];

    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_execution_providers(providers)?;

    if let Some(threads) = num_threads {
        builder = builder
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?;
    }

    Ok(builder.commit_from_file(onnx_path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_map() -> HashMap<char, Vec<i64>> {
        [('_', 0), ('^', 1), ('$', 2), (' ', 3), ('h', 20), ('i', 21)]
            .into_iter()
            .map(|(ch, id)| (ch, vec![id]))
            .collect()
    }

    #[test]
    fn wraps_phonemes_with_bos_pad_eos() {
        let ids = phonemes_to_ids(&['h', 'i'], &id_map());
        assert_eq!(ids, vec![1, 0, 20, 0, 21, 0, 2]);
    }

    #[test]
    fn drops_unknown_phonemes() {
        let ids = phonemes_to_ids(&['h', 'ʒ', 'i'], &id_map());
        assert_eq!(ids, vec![1, 0, 20, 0, 21, 0, 2]);
    }

    #[test]
    fn normalizes_to_full_scale() {
        let pcm = audio_to_pcm(&[0.0, 0.25, -0.5]);
        assert_eq!(pcm, vec![0, 16383, -32767]);
    }

    #[test]
    fn quiet_audio_is_not_amplified_past_floor() {
        let pcm = audio_to_pcm(&[0.001, -0.001]);
        assert_eq!(pcm, vec![3276, -3276]);
    }

    #[test]
    fn default_speaker_depends_on_model() {
        assert_eq!(resolve_speaker(None, 1).unwrap(), None);
        assert_eq!(resolve_speaker(None, 4).unwrap(), Some(0));
    }

    #[test]
    fn validates_speaker_range() {
        assert_eq!(resolve_speaker(Some(3), 4).unwrap(), Some(3));
        assert_eq!(resolve_speaker(Some(0), 1).unwrap(), None);
        assert!(matches!(
            resolve_speaker(Some(4), 4),
            Err(PiperError::SpeakerNotFound { id: 4, .. })
        ));
        assert!(resolve_speaker(Some(1), 1).is_err());
    }

    #[test]
    fn missing_config_fails_before_model_load() {
        let err = PiperModel::load(Path::new("/nonexistent/voice.onnx"), None, None)
            .err()
            .expect("load should fail");
        assert!(matches!(err, PiperError::Config(_)));
    }
}
