use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::model::PiperError;

/// Voice metadata shipped next to a Piper model (`<voice>.onnx.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    pub audio: AudioConfig,
    #[serde(default)]
    pub espeak: EspeakVoice,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default = "default_num_speakers")]
    pub num_speakers: u32,
    pub phoneme_id_map: HashMap<String, Vec<i64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Rate the model generates audio at.
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EspeakVoice {
    /// espeak-ng voice used for phonemization, e.g. `"en-us"`.
    pub voice: String,
}

impl Default for EspeakVoice {
    fn default() -> Self {
        Self {
            voice: "en-us".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_noise_scale")]
    pub noise_scale: f32,
    #[serde(default = "default_length_scale")]
    pub length_scale: f32,
    #[serde(default = "default_noise_w")]
    pub noise_w: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            noise_scale: default_noise_scale(),
            length_scale: default_length_scale(),
            noise_w: default_noise_w(),
        }
    }
}

fn default_num_speakers() -> u32 {
    1
}

fn default_noise_scale() -> f32 {
    0.667
}

fn default_length_scale() -> f32 {
    1.0
}

fn default_noise_w() -> f32 {
    0.8
}

impl VoiceConfig {
    /// Load the voice config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, PiperError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PiperError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, PiperError> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| PiperError::Config(format!("Failed to parse JSON: {e}")))?;
        if config.audio.sample_rate == 0 {
            return Err(PiperError::Config(
                "audio.sample_rate must be positive".to_string(),
            ));
        }
        Ok(config)
    }

    /// Phoneme id map keyed by character.
    ///
    /// Piper phonemes are single code points; any other key is rejected.
    pub fn phoneme_ids(&self) -> Result<HashMap<char, Vec<i64>>, PiperError> {
        let mut map = HashMap::with_capacity(self.phoneme_id_map.len());
        for (key, ids) in &self.phoneme_id_map {
            let mut chars = key.chars();
            let (Some(ch), None) = (chars.next(), chars.next()) else {
                return Err(PiperError::Config(format!(
                    "Phoneme key {key:?} is not a single character"
                )));
            };
            map.insert(ch, ids.clone());
        }
        Ok(map)
    }
}

/// Config path to use for `model_path`: the explicit one, or `<model>.json`.
pub fn resolve_config_path(model_path: &Path, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let mut name = model_path.as_os_str().to_os_string();
            name.push(".json");
            PathBuf::from(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"{
        "audio": { "sample_rate": 22050 },
        "phoneme_id_map": { "_": [0], "^": [1], "$": [2], "a": [14] }
    }"#;

    #[test]
    fn fills_defaults() {
        let config = VoiceConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.audio.sample_rate, 22050);
        assert_eq!(config.espeak.voice, "en-us");
        assert_eq!(config.num_speakers, 1);
        assert!((config.inference.noise_scale - 0.667).abs() < 1e-6);
        assert!((config.inference.length_scale - 1.0).abs() < 1e-6);
        assert!((config.inference.noise_w - 0.8).abs() < 1e-6);
    }

    #[test]
    fn reads_full_config() {
        let json = r#"{
            "audio": { "sample_rate": 48000 },
            "espeak": { "voice": "cmn" },
            "inference": { "noise_scale": 0.5, "length_scale": 1.2, "noise_w": 0.6 },
            "num_speakers": 4,
            "speaker_id_map": { "alice": 0, "bob": 1 },
            "phoneme_id_map": { "_": [0] }
        }"#;
        let config = VoiceConfig::parse(json).unwrap();
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.espeak.voice, "cmn");
        assert_eq!(config.num_speakers, 4);
        assert!((config.inference.length_scale - 1.2).abs() < 1e-6);
    }

    #[test]
    fn rejects_zero_sample_rate() {
        let json = r#"{ "audio": { "sample_rate": 0 }, "phoneme_id_map": {} }"#;
        assert!(matches!(VoiceConfig::parse(json), Err(PiperError::Config(_))));
    }

    #[test]
    fn rejects_multi_char_phoneme_keys() {
        let json = r#"{ "audio": { "sample_rate": 16000 }, "phoneme_id_map": { "ab": [3] } }"#;
        let config = VoiceConfig::parse(json).unwrap();
        assert!(config.phoneme_ids().is_err());
    }

    #[test]
    fn converts_phoneme_keys_to_chars() {
        let ids = VoiceConfig::parse(MINIMAL).unwrap().phoneme_ids().unwrap();
        assert_eq!(ids[&'a'], vec![14]);
        assert_eq!(ids[&'^'], vec![1]);
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = VoiceConfig::load(file.path()).unwrap();
        assert_eq!(config.audio.sample_rate, 22050);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = VoiceConfig::load(Path::new("/nonexistent/voice.onnx.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/voice.onnx.json"));
    }

    #[test]
    fn default_config_path_appends_json() {
        let path = resolve_config_path(Path::new("voices/en.onnx"), None);
        assert_eq!(path, PathBuf::from("voices/en.onnx.json"));

        let explicit = resolve_config_path(Path::new("voices/en.onnx"), Some(Path::new("x.json")));
        assert_eq!(explicit, PathBuf::from("x.json"));
    }
}
