use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::model::PiperError;

/// Where to find espeak-ng.
///
/// `None` falls back to `espeak-ng` on PATH and its built-in data directory.
#[derive(Debug, Clone, Default)]
pub struct EspeakConfig {
    pub bin_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
}

/// Convert text to IPA phonemes via espeak-ng, one entry per sentence.
///
/// Sentences end at `.`, `!`, `?` and line breaks. Clause punctuation is kept
/// as a phoneme so the voice can pause on it.
pub fn phonemize(
    text: &str,
    voice: &str,
    espeak: &EspeakConfig,
) -> Result<Vec<Vec<char>>, PiperError> {
    let parts = split_text_parts(text);
    if parts.is_empty() {
        return Ok(Vec::new());
    }

    let text_segments: Vec<&str> = parts
        .iter()
        .filter_map(|part| match part {
            TextPart::Text(segment) => Some(segment.as_str()),
            TextPart::Punct(_) => None,
        })
        .collect();

    let segment_phonemes = if text_segments.is_empty() {
        Vec::new()
    } else {
        phonemize_segments_batch(&text_segments, voice, espeak)?
    };

    let mut sentences = Vec::new();
    let mut current: Vec<char> = Vec::new();
    let mut segment_index = 0usize;
    for part in parts {
        match part {
            TextPart::Text(_) => {
                if !current.is_empty() && current.last() != Some(&' ') {
                    current.push(' ');
                }
                if let Some(phonemes) = segment_phonemes.get(segment_index) {
                    current.extend(phonemes.chars());
                }
                segment_index += 1;
            }
            TextPart::Punct(ch) => {
                current.push(ch);
                if is_sentence_end(ch) {
                    flush_sentence(&mut sentences, &mut current);
                }
            }
        }
    }
    flush_sentence(&mut sentences, &mut current);

    Ok(sentences)
}

fn flush_sentence(sentences: &mut Vec<Vec<char>>, current: &mut Vec<char>) {
    while current.last() == Some(&' ') {
        current.pop();
    }
    if current.iter().any(|ch| !is_boundary(*ch)) {
        sentences.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

fn is_sentence_end(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?')
}

fn is_boundary(ch: char) -> bool {
    ch == ' ' || map_boundary_punctuation(ch).is_some()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TextPart {
    Text(String),
    Punct(char),
}

fn split_text_parts(text: &str) -> Vec<TextPart> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for (idx, ch) in text.char_indices() {
        let ch_len = ch.len_utf8();
        if let Some(punct) = map_boundary_punctuation(ch) {
            if !is_numeric_connector_between_digits(text, idx, ch_len, ch) {
                flush_text_part(&mut parts, &mut current);
                parts.push(TextPart::Punct(punct));
                continue;
            }
        }

        if ch.is_whitespace() {
            if !current.is_empty() && !current.ends_with(' ') {
                current.push(' ');
            }
            continue;
        }

        current.push(ch);
    }

    flush_text_part(&mut parts, &mut current);
    parts
}

fn flush_text_part(parts: &mut Vec<TextPart>, current: &mut String) {
    let trimmed = current.trim();
    if trimmed.is_empty() {
        current.clear();
        return;
    }
    parts.push(TextPart::Text(trimmed.to_string()));
    current.clear();
}

fn map_boundary_punctuation(ch: char) -> Option<char> {
    match ch {
        '.' | '!' | '?' | ',' | ';' | ':' => Some(ch),
        '。' => Some('.'),
        '！' => Some('!'),
        '？' => Some('?'),
        '，' | '、' => Some(','),
        '\n' | '\r' => Some('.'),
        _ => None,
    }
}

fn is_numeric_connector_between_digits(text: &str, idx: usize, ch_len: usize, ch: char) -> bool {
    if !matches!(ch, '.' | ',') {
        return false;
    }

    let prev = text[..idx].chars().next_back();
    let next = text[idx + ch_len..].chars().next();

    matches!(
        (prev, next),
        (Some(left), Some(right)) if left.is_ascii_digit() && right.is_ascii_digit()
    )
}

fn phonemize_segments_batch(
    segments: &[&str],
    voice: &str,
    espeak: &EspeakConfig,
) -> Result<Vec<String>, PiperError> {
    let batched_input = segments.join("\n");
    let output = run_espeak(&batched_input, voice, espeak)?;
    let lines: Vec<&str> = output.lines().collect();

    // espeak-ng should emit one line per input line for stdin mode.
    // If this assumption breaks, fall back to per-segment invocation.
    if lines.len() != segments.len() {
        log::debug!(
            "espeak-ng returned {} lines for {} segments, phonemizing one by one",
            lines.len(),
            segments.len()
        );
        return segments
            .iter()
            .map(|segment| Ok(clean_ipa(&run_espeak(segment, voice, espeak)?)))
            .collect();
    }

    Ok(lines.iter().map(|line| clean_ipa(line)).collect())
}

fn run_espeak(input: &str, voice: &str, espeak: &EspeakConfig) -> Result<String, PiperError> {
    let bin = espeak
        .bin_path
        .as_deref()
        .map(|p| p.as_os_str())
        .unwrap_or_else(|| OsStr::new("espeak-ng"));

    let mut command = Command::new(bin);
    command.args(["--ipa", "--stdin", "-q", "-v", voice]);
    if let Some(data) = &espeak.data_path {
        let mut arg = OsString::from("--path=");
        arg.push(data);
        command.arg(arg);
    }

    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PiperError::EspeakNotFound
            } else {
                PiperError::Io(e)
            }
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        // espeak-ng treats stdin as line-oriented input; an unterminated last
        // line can lose its final token.
        let stdin_payload = canonicalize_espeak_stdin_payload(input);
        stdin
            .write_all(stdin_payload.as_bytes())
            .map_err(PiperError::Io)?;
    }

    let output = child.wait_with_output().map_err(PiperError::Io)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PiperError::PhonemizerFailed(format!(
            "espeak-ng exited with code {:?}: {stderr}",
            output.status.code()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn canonicalize_espeak_stdin_payload(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}

/// Join espeak output lines and drop its `_` pause markers.
fn clean_ipa(ipa: &str) -> String {
    ipa.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|&ch| ch != '_')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        canonicalize_espeak_stdin_payload, clean_ipa, phonemize, run_espeak, split_text_parts,
        EspeakConfig, TextPart,
    };
    use std::process::Command;

    fn espeak_available() -> bool {
        Command::new("espeak-ng").arg("--version").output().is_ok()
    }

    #[test]
    fn splits_text_and_punctuation_parts() {
        let parts = split_text_parts("Hello, world. Testing!");
        assert_eq!(
            parts,
            vec![
                TextPart::Text("Hello".to_string()),
                TextPart::Punct(','),
                TextPart::Text("world".to_string()),
                TextPart::Punct('.'),
                TextPart::Text("Testing".to_string()),
                TextPart::Punct('!'),
            ]
        );
    }

    #[test]
    fn keeps_decimal_and_thousands_separators_inside_text() {
        let parts = split_text_parts("Version 2.0 reached 1,000 users.");
        assert_eq!(
            parts,
            vec![
                TextPart::Text("Version 2.0 reached 1,000 users".to_string()),
                TextPart::Punct('.'),
            ]
        );
    }

    #[test]
    fn maps_full_width_punctuation() {
        let parts = split_text_parts("你好，世界。");
        assert_eq!(
            parts,
            vec![
                TextPart::Text("你好".to_string()),
                TextPart::Punct(','),
                TextPart::Text("世界".to_string()),
                TextPart::Punct('.'),
            ]
        );
    }

    #[test]
    fn line_breaks_end_sentences() {
        let parts = split_text_parts("one\ntwo");
        assert_eq!(
            parts,
            vec![
                TextPart::Text("one".to_string()),
                TextPart::Punct('.'),
                TextPart::Text("two".to_string()),
            ]
        );
    }

    #[test]
    fn empty_and_punctuation_only_text_yield_no_sentences() {
        let espeak = EspeakConfig::default();
        assert!(phonemize("", "en-us", &espeak).unwrap().is_empty());
        assert!(phonemize("   ", "en-us", &espeak).unwrap().is_empty());
        assert!(phonemize("...", "en-us", &espeak).unwrap().is_empty());
    }

    #[test]
    fn strips_pause_markers() {
        assert_eq!(clean_ipa("həlˈoʊ_\n wˈɜːld\n"), "həlˈoʊ wˈɜːld");
    }

    #[test]
    fn appends_trailing_newline_for_espeak_stdin() {
        assert_eq!(canonicalize_espeak_stdin_payload("America"), "America\n");
        assert_eq!(canonicalize_espeak_stdin_payload("America\n"), "America\n");
    }

    #[test]
    fn splits_sentences_with_espeak() {
        if !espeak_available() {
            return;
        }

        let sentences = phonemize(
            "Hello there. How are you?",
            "en-us",
            &EspeakConfig::default(),
        )
        .expect("phonemize should succeed");
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].last(), Some(&'.'));
        assert_eq!(sentences[1].last(), Some(&'?'));
    }

    #[test]
    fn espeak_output_is_stable_with_or_without_trailing_newline() {
        if !espeak_available() {
            return;
        }

        let espeak = EspeakConfig::default();
        let without_newline =
            run_espeak("America", "en-us", &espeak).expect("espeak should succeed");
        let with_newline =
            run_espeak("America\n", "en-us", &espeak).expect("espeak should succeed");
        assert_eq!(without_newline.trim(), with_newline.trim());
    }

    #[test]
    fn missing_binary_is_reported() {
        let espeak = EspeakConfig {
            bin_path: Some("/nonexistent/espeak-ng".into()),
            data_path: None,
        };
        assert!(matches!(
            run_espeak("hi", "en-us", &espeak),
            Err(super::PiperError::EspeakNotFound)
        ));
    }
}
