//! C ABI for voice sessions.
//!
//! ```text
//! piper_bridge_init ──► handle ──► piper_bridge_text_to_audio[_resampled] ──► buffer
//!                          │                                                    │
//!                          ▼                                                    ▼
//!                 piper_bridge_terminate                            piper_bridge_free_audio
//! ```
//!
//! Status codes: `0` success (including empty audio), `-1` invalid argument,
//! `-2` synthesis failure, `-3` resample configuration failure, `-4` resample
//! execution failure, `-5` output buffer allocation failure.
//!
//! Every exported function catches panics; nothing unwinds into the caller.
//! The declarations live in `include/piper_bridge.h`.

use std::ffi::{c_char, c_int, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use crate::adapter::{panic_message, OutputFormat, SynthesisRequest};
use crate::buffer::PcmBuffer;
use crate::error::{BridgeError, STATUS_OK};
use crate::resample::ResampleError;
use crate::session::VoiceSession;

/// Opaque session handle handed to C callers.
pub type PiperBridgeSession = VoiceSession;

/// Load a voice and return a session handle, or null on failure.
///
/// Null `espeak_data_path`, `config_path` or `language` are treated as empty.
/// A negative `speaker_id` selects the model's default speaker. The failure
/// cause is logged.
///
/// # Safety
///
/// Every non-null pointer must reference a valid NUL-terminated string.
#[cfg(feature = "piper")]
#[no_mangle]
pub unsafe extern "C" fn piper_bridge_init(
    espeak_data_path: *const c_char,
    model_path: *const c_char,
    config_path: *const c_char,
    speaker_id: c_int,
    language: *const c_char,
) -> *mut PiperBridgeSession {
    crate::logging::init();

    guard("piper_bridge_init", ptr::null_mut(), || {
        let session = (|| {
            // SAFETY: caller guarantees the pointers are null or valid C strings.
            let config = unsafe {
                crate::session::SessionConfig::from_raw_parts(
                    optional_str(espeak_data_path, "espeak_data_path")?,
                    required_str(model_path, "model_path")?,
                    optional_str(config_path, "config_path")?,
                    i64::from(speaker_id),
                    optional_str(language, "language")?,
                )
            };
            VoiceSession::initialize(&config)
        })();

        match session {
            Ok(session) => Box::into_raw(Box::new(session)),
            Err(e) => {
                log::error!("Error initializing piper: {e}");
                ptr::null_mut()
            }
        }
    })
}

/// Synthesize `text` at the voice's native sample rate.
///
/// On success `*audio_buffer` owns `*audio_length` samples and must be
/// released with [`piper_bridge_free_audio`]. Empty audio returns `0` with a
/// null buffer and zero length.
///
/// # Safety
///
/// `session` must be null or a live handle from [`piper_bridge_init`], `text`
/// null or a valid C string, and the out-pointers null or writable.
#[no_mangle]
pub unsafe extern "C" fn piper_bridge_text_to_audio(
    session: *mut PiperBridgeSession,
    text: *const c_char,
    audio_buffer: *mut *mut i16,
    audio_length: *mut c_int,
) -> c_int {
    unsafe { text_to_audio(session, text, None, audio_buffer, audio_length) }
}

/// Synthesize `text` and convert it to `sample_rate` with `channels`
/// interleaved channels.
///
/// When `sample_rate` equals the voice's native rate the samples are copied
/// unchanged.
///
/// # Safety
///
/// Same contract as [`piper_bridge_text_to_audio`].
#[no_mangle]
pub unsafe extern "C" fn piper_bridge_text_to_audio_resampled(
    session: *mut PiperBridgeSession,
    text: *const c_char,
    audio_buffer: *mut *mut i16,
    audio_length: *mut c_int,
    sample_rate: c_int,
    channels: c_int,
) -> c_int {
    unsafe {
        text_to_audio(
            session,
            text,
            Some((sample_rate, channels)),
            audio_buffer,
            audio_length,
        )
    }
}

/// Native sample rate of the session's voice, or `-1` for a null or
/// unloaded handle.
///
/// # Safety
///
/// `session` must be null or a live handle from [`piper_bridge_init`].
#[no_mangle]
pub unsafe extern "C" fn piper_bridge_sample_rate(session: *const PiperBridgeSession) -> c_int {
    guard("piper_bridge_sample_rate", -1, || {
        // SAFETY: caller guarantees session is null or live.
        let Some(session) = (unsafe { session.as_ref() }) else {
            return BridgeError::InvalidArgument("null session".into()).status();
        };
        match session.native_sample_rate() {
            Ok(rate) => c_int::try_from(rate).unwrap_or(-1),
            Err(e) => e.status(),
        }
    })
}

/// Release a buffer returned by a synthesis call. Null is a no-op.
///
/// # Safety
///
/// `audio_buffer` must be null or a buffer from this library that has not
/// been freed yet.
#[no_mangle]
pub unsafe extern "C" fn piper_bridge_free_audio(audio_buffer: *mut i16) {
    guard("piper_bridge_free_audio", (), || {
        // SAFETY: caller guarantees the buffer came from into_raw and is unfreed.
        drop(unsafe { PcmBuffer::from_raw(audio_buffer) });
    })
}

/// Release a session and its voice. Null is a no-op.
///
/// # Safety
///
/// `session` must be null or a live handle from [`piper_bridge_init`]; it is
/// invalid after this call.
#[no_mangle]
pub unsafe extern "C" fn piper_bridge_terminate(session: *mut PiperBridgeSession) {
    if session.is_null() {
        return;
    }
    guard("piper_bridge_terminate", (), || {
        // SAFETY: caller guarantees session was produced by Box::into_raw in
        // piper_bridge_init and not terminated yet.
        let session = unsafe { Box::from_raw(session) };
        session.terminate();
        log::debug!("Session terminated");
    })
}

unsafe fn text_to_audio(
    session: *mut PiperBridgeSession,
    text: *const c_char,
    target: Option<(c_int, c_int)>,
    audio_buffer: *mut *mut i16,
    audio_length: *mut c_int,
) -> c_int {
    if audio_buffer.is_null() || audio_length.is_null() {
        log::error!("Invalid arguments passed to piper_bridge_text_to_audio");
        return BridgeError::InvalidArgument("null output pointer".into()).status();
    }
    // SAFETY: both out-pointers were checked for null and are writable per contract.
    unsafe {
        *audio_buffer = ptr::null_mut();
        *audio_length = 0;
    }

    let failed = BridgeError::Synthesis("panic".into()).status();
    guard("piper_bridge_text_to_audio", failed, || {
        // SAFETY: forwarded caller contract.
        match unsafe { run_request(session, text, target) } {
            Ok(Some(buffer)) => {
                let (data, len) = buffer.into_raw();
                // SAFETY: out-pointers checked above; len fits c_int (checked in run_request).
                unsafe {
                    *audio_buffer = data;
                    *audio_length = len as c_int;
                }
                log::info!("Successfully copied {len} audio samples to output buffer");
                STATUS_OK
            }
            Ok(None) => STATUS_OK,
            Err(e) => {
                log::error!("{e}");
                e.status()
            }
        }
    })
}

unsafe fn run_request(
    session: *mut PiperBridgeSession,
    text: *const c_char,
    target: Option<(c_int, c_int)>,
) -> Result<Option<PcmBuffer>, BridgeError> {
    // SAFETY: caller guarantees session is null or live.
    let session = unsafe { session.as_mut() }
        .ok_or_else(|| BridgeError::InvalidArgument("null session".into()))?;
    // SAFETY: caller guarantees text is null or a valid C string.
    let text = unsafe { required_str(text, "text")? };
    let target = target
        .map(|(rate, channels)| output_format(rate, channels))
        .transpose()?;

    let output = session.synthesize_request(&SynthesisRequest { text, target })?;
    if c_int::try_from(output.samples.len()).is_err() {
        return Err(BridgeError::Allocation(format!(
            "{} samples exceed the C length type",
            output.samples.len()
        )));
    }
    PcmBuffer::from_samples(&output.samples)
}

fn output_format(sample_rate: c_int, channels: c_int) -> Result<OutputFormat, BridgeError> {
    match (u32::try_from(sample_rate), u16::try_from(channels)) {
        (Ok(sample_rate), Ok(channels)) if sample_rate > 0 && channels > 0 => Ok(OutputFormat {
            sample_rate,
            channels,
        }),
        _ => Err(ResampleError::Configuration(format!(
            "unsupported output format {sample_rate} Hz x {channels} ch"
        ))
        .into()),
    }
}

/// # Safety
///
/// `ptr` must be null or a valid NUL-terminated string that outlives `'a`.
unsafe fn optional_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, BridgeError> {
    if ptr.is_null() {
        return Ok("");
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| BridgeError::InvalidArgument(format!("{what} is not valid UTF-8")))
}

/// # Safety
///
/// Same as [`optional_str`].
unsafe fn required_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, BridgeError> {
    if ptr.is_null() {
        return Err(BridgeError::InvalidArgument(format!("{what} is null")));
    }
    unsafe { optional_str(ptr, what) }
}

fn guard<T>(name: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            log::error!("{name} panicked: {}", panic_message(payload.as_ref()));
            fallback
        }
    }
}
