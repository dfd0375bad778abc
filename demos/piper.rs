use std::path::PathBuf;
use std::time::Instant;

use piper_bridge::{OutputFormat, SessionConfigBuilder, SynthesisRequest, VoiceSession};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let model_path = PathBuf::from(
        args.next()
            .unwrap_or_else(|| "voices/en_US-lessac-medium.onnx".to_string()),
    );
    let target_rate: u32 = args.next().map(|r| r.parse()).transpose()?.unwrap_or(16000);

    let config = SessionConfigBuilder::default()
        .model_path(model_path)
        .build()?;

    let load_start = Instant::now();
    let mut session = VoiceSession::initialize(&config)?;
    println!(
        "Voice loaded in {:.2?} (native rate {} Hz)",
        load_start.elapsed(),
        session.native_sample_rate()?
    );

    let text = "Hello! This is Piper, speaking through a C-callable bridge. \
                The audio you hear has been resampled to the rate you asked for.";

    let synth_start = Instant::now();
    let request = SynthesisRequest::resampled(text, OutputFormat::mono(target_rate));
    let output = session.synthesize_request(&request)?;
    let synth_dur = synth_start.elapsed();

    println!(
        "Synthesized {:.2}s audio in {:.2?} ({:.1}x real-time), {} samples at {} Hz",
        output.duration_secs,
        synth_dur,
        output.duration_secs / synth_dur.as_secs_f64(),
        output.samples.len(),
        output.sample_rate
    );

    let spec = hound::WavSpec {
        channels: output.channels,
        sample_rate: output.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create("output.wav", spec)?;
    for &sample in &output.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    println!("Saved to output.wav");

    session.terminate();
    Ok(())
}
