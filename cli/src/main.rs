use bfskrx_core::sync::{generate_tone, preamble_template};
use bfskrx_core::{MemorySource, Receiver, ReceiverError, RxConfig};
use clap::{Parser, Subcommand};
use hound::WavSpec;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bfskrx")]
#[command(about = "BFSK acoustic-modem receiver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a BFSK transmission from a WAV recording
    Decode {
        /// Input WAV file
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,
    },

    /// Generate a reference transmission WAV for a text message
    Synth {
        /// Message text to encode
        message: String,

        /// Output WAV file
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Symbol periods of leading silence
        #[arg(long, default_value = "8")]
        lead_in: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { input } => decode_command(&input),
        Commands::Synth {
            message,
            output,
            lead_in,
        } => synth_command(&message, &output, lead_in),
    }
}

fn decode_command(input: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader = hound::WavReader::open(input)?;
    let spec = reader.spec();

    let mut config = RxConfig::default();
    if spec.sample_rate != config.sample_rate {
        log::warn!(
            "recording at {} Hz, reference configuration expects {} Hz",
            spec.sample_rate,
            config.sample_rate
        );
        config.sample_rate = spec.sample_rate;
    }

    let channels = spec.channels as usize;
    // First channel only, normalized to [-1, 1]
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .step_by(channels)
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let full_scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .step_by(channels)
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };
    log::info!("read {} samples from {}", samples.len(), input.display());

    let mut source = MemorySource::new(samples, config.symbol_samples);
    let receiver = Receiver::spawn(config)?;
    receiver.feed_from(&mut source)?;

    // The recording is exhausted; let the workers drain whatever is still
    // queued rather than cutting a valid transmission off mid-message.
    receiver.finish();
    match receiver.join() {
        Ok(message) => {
            println!("{}", String::from_utf8_lossy(&message));
            Ok(())
        }
        Err(ReceiverError::Incomplete) => {
            Err(format!("no complete transmission found in {}", input.display()).into())
        }
        Err(e) => Err(e.into()),
    }
}

fn synth_command(
    message: &str,
    output: &PathBuf,
    lead_in: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = RxConfig::default();
    config.validate()?;
    let symbol = config.symbol_samples;

    let mut samples = vec![0.0f32; lead_in * symbol];
    samples.extend(preamble_template(&config));
    for &byte in message.as_bytes() {
        for i in (0..8).rev() {
            let freq = if (byte >> i) & 1 == 1 {
                config.one_freq
            } else {
                config.zero_freq
            };
            samples.extend(generate_tone(freq, symbol, config.sample_rate, config.amplitude));
        }
    }
    samples.extend(generate_tone(
        config.stop_freq,
        symbol,
        config.sample_rate,
        config.amplitude,
    ));
    // A little tail silence so playback devices do not clip the sentinel.
    samples.extend(std::iter::repeat(0.0).take(2 * symbol));

    let spec = WavSpec {
        channels: 1,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(output, spec)?;
    for sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * 32767.0) as i16)?;
    }
    writer.finalize()?;

    println!(
        "wrote {} symbol transmission to {}",
        message.len() * 8 + config.preamble_bits.len() + 1,
        output.display()
    );
    Ok(())
}
