use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use serde::Serialize;
use smartamp_core::{
    format::{narrow, widen},
    AudioStream, DiagnosticsSnapshot, FrameGeometry, PassthroughEngine, SessionConfig, SmartAmp,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Args {
    ticks: usize,
    period: usize,
    engine_frame: usize,
    input: Option<PathBuf>,
    config: Option<PathBuf>,
    output_wav: Option<PathBuf>,
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    ticks: usize,
    period_frames: usize,
    geometry: FrameGeometry,
    p50_tick_us: f64,
    p95_tick_us: f64,
    max_tick_us: f64,
    avg_tick_us: f64,
    underrun_ticks: usize,
    overflow_ticks: usize,
    diagnostics: DiagnosticsSnapshot,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        ticks: 1000,
        period: 48,
        engine_frame: 240,
        input: None,
        config: None,
        output_wav: None,
        output: None,
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |name: &str| it.next().with_context(|| format!("missing value for {name}"));
        match arg.as_str() {
            "--ticks" => {
                args.ticks = value("--ticks")?
                    .parse::<usize>()
                    .context("invalid value for --ticks")?
                    .max(1);
            }
            "--period" => {
                args.period = value("--period")?
                    .parse::<usize>()
                    .context("invalid value for --period")?
                    .max(1);
            }
            "--engine-frame" => {
                args.engine_frame = value("--engine-frame")?
                    .parse::<usize>()
                    .context("invalid value for --engine-frame")?;
            }
            "--input" => args.input = Some(PathBuf::from(value("--input")?)),
            "--config" => args.config = Some(PathBuf::from(value("--config")?)),
            "--output-wav" => args.output_wav = Some(PathBuf::from(value("--output-wav")?)),
            "--output" => args.output = Some(PathBuf::from(value("--output")?)),
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p smartamp-core --bin reframe_bench -- \\
  [--ticks <n>] [--period <frames>] [--engine-frame <samples>] \\
  [--input <stereo16.wav>] [--config <session.json>] \\
  [--output-wav <file.wav>] [--output <file.json>]"
                );
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(args)
}

/// Interleaved frames widened to 32-bit containers.
fn read_wav(path: &Path, channels: usize) -> anyhow::Result<Vec<i32>> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        bail!("{}: only 16-bit PCM input is supported", path.display());
    }
    let src_channels = usize::from(spec.channels.max(1));
    let samples = reader
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("reading {}", path.display()))?;

    let mut out = Vec::with_capacity(samples.len() / src_channels * channels);
    for frame in samples.chunks_exact(src_channels) {
        for ch in 0..channels {
            out.push(widen(frame[ch.min(src_channels - 1)]));
        }
    }
    if out.is_empty() {
        bail!("{}: no samples", path.display());
    }
    Ok(out)
}

/// One second of a 1 kHz tone on every channel.
fn synth_tone(sample_rate: u32, channels: usize) -> Vec<i32> {
    let n = sample_rate as usize;
    let mut out = Vec::with_capacity(n * channels);
    for i in 0..n {
        let phase = 2.0 * std::f64::consts::PI * 1000.0 * i as f64 / sample_rate as f64;
        let s = (phase.sin() * 8000.0) as i16;
        out.extend(std::iter::repeat(widen(s)).take(channels));
    }
    out
}

fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = ((sorted.len() - 1) as f64 * p.clamp(0.0, 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn run() -> anyhow::Result<()> {
    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            SessionConfig::from_json_str(&json)?
        }
        None => SessionConfig::default(),
    };
    let channels = config.channels;
    let iv_slots = config.iv_layout.slots_per_frame(channels);
    let sample_rate = config.sample_rate;

    let signal = match &args.input {
        Some(path) => read_wav(path, channels)?,
        None => synth_tone(sample_rate, channels),
    };

    let engine = PassthroughEngine::new(args.engine_frame, args.engine_frame);
    let mut amp = SmartAmp::new(config.clone(), Box::new(engine))?;
    let sink_slots = 32 - amp.sink_slot_mask().leading_zeros() as usize;

    let mut source = AudioStream::new(args.period * 4, channels, config.forward_format);
    let mut feedback = AudioStream::new(args.period * 4, iv_slots, config.feedback_format);
    let mut sink = AudioStream::new(args.period * 4, sink_slots.max(channels), config.forward_format);

    amp.prepare(&source, Some(&feedback), &sink)?;
    amp.start(Some(&mut feedback))?;
    info!(ticks = args.ticks, period = args.period, "reframe bench running");

    let period_samples = args.period * channels;
    let mut cursor = 0usize;
    let mut period = vec![0i32; period_samples];
    let iv = vec![0i32; args.period * iv_slots];
    let mut drained = vec![0i32; args.period * sink.channels()];
    let mut rendered: Vec<i32> = Vec::new();
    let mut latencies = Vec::with_capacity(args.ticks);
    let (mut underrun_ticks, mut overflow_ticks) = (0usize, 0usize);

    for _ in 0..args.ticks {
        for slot in period.iter_mut() {
            *slot = signal[cursor];
            cursor = (cursor + 1) % signal.len();
        }
        source.write_interleaved(&period);
        feedback.write_interleaved(&iv);

        let started = Instant::now();
        let report = amp.copy(&mut source, Some(&mut feedback), &mut sink)?;
        latencies.push(started.elapsed().as_secs_f64() * 1_000_000.0);

        underrun_ticks += usize::from(report.underrun);
        overflow_ticks += usize::from(report.overflow);

        let frames = sink.read_interleaved(&mut drained);
        if args.output_wav.is_some() {
            for frame in drained[..frames * sink.channels()].chunks(sink.channels()) {
                rendered.extend_from_slice(&frame[..channels]);
            }
        }
    }
    amp.stop()?;

    let summary = Summary {
        ticks: args.ticks,
        period_frames: args.period,
        geometry: amp.session().geometry(),
        p50_tick_us: percentile(&latencies, 0.50),
        p95_tick_us: percentile(&latencies, 0.95),
        max_tick_us: latencies.iter().copied().fold(0.0, f64::max),
        avg_tick_us: latencies.iter().sum::<f64>() / latencies.len().max(1) as f64,
        underrun_ticks,
        overflow_ticks,
        diagnostics: amp.diagnostics().snapshot(),
    };

    if let Some(path) = &args.output_wav {
        let spec = hound::WavSpec {
            channels: channels as u16,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("creating {}", path.display()))?;
        for &s in &rendered {
            writer.write_sample(narrow(s))?;
        }
        writer.finalize()?;
        println!("Wrote processed audio: {}", path.display());
    }

    println!(
        "Done. ticks={} p50={:.1}us p95={:.1}us underruns={}",
        summary.ticks, summary.p50_tick_us, summary.p95_tick_us, summary.underrun_ticks
    );

    let json = serde_json::to_string_pretty(&summary)?;
    if let Some(out) = args.output {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&out, json)?;
        println!("Wrote bench report: {}", out.display());
    } else {
        println!("{json}");
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("smartamp_core=info")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("reframe bench failed: {e:#}");
        std::process::exit(1);
    }
}
