//! cadence CLI: headless playback and WAV export.
//!
//! Usage:
//!   cd-cli project.json
//!   cd-cli project.json --wav output.wav
//!   cd-cli project.json --config engine.toml --loop --seconds 30

use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};
use std::{env, fs};

use anyhow::{bail, Context, Result};
use cd_master::{Controller, EngineConfig, Project};
use tracing::info;
use tracing_subscriber::EnvFilter;

struct Args {
    project: String,
    config: Option<String>,
    wav: Option<String>,
    looping: bool,
    seconds: Option<f64>,
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(project) = args.first().filter(|a| !a.starts_with("--")).cloned() else {
        bail!("usage: cd-cli <project.json> [--config engine.toml] [--wav out.wav] [--loop] [--seconds N]");
    };
    let value_of = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };
    let seconds = value_of("--seconds")
        .map(|s| s.parse::<f64>().with_context(|| format!("invalid --seconds value {s:?}")))
        .transpose()?;
    Ok(Args {
        project,
        config: value_of("--config"),
        wav: value_of("--wav"),
        looping: args.iter().any(|a| a == "--loop"),
        seconds,
    })
}

fn load_project(path: &str) -> Result<Project> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse project {path}"))
}

fn load_config(path: Option<&str>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    let config: EngineConfig =
        toml::from_str(&text).with_context(|| format!("failed to parse config {path}"))?;
    Ok(config.validated())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args()?;
    let project = load_project(&args.project)?;
    let config = load_config(args.config.as_deref())?;

    println!("Project:  {}", args.project);
    println!("Tempo:    {} BPM", project.tempo_bpm);
    println!("Key:      {}", project.key_signature);
    println!("Tracks:   {}", project.tracks.len());
    let notes: usize = project
        .tracks
        .iter()
        .flat_map(|t| &t.clips)
        .map(|c| c.notes.len())
        .sum();
    println!("Notes:    {}", notes);
    println!();

    let mut ctrl = Controller::new(config);
    ctrl.load_project(project);
    ctrl.set_looping(args.looping);

    match args.wav {
        Some(wav) => render_to_wav(&ctrl, &wav, args.seconds),
        None => play_audio(&mut ctrl, args.seconds),
    }
}

fn play_audio(ctrl: &mut Controller, seconds: Option<f64>) -> Result<()> {
    ctrl.tick();
    ctrl.play().context("failed to start playback")?;
    println!("Playing...");
    println!();

    let tick = Duration::from_secs_f64(ctrl.engine().config().tick_interval);
    let started = Instant::now();
    while ctrl.is_playing() {
        ctrl.tick();
        let levels = ctrl.levels();
        print!("\rTime: {:7.2}s | Master: {:5.3}", ctrl.position(), levels.master);
        let _ = std::io::stdout().flush();
        if seconds.is_some_and(|s| started.elapsed().as_secs_f64() >= s) {
            break;
        }
        std::thread::sleep(tick);
    }
    ctrl.dispose();

    println!("\rDone.                                ");
    Ok(())
}

fn render_to_wav(ctrl: &Controller, path: &str, seconds: Option<f64>) -> Result<()> {
    let sample_rate: u32 = 44100;
    let max_seconds = seconds.unwrap_or_else(|| ctrl.project().total_duration());
    println!("Rendering to {} at {} Hz...", path, sample_rate);

    let wav = ctrl.render_to_wav(sample_rate, max_seconds);
    fs::write(Path::new(path), &wav).with_context(|| format!("failed to write {path}"))?;
    info!(bytes = wav.len(), path, "render written");
    println!("Wrote {} bytes.", wav.len());
    Ok(())
}
