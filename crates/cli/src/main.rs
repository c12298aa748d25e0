#![deny(warnings)]

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vocal_emotion_core::capture::{AudioSource, SilenceSource, WavFileSource};
use vocal_emotion_core::config::{
    self, resolve_optional_path, resolve_u64_with_default, AppConfig, AudioInput, Env,
    ExtractorConfig, StdEnv, TickInterval, DEFAULT_SESSION_SECS, DEFAULT_TICK_MS, ENV_MODEL_PATH,
    ENV_TICK_MS,
};
use vocal_emotion_core::emotion::{EmotionCategory, EmotionSimulator, SoftmaxClassifier};
use vocal_emotion_core::features::{ExtractorBackend, FeatureExtractor};
use vocal_emotion_core::inference::{InferenceCoordinator, InferenceMode, LivePipeline};
use vocal_emotion_core::report::SessionReport;
use vocal_emotion_core::session::{SessionRunner, TickOutput};

/// Rate of the silent placeholder input used when no WAV file is given.
const DEFAULT_SAMPLE_RATE: u32 = 44_100;

#[derive(Parser, Debug)]
#[command(name = "vocal-emotion")]
#[command(about = "Periodic vocal emotion estimation with an end-of-session report")]
struct Args {
    /// WAV file replayed as the audio input.
    #[arg(long, conflicts_with = "simulate")]
    wav: Option<PathBuf>,

    /// JSON weights for the softmax classifier.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Skip audio analysis and run the emotion simulator only.
    #[arg(long)]
    simulate: bool,

    #[arg(long)]
    tick_ms: Option<u64>,

    #[arg(long, default_value_t = DEFAULT_SESSION_SECS)]
    duration_secs: u64,

    /// Seed for the simulator and placeholder features.
    #[arg(long)]
    seed: Option<u64>,

    /// Print ticks as JSON lines and the report as a JSON document.
    #[arg(long)]
    json: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let json = args.json;
    let env = StdEnv;
    let cfg = build_config(args, &env)?;

    tracing::info!(
        input = ?cfg.input,
        tick_ms = cfg.tick.period_ms(),
        session_secs = cfg.session_length.as_secs(),
        "config loaded"
    );

    let report = run_session(&cfg, json).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

async fn run_session(cfg: &AppConfig, json: bool) -> anyhow::Result<SessionReport> {
    let coordinator = build_coordinator(cfg);
    let mut runner =
        SessionRunner::new(coordinator, cfg.tick).with_max_duration(cfg.session_length);

    let stop = runner.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping session");
            stop.stop();
        }
    });

    let (tick_tx, mut tick_rx) = tokio::sync::mpsc::channel::<TickOutput>(16);
    let printer = tokio::spawn(async move {
        while let Some(tick) = tick_rx.recv().await {
            print_tick(&tick, json)?;
        }
        anyhow::Ok(())
    });

    let record = runner.run(Some(tick_tx)).await;
    printer.await.context("tick printer task failed")??;

    Ok(SessionReport::from_record(&record))
}

fn build_coordinator(cfg: &AppConfig) -> InferenceCoordinator {
    let simulator = match cfg.seed {
        Some(seed) => EmotionSimulator::with_seed(seed),
        None => EmotionSimulator::new(),
    };

    match build_live_pipeline(cfg) {
        Ok(Some(live)) => InferenceCoordinator::new(live, simulator),
        Ok(None) => {
            tracing::info!("simulation requested, audio analysis disabled");
            InferenceCoordinator::simulated(simulator)
        }
        Err(e) => {
            let reason = format!("{e:#}");
            tracing::warn!(error = %reason, "live analysis unavailable, running in simulated mode");
            InferenceCoordinator::simulated(simulator)
        }
    }
}

fn build_live_pipeline(cfg: &AppConfig) -> anyhow::Result<Option<LivePipeline>> {
    let source: Box<dyn AudioSource> = match &cfg.input {
        AudioInput::Simulated => return Ok(None),
        AudioInput::Wav(path) => Box::new(
            WavFileSource::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?,
        ),
        AudioInput::Silence { sample_rate } => Box::new(SilenceSource::new(*sample_rate)),
    };

    let model_path = cfg
        .model_path
        .as_deref()
        .with_context(|| format!("no classifier model configured (--model or {ENV_MODEL_PATH})"))?;
    let classifier = SoftmaxClassifier::load(model_path)
        .with_context(|| format!("failed to load model {}", model_path.display()))?;

    let extractor = match cfg.seed {
        Some(seed) => FeatureExtractor::with_seed(cfg.extractor, ExtractorBackend::Spectral, seed),
        None => FeatureExtractor::new(cfg.extractor),
    };

    Ok(Some(LivePipeline {
        source,
        classifier: Box::new(classifier),
        extractor,
    }))
}

fn mode_label(mode: InferenceMode) -> &'static str {
    match mode {
        InferenceMode::Live => "live",
        InferenceMode::Simulated => "simulated",
    }
}

fn print_tick(tick: &TickOutput, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(tick)?);
    } else {
        println!(
            "[{:>7.1}s] {:<8} {:>5.1}%  ({})",
            tick.timestamp,
            tick.dominant.display_name(),
            tick.probabilities.get(tick.dominant),
            mode_label(tick.mode)
        );
    }
    Ok(())
}

fn print_report(report: &SessionReport) {
    let stats = &report.stats;
    println!();
    println!("Session length:    {}", stats.duration);
    println!("Dominant emotion:  {}", stats.dominant.display_name());
    println!("Emotional changes: {}", stats.changes);
    println!("Distribution:");
    for category in EmotionCategory::ALL {
        println!("  {:<9} {:>3}%", category.display_name(), stats.percent(category));
    }
    println!();
    println!("{}", report.narrative);
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_config(args: Args, env: &impl Env) -> anyhow::Result<AppConfig> {
    let input = match (args.simulate, args.wav) {
        (true, _) => AudioInput::Simulated,
        (false, Some(path)) => AudioInput::Wav(path),
        (false, None) => AudioInput::Silence {
            sample_rate: DEFAULT_SAMPLE_RATE,
        },
    };

    let tick_ms = resolve_u64_with_default(args.tick_ms, ENV_TICK_MS, env, DEFAULT_TICK_MS)?;

    Ok(AppConfig {
        input,
        model_path: resolve_optional_path(args.model, ENV_MODEL_PATH, env),
        tick: TickInterval::new(tick_ms)?,
        extractor: ExtractorConfig::default(),
        session_length: config::session_length(args.duration_secs)?,
        seed: args.seed,
    })
}
