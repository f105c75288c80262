use clap::{Parser, Subcommand, ValueEnum};
use focusflow_core::coaching::mock::{
    MockAudioPlayer, MockLocalSpeech, MockSpeechService, MockTextGenerator,
};
use focusflow_core::{
    Angles, AudioCache, BoundingBox, Collaborators, DetectionFrame, FaceDetection, FocusPipeline,
    FocusflowConfig, Gaze, ManualClock, PipelineEvent, Rotation, ServiceError,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// 5 Hz synthetic detector.
const FRAME_MS: i64 = 200;

#[derive(Parser)]
#[command(name = "focusflow", about = "Focus scoring and voice-coaching simulator")]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted session against mock collaborators and print its summary
    Simulate {
        #[arg(long, value_enum, default_value_t = Scenario::Recovering)]
        scenario: Scenario,
        #[arg(long, default_value_t = 180)]
        seconds: u64,
        #[arg(long)]
        seed: Option<u64>,
        /// Make the text generator fail so fallback phrases are used
        #[arg(long)]
        fail_text: bool,
        /// Make speech synthesis fail so local speech is used
        #[arg(long)]
        fail_speech: bool,
        /// TOML config file; FOCUSFLOW_* environment overrides apply on top
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the default config or validate a config file
    Config {
        #[arg(long)]
        dump: bool,
        #[arg(long)]
        check: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Scenario {
    Focused,
    Distracted,
    /// Distracted for the first 60%, then back on task
    Recovering,
}

fn init_logging() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(d) = "focusflow_core=info".parse() {
        filter = filter.add_directive(d);
    }
    if let Ok(d) = "focusflow_cli=info".parse() {
        filter = filter.add_directive(d);
    }

    fmt().with_env_filter(filter).init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Simulate {
            scenario,
            seconds,
            seed,
            fail_text,
            fail_speech,
            config,
        } => {
            let mut config = match config {
                Some(path) => FocusflowConfig::from_file_with_env(path)?,
                None => {
                    let mut config = FocusflowConfig::default();
                    config.apply_env_overrides()?;
                    config
                }
            };
            if seed.is_some() {
                config.coaching.rng_seed = seed;
            }

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?;
            runtime.block_on(simulate(
                config,
                scenario,
                seconds,
                seed,
                fail_text,
                fail_speech,
            ))?;
        }
        Commands::Config { dump, check } => {
            if !dump && check.is_none() {
                return Err("nothing to do: pass --dump or --check <path>".into());
            }
            if dump {
                print!("{}", FocusflowConfig::default().to_toml_string()?);
            }
            if let Some(path) = check {
                let config = FocusflowConfig::from_file_with_env(&path)?;
                for issue in config.issues() {
                    warn!("{}", issue);
                }
                println!("{}: ok", path.display());
            }
        }
    }
    Ok(())
}

async fn simulate(
    config: FocusflowConfig,
    scenario: Scenario,
    seconds: u64,
    seed: Option<u64>,
    fail_text: bool,
    fail_speech: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = if fail_text {
        MockTextGenerator::failing(ServiceError::Transport("simulated outage".into()))
    } else {
        MockTextGenerator::with_response("Eyes back on your work.")
    };
    let speech = if fail_speech {
        MockSpeechService::failing(ServiceError::Http {
            status: 503,
            body: "simulated outage".into(),
        })
    } else {
        MockSpeechService::new()
    };
    let services = Collaborators::new(
        Arc::new(text),
        Arc::new(speech),
        Arc::new(MockAudioPlayer::new()),
        Arc::new(MockLocalSpeech::new()),
    );

    let clock = ManualClock::new(0);
    let mut pipeline = FocusPipeline::new(config, services, AudioCache::new(), Arc::new(clock.clone()));
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    info!("Simulating {:?} session for {}s", scenario, seconds);
    pipeline.start();

    let total_ms = seconds as i64 * 1_000;
    while clock.advance(0) < total_ms {
        let now = clock.advance(FRAME_MS);
        let frame = synthetic_frame(scenario, now, total_ms, &mut rng);

        let mut events = pipeline.on_frame(&frame);
        // Let delivery tasks make progress between frames.
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        events.extend(pipeline.tick());

        for event in events {
            report(now, &event);
        }
    }

    if let Some(handle) = pipeline.orchestrator_mut().take_prewarm_handle() {
        if let Ok(report) = handle.await {
            info!("Pre-warm report: {}", serde_json::to_string(&report)?);
        }
    }

    match pipeline.end() {
        Some(summary) => {
            if !summary.is_worth_persisting() {
                warn!("Session shorter than a minute; a host would discard it");
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        None => warn!("Session was not running, no summary"),
    }
    Ok(())
}

fn report(now: i64, event: &PipelineEvent) {
    let t = now as f64 / 1_000.0;
    match event {
        PipelineEvent::Snapshot(_) => {}
        PipelineEvent::ScoreChanged { score, .. } => {
            if score % 10 == 0 {
                info!("[{:>6.1}s] session score {}", t, score);
            }
        }
        PipelineEvent::Chime(chime) => info!("[{:>6.1}s] {:?}", t, chime),
        PipelineEvent::Coaching(coaching) => info!("[{:>6.1}s] {:?}", t, coaching),
    }
}

fn synthetic_frame(scenario: Scenario, now: i64, total_ms: i64, rng: &mut StdRng) -> DetectionFrame {
    let attentive = match scenario {
        Scenario::Focused => true,
        Scenario::Distracted => false,
        Scenario::Recovering => now * 10 >= total_ms * 6,
    };

    if !attentive && rng.gen_bool(0.3) {
        return DetectionFrame::empty(now);
    }

    let (yaw, pitch, bearing) = if attentive {
        (
            rng.gen_range(-4.0f32..4.0),
            rng.gen_range(-3.0f32..3.0),
            90.0 + rng.gen_range(-3.0f32..3.0),
        )
    } else {
        (
            45.0 + rng.gen_range(-5.0f32..5.0),
            rng.gen_range(-10.0f32..10.0),
            140.0 + rng.gen_range(-5.0f32..5.0),
        )
    };

    DetectionFrame::with_face(
        now,
        FaceDetection {
            bbox: BoundingBox {
                x: 220.0,
                y: 120.0,
                width: 200.0,
                height: 240.0,
            },
            score: 0.95,
            rotation: Some(Rotation {
                angle: Angles {
                    yaw: yaw.to_radians(),
                    pitch: pitch.to_radians(),
                    roll: 0.0,
                },
                gaze: Gaze {
                    bearing: bearing.to_radians(),
                    strength: 0.9,
                },
            }),
        },
    )
}
