use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info, warn};

use labelview::detection::rekognition::load_sdk_config;
use labelview::render::label_text;
use labelview::storage::{S3BucketLocator, ensure_same_region};
use labelview::{
    Config, FailurePolicy, ModelLifecycle, Pipeline, RekognitionClient, Renderer, RunSummary,
    Transition, TransitionPlan, WaitOptions, run_transition,
};

#[derive(Parser)]
#[command(name = "labelview")]
#[command(about = "Run a hosted custom-labels model on test images and inspect the boxes")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, value_name = "FILE", default_value = "labelview.json", global = true)]
    config: PathBuf,

    /// Override the AWS region from the configuration and environment
    #[arg(long, global = true)]
    region: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run inference on every image in the test directory
    Detect(DetectArgs),
    /// Request the model version to start
    Start(WaitArgs),
    /// Request the model version to stop
    Stop(WaitArgs),
    /// Print the model version's current status
    Status,
}

#[derive(Args)]
struct DetectArgs {
    /// Directory of test images (overrides test_images_dir)
    #[arg(value_name = "DIR")]
    image_dir: Option<PathBuf>,

    /// Confidence floor sent to the service, 0-100
    #[arg(long)]
    min_confidence: Option<f32>,

    /// Only draw boxes at or above this confidence, 0-100
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Write box overlays to this directory (must be empty)
    #[arg(long, value_name = "DIR")]
    render_dir: Option<PathBuf>,

    /// Font used for box labels
    #[arg(long, value_name = "FILE")]
    font: Option<PathBuf>,

    /// Keep going when a request for one image fails
    #[arg(long)]
    skip_failed: bool,

    /// Do not compare the bucket region with the session region
    #[arg(long)]
    skip_region_check: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct WaitArgs {
    /// Poll until the transition completes
    #[arg(long)]
    wait: bool,

    /// Seconds between status polls
    #[arg(long, default_value_t = 30)]
    poll_secs: u64,

    /// Give up waiting after this many seconds
    #[arg(long, default_value_t = 3600)]
    timeout_secs: u64,

    /// Inference units to provision on start
    #[arg(long)]
    units: Option<i32>,
}

impl WaitArgs {
    fn options(&self) -> WaitOptions {
        WaitOptions {
            interval: Duration::from_secs(self.poll_secs.max(1)),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let mut config = Config::from_json_file(&args.config)
        .with_context(|| format!("Failed to load configuration {}", args.config.display()))?;
    if args.region.is_some() {
        config.region = args.region.clone();
    }

    match args.command {
        Command::Detect(detect) => run_detect(config, detect).await,
        Command::Start(wait) => run_start(config, wait).await,
        Command::Stop(wait) => run_stop(config, wait).await,
        Command::Status => run_status(config).await,
    }
}

async fn run_detect(mut config: Config, args: DetectArgs) -> anyhow::Result<()> {
    if let Some(dir) = args.image_dir {
        config.test_images_dir = Some(dir);
    }
    if args.min_confidence.is_some() {
        config.min_confidence = args.min_confidence;
    }
    if args.threshold.is_some() {
        config.display_threshold = args.threshold;
    }
    // Setup errors, including the font and render directory, surface
    // before any remote call.
    config.validate_for_detection()?;

    let renderer = match &args.font {
        Some(font) => Renderer::with_font_path(font)?,
        None => Renderer::with_system_font(),
    };
    let policy = if args.skip_failed {
        FailurePolicy::SkipImage
    } else {
        FailurePolicy::Abort
    };
    let vocabulary = config.vocabulary()?;
    let model_id = config.model_id()?;

    let sdk_config = load_sdk_config(config.region.as_deref()).await;
    let mut pipeline = Pipeline::new(
        Arc::new(RekognitionClient::new(&sdk_config)),
        vocabulary,
        model_id,
    )
    .with_min_confidence(config.min_confidence)
    .with_display_threshold(config.display_threshold())?
    .with_renderer(renderer)
    .with_failure_policy(policy);
    if let Some(dir) = args.render_dir {
        pipeline = pipeline.with_render_dir(dir)?;
    }

    let session_region = sdk_config
        .region()
        .map(|r| r.to_string())
        .context("No AWS region configured; set one in the configuration or with --region")?;
    info!("Session region: {}", session_region);

    if args.skip_region_check {
        warn!("Skipping bucket region check");
    } else {
        ensure_same_region(
            &S3BucketLocator::new(&sdk_config),
            config.bucket()?,
            &session_region,
        )
        .await?;
    }

    let summary = pipeline.run_directory(config.images_dir()?).await?;

    if args.json {
        print_json(&summary)?;
    } else {
        print_summary(&pipeline, &summary, config.display_threshold());
    }
    Ok(())
}

fn print_summary(pipeline: &Pipeline, summary: &RunSummary, threshold: f32) {
    println!("\n=== Detection Results ===");
    println!(
        "Images: {}  Detections: {}  Failed: {}",
        summary.reports.len(),
        summary.total_detections(),
        summary.failures.len()
    );
    for report in &summary.reports {
        println!("\n{}", report.path.display());
        if report.detections.is_empty() {
            println!("  No detections.");
        }
        for d in &report.detections {
            let marker = if d.confidence >= threshold { "*" } else { " " };
            println!(
                "{} {:?}  {}",
                marker,
                d.as_tuple(),
                label_text(pipeline.vocabulary(), d)
            );
        }
        if let Some(out) = &report.rendered {
            println!("  Overlay: {}", out.display());
        }
    }
    for (path, err) in &summary.failures {
        println!("\nFAILED {}: {}", path.display(), err);
    }
}

fn print_json(summary: &RunSummary) -> anyhow::Result<()> {
    let reports: Vec<_> = summary
        .reports
        .iter()
        .map(|r| {
            serde_json::json!({
                "path": r.path,
                "detections": r.detections,
                "rendered": r.rendered,
            })
        })
        .collect();
    let failures: Vec<_> = summary
        .failures
        .iter()
        .map(|(path, err)| {
            serde_json::json!({
                "path": path,
                "error": err.to_string(),
                "retriable": err.is_retriable(),
            })
        })
        .collect();
    let out = serde_json::json!({ "images": reports, "failures": failures });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn run_start(config: Config, args: WaitArgs) -> anyhow::Result<()> {
    let units = args.units.unwrap_or_else(|| config.min_inference_units());
    let plan = config.transition_plan(
        Transition::Start {
            min_inference_units: units,
        },
        args.wait.then(|| args.options()),
    )?;
    run_plan(&config, &plan).await
}

async fn run_stop(config: Config, args: WaitArgs) -> anyhow::Result<()> {
    let plan = config.transition_plan(Transition::Stop, args.wait.then(|| args.options()))?;
    run_plan(&config, &plan).await
}

async fn run_plan(config: &Config, plan: &TransitionPlan) -> anyhow::Result<()> {
    let sdk_config = load_sdk_config(config.region.as_deref()).await;
    let client = RekognitionClient::new(&sdk_config);
    let status = run_transition(&client, plan).await?;
    println!("{}: {}", plan.model_id, status);
    Ok(())
}

async fn run_status(config: Config) -> anyhow::Result<()> {
    let version = config.version_ref()?;
    let sdk_config = load_sdk_config(config.region.as_deref()).await;
    let client = RekognitionClient::new(&sdk_config);
    let status = client.status(&version).await?;
    println!("{}: {}", version.version_name, status);
    Ok(())
}
