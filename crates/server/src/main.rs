use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use intent_encoder::EncoderMode;
use intent_feedback::FeedbackLog;
use intent_server::{build_router, ServiceContext, ServiceOptions};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "intentd")]
#[command(about = "Semantic intent classification sidecar", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Override embedding backend in this process
    #[arg(long, global = true, value_enum)]
    embed_mode: Option<EmbedMode>,

    /// Override embedding model id
    #[arg(long, global = true)]
    embed_model: Option<String>,

    /// Model directory (overrides INTENT_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Intent catalog JSON file (defaults to the built-in seed catalog)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Root directory under which the feedback log is stored
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP classification service
    Serve(ServeArgs),

    /// Classify a single utterance and print the result
    Classify(ClassifyArgs),

    /// Classify a canned set of demo phrases
    Demo,

    /// Print feedback-log statistics as JSON
    Stats,
}

#[derive(Args)]
struct ServeArgs {
    /// Port to listen on
    #[arg(long, default_value_t = 8790)]
    port: u16,
}

#[derive(Args)]
struct ClassifyArgs {
    /// Utterance to classify (words are joined with spaces)
    #[arg(required = true)]
    text: Vec<String>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum EmbedMode {
    Onnx,
    Stub,
}

impl EmbedMode {
    const fn as_encoder_mode(self) -> EncoderMode {
        match self {
            Self::Onnx => EncoderMode::Onnx,
            Self::Stub => EncoderMode::Stub,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // Silence ort unless verbose mode (ORT is extremely noisy).
    if !cli.verbose {
        builder.filter_module("ort", log::LevelFilter::Off);
    }
    builder.target(env_logger::Target::Stderr).init();

    let options = ServiceOptions {
        data_root: cli.data_root.clone(),
        catalog_path: cli.catalog.clone(),
        embed_mode: cli.embed_mode.map(EmbedMode::as_encoder_mode),
        embed_model: cli.embed_model.clone(),
        model_dir: cli.model_dir.clone(),
    };

    match cli.command {
        Commands::Serve(args) => serve(args, options).await,
        Commands::Classify(args) => run_classify(args, options).await,
        Commands::Demo => run_demo(options).await,
        Commands::Stats => run_stats(&options),
    }
}

async fn serve(args: ServeArgs, options: ServiceOptions) -> Result<()> {
    log::info!("Loading model...");
    let context = Arc::new(
        ServiceContext::initialize(options)
            .await
            .context("failed to start the classification service")?,
    );

    let app = build_router(context);
    let bind = format!("127.0.0.1:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    log::info!("Ready at http://{bind}");
    log::info!("Endpoints: POST /classify, POST /log, GET /health, GET /stats");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_classify(args: ClassifyArgs, options: ServiceOptions) -> Result<()> {
    let transcript = args.text.join(" ");
    let context = ServiceContext::initialize(options).await?;
    let result = context.engine.classify(&transcript).await?;

    println!("Intent: {}", result.label);
    println!("Confidence: {:.2}%", result.clamped_confidence() * 100.0);
    Ok(())
}

async fn run_demo(options: ServiceOptions) -> Result<()> {
    const DEMO_PHRASES: [&str; 7] = [
        "I wish we had a correlation matrix",
        "there's a bug in the login page",
        "it's so annoying that I have to restart every time",
        "the button spacing looks off",
        "I figured out the API needs a trailing slash",
        "show me all open issues",
        "what should I work on next",
    ];

    let context = ServiceContext::initialize(options).await?;

    println!("Intent Classification Demo");
    println!("{}", "=".repeat(50));
    for phrase in DEMO_PHRASES {
        let result = context.engine.classify(phrase).await?;
        println!();
        println!("\"{phrase}\"");
        println!(
            "  -> {} ({:.0}%)",
            result.label,
            result.clamped_confidence() * 100.0
        );
    }
    Ok(())
}

/// Stats don't need the model; read the log directly.
fn run_stats(options: &ServiceOptions) -> Result<()> {
    let feedback = FeedbackLog::at_data_root(options.data_root.as_deref());
    let stats = feedback.stats()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
