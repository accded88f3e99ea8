use anyhow::Result;
use clap::Parser;
use photobooth::{BoothConfig, BoothOrchestrator};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "photobooth")]
#[command(about = "Self-service video booth for events")]
#[command(version)]
#[command(long_about = "A self-service video booth for weddings and events. Guests record \
short video messages from a kiosk; recordings are stored locally and can be exported as \
size-bounded archives from the PIN-protected admin surface.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "photobooth.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the booth")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - build components but don't start them
    #[arg(long, help = "Perform dry run - build components but don't start them")]
    dry_run: bool,

    /// Disable the keyboard control surface
    #[arg(long, help = "Run without the raw-mode keyboard handler (headless deployments)")]
    no_keyboard: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting photobooth v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match BoothConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let mut orchestrator = BoothOrchestrator::new(config).await.map_err(|e| {
        error!("Failed to create orchestrator: {}", e);
        e
    })?;

    if args.no_keyboard {
        orchestrator.disable_keyboard();
    }

    if args.dry_run {
        info!("Dry run mode - components built but not started");
        println!("✓ Dry run completed successfully - all components built");
        return Ok(());
    }

    orchestrator.start().await.map_err(|e| {
        error!("Failed to start booth: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Photobooth exited with code: {}", exit_code);

    // exit code matters for systemd restart policy
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("photobooth={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# Photobooth Configuration File");
    println!("# This is the default configuration with all available options");
    println!();

    let default_config = r#"[storage]
# Directory holding the recording store and settings document
data_dir = "./booth-data"
# Directory archive exports are written to
export_dir = "./exports"
# Directory holding <lang>.json translation catalogs
locales_dir = "./locales"
# Base file name for export archives
export_base_name = "photobooth-videos"

[capture]
# Preferred recording resolution (width, height)
ideal_resolution = [1920, 1080]
# Resolution retried once when the preferred one cannot be delivered
fallback_resolution = [1280, 720]
# Requested frames per second
fps = 30
# Center-crop zoom factor countering wide-angle distortion
zoom_factor = 1.5
# Disable to record the full field of view
crop_enabled = true
# Remaining time becomes visible below this many seconds
countdown_visible_seconds = 60
# The urgent warning fires at exactly this many seconds remaining
urgent_warning_seconds = 10

[session]
# How long the confirmation screen stays up after a saved recording
confirmation_seconds = 3
# Taps required to open the admin entry
secret_taps = 5
# Window for the tap gesture, in milliseconds
secret_tap_window_ms = 2000
"#;

    println!("{}", default_config);
}
