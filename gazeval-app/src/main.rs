mod headless;
mod session;
mod window;

use anyhow::Result;
use clap::Parser;
use gazeval_validation::Units;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gazeval", about = "Eye tracker gaze accuracy validation")]
struct Cli {
    /// Validation settings (JSON). Built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run on a simulated clock and keyboard without opening a window
    #[arg(long)]
    headless: bool,

    /// Coordinate units of the display: pix, norm, height or deg
    #[arg(long, default_value = "pix")]
    units: Units,

    /// Where to write the results JSON
    #[arg(long, default_value = "validation_results.json")]
    output: PathBuf,

    /// Seed for position shuffling, jitter and the simulated tracker
    #[arg(long)]
    seed: Option<u64>,

    /// TrueType font used for on-screen text
    #[arg(long)]
    font: Option<PathBuf>,

    /// Simulated tracker sample rate in Hz
    #[arg(long, default_value_t = 500.0)]
    tracker_rate: f64,

    /// Simulated gaze noise standard deviation, in display units
    #[arg(long, default_value_t = 0.0)]
    noise: f64,

    /// Share of simulated samples reported as lost, 0 to 1
    #[arg(long, default_value_t = 0.0)]
    dropout: f64,

    /// Headless frame rate in Hz
    #[arg(long, default_value_t = 60.0)]
    refresh_rate: f64,

    /// Headless key press interval in seconds
    #[arg(long, default_value_t = 1.5)]
    press_interval: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gazeval=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = session::load_config(cli.config.as_deref())?;
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    let opts = session::SessionOptions {
        units: cli.units,
        output: cli.output,
        font: cli.font,
        tracker_rate: cli.tracker_rate,
        noise: cli.noise,
        dropout: cli.dropout,
        seed: config.seed,
    };

    println!("=== GAZE VALIDATION ===");
    println!("Platform: {}", std::env::consts::OS);
    println!("Architecture: {}", std::env::consts::ARCH);
    println!("Display units: {}", opts.units);

    let passed = if cli.headless {
        println!("Mode: headless ({:.0} Hz)\n", cli.refresh_rate);
        headless::run(config, &opts, cli.refresh_rate, cli.press_interval)?
    } else {
        println!("Press SPACE to advance the target or ESC to exit.\n");
        window::run(config, &opts)?
    };

    match passed {
        Some(true) => println!("\nValidation passed."),
        Some(false) => println!("\nValidation failed."),
        None => println!("\nValidation terminated."),
    }
    Ok(())
}
