mod auth_commands;

use {
    clap::{Parser, Subcommand},
    std::time::Duration,
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "sas", version, about = "Log in to SAS Viya from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Profile from ~/.sas/config.json to use.
    #[arg(long, global = true, default_value = "default", env = "SAS_PROFILE")]
    profile: String,

    /// Enable verbose output (same as --log-level debug).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in through the browser and store the token for the profile.
    Auth {
        /// Give up if the browser has not redirected back after this many seconds.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,
    },
    /// Show every stored token and whether it is still valid.
    Status,
    /// Print the stored access token for the profile.
    Token,
    /// Remove the stored token for the profile.
    Logout,
}

fn init_telemetry(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else {
        cli.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), profile = %cli.profile, "sas starting");

    match cli.command {
        Commands::Auth { timeout } => {
            auth_commands::login(&cli.profile, timeout.map(Duration::from_secs)).await
        },
        Commands::Status => auth_commands::status(),
        Commands::Token => auth_commands::token(&cli.profile),
        Commands::Logout => auth_commands::logout(&cli.profile),
    }
}
