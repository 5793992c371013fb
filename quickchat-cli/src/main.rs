use anyhow::{Context, Result};
use clap::Parser;
use quickchat_core::config::ClientConfig;
use quickchat_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use std::path::PathBuf;
use tracing::info;

mod demo;
mod tools;

#[derive(Parser, Debug)]
#[command(name = "quickchat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Configuration file (TOML); QUICKCHAT_* environment variables otherwise
    #[arg(short, long)]
    config: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Sign two users in against the in-memory backend and exchange a message
    Demo {
        /// Phone number of the first user
        #[arg(long, default_value = "+15551234567")]
        from: String,

        /// Phone number of the second user
        #[arg(long, default_value = "+15550000002")]
        to: String,

        /// Message to send
        #[arg(default_value = "Hello from QuickChat!")]
        message: String,
    },

    /// Validate the configuration and print it
    CheckConfig,

    /// Write the default configuration to a file
    InitConfig {
        /// Destination path
        path: String,
    },

    /// Show whether the local "signed in" flag is set
    Status,

    /// Encode an image file the way profile pictures are stored
    EncodeImage {
        /// Image file (JPEG or PNG)
        path: String,

        /// JPEG quality (1-100), the configured quality otherwise
        #[arg(short, long)]
        quality: Option<u8>,
    },
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn load_config(path: Option<&str>) -> Result<ClientConfig> {
    match path {
        Some(path) => {
            let path = expand(path);
            ClientConfig::from_file(&path)
                .with_context(|| format!("loading configuration from {}", path.display()))
        }
        None => ClientConfig::from_env().context("loading configuration from environment"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    // Command-line flags win over the configured logging section
    let mut log_config = LogConfig::try_from(&config.logging)?;
    if let Some(level) = &args.log_level {
        log_config.level = level.parse::<LogLevel>().unwrap_or_else(|e| {
            eprintln!("{}, using 'info'", e);
            LogLevel::Info
        });
    }
    if args.json_logs {
        log_config = log_config.json_format(true);
    }
    init_logging_with_config(log_config)?;
    quickchat_core::metrics::init_metrics();

    info!("QuickChat CLI started");

    match args.command {
        Some(Command::Demo { from, to, message }) => {
            let report = demo::run(&config, &from, &to, &message).await?;
            println!("{}", report);
        }
        Some(Command::CheckConfig) => {
            println!("{}", tools::render_config(&config)?);
        }
        Some(Command::InitConfig { path }) => {
            let path = expand(&path);
            ClientConfig::default().save_to_file(&path)?;
            println!("Wrote default configuration to {}", path.display());
        }
        Some(Command::Status) => {
            let signed_in = tools::signed_in(&config)?;
            println!("signed in: {}", signed_in);
        }
        Some(Command::EncodeImage { path, quality }) => {
            let quality = quality.unwrap_or(config.profile.jpeg_quality);
            println!("{}", tools::encode_image_file(&expand(&path), quality)?);
        }
        None => {
            info!("No command specified. Use --help for usage information.");
        }
    }

    info!("QuickChat CLI finished");

    Ok(())
}
