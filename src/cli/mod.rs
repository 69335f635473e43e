//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommand hierarchy:
//! - `serve` (default) -- start the HTTP server
//! - `probe <url>` -- run the probe pipeline once and print the result
//! - `status` -- query a running instance's health endpoint
//! - `config show|path` -- inspect the resolved configuration
//! - `version` -- print build/version info

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{self, Config, DEFAULT_PORT};
use crate::media::ProbePipeline;
use crate::server::http::parse_probe_url;

/// Media probe server: download a URL, report its ffprobe metadata.
#[derive(Parser, Debug)]
#[command(
    name = "mediaprobe",
    version = env!("CARGO_PKG_VERSION"),
    about = "Download remote media and report container and stream metadata via ffprobe"
)]
pub struct Cli {
    /// Path to a JSON5 configuration file.
    #[arg(short, long, global = true, env = config::CONFIG_PATH_ENV)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (default when no subcommand is given).
    Serve {
        /// Address to bind (overrides config).
        #[arg(long)]
        bind: Option<IpAddr>,

        /// Port to listen on (overrides config).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Probe a single URL locally and print the analyzer output.
    Probe {
        /// Absolute http(s) URL of the media to inspect.
        url: String,

        /// Print compact JSON instead of pretty-printed.
        #[arg(long)]
        compact: bool,
    },

    /// Query a running instance for health information.
    Status {
        /// Port of the running instance (default: from config or 8000).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host of the running instance.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print version, build date, and git commit information.
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the fully resolved configuration as JSON.
    Show,

    /// Print the configuration file path that would be read.
    Path,
}

// ---------------------------------------------------------------------------
// Subcommand handlers
// ---------------------------------------------------------------------------

/// Apply `serve` flag overrides on top of file and environment settings.
pub fn apply_serve_overrides(config: &mut Config, bind: Option<IpAddr>, port: Option<u16>) {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
}

/// Run the `probe <url>` subcommand.
pub async fn handle_probe(
    config: &Config,
    raw_url: &str,
    compact: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let url = parse_probe_url(raw_url).map_err(|e| e.detail)?;
    let pipeline = ProbePipeline::from_config(config)?;
    let result = pipeline.run(&url).await?;
    let rendered = if compact {
        serde_json::to_string(&result)?
    } else {
        serde_json::to_string_pretty(&result)?
    };
    println!("{}", rendered);
    Ok(())
}

/// Run the `status` subcommand -- connect to a running instance's health endpoint.
pub async fn handle_status(
    config: &Config,
    host: &str,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let port = resolve_port(config, port);
    let url = format!("http://{}:{}/health", host, port);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;

    let response = client.get(&url).send().await.map_err(|e| {
        format!(
            "could not connect to mediaprobe at {}:{} ({}); is the server running?",
            host, port, e
        )
    })?;

    if !response.status().is_success() {
        return Err(format!("health endpoint returned HTTP {}", response.status()).into());
    }

    let body: crate::server::HealthResponse = response.json().await?;
    println!("mediaprobe status");
    println!("=================");
    println!("  Address:  {}:{}", host, port);
    println!("  Status:   {}", body.status);
    Ok(())
}

/// Run the `config show` subcommand.
pub fn handle_config_show(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// Run the `config path` subcommand.
pub fn handle_config_path(explicit: Option<&std::path::Path>) {
    match explicit {
        Some(path) => println!("{}", path.display()),
        None => println!("{}", config::get_config_path().display()),
    }
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("mediaprobe {}", env!("CARGO_PKG_VERSION"));
    println!("  Build date: {}", env!("MEDIAPROBE_BUILD_DATE"));
    println!("  Git commit: {}", env!("MEDIAPROBE_GIT_HASH"));
    println!(
        "  Platform:   {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Port for reaching a running instance: explicit flag, then config.
fn resolve_port(config: &Config, explicit: Option<u16>) -> u16 {
    explicit.unwrap_or(if config.server.port == 0 {
        DEFAULT_PORT
    } else {
        config.server.port
    })
}
