use std::process::ExitCode;

use clap::Parser;
use mediaprobe::cli::{self, Cli, Command, ConfigCommand};
use mediaprobe::{config, logging, server};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let command = cli.command.unwrap_or(Command::Serve {
        bind: None,
        port: None,
    });

    match command {
        Command::Version => {
            cli::handle_version();
            return Ok(());
        }
        Command::Config(ConfigCommand::Path) => {
            cli::handle_config_path(cli.config.as_deref());
            return Ok(());
        }
        _ => {}
    }

    let mut config = config::load_config(cli.config.as_deref())?;

    match command {
        Command::Serve { bind, port } => {
            cli::apply_serve_overrides(&mut config, bind, port);
            logging::init_logging(&config.logging)?;
            server::serve(&config).await?;
        }
        Command::Probe { url, compact } => {
            logging::init_logging(&config.logging)?;
            cli::handle_probe(&config, &url, compact).await?;
        }
        Command::Status { port, host } => cli::handle_status(&config, &host, port).await?,
        Command::Config(ConfigCommand::Show) => cli::handle_config_show(&config)?,
        Command::Config(ConfigCommand::Path) | Command::Version => {}
    }
    Ok(())
}
