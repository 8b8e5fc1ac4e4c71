use std::sync::Arc;

use board_link::{
    cli, config::Config, directory::InMemoryDirectory, flash::Flasher, logging,
    registry::RegistryBuilder, serial::transport::SerialTransport, sink::LoggingSink,
};
use clap::Parser;
use color_eyre::{eyre::eyre, Result};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use tracing::{debug, error, info, warn};

fn load_config(cli: &cli::Cli) -> Result<Config> {
    let config = if let Some(config_path) = &cli.config {
        debug!(?config_path, "Config from path");
        Config::new_from_path(config_path)?
    } else {
        debug!("Default config");
        Config::default()
    };

    config.validate()?;

    Ok(config)
}

async fn list_ports() -> Result<()> {
    let ports = tokio_serial::available_ports()?;

    if ports.is_empty() {
        println!("No serial ports found");
    }

    for port in ports {
        println!("{}\t{:?}", port.port_name, port.port_type);
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_quit() -> Result<()> {
    let mut hangup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        _ = hangup.recv() => {
            info!("Told to hang up, quitting")
        }
    }

    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_quit() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C, quitting");

    Ok(())
}

async fn run(mut cli: cli::Cli) -> Result<()> {
    match cli.command.take() {
        Some(cli::Commands::Examples(example)) => {
            cli::show_example(example);
            return Ok(());
        }
        Some(cli::Commands::Ports) => return list_ports().await,
        Some(cli::Commands::Flash { path, model, image }) => {
            let config = load_config(&cli)?;
            let image = image
                .or(config.firmware)
                .ok_or_else(|| eyre!("No firmware image given, and none in the configuration"))?;

            Flasher::default().flash(&path, &model, &image).await?;
            return Ok(());
        }
        None => {}
    }

    let config = load_config(&cli)?;

    let directory = InMemoryDirectory::new(config.devices.clone());
    let registry = RegistryBuilder::new(Arc::new(directory), Arc::new(LoggingSink))
        .set_settings(config.port_settings())
        .build(SerialTransport);

    for board in config.boards {
        match registry.connect(board.clone()).await {
            Ok(info) => info!(%board, linked = ?info.linked_devices, "Listening"),
            Err(e) => warn!(%board, %e, "Could not connect"),
        }
    }

    let result = wait_for_quit().await;

    if let Err(e) = registry.shutdown().await {
        error!(%e, "Problem shutting down");
    }

    result
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();

    let file_logging = cli.log_dir.clone().map(|dir| logging::FileLogging {
        dir,
        level: cli.log_level,
    });
    logging::init(cli.log_level, file_logging)?;

    let result = run(cli).await;

    if let Err(e) = &result {
        error!(%e, "Exiting");
    }
    logging::shutdown();

    result
}
