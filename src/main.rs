use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use dut_keel::{
    cable::ChargingCable,
    cli::{self, Commands, Examples},
    config::Config,
    error::Error,
    logging,
    mock::MockDut,
    port::{Port, Reset},
    session::Session,
};
use tracing::{debug, info, warn};

async fn watch<P: Port + Reset>(session: &Session<P>) -> Result<(), Error> {
    const POLL: Duration = Duration::from_secs(1);

    let mut lines = session.port().listen();

    loop {
        match lines.next(POLL).await {
            Ok(line) => println!("{line}"),
            Err(Error::Timeout { .. }) => {}
            Err(e) => return Err(e),
        }

        if session.check_no_restart().is_err() {
            warn!("The device restarted unexpectedly");
        }
    }
}

async fn execute<P: Port + Reset>(session: &mut Session<P>, command: Commands) -> Result<(), Error> {
    match command {
        Commands::Boot => session.power_cycle().await,
        Commands::Run { boot, commands } => {
            if boot {
                session.power_cycle().await?;
            }

            let runner = session.command_runner().await?;
            for command in commands {
                info!(%command, "Running");
                for line in runner.run_command(&command).await? {
                    println!("{line}");
                }
            }
            Ok(())
        }
        Commands::Watch => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C, quitting");
                    Ok(())
                }
                result = watch(session) => result,
            }
        }
        Commands::Examples(_) | Commands::Ports => Ok(()),
    }
}

async fn run<P: Port + Reset>(port: P, config: &Config, command: Commands) -> Result<(), Error> {
    let cable = ChargingCable::new(&config.cable.state_file)
        .with_settle_time(config.cable.settle_time());
    let mut session = Session::start(port, cable, config).await?;

    let result = execute(&mut session, command).await;

    // Leave the cable connected even if the command failed.
    let finished = session.finish().await;
    result.and(finished)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();

    match cli.command {
        Commands::Examples(Examples::Config) => {
            println!("{}", Config::example().serialize_pretty());
            return Ok(());
        }
        Commands::Ports => {
            for port in serialport::available_ports()? {
                println!("{}\t{:?}", port.port_name, port.port_type);
            }
            return Ok(());
        }
        _ => {}
    }

    logging::init(cli.stdout_level(), cli.file_logging()).await;

    let config = if let Some(config_path) = &cli.config {
        debug!(?config_path, "Config from path");
        Config::new_from_path(config_path)?
    } else {
        debug!("Default config");
        Config::default()
    };

    let result = if cli.mock {
        let mock = MockDut::start().await?;
        let result = run(&mock, &config, cli.command).await;
        mock.stop().await;
        result
    } else {
        let port = config.serial.builder().build().await?;
        let result = run(&port, &config, cli.command).await;
        port.close().await;
        result
    };

    logging::shutdown();

    result?;
    Ok(())
}
