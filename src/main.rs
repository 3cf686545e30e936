use camcast::config::{self, Config};
use camcast::control::server::ControlServer;
use camcast::control::supervisor::{ShellCaptureCommand, Supervisor};
use clap::{Arg, ArgAction, Command};
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::LevelFilter;

fn main() {
    let matches = Command::new(config::app_name())
        .version(config::version())
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("detach")
                .short('d')
                .long("detach")
                .help("Run detached: keep quiet, log errors only.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Port to listen on for control commands.")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("command")
                .short('c')
                .long("command")
                .value_name("PATH")
                .help("Capture process command to supervise."),
        )
        .get_matches();

    let mut config = Config::default();
    if let Some(port) = matches.get_one::<u16>("port") {
        config.port = *port;
    }
    if let Some(command) = matches.get_one::<String>("command") {
        config.capture_command = command.into();
    }
    config.quiet = matches.get_flag("detach");

    let level = if config.quiet {
        LevelFilter::ERROR
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    // gracefully close the daemon when receiving SIGINT or SIGTERM
    let shutdown = CancellationToken::new();
    let handler_token = shutdown.clone();
    ctrlc::set_handler(move || handler_token.cancel()).expect("Error setting Ctrl-C handler");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            process::exit(1);
        }
    };

    let result = runtime.block_on(async {
        let command = ShellCaptureCommand::new(&config.capture_command);
        let supervisor = Supervisor::new(Arc::new(command));
        let server = ControlServer::bind(config.port, supervisor, shutdown.clone()).await?;
        server.run().await
    });

    if let Err(e) = result {
        log::error!("{e:#}");
        process::exit(1);
    }
}
