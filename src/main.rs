//! CLI entry point: flag handling, the bootstrap logger, secret
//! collection, the double config render, and the supervision run itself.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use launch::{
    collect_secrets, example_config, spawn_signal_forwarder, Config, DefaultLoggerConfig,
    InternalLogger, LogManager, LoggingConfig, ProcessesConfig, SignalReplicator, Supervisor,
};

/// Version and build stamp; the timestamp is expected to be passed in at
/// build time.
const VERSION: &str = env!("CARGO_PKG_VERSION");
const BUILD_TIMESTAMP: &str = match option_env!("BUILD_TIMESTAMP") {
    Some(ts) => ts,
    None => "unknown",
};
const RUNTIME_VERSION: &str = match option_env!("RUSTC_VERSION") {
    Some(rv) => rv,
    None => "rustc (unrecorded)",
};

#[derive(Parser)]
#[command(name = "launch", disable_version_flag = true)]
/// Container-oriented process supervisor.
struct Cli {
    /// Shows the version.
    #[arg(short = 'v')]
    version: bool,
    /// Shows extended version numbering.
    #[arg(long = "version")]
    version_extended: bool,
    /// Displays an example configuration.
    #[arg(long = "example-config")]
    example_config: bool,
    /// Location of the config file to read.
    #[arg(short = 'f', default_value = "/launch.yaml")]
    config_file: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.version {
        println!("{VERSION}");
        return;
    }
    if cli.version_extended {
        println!("Version: {VERSION}\nBuild time: {BUILD_TIMESTAMP}\nRuntime version: {RUNTIME_VERSION}");
        return;
    }
    if cli.example_config {
        match example_config() {
            Ok(yaml) => println!("{yaml}"),
            Err(e) => {
                eprintln!("there was an error generating the configuration file example: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    // Signal capture goes up before anything can spawn. Signals come from
    // the daemon running the container or from our own tumble cascade; both
    // funnel through the replicator.
    let replicator = SignalReplicator::new();
    if let Err(e) = spawn_signal_forwarder(replicator.clone()) {
        eprintln!("failed to install signal handlers: {e}");
        std::process::exit(1);
    }

    // A console-only logger carries us through secret collection; the full
    // config may depend on secrets that do not exist yet.
    let bootstrap_config = LoggingConfig::console();
    let mut bootstrap = LogManager::new(DefaultLoggerConfig::default());
    if let Err(e) = bootstrap
        .start(&ProcessesConfig::default(), &bootstrap_config)
        .await
    {
        eprintln!("{e}");
    }
    let bootstrap = Arc::new(bootstrap);
    let pmlogger = InternalLogger::new(bootstrap_config, Arc::clone(&bootstrap));

    let config = match Config::load(&cli.config_file) {
        Ok(config) => config,
        Err(e) => {
            pmlogger.err(format!("failed to render the configuration: {e}"));
            return terminate(1, &bootstrap).await;
        }
    };

    pmlogger.std("attempting to collect secrets");
    if let Err(e) = collect_secrets(&config.processes.secret_processes, &pmlogger).await {
        pmlogger.err(format!("failed to collect secrets: {e}"));
        return terminate(1, &bootstrap).await;
    }

    // Render again so secret values resolve where they are referenced.
    pmlogger.std("rendering configuration again with secrets in place");
    let config = match Config::load(&cli.config_file) {
        Ok(config) => config,
        Err(e) => {
            pmlogger.err(format!("failed to recreate the configuration: {e}"));
            return terminate(1, &bootstrap).await;
        }
    };

    pmlogger.std("starting full loggers");
    for e in bootstrap.shutdown().await {
        eprintln!("error shutting down bootstrap logger: {e}");
    }

    let mut manager = LogManager::new(config.default_logger_config.clone());
    if let Err(e) = manager
        .start(&config.processes, &config.process_manager.logging_config)
        .await
    {
        eprintln!("could not start full logging: {e}");
        std::process::exit(1);
    }
    let manager = Arc::new(manager);

    let pmlogger = InternalLogger::new(
        config.process_manager.logging_config.clone(),
        Arc::clone(&manager),
    );
    pmlogger.set_debug(config.process_manager.debug_logging);
    pmlogger.debug("debug logging for the process manager has been turned on");
    if config.process_manager.debug_options.show_generated_config {
        pmlogger.debug(format!("using generated config:\n{}", config.render()));
    }

    let supervisor = Supervisor::new(
        config.processes.clone(),
        Arc::clone(&manager),
        pmlogger.clone(),
        replicator.clone(),
    );

    if let Err(e) = supervisor.run_inits().await {
        pmlogger.err(format!("an init process failed: {e}"));
        pmlogger.std(supervisor.exit_states_json());
        return terminate(1, &manager).await;
    }

    let mut report = supervisor.run_mains().await;
    pmlogger.debug("waiting for main processes to finish");
    let end_message = report.recv().await.unwrap_or_default();
    pmlogger.debug("finished waiting, proceeding to shut down loggers");
    pmlogger.std(end_message);

    terminate(0, &manager).await;
}

/// Drains the loggers and exits. If the loggers fail there is nothing left
/// but the raw console.
async fn terminate(code: i32, manager: &Arc<LogManager>) {
    for e in manager.shutdown().await {
        eprintln!("error shutting down loggers: {e}");
    }
    std::process::exit(code);
}
