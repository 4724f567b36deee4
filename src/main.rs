use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use wiremock_launcher::artifact::{ArtifactFetcher, ArtifactLocation, ArtifactSource, FetchOutcome};
use wiremock_launcher::config::Config;
use wiremock_launcher::lifecycle::{Capabilities, InterruptListener, LifecycleController, RunnerConfig};
use wiremock_launcher::port::wait_until_ready;

mod cli;

use cli::Cli;
use cli::commands::{Commands, LaunchArgs};

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wiremock-launcher")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("wiremock-launcher.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: Config) -> Result<i32> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run { launch, watch } => handle_run(with_overrides(config, launch), *watch).await,
        Commands::Exec { launch, command } => handle_exec(with_overrides(config, launch), command).await,
        Commands::Fetch { launch } => handle_fetch(with_overrides(config, launch)).await,
        Commands::WaitPort {
            port,
            timeout_ms,
            poll_ms,
        } => handle_wait_port(*port, *timeout_ms, *poll_ms).await,
    }
}

fn with_overrides(mut config: Config, launch: &LaunchArgs) -> Config {
    launch.apply(&mut config);
    config
}

async fn handle_run(config: Config, watch: bool) -> Result<i32> {
    info!("Running WireMock (watch: {})", watch);
    let mut controller = LifecycleController::from_config(&config)?;
    // Live before the child exists, so SIGINT/SIGTERM always go through terminate
    let mut interrupt = InterruptListener::install().context("Failed to install signal handlers")?;

    controller
        .prepare_or_teardown(&RunnerConfig { watch }, &Capabilities::Null)
        .await
        .context("Failed to prepare WireMock")?;
    println!(
        "{} WireMock listening on port {} (root dir {})",
        "Ready:".green(),
        config.port,
        controller.launch_config().root_dir.display()
    );

    let supervisor = Arc::clone(controller.supervisor());
    tokio::select! {
        _ = interrupt.recv() => {
            println!("{}", "Interrupted".yellow());
        }
        record = supervisor.wait_for_exit(Duration::MAX) => {
            if let Some(record) = record {
                info!("WireMock stopped on its own: {}", record);
            }
        }
    }

    controller.complete().await;
    controller.shutdown();
    Ok(0)
}

async fn handle_exec(config: Config, command: &[String]) -> Result<i32> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| eyre!("No command given"))?;
    info!("Executing {:?} against WireMock on port {}", command, config.port);

    let mut controller = LifecycleController::from_config(&config)?;
    let mut interrupt = InterruptListener::install().context("Failed to install signal handlers")?;

    controller
        .prepare_or_teardown(&RunnerConfig::default(), &Capabilities::Null)
        .await
        .context("Failed to prepare WireMock")?;

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .env("WIREMOCK_PORT", config.port.to_string())
        .env("WIREMOCK_URL", format!("http://localhost:{}", config.port))
        .kill_on_drop(true);

    let status = tokio::select! {
        status = cmd.status() => Some(status),
        _ = interrupt.recv() => None,
    };

    controller.complete().await;

    let Some(status) = status else {
        println!("{} {}", "Interrupted:".yellow(), command.join(" "));
        return Ok(130);
    };
    let status = status.context(format!("Failed to run {}", program))?;
    let code = status.code().unwrap_or(1);
    if status.success() {
        println!("{} {}", "Passed:".green(), command.join(" "));
    } else {
        println!("{} {} (exit code {})", "Failed:".red(), command.join(" "), code);
    }
    Ok(code)
}

async fn handle_fetch(config: Config) -> Result<i32> {
    let location = ArtifactLocation::wiremock(&config.maven_base_url, &config.version, &config.install_dir);
    let fetcher = ArtifactFetcher::new(Duration::from_millis(config.download_timeout_ms))?;

    match fetcher.ensure_artifact(&location).await? {
        FetchOutcome::CacheHit => {
            println!("{} {}", "Cached:".green(), location.local_path.display());
        }
        FetchOutcome::Downloaded { bytes, sha256 } => {
            println!(
                "{} {} ({} bytes, sha256 {})",
                "Downloaded:".green(),
                location.local_path.display(),
                bytes,
                sha256
            );
        }
    }
    Ok(0)
}

async fn handle_wait_port(port: u16, timeout_ms: u64, poll_ms: u64) -> Result<i32> {
    wait_until_ready(port, Duration::from_millis(poll_ms), Duration::from_millis(timeout_ms)).await?;
    println!("{} port {} is accepting connections", "Ready:".green(), port);
    Ok(0)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging first
    setup_logging(cli.is_verbose()).context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    let code = run_application(&cli, config).await.context("Application failed")?;
    if code != 0 {
        std::process::exit(code);
    }

    Ok(())
}
