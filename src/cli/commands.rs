//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: start WireMock and keep it up until interrupted
//! - exec: start WireMock, run a command against it, stop WireMock
//! - fetch: download the standalone jar into the cache
//! - wait-port: block until a port accepts connections

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use wiremock_launcher::config::{Config, StdioMode};

/// wiremock-launcher - WireMock standalone as a managed test fixture
#[derive(Parser, Debug)]
#[command(name = "wiremock-launcher")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start WireMock and keep it running until interrupted or it exits
    Run {
        #[command(flatten)]
        launch: LaunchArgs,

        /// Watch mode: only interrupt, exit or a fault stop WireMock
        #[arg(short, long)]
        watch: bool,
    },

    /// Start WireMock, run a command, then stop WireMock
    Exec {
        #[command(flatten)]
        launch: LaunchArgs,

        /// Command (and arguments) to run while WireMock is up
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Download the WireMock standalone jar if it is not cached yet
    Fetch {
        #[command(flatten)]
        launch: LaunchArgs,
    },

    /// Wait until a local TCP port accepts connections
    WaitPort {
        /// Port to probe
        port: u16,

        /// Give up after this many milliseconds
        #[arg(short, long, default_value_t = 10_000)]
        timeout_ms: u64,

        /// Delay between attempts in milliseconds
        #[arg(short, long, default_value_t = 100)]
        poll_ms: u64,
    },
}

/// Flags that override values from the config file
#[derive(Args, Debug, Clone, Default)]
pub struct LaunchArgs {
    /// Port WireMock listens on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// WireMock root directory (mappings, __files)
    #[arg(short, long)]
    pub root_dir: Option<PathBuf>,

    /// WireMock standalone version
    #[arg(long = "wiremock-version")]
    pub wiremock_version: Option<String>,

    /// Maven repository base URL
    #[arg(long)]
    pub maven_base_url: Option<String>,

    /// Do not download the jar, even when it is missing
    #[arg(long)]
    pub skip_install: bool,

    /// Java executable
    #[arg(long)]
    pub java_bin: Option<String>,

    /// Directory the jar is cached in
    #[arg(long)]
    pub install_dir: Option<PathBuf>,

    /// How WireMock's output is handled
    #[arg(long, value_enum)]
    pub stdio: Option<StdioMode>,

    /// Extra argument passed to WireMock (repeatable)
    #[arg(long = "arg", allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl LaunchArgs {
    /// Overlay the flags that were given onto `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(root_dir) = &self.root_dir {
            config.root_dir = root_dir.clone();
        }
        if let Some(version) = &self.wiremock_version {
            config.version = version.clone();
        }
        if let Some(url) = &self.maven_base_url {
            config.maven_base_url = url.clone();
        }
        if self.skip_install {
            config.skip_wiremock_install = true;
        }
        if let Some(java_bin) = &self.java_bin {
            config.java_bin = java_bin.clone();
        }
        if let Some(install_dir) = &self.install_dir {
            config.install_dir = install_dir.clone();
        }
        if let Some(stdio) = self.stdio {
            config.stdio = stdio;
        }
        if !self.args.is_empty() {
            config.args = self.args.clone();
        }
    }
}
