use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use crate::error::LauncherError;

/// Default Maven repository the jar is fetched from.
pub const DEFAULT_MAVEN_BASE_URL: &str = "https://repo1.maven.org/maven2";

/// Default WireMock standalone release.
pub const DEFAULT_WIREMOCK_VERSION: &str = "2.26.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    #[serde(alias = "rootDir")]
    pub root_dir: PathBuf,
    pub stdio: StdioMode,
    #[serde(alias = "mavenBaseUrl")]
    pub maven_base_url: String,
    #[serde(alias = "skipWiremockInstall")]
    pub skip_wiremock_install: bool,
    pub args: Vec<String>,
    pub version: String,
    pub java_bin: String,
    pub install_dir: PathBuf,
    pub download_timeout_ms: u64,
    pub shutdown_wait_ms: Option<u64>,
    pub readiness: ReadinessConfig,
}

/// How the child's stdout/stderr are wired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StdioMode {
    Inherit,
    Ignore,
}

impl StdioMode {
    pub fn to_stdio(self) -> Stdio {
        match self {
            StdioMode::Inherit => Stdio::inherit(),
            StdioMode::Ignore => Stdio::null(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
    pub terminate_on_timeout: bool,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            timeout_ms: 10_000,
            terminate_on_timeout: false,
        }
    }
}

impl ReadinessConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Directory the downloaded jar is cached in when none is configured
pub fn default_install_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(env!("CARGO_PKG_NAME"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            root_dir: PathBuf::from("./mock"),
            stdio: StdioMode::Inherit,
            maven_base_url: DEFAULT_MAVEN_BASE_URL.to_string(),
            skip_wiremock_install: false,
            args: Vec::new(),
            version: DEFAULT_WIREMOCK_VERSION.to_string(),
            java_bin: "java".to_string(),
            install_dir: default_install_dir(),
            download_timeout_ms: 300_000,
            shutdown_wait_ms: None,
            readiness: ReadinessConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Immutable launch parameters resolved from a `Config`.
///
/// Constructing one creates `root_dir` if it does not exist yet, so a
/// `LaunchConfig` always points at an existing, absolute root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    pub port: u16,
    pub root_dir: PathBuf,
    pub artifact_version: String,
    pub artifact_base_url: String,
    pub skip_fetch: bool,
    pub extra_args: Vec<String>,
    pub java_bin: String,
    pub install_dir: PathBuf,
    pub stdio: StdioMode,
}

impl LaunchConfig {
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        if config.port == 0 {
            return Err(LauncherError::Config("port must be greater than 0".to_string()));
        }
        if config.version.trim().is_empty() {
            return Err(LauncherError::Config("version must not be empty".to_string()));
        }

        let root_dir = std::path::absolute(&config.root_dir)?;
        if !root_dir.exists() {
            log::info!("Creating root dir {}", root_dir.display());
            fs::create_dir_all(&root_dir)?;
        }

        Ok(Self {
            port: config.port,
            root_dir,
            artifact_version: config.version.clone(),
            artifact_base_url: config.maven_base_url.clone(),
            skip_fetch: config.skip_wiremock_install,
            extra_args: config.args.clone(),
            java_bin: config.java_bin.clone(),
            install_dir: config.install_dir.clone(),
            stdio: config.stdio,
        })
    }
}
