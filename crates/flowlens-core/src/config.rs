use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{self, IsTerminal};
use std::path::Path;
use std::time::Duration;
use std::{env, fs};

use crate::calendar::{Calendar, DEFAULT_HOURS_PER_DAY};
use crate::period::Period;

const PROJECT_CONFIG: &str = ".flowlens/config.toml";
const USER_CONFIG: &str = "flowlens/config.toml";

/// Project-level settings read from `.flowlens/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub flow: FlowSettings,
    #[serde(default)]
    pub forecast: ForecastSettings,
    #[serde(default)]
    pub effort: EffortSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_hours_per_day")]
    pub hours_per_day: f64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            hours_per_day: default_hours_per_day(),
        }
    }
}

impl CalendarConfig {
    #[must_use]
    pub fn calendar(&self) -> Calendar {
        Calendar::new(self.hours_per_day)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSettings {
    #[serde(default)]
    pub period: Period,
    /// Lower bound for the scope series while the backlog is still fuzzy.
    #[serde(default)]
    pub uncertain_scope: u32,
    /// How many recent throughput samples feed the Monte Carlo simulation.
    #[serde(default = "default_monte_carlo_window")]
    pub monte_carlo_window: usize,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            period: Period::default(),
            uncertain_scope: 0,
            monte_carlo_window: default_monte_carlo_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastSettings {
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Fixed RNG seed for reproducible simulations.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffortSettings {
    /// How long a rebuild waits for a concurrent rebuild of the same item.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for EffortSettings {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl EffortSettings {
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// Read `.flowlens/config.toml` under `project_root`, defaults when absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    read_toml_or_default(&project_root.join(PROJECT_CONFIG))
}

/// Read `<config dir>/flowlens/config.toml`, defaults when absent.
///
/// # Errors
///
/// Returns an error if the user config exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    dirs::config_dir().map_or_else(
        || Ok(UserConfig::default()),
        |dir| read_toml_or_default(&dir.join(USER_CONFIG)),
    )
}

fn read_toml_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.is_file() {
        return Ok(T::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("cannot read config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
}

/// Load both config layers and settle the output mode.
///
/// # Errors
///
/// Propagates project or user config loading failures.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;
    let resolved_output = if cli_json {
        "json"
    } else {
        output_mode_name(
            env::var("FORMAT").ok().as_deref(),
            user.output.as_deref(),
            io::stdout().is_terminal(),
        )
    };

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output: resolved_output.to_string(),
    })
}

/// `FORMAT` env, then the user setting, then the terminal default.
fn output_mode_name(env_format: Option<&str>, user_output: Option<&str>, tty: bool) -> &'static str {
    [env_format, user_output]
        .into_iter()
        .flatten()
        .find_map(canonical_mode)
        .unwrap_or(if tty { "pretty" } else { "text" })
}

fn canonical_mode(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pretty" | "human" => Some("pretty"),
        "text" | "plain" => Some("text"),
        "json" => Some("json"),
        _ => None,
    }
}

const fn default_hours_per_day() -> f64 {
    DEFAULT_HOURS_PER_DAY
}

const fn default_monte_carlo_window() -> usize {
    10
}

const fn default_iterations() -> usize {
    1_000
}

const fn default_lock_timeout_ms() -> u64 {
    5_000
}
