//! Application configuration for the YouMind client.
//!
//! User config lives at `~/.youmind/youmind.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, YoumindError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "youmind.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".youmind";

// ---------------------------------------------------------------------------
// Config structs (matching youmind.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote service endpoints.
    #[serde(default)]
    pub service: ServiceConfig,

    /// CSS selectors for the board chat surface.
    #[serde(default)]
    pub selectors: SelectorsConfig,

    /// Timeouts and polling cadence.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// WebDriver endpoint and browser launch settings.
    #[serde(default)]
    pub webdriver: WebDriverConfig,

    /// Discovery defaults.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// `[service]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service origin.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the interactive sign-in page.
    #[serde(default = "default_sign_in_path")]
    pub sign_in_path: String,

    /// Path of the signed-in landing page, used by the auth probe.
    #[serde(default = "default_overview_path")]
    pub overview_path: String,

    /// Path prefix under which boards live.
    #[serde(default = "default_board_path_prefix")]
    pub board_path_prefix: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            sign_in_path: default_sign_in_path(),
            overview_path: default_overview_path(),
            board_path_prefix: default_board_path_prefix(),
        }
    }
}

fn default_base_url() -> String {
    "https://youmind.com".into()
}
fn default_sign_in_path() -> String {
    "/sign-in".into()
}
fn default_overview_path() -> String {
    "/overview".into()
}
fn default_board_path_prefix() -> String {
    "/boards/".into()
}

impl ServiceConfig {
    /// Full sign-in URL.
    pub fn sign_in_url(&self) -> Result<Url> {
        self.join(&self.sign_in_path)
    }

    /// Full overview URL (auth probe target).
    pub fn overview_url(&self) -> Result<Url> {
        self.join(&self.overview_path)
    }

    /// Full board URL prefix, for validating user-supplied board URLs.
    pub fn board_url_prefix(&self) -> Result<Url> {
        self.join(&self.board_path_prefix)
    }

    fn join(&self, path: &str) -> Result<Url> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| YoumindError::config(format!("invalid base_url: {e}")))?;
        base.join(path)
            .map_err(|e| YoumindError::config(format!("invalid service path '{path}': {e}")))
    }
}

/// `[selectors]` section — ordered by reliability, first visible match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorsConfig {
    /// Chat input candidates.
    #[serde(default = "default_query_input")]
    pub query_input: Vec<String>,

    /// Send button candidates (fallback when Enter inserts a newline).
    #[serde(default = "default_send_button")]
    pub send_button: Vec<String>,

    /// Rendered response candidates.
    #[serde(default = "default_response")]
    pub response: Vec<String>,

    /// In-progress generation indicators.
    #[serde(default = "default_thinking")]
    pub thinking: Vec<String>,
}

impl Default for SelectorsConfig {
    fn default() -> Self {
        Self {
            query_input: default_query_input(),
            send_button: default_send_button(),
            response: default_response(),
            thinking: default_thinking(),
        }
    }
}

fn default_query_input() -> Vec<String> {
    [
        "textarea[placeholder*='Ask']",
        "textarea[placeholder*='question']",
        "textarea[aria-label*='Ask']",
        "textarea[aria-label*='question']",
        "div[contenteditable='true'][role='textbox']",
        "div[contenteditable='true']",
    ]
    .map(String::from)
    .to_vec()
}

fn default_send_button() -> Vec<String> {
    [
        "button[aria-label*='Send']",
        "button[data-testid*='send']",
        "button[class*='send']",
    ]
    .map(String::from)
    .to_vec()
}

fn default_response() -> Vec<String> {
    [
        "div.message-blocks",
        "div[class*='message-blocks']",
        "[class*='message-blocks']",
        "[data-message-author='assistant']",
        "[data-role='assistant']",
        "[data-testid*='assistant']",
        "div[class*='message']",
        "[class*='message']",
        ".assistant-message",
        ".message.ai",
        ".message-content",
    ]
    .map(String::from)
    .to_vec()
}

fn default_thinking() -> Vec<String> {
    ["div.thinking-message", "[data-testid*='thinking']"]
        .map(String::from)
        .to_vec()
}

/// `[timeouts]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Default per-question deadline in seconds.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// How long `auth setup` waits for the operator to finish logging in.
    #[serde(default = "default_login_wait")]
    pub login_wait_secs: u64,

    /// Interval between completion polls, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Bounded wait for the chat input to appear, in seconds.
    #[serde(default = "default_input_wait")]
    pub input_wait_secs: u64,

    /// Consecutive identical polls required before an answer counts as final.
    #[serde(default = "default_stability_polls")]
    pub stability_polls: u32,

    /// How long a successful probe keeps `status` reporting present-valid.
    #[serde(default = "default_auth_freshness")]
    pub auth_freshness_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            query_timeout_secs: default_query_timeout(),
            login_wait_secs: default_login_wait(),
            poll_interval_ms: default_poll_interval(),
            input_wait_secs: default_input_wait(),
            stability_polls: default_stability_polls(),
            auth_freshness_secs: default_auth_freshness(),
        }
    }
}

fn default_query_timeout() -> u64 {
    120
}
fn default_login_wait() -> u64 {
    600
}
fn default_poll_interval() -> u64 {
    800
}
fn default_input_wait() -> u64 {
    5
}
fn default_stability_polls() -> u32 {
    3
}
fn default_auth_freshness() -> u64 {
    300
}

impl TimeoutsConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn input_wait(&self) -> Duration {
        Duration::from_secs(self.input_wait_secs)
    }
}

/// `[webdriver]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebDriverConfig {
    /// WebDriver endpoint (a running chromedriver).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// User agent presented by driven sessions.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Extra Chrome switches applied to every session.
    #[serde(default = "default_browser_args")]
    pub browser_args: Vec<String>,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            user_agent: default_user_agent(),
            browser_args: default_browser_args(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:9515".into()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into()
}

fn default_browser_args() -> Vec<String> {
    [
        "--disable-blink-features=AutomationControlled",
        "--disable-dev-shm-usage",
        "--no-sandbox",
        "--no-first-run",
        "--no-default-browser-check",
    ]
    .map(String::from)
    .to_vec()
}

/// `[discovery]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Default pass count for smart-add: 1 or 2.
    #[serde(default = "default_passes")]
    pub passes: u8,

    /// Whether queries keep a board URL's embedded material focus by default.
    #[serde(default)]
    pub keep_material_context: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            passes: default_passes(),
            keep_material_context: false,
        }
    }
}

fn default_passes() -> u8 {
    2
}

// ---------------------------------------------------------------------------
// Paths and config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.youmind/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| YoumindError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.youmind/youmind.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Get the path to the local data directory (`~/.youmind/data`).
pub fn data_dir() -> Result<PathBuf> {
    Ok(config_dir()?.join("data"))
}

/// Path of the persisted auth artifact.
pub fn auth_state_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("state.json"))
}

/// Path of the persisted board library.
pub fn library_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("library.json"))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| YoumindError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| YoumindError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| YoumindError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| YoumindError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| YoumindError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("base_url"));
        assert!(toml_str.contains("query_timeout_secs"));
        assert!(toml_str.contains("localhost:9515"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.timeouts.query_timeout_secs, 120);
        assert_eq!(parsed.discovery.passes, 2);
        assert!(!parsed.selectors.query_input.is_empty());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[service]
base_url = "https://staging.youmind.com"

[timeouts]
query_timeout_secs = 30
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.service.base_url, "https://staging.youmind.com");
        assert_eq!(config.timeouts.query_timeout_secs, 30);
        // Everything unspecified keeps its default.
        assert_eq!(config.timeouts.poll_interval_ms, 800);
        assert_eq!(config.webdriver.endpoint, "http://localhost:9515");
    }

    #[test]
    fn service_urls_derive_from_base() {
        let service = ServiceConfig::default();
        assert_eq!(
            service.sign_in_url().unwrap().as_str(),
            "https://youmind.com/sign-in"
        );
        assert_eq!(
            service.overview_url().unwrap().as_str(),
            "https://youmind.com/overview"
        );
        assert_eq!(
            service.board_url_prefix().unwrap().as_str(),
            "https://youmind.com/boards/"
        );
    }

    #[test]
    fn invalid_base_url_is_config_error() {
        let service = ServiceConfig {
            base_url: "not a url".into(),
            ..ServiceConfig::default()
        };
        assert!(service.sign_in_url().is_err());
    }
}
