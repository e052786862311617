//! Configuration management for the SSI renderer.
//!
//! Parses `ssi.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `render.base_dir`
//! - every value of `[commands]`
//! - every string value of `[constants]`

mod expand;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override source encoding.
    pub encoding: Option<String>,
    /// Override byte-order-mark preservation.
    pub preserve_bom: Option<bool>,
    /// Override the per-insert timeout in milliseconds (0 disables it).
    pub timeout_ms: Option<u64>,
    /// Override the base directory for relative includes.
    pub base_dir: Option<PathBuf>,
    /// Override the leftover attribute check.
    pub reject_leftover_attrs: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "ssi.toml";

/// Default per-insert timeout.
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Encodings the renderer knows how to decode.
const KNOWN_ENCODINGS: &[&str] = &["utf-8", "utf8", "latin1", "iso-8859-1"];

/// Registry keys that carry settings or chain slots instead of command names.
const RESERVED_KEYS: &[&str] = &[">prefix", ">suffix", ">before", ">other", ">after"];

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Render settings as written in TOML.
    render: RenderConfigRaw,
    /// Command registry entries: reserved keys and aliases.
    ///
    /// `">prefix"` and `">suffix"` set the tag markers, every other value names
    /// the handler the key resolves to.
    pub commands: BTreeMap<String, String>,
    /// Commands that always produce a fixed value.
    pub constants: BTreeMap<String, Constant>,

    /// Resolved render configuration (set after loading).
    #[serde(skip)]
    pub render_resolved: RenderConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Raw render configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RenderConfigRaw {
    encoding: Option<String>,
    preserve_bom: Option<bool>,
    timeout_ms: Option<u64>,
    reject_leftover_attrs: Option<bool>,
    base_dir: Option<String>,
}

/// Resolved render configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    /// Source and output encoding name.
    pub encoding: String,
    /// Whether a source byte-order mark is written back to the output.
    pub preserve_bom: bool,
    /// Default per-insert timeout (`None` disables it).
    pub timeout: Option<Duration>,
    /// Whether command tags must consume all of their attributes.
    pub reject_leftover_attrs: bool,
    /// Directory that relative include paths resolve against.
    pub base_dir: PathBuf,
}

impl RenderConfig {
    fn default_with_base(base: &Path) -> Self {
        Self {
            encoding: "utf-8".to_owned(),
            preserve_bom: true,
            timeout: Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
            reject_leftover_attrs: true,
            base_dir: base.to_path_buf(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Fixed value produced by a `[constants]` command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Constant {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    Text(String),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`render.base_dir`").
        field: String,
        /// Error message (e.g., "${`DOCS_ROOT`} not set").
        message: String,
    },
}

/// Require a marker string to be usable inside a tag.
fn require_marker(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.chars().any(|c| c.is_whitespace() || c == '<' || c == '>') {
        return Err(ConfigError::Validation(format!(
            "{field} cannot contain whitespace, '<' or '>'"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `ssi.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(encoding) = &settings.encoding {
            self.render_resolved.encoding.clone_from(encoding);
        }
        if let Some(preserve_bom) = settings.preserve_bom {
            self.render_resolved.preserve_bom = preserve_bom;
        }
        if let Some(timeout_ms) = settings.timeout_ms {
            self.render_resolved.timeout = timeout_from_millis(timeout_ms);
        }
        if let Some(base_dir) = &settings.base_dir {
            self.render_resolved.base_dir.clone_from(base_dir);
        }
        if let Some(reject) = settings.reject_leftover_attrs {
            self.render_resolved.reject_leftover_attrs = reject;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            render: RenderConfigRaw::default(),
            commands: BTreeMap::new(),
            constants: BTreeMap::new(),
            render_resolved: RenderConfig::default_with_base(base),
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file and after CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_render()?;
        self.validate_commands()?;
        Ok(())
    }

    fn validate_render(&self) -> Result<(), ConfigError> {
        let encoding = self.render_resolved.encoding.to_ascii_lowercase();
        if !KNOWN_ENCODINGS.contains(&encoding.as_str()) {
            return Err(ConfigError::Validation(format!(
                "render.encoding must be one of {}",
                KNOWN_ENCODINGS.join(", ")
            )));
        }
        Ok(())
    }

    fn validate_commands(&self) -> Result<(), ConfigError> {
        for (key, value) in &self.commands {
            if key.starts_with('>') && !RESERVED_KEYS.contains(&key.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "commands.\"{key}\" is not a reserved key (expected one of {})",
                    RESERVED_KEYS.join(", ")
                )));
            }
            match key.as_str() {
                ">prefix" | ">suffix" => require_marker(value, &format!("commands.\"{key}\""))?,
                _ if value.is_empty() => {
                    return Err(ConfigError::Validation(format!(
                        "commands.\"{key}\" cannot be empty"
                    )));
                }
                _ => {}
            }
        }

        if let Some(key) = self.constants.keys().find(|k| k.starts_with('>')) {
            return Err(ConfigError::Validation(format!(
                "constants.\"{key}\": reserved keys belong in [commands]"
            )));
        }

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref base_dir) = self.render.base_dir {
            self.render.base_dir = Some(expand::expand_env(base_dir, "render.base_dir")?);
        }

        for (key, value) in &mut self.commands {
            *value = expand::expand_env(value, &format!("commands.\"{key}\""))?;
        }

        for (key, value) in &mut self.constants {
            if let Constant::Text(text) = value {
                *text = expand::expand_env(text, &format!("constants.\"{key}\""))?;
            }
        }

        Ok(())
    }

    /// Resolve raw values against the config file directory.
    fn resolve(&mut self, config_dir: &Path) {
        let defaults = RenderConfig::default_with_base(config_dir);
        let raw = &self.render;

        self.render_resolved = RenderConfig {
            encoding: raw.encoding.clone().unwrap_or(defaults.encoding),
            preserve_bom: raw.preserve_bom.unwrap_or(defaults.preserve_bom),
            timeout: raw
                .timeout_ms
                .map_or(defaults.timeout, timeout_from_millis),
            reject_leftover_attrs: raw
                .reject_leftover_attrs
                .unwrap_or(defaults.reject_leftover_attrs),
            base_dir: raw
                .base_dir
                .as_deref()
                .map_or(defaults.base_dir, |dir| config_dir.join(dir)),
        };
    }
}

/// Convert a millisecond setting into a timeout, `0` meaning "no timeout".
fn timeout_from_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
