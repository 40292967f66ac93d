//! Core configuration structures and loading logic

use serde::{de, Deserialize, Deserializer, Serialize};
use std::borrow::Cow;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Transition length used when neither flags, environment nor config set one.
pub const DEFAULT_DURATION_SECS: f64 = 1.0;
/// Effect list used when nothing else is configured.
pub const DEFAULT_EFFECTS: &str = "fade";
/// Verbosity handed to the transcoder when nothing else is configured.
pub const DEFAULT_LOGLEVEL: &str = "error";
/// Frame rate both inputs are normalized to when exactly two clips are joined.
pub const DEFAULT_FPS: u32 = 30;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// JSON parsing error
    Parse(serde_json::Error),
    /// Effect list was empty after splitting
    InvalidEffects(String),
    /// Duration was not a positive finite number
    InvalidDuration(String),
    /// Frame rate was zero
    InvalidFrameRate(u32),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::InvalidEffects(s) => {
                write!(f, "Effect list '{}' contains no effect names", s)
            }
            ConfigError::InvalidDuration(s) => {
                write!(f, "Duration '{}' is not a positive number of seconds", s)
            }
            ConfigError::InvalidFrameRate(fps) => {
                write!(f, "Frame rate must be positive, got {}", fps)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// The `input` field: a single path or a list of paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum InputSpec {
    One(String),
    Many(Vec<String>),
}

impl InputSpec {
    /// Input paths in the order they were written.
    pub fn paths(&self) -> Vec<PathBuf> {
        match self {
            InputSpec::One(p) => vec![PathBuf::from(p)],
            InputSpec::Many(ps) => ps.iter().map(PathBuf::from).collect(),
        }
    }
}

/// The `duration` field. Written as a numeric string, but bare numbers are accepted too.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DurationValue {
    Number(f64),
    Text(String),
}

impl DurationValue {
    /// Seconds, validated to be positive and finite.
    pub fn seconds(&self) -> Result<f64, ConfigError> {
        match self {
            DurationValue::Number(n) if n.is_finite() && *n > 0.0 => Ok(*n),
            DurationValue::Number(n) => Err(ConfigError::InvalidDuration(n.to_string())),
            DurationValue::Text(s) => parse_duration(s),
        }
    }
}

/// Contents of a JSON config file.
///
/// Every field is optional; unset fields fall through to CLI defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub input: Option<InputSpec>,
    #[serde(default)]
    pub output: Option<String>,
    /// Regex applied to candidate file names
    #[serde(default)]
    pub grep: Option<String>,
    /// Natural-sort the resolved clips by file name (`true` or `"true"`)
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub sort: Option<bool>,
    /// Comma-separated effect names
    #[serde(default)]
    pub effects: Option<String>,
    /// Transition duration in seconds
    #[serde(default)]
    pub duration: Option<DurationValue>,
    /// Transcoder log level
    #[serde(default)]
    pub loglevel: Option<String>,
    /// Frame rate for two-clip normalization
    #[serde(default)]
    pub fps: Option<u32>,
}

impl ConfigFile {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_json(&content)
    }

    /// Parse configuration from a JSON string
    pub fn parse_json(content: &str) -> Result<Self, ConfigError> {
        let config: ConfigFile = serde_json::from_str(content)?;
        if let Some(fps) = config.fps {
            if fps == 0 {
                return Err(ConfigError::InvalidFrameRate(fps));
            }
        }
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - XFADE_OUTPUT -> output
    /// - XFADE_EFFECTS -> effects
    /// - XFADE_DURATION -> duration
    /// - XFADE_LOGLEVEL -> loglevel
    /// - XFADE_GREP -> grep
    /// - XFADE_SORT -> sort
    /// - XFADE_FPS -> fps
    ///
    /// Malformed values are ignored and the existing setting is kept.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("XFADE_OUTPUT") {
            if !val.trim().is_empty() {
                self.output = Some(val);
            }
        }

        if let Ok(val) = env::var("XFADE_EFFECTS") {
            if parse_effects(&val).is_ok() {
                self.effects = Some(val);
            }
        }

        if let Ok(val) = env::var("XFADE_DURATION") {
            if parse_duration(&val).is_ok() {
                self.duration = Some(DurationValue::Text(val));
            }
        }

        if let Ok(val) = env::var("XFADE_LOGLEVEL") {
            if !val.trim().is_empty() {
                self.loglevel = Some(val.trim().to_string());
            }
        }

        if let Ok(val) = env::var("XFADE_GREP") {
            self.grep = Some(val);
        }

        if let Ok(val) = env::var("XFADE_SORT") {
            if let Some(flag) = parse_flag(&val) {
                self.sort = Some(flag);
            }
        }

        if let Ok(val) = env::var("XFADE_FPS") {
            if let Ok(fps) = val.trim().parse::<u32>() {
                if fps > 0 {
                    self.fps = Some(fps);
                }
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Configuration from environment variables alone, for runs without a config file.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }
}

/// Split a comma-separated effect list into ordered effect names.
///
/// Names are trimmed and empty pieces dropped. Names are not checked against
/// any catalog.
pub fn parse_effects(raw: &str) -> Result<Vec<String>, ConfigError> {
    let effects: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if effects.is_empty() {
        return Err(ConfigError::InvalidEffects(raw.to_string()));
    }
    Ok(effects)
}

/// Rewrite a decimal comma as a point (`"1,5"` -> `"1.5"`).
///
/// Text that already has a `.` is left alone.
pub fn normalize_decimal(raw: &str) -> Cow<'_, str> {
    if raw.contains(',') && !raw.contains('.') {
        Cow::Owned(raw.replace(',', "."))
    } else {
        Cow::Borrowed(raw)
    }
}

/// Parse a transition duration in seconds.
///
/// Accepts surrounding whitespace and a decimal comma (`"1,5"`).
pub fn parse_duration(raw: &str) -> Result<f64, ConfigError> {
    match normalize_decimal(raw.trim()).parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs > 0.0 => Ok(secs),
        _ => Err(ConfigError::InvalidDuration(raw.to_string())),
    }
}

/// Boolean spellings accepted in config strings and environment variables:
/// `true`/`1`/`yes` and `false`/`0`/`no`, case-insensitive.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// `sort` may be written as a JSON bool or as a string flag.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Option::<Flag>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Flag::Bool(b)) => Ok(Some(b)),
        Some(Flag::Text(s)) => parse_flag(&s)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid flag {:?}, expected true or false", s))),
    }
}
