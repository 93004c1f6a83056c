use std::{env, fmt, fs, path};

use netpulse::MonitorParams;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config: {0}")]
    ReadFailed(String),
    #[error("failed to write config: {0}")]
    WriteFailed(String),
    #[error("failed to parse config: {0}")]
    ParseFailed(String),
    #[error("no config directory available")]
    ConfigPathUnavailable,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: Monitor,
    pub logging: Logging,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Monitor {
    pub url: String,
    pub interval: u64,
    pub duration: u64,
    pub latency_max: f64,
    pub method: String,
    /// `Name: value` lines; empty sends `Accept: application/json`
    pub headers: Vec<String>,
    pub body: Option<String>,
    pub timeout_ms: u64,
    pub device: Option<String>,
    pub json_size: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub format: String,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/netpulse/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("netpulse/config.toml"))
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            url: "https://jsonplaceholder.typicode.com/posts/1".into(),
            interval: 2,
            duration: 30,
            latency_max: 250.0,
            method: "GET".into(),
            headers: Vec::new(),
            body: None,
            timeout_ms: 3000,
            device: None,
            json_size: false,
        }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self { level: "info".into(), format: "compact".into() }
    }
}

impl Monitor {
    /// Raw parameters for validation, `device` filling in a missing label
    pub fn to_params(&self, device: Option<String>) -> MonitorParams {
        MonitorParams {
            url: self.url.clone(),
            interval: self.interval.to_string(),
            duration: self.duration.to_string(),
            latency_max: self.latency_max.to_string(),
            method: self.method.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            timeout_ms: self.timeout_ms.to_string(),
            device: self.device.clone().or(device),
            json_size: self.json_size,
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Monitor")?;
        write_1(f, "URL", &self.monitor.url)?;
        write_1(f, "Method", &self.monitor.method)?;
        write_1(f, "Interval (s)", &self.monitor.interval)?;
        write_1(f, "Duration (s)", &self.monitor.duration)?;
        write_1(f, "Latency Max (ms)", &self.monitor.latency_max)?;
        write_1(f, "Timeout (ms)", &self.monitor.timeout_ms)?;
        write_1(f, "Headers", &self.monitor.headers.len())?;
        write_1(f, "JSON Sizing", &self.monitor.json_size)?;
        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;
        write_1(f, "Format", &self.logging.format)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/netpulse/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string =
                fs::read_to_string(&config_path).map_err(|err| Error::ReadFailed(err.to_string()))?;
            toml::from_str(raw_string.as_str()).map_err(|err| Error::ParseFailed(err.to_string()))
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), Error> {
        let config_str: String =
            toml::to_string_pretty(self).map_err(|err| Error::ParseFailed(err.to_string()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::WriteFailed(err.to_string()))?;
        }

        std::fs::write(path, config_str).map_err(|err| Error::WriteFailed(err.to_string()))
    }
}
