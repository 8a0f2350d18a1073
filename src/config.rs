use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_yaml;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::notion::{DEFAULT_API_URL, DEFAULT_API_VERSION};

#[derive(Parser, Debug)]
#[command(name = "clipsync")]
#[command(about = "Syncs e-reader highlights and notes to a Notion database", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config", global = true)]
    pub config_path: Option<String>,

    /// Clippings export to read, overrides the config file.
    #[arg(short = 'i', long = "input", global = true)]
    pub input: Option<String>,

    #[arg(long = "json-logs", global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Parse the export, write grouped clippings and print stats.
    Parse,
    /// Print only the highlights that carry a note.
    Notes,
    /// Parse, export and push unsynced highlights to Notion.
    Sync {
        #[arg(long)]
        dry_run: bool,
    },
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".clipsync")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct App {
    #[serde(default = "default_clippings_path")]
    pub clippings_path: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
}

impl Default for App {
    fn default() -> Self {
        Self {
            clippings_path: default_clippings_path(),
            output_dir: default_output_dir(),
            cache_file: default_cache_file(),
            pacing_ms: default_pacing_ms(),
        }
    }
}

fn default_clippings_path() -> String {
    "My Clippings.txt".to_string()
}

fn default_output_dir() -> String {
    "data".to_string()
}

fn default_cache_file() -> String {
    "sync.json".to_string()
}

fn default_pacing_ms() -> u64 {
    500
}

impl App {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    /// Cache location; relative paths live under `data_dir`.
    pub fn cache_path(&self, data_dir: &Path) -> PathBuf {
        let path = PathBuf::from(&self.cache_file);
        if path.is_absolute() {
            path
        } else {
            data_dir.join(path)
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Notion {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub database_id: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Default for Notion {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            database_id: String::new(),
            api_url: default_api_url(),
            api_version: default_api_version(),
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

impl Notion {
    /// Fails when the credentials a sync needs are missing.
    pub fn require(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            bail!("notion api key is not configured (notion.api_key or NOTION_API_KEY)");
        }
        if self.database_id.trim().is_empty() {
            bail!("notion database id is not configured (notion.database_id or BOOK_DB_ID)");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub notion: Notion,
}

impl Config {
    pub fn new(path: &str) -> Result<Self> {
        let cfg = Config::load_config(path)?;
        Ok(cfg)
    }

    /// Loads `path` if it exists, otherwise builds the config from the
    /// environment.
    pub fn load_or_env(path: &Path) -> Result<Self> {
        if path.exists() {
            let path = path.to_str().context("config path is not valid utf-8")?;
            return Config::new(path);
        }

        tracing::info!(path = %path.display(), "no config file, reading configuration from environment");
        Ok(Config::from_env())
    }

    pub fn from_env() -> Self {
        let mut cfg = Config::default();
        if let Ok(key) = env::var("NOTION_API_KEY") {
            cfg.notion.api_key = key;
        }
        if let Ok(id) = env::var("BOOK_DB_ID") {
            cfg.notion.database_id = id;
        }
        if let Ok(path) = env::var("CLIPPINGS_PATH") {
            cfg.app.clippings_path = path;
        }
        cfg
    }

    fn load_config(path: &str) -> Result<Config> {
        let yaml_str = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path))?;
        Config::from_yaml(&yaml_str)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Config> {
        let yaml_with_env = Config::substitute_env_vars(yaml_str)?;
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        Ok(config)
    }

    fn substitute_env_vars(yaml_str: &str) -> Result<String> {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            if let Some(end) = result[actual_start..].find("}") {
                let var_name = &result[actual_start + 2..actual_start + end];

                // Handle default values like ${VAR:-default}
                let env_value = if let Some(default_start) = var_name.find(":-") {
                    let actual_var = &var_name[..default_start];
                    let default_val = &var_name[default_start + 2..];
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                } else {
                    env::var(var_name).unwrap_or_else(|_| {
                        tracing::warn!("environment variable '{}' not found", var_name);
                        String::new()
                    })
                };

                result.replace_range(actual_start..actual_start + end + 1, &env_value);
                offset = actual_start + env_value.len();
            } else {
                break;
            }
        }

        Ok(result)
    }
}
