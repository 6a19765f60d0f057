use crate::envfile::{self, EnvFile};
use crate::error::{Error, Result};
use crate::model::ModelId;
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Settings as written in `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
	pub base_url: Option<String>,
	pub api_key: Option<String>,
	pub timeout_secs: Option<u64>,
	pub connect_timeout_secs: Option<u64>,
	pub retries: Option<u32>,
	pub retry_backoff_ms: Option<u64>,
	pub models: Option<Vec<ModelId>>,
}

impl FileConfig {
	/// Reads `path`, or the platform default location when `path` is `None`.
	/// A missing default file is not an error; a missing explicit one is.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let (path, explicit) = match path {
			Some(path) => (path.to_path_buf(), true),
			None => match default_config_path() {
				Some(path) => (path, false),
				None => return Ok(Self::default()),
			},
		};

		if !path.exists() {
			if explicit {
				return Err(Error::Config(format!(
					"Config file not found: {}",
					path.display()
				)));
			}
			return Ok(Self::default());
		}

		tracing::debug!("Loading config from {:?}", path);
		let content = std::fs::read_to_string(&path)?;
		Self::parse(&content)
	}

	pub fn parse(content: &str) -> Result<Self> {
		Ok(toml::from_str(content)?)
	}
}

pub fn default_config_path() -> Option<PathBuf> {
	ProjectDirs::from("", "", "speaches-bootstrap")
		.map(|dirs| dirs.config_dir().join("config.toml"))
}

fn non_blank(value: Option<String>) -> Option<String> {
	value.filter(|v| !v.trim().is_empty())
}

/// The bearer token from the command line, else `API_KEY` in the `.env` at
/// `env_path`. Blank values count as unset.
pub fn api_key_override(flag: Option<String>, env_path: &Path) -> Result<Option<String>> {
	if let Some(key) = non_blank(flag) {
		return Ok(Some(key));
	}

	let from_env_file = EnvFile::load_optional(env_path)?
		.and_then(|env| env.get(envfile::API_KEY).map(str::to_string));
	Ok(non_blank(from_env_file))
}

/// Values given on the command line or through the environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
	pub base_url: Option<String>,
	pub api_key: Option<String>,
	pub timeout_secs: Option<u64>,
	pub retries: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Config {
	pub base_url: reqwest::Url,
	pub api_key: Option<String>,
	pub timeout: Duration,
	pub connect_timeout: Duration,
	pub retries: u32,
	pub retry_backoff: Duration,
	pub models: Vec<ModelId>,
}

impl Config {
	/// Layers overrides over the file over built-in defaults.
	pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Self> {
		let raw_url = overrides
			.base_url
			.or(file.base_url)
			.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
		let base_url = parse_base_url(&raw_url)?;

		let api_key = non_blank(overrides.api_key).or_else(|| non_blank(file.api_key));

		let timeout_secs = overrides
			.timeout_secs
			.or(file.timeout_secs)
			.unwrap_or(DEFAULT_TIMEOUT_SECS);
		let connect_timeout_secs = file
			.connect_timeout_secs
			.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
		if timeout_secs == 0 || connect_timeout_secs == 0 {
			return Err(Error::Config("Timeouts must be at least 1 second".to_string()));
		}

		let models = match file.models {
			Some(models) if !models.is_empty() => models,
			_ => ModelId::defaults(),
		};

		Ok(Self {
			base_url,
			api_key,
			timeout: Duration::from_secs(timeout_secs),
			connect_timeout: Duration::from_secs(connect_timeout_secs),
			retries: overrides.retries.or(file.retries).unwrap_or(DEFAULT_RETRIES),
			retry_backoff: Duration::from_millis(
				file.retry_backoff_ms.unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
			),
			models,
		})
	}
}

fn parse_base_url(raw: &str) -> Result<reqwest::Url> {
	let url = reqwest::Url::parse(raw.trim())
		.map_err(|e| Error::Config(format!("Invalid base URL '{}': {}", raw, e)))?;

	if !matches!(url.scheme(), "http" | "https") {
		return Err(Error::Config(format!(
			"Base URL must use http or https: {}",
			raw
		)));
	}
	if url.query().is_some() || url.fragment().is_some() {
		return Err(Error::Config(format!(
			"Base URL cannot carry a query or fragment: {}",
			raw
		)));
	}

	Ok(url)
}
