use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("Invalid model id '{id}': {reason}")]
	InvalidModelId { id: String, reason: String },

	#[error("Invalid input: {0}")]
	InvalidInput(String),

	#[error("Configuration error: {0}")]
	Config(String),

	#[error("Server returned {status}{}", format_body(.body))]
	Http { status: StatusCode, body: String },

	#[error("Request failed: {0}")]
	Transport(String),

	#[error("Request timed out: {0}")]
	Timeout(String),

	#[error("Server at {url} not ready after {waited_secs}s")]
	ServerNotReady { url: String, waited_secs: u64 },

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	Serialization(String),
}

fn format_body(body: &str) -> String {
	let body = body.trim();
	if body.is_empty() {
		String::new()
	} else {
		format!(": {}", body)
	}
}

impl Error {
	/// Whether a retry could plausibly succeed.
	pub fn is_transient(&self) -> bool {
		match self {
			Error::Transport(_) | Error::Timeout(_) => true,
			Error::Http { status, .. } => {
				status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
			}
			_ => false,
		}
	}
}

impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		if err.is_timeout() {
			Error::Timeout(err.to_string())
		} else if err.is_decode() {
			Error::Serialization(err.to_string())
		} else {
			Error::Transport(err.to_string())
		}
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::Serialization(err.to_string())
	}
}

impl From<toml::de::Error> for Error {
	fn from(err: toml::de::Error) -> Self {
		Error::Serialization(err.to_string())
	}
}

pub type Result<T> = std::result::Result<T, Error>;
