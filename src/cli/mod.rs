use crate::model::ModelId;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "speaches-bootstrap")]
#[command(version, about = "Prefetch models into a Speaches server before first use", long_about = None)]
pub struct Cli {
	/// Server base URL
	#[arg(long, env = "SPEACHES_BASE_URL", global = true)]
	pub base_url: Option<String>,

	/// Bearer token for servers started with API_KEY (falls back to API_KEY in ./.env)
	#[arg(long, env = "SPEACHES_API_KEY", global = true, hide_env_values = true)]
	pub api_key: Option<String>,

	/// Config file (defaults to the platform config dir)
	#[arg(long, env = "SPEACHES_BOOTSTRAP_CONFIG", global = true)]
	pub config: Option<PathBuf>,

	/// Per-request timeout in seconds
	#[arg(long, global = true)]
	pub timeout: Option<u64>,

	/// Extra attempts for transient failures
	#[arg(long, global = true)]
	pub retries: Option<u32>,

	/// More log output (-v debug, -vv trace)
	#[arg(short, long, action = ArgAction::Count, global = true)]
	pub verbose: u8,

	/// Only log warnings and errors
	#[arg(short, long, global = true, conflicts_with = "verbose")]
	pub quiet: bool,

	/// Defaults to `pull` with the configured models
	#[command(subcommand)]
	pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Ask the server to download and register models, one at a time
	Pull {
		/// Model ids like "Systran/faster-whisper-large-v3" (defaults to the configured list)
		models: Vec<ModelId>,

		/// Wait up to this many seconds for the server to report healthy first
		#[arg(long, value_name = "SECS")]
		wait: Option<u64>,

		/// Stop at the first model that fails
		#[arg(long)]
		fail_fast: bool,

		/// Print the report as JSON
		#[arg(long)]
		json: bool,
	},

	/// List the models the server has registered
	List {
		/// Print the listing as JSON
		#[arg(long)]
		json: bool,
	},

	/// Check that models are registered on the server
	Verify {
		/// Model ids to look for (defaults to the configured list)
		models: Vec<ModelId>,
	},

	/// Check that the server is up
	Health,

	/// Manage the server's .env file
	Env {
		#[command(subcommand)]
		action: EnvCommands,
	},
}

#[derive(Subcommand)]
pub enum EnvCommands {
	/// Write a template .env
	Init {
		#[arg(long, default_value = ".env")]
		path: PathBuf,

		/// Overwrite an existing file
		#[arg(long)]
		force: bool,
	},

	/// Set one variable, keeping the rest of the file intact
	Set {
		key: String,
		value: String,

		#[arg(long, default_value = ".env")]
		path: PathBuf,
	},

	/// Report missing or invalid settings
	Check {
		#[arg(long, default_value = ".env")]
		path: PathBuf,
	},
}

impl Cli {
	pub fn default_log_level(&self) -> &'static str {
		if self.quiet {
			return "warn";
		}
		match self.verbose {
			0 => "info",
			1 => "debug",
			_ => "trace",
		}
	}
}
