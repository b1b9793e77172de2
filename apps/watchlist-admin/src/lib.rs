pub mod commands;

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use color_eyre::eyre;
use tracing_subscriber::EnvFilter;

use watchlist_service::{SearchMode, SearchService};
use watchlist_storage::{ClusterStatus, DocumentStore, Monitor, MonitorSettings};

#[derive(Debug, Parser)]
#[command(
	version = watchlist_cli::VERSION,
	rename_all = "kebab",
	styles = watchlist_cli::styles(),
)]
pub struct Args {
	/// TOML config. Without it, defaults plus `WATCHLIST_*` variables are used.
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: Option<PathBuf>,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Create the AC, vector and pattern indices if they are missing.
	Init,
	/// Report cluster and per-index health.
	Health,
	/// Run one screening search and print the result.
	Search(SearchArgs),
}

#[derive(Debug, clap::Args)]
pub struct SearchArgs {
	/// Normalized name to screen.
	pub name: String,
	#[arg(long, value_parser = parse_mode, default_value = "hybrid")]
	pub mode: SearchMode,
	#[arg(long, value_name = "N")]
	pub top_k: Option<u32>,
	#[arg(long, value_name = "SCORE")]
	pub threshold: Option<f32>,
	#[arg(long, value_name = "TYPE")]
	pub entity_type: Option<String>,
	#[arg(long, value_name = "CODE")]
	pub country: Option<String>,
	/// Free text the name was extracted from, used for anchors and context.
	#[arg(long, value_name = "TEXT")]
	pub original_text: Option<String>,
	/// Comma-separated query vector.
	#[arg(long, value_name = "F32,...", value_delimiter = ',', allow_hyphen_values = true)]
	pub vector: Vec<f32>,
	#[arg(long)]
	pub no_escalation: bool,
	/// Include the search trace and its validation report.
	#[arg(long)]
	pub trace: bool,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = match args.config.as_deref() {
		Some(path) => watchlist_config::load(path)?,
		None => watchlist_config::from_env()?,
	};

	init_tracing(&config)?;

	let monitor = Arc::new(Monitor::new(MonitorSettings::from_config(&config.monitoring)));
	let store = Arc::new(DocumentStore::connect(&config, monitor)?);

	match args.command {
		Command::Init => print(&commands::init(&store).await?),
		Command::Health => {
			let (status, output) = commands::health(&store).await;

			print(&output)?;

			if status == ClusterStatus::Unreachable {
				return Err(eyre::eyre!("Document store is unreachable."));
			}

			Ok(())
		},
		Command::Search(search) => {
			let service = SearchService::new(config, store);

			print(&commands::search(&service, search).await)
		},
	}
}

fn print(output: &serde_json::Value) -> color_eyre::Result<()> {
	let json = serde_json::to_string_pretty(output)?;

	println!("{json}");

	Ok(())
}

fn parse_mode(raw: &str) -> Result<SearchMode, String> {
	SearchMode::parse(raw).ok_or_else(|| {
		format!("unknown mode {raw:?}; expected ac, vector, hybrid, fallback_ac or fallback_vector")
	})
}

fn init_tracing(config: &watchlist_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	Ok(())
}
