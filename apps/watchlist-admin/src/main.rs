use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = watchlist_admin::Args::parse();

	watchlist_admin::run(args).await
}
