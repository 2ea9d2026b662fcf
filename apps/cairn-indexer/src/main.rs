use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = cairn_indexer::Args::parse();

	cairn_indexer::run(args).await
}
