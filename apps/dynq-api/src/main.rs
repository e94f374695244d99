use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = dynq_api::Args::parse();

	dynq_api::run(args).await
}
