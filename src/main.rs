use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("apikey_keyring=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = apikey_keyring::cli::Cli::parse();
    cli.run()
}
