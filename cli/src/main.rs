//! Entry-point for the `autoquality` binary.
use autoquality_cli::Cli;
use autoquality_cli::run_main;
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let cli = Cli::parse();
        run_main(cli).await?;
        Ok(())
    })
}
