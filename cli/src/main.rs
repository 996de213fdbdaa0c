use anyhow::Result;
use clap::Parser;
use symdex_cli::Cli;
use symdex_core::CancellationToken;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(symdex_cli::log_level(cli.verbose))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Ctrl-C stops indexing or a rename at the next file boundary.
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted; finishing the current file");
            interrupt.cancel();
        }
    });

    symdex_cli::run(&cli, &mut std::io::stdout(), &cancel).await?;
    Ok(())
}
