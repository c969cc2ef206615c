//! dirsync CLI - directory extraction and profile replay

use clap::Parser;
use dirsync_cli::commands::{execute, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}
