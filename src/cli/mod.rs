use crate::client::SwarmClient;
use crate::config::FetchConfig;
use crate::manifest::load_manifest;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "swarmfetch")]
#[command(about = "Download content from a peer swarm", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download the content described by a .torrent file
    Download {
        /// Path to the .torrent file
        #[arg(short, long)]
        torrent: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "./downloads")]
        output: PathBuf,

        /// Port reported to the tracker
        #[arg(short, long, default_value_t = 6881)]
        port: u16,

        /// Maximum concurrent chunk attempts (0 for no limit)
        #[arg(short = 'w', long, default_value_t = 50)]
        max_workers: usize,

        /// Give up on a chunk after this many failed attempts
        #[arg(short = 'a', long)]
        max_attempts: Option<u32>,

        /// Give up on the whole download after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Show information about a .torrent file
    Info {
        /// Path to the .torrent file
        torrent: PathBuf,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Download {
                torrent,
                output,
                port,
                max_workers,
                max_attempts,
                timeout_secs,
            } => {
                let config = FetchConfig {
                    listen_port: *port,
                    max_workers: (*max_workers > 0).then_some(*max_workers),
                    max_attempts_per_chunk: *max_attempts,
                    download_deadline: timeout_secs.map(Duration::from_secs),
                    ..FetchConfig::default()
                };

                let client = SwarmClient::new(config);
                let cancel = client.cancel_token();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("Interrupted, cancelling download");
                        cancel.cancel();
                    }
                });

                let written = client.download(torrent, output).await?;
                for path in &written {
                    info!("Saved {}", path.display());
                }
            }

            Commands::Info { torrent } => show_manifest_info(torrent).await?,
        }

        Ok(())
    }
}

async fn show_manifest_info(path: &Path) -> Result<()> {
    let manifest = load_manifest(path).await?;
    let descriptor = &manifest.descriptor;

    println!("Manifest Information");
    println!("====================");
    println!("Name: {}", manifest.name);
    println!("Tracker: {}", manifest.announce);
    println!("Total Size: {} bytes", descriptor.total_length());
    println!("Chunk Size: {} bytes", descriptor.chunk_size());
    println!("Number of Chunks: {}", descriptor.num_chunks());
    println!("Fingerprint: {}", manifest.fingerprint_hex());
    println!("\nFiles:");

    for (i, file) in manifest.files.iter().enumerate() {
        println!("  {}: {} ({} bytes)", i + 1, file.path.join("/"), file.length);
    }

    Ok(())
}
