//! ots: command line timestamp client

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};

use ots_client::{info as proof_info, storage, ClientConfig, ClientError, OtsClient};
use ots_core::{DetachedTimestampFile, Verification, VerificationError};
use ots_types::{Digest, HashAlgorithm};

#[derive(Parser)]
#[command(name = "ots")]
#[command(about = "Create, upgrade and verify OpenTimestamps proofs", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Timestamp files, writing FILE.ots next to each
    Stamp {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Calendar URL; repeat to use several (replaces configured calendars)
        #[arg(short = 'a', long = "calendar")]
        calendars: Vec<String>,

        /// Calendar responses required for success
        #[arg(short, long)]
        min_responses: Option<usize>,

        /// Hash algorithm for the file digests
        #[arg(long, default_value = "sha256")]
        algorithm: String,

        /// Submit digests without privacy nonces
        #[arg(long)]
        no_nonce: bool,
    },

    /// Fetch missing parts of pending timestamps from their calendars
    Upgrade {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Verify a timestamp against the blockchain
    Verify {
        ots_file: PathBuf,

        /// Timestamped file (defaults to the .ots path without extension)
        #[arg(short = 'f', long)]
        target: Option<PathBuf>,

        /// Verify against a hex digest instead of a file
        #[arg(short, long, conflicts_with = "target")]
        digest: Option<String>,

        /// Print the verification report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the operations and attestations of a timestamp
    Info {
        ots_file: PathBuf,

        /// Show the message produced by every operation
        #[arg(long)]
        show_messages: bool,
    },

    /// Keep only the path to the earliest attestation
    Shrink { ots_file: PathBuf },
}

fn format_time(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn hash_file(algorithm: HashAlgorithm, path: &Path) -> Result<DetachedTimestampFile> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    DetachedTimestampFile::hash_reader(algorithm, file)
        .with_context(|| format!("Failed to hash {}", path.display()))
}

async fn stamp(client: &OtsClient, algorithm: HashAlgorithm, paths: &[PathBuf]) -> Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    let mut targets = Vec::with_capacity(paths.len());
    for path in paths {
        let ots = storage::ots_path(path);
        if ots.exists() {
            bail!("{} already exists", ots.display());
        }
        files.push(hash_file(algorithm, path)?);
        targets.push(ots);
    }

    client.stamp(&mut files).await?;

    for (file, ots) in files.iter().zip(&targets) {
        storage::write_new(ots, file)?;
        println!("Created {}", ots.display());
    }
    Ok(())
}

async fn upgrade(client: &OtsClient, path: &Path, dry_run: bool) -> Result<()> {
    let mut file = storage::read_timestamp(path)?;
    let changed = client.upgrade(&mut file).await?;

    if changed && !dry_run {
        let backup = storage::replace_with_backup(path, &file)?;
        info!(backup = %backup.display(), "Previous timestamp kept");
    }

    if file.timestamp().is_complete() {
        println!("Success! Timestamp {} is complete", path.display());
    } else {
        let calendars: Vec<String> = file
            .timestamp()
            .pending_targets()
            .into_iter()
            .map(|t| t.calendar_url)
            .collect();
        println!(
            "Timestamp {} not complete yet; pending at {}",
            path.display(),
            calendars.join(", ")
        );
    }
    Ok(())
}

fn subject_digest(
    file: &DetachedTimestampFile,
    ots_path: &Path,
    target: Option<PathBuf>,
    digest: Option<String>,
) -> Result<Digest> {
    if let Some(hex_digest) = digest {
        return Ok(Digest::from_hex(file.hash_algorithm(), &hex_digest)?);
    }
    let target = match target {
        Some(target) => target,
        None => storage::target_path(ots_path)
            .ok_or_else(|| anyhow!("Cannot derive target from {}; use --target", ots_path.display()))?,
    };
    let hashed = hash_file(file.hash_algorithm(), &target)?;
    Ok(Digest::from_slice(file.hash_algorithm(), hashed.file_digest())?)
}

fn print_verification(verification: &Verification) {
    if let Some(earliest) = verification.earliest() {
        println!(
            "Success! {} block {} attests existence as of {}",
            earliest.chain,
            earliest.height,
            format_time(earliest.time)
        );
    }
    for failed in &verification.failed {
        println!(
            "Could not verify {} block {}: {}",
            failed.chain, failed.height, failed.reason
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut config = ClientConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Stamp {
            files,
            calendars,
            min_responses,
            algorithm,
            no_nonce,
        } => {
            let algorithm = HashAlgorithm::from_name(&algorithm)
                .ok_or_else(|| anyhow!("Unknown hash algorithm: {}", algorithm))?;
            if !calendars.is_empty() {
                config.calendars = calendars;
            }
            if let Some(m) = min_responses {
                config.min_responses = m;
            }
            config.use_nonce = !no_nonce;

            let client = OtsClient::new(config)?;
            stamp(&client, algorithm, &files).await?;
        }

        Commands::Upgrade { files, dry_run } => {
            let client = OtsClient::new(config)?;
            let mut failures = 0;
            for path in &files {
                if let Err(e) = upgrade(&client, path, dry_run).await {
                    warn!(file = %path.display(), error = %e, "Upgrade failed");
                    failures += 1;
                }
            }
            if failures > 0 {
                bail!("{} of {} timestamps could not be upgraded", failures, files.len());
            }
        }

        Commands::Verify {
            ots_file,
            target,
            digest,
            json,
        } => {
            let file = storage::read_timestamp(&ots_file)?;
            let subject = subject_digest(&file, &ots_file, target, digest)?;
            let client = OtsClient::new(config)?;

            match client.verify(&file, &subject).await {
                Ok(verification) if json => {
                    println!("{}", serde_json::to_string_pretty(&verification)?);
                }
                Ok(verification) => print_verification(&verification),
                Err(ClientError::Verification(VerificationError::NoBlockchainAttestation))
                    if !file.timestamp().pending_targets().is_empty() =>
                {
                    bail!("Timestamp not complete yet; run `ots upgrade` first");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Info {
            ots_file,
            show_messages,
        } => {
            let file = storage::read_timestamp(&ots_file)?;
            print!("{}", proof_info::render(&file, show_messages));
        }

        Commands::Shrink { ots_file } => {
            let mut file = storage::read_timestamp(&ots_file)?;
            let before = file.clone();
            let kept = file.timestamp_mut().shrink()?;
            if file != before {
                storage::replace_with_backup(&ots_file, &file)?;
                println!("Shrunk {} to {}", ots_file.display(), kept);
            } else {
                println!("{} already minimal ({})", ots_file.display(), kept);
            }
        }
    }

    Ok(())
}
