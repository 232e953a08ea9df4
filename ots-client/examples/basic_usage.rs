//! Basic usage example for the OpenTimestamps client library
//!
//! This example demonstrates:
//! - Stamping data through the configured public calendars
//! - Upgrading the pending proof
//! - Verifying it once a calendar has anchored it in Bitcoin
//!
//! Run with: cargo run -p ots-client --example basic_usage

use ots_client::{info, ClientConfig, ClientError, OtsClient};
use ots_core::{DetachedTimestampFile, VerificationError};
use ots_types::{Digest, HashAlgorithm};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("OpenTimestamps Example");
    println!("======================\n");

    // Step 1: Hash the data to timestamp
    let data = b"Timestamp this document";
    let subject = Digest::of(HashAlgorithm::Sha256, data);
    let mut files = vec![DetachedTimestampFile::hash_data(HashAlgorithm::Sha256, data)];
    println!("Digest: {}\n", subject);

    // Step 2: Submit to every configured calendar
    let config = ClientConfig::default();
    println!("Calendars:");
    for calendar in &config.calendars {
        println!("  {}", calendar);
    }
    println!();

    let client = OtsClient::new(config)?;
    client.stamp(&mut files).await?;
    let mut file = files.remove(0);
    println!("Stamped; {} bytes of proof", file.to_bytes()?.len());
    print!("{}", info::render(&file, false));
    println!();

    // Step 3: Ask the calendars for anything newer. A fresh stamp usually
    // stays pending until the next Bitcoin block is mined.
    let changed = client.upgrade(&mut file).await?;
    println!("Upgrade changed the proof: {}", changed);

    // Step 4: Verify against block headers
    match client.verify(&file, &subject).await {
        Ok(verification) => {
            if let Some(earliest) = verification.earliest() {
                println!(
                    "Verified: {} block {} at unix time {}",
                    earliest.chain, earliest.height, earliest.time
                );
            }
        }
        Err(ClientError::Verification(VerificationError::NoBlockchainAttestation)) => {
            println!("Pending at:");
            for target in file.timestamp().pending_targets() {
                println!("  {}", target.calendar_url);
            }
            println!("Save file.to_bytes() and upgrade again in a few hours.");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
