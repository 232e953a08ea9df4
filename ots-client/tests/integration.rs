//! End-to-end tests: stamp, upgrade and verify against an in-process calendar

mod common;

use common::{config_for, TestServer, BLOCK_TIME};
use ots_client::{storage, ClientError, OtsClient};
use ots_core::{DetachedTimestampFile, VerificationError};
use ots_types::{Attestation, Chain, Digest, HashAlgorithm};

fn file_for(data: &[u8]) -> DetachedTimestampFile {
    DetachedTimestampFile::hash_data(HashAlgorithm::Sha256, data)
}

fn subject(data: &[u8]) -> Digest {
    Digest::of(HashAlgorithm::Sha256, data)
}

#[tokio::test]
async fn test_stamp_upgrade_verify() {
    let server = TestServer::start().await;
    let client = OtsClient::new(config_for(&[&server])).expect("client");

    let data = b"Hello World!\n";
    let mut files = vec![file_for(data)];
    client.stamp(&mut files).await.expect("stamp failed");
    let mut file = files.pop().unwrap();

    let targets = file.timestamp().pending_targets();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].calendar_url, server.url());
    assert!(!file.timestamp().is_complete());

    // Nothing mined yet
    let err = client.verify(&file, &subject(data)).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Verification(VerificationError::NoBlockchainAttestation)
    ));
    assert!(!client.upgrade(&mut file).await.expect("upgrade failed"));

    server.confirm(358391);
    assert!(client.upgrade(&mut file).await.expect("upgrade failed"));
    assert!(file.timestamp().is_complete());

    let verification = client
        .verify(&file, &subject(data))
        .await
        .expect("verification failed");
    assert_eq!(verification.time, BLOCK_TIME);
    assert_eq!(verification.verified.len(), 1);
    assert_eq!(verification.verified[0].chain, Chain::Bitcoin);
    assert_eq!(verification.verified[0].height, 358391);
    assert!(!verification.is_partial());

    // A second upgrade has nothing left to add
    assert!(!client.upgrade(&mut file).await.expect("upgrade failed"));
}

#[tokio::test]
async fn test_batch_shares_one_submission() {
    let server = TestServer::start().await;
    let client = OtsClient::new(config_for(&[&server])).expect("client");

    let inputs: Vec<Vec<u8>> = (0..5).map(|i| format!("document {}", i).into_bytes()).collect();
    let mut files: Vec<_> = inputs.iter().map(|d| file_for(d)).collect();
    client.stamp(&mut files).await.expect("stamp failed");

    assert_eq!(server.submissions(), 1);
    assert_eq!(server.pending_commitments(), 1);

    server.confirm(400_000);
    for (file, data) in files.iter_mut().zip(&inputs) {
        assert!(client.upgrade(file).await.expect("upgrade failed"));
        let verification = client.verify(file, &subject(data)).await.expect("verify");
        assert_eq!(verification.verified[0].height, 400_000);
    }
}

#[tokio::test]
async fn test_nonce_hides_digest_from_calendar() {
    let server = TestServer::start().await;
    let mut config = config_for(&[&server]);
    config.use_nonce = true;
    let client = OtsClient::new(config).expect("client");

    let mut first = vec![file_for(b"same")];
    let mut second = vec![file_for(b"same")];
    client.stamp(&mut first).await.expect("stamp failed");
    client.stamp(&mut second).await.expect("stamp failed");

    assert_ne!(
        first[0].timestamp().pending_targets(),
        second[0].timestamp().pending_targets()
    );
}

#[tokio::test]
async fn test_two_calendars_earliest_wins() {
    let alice = TestServer::start().await;
    let bob = TestServer::start().await;
    let client = OtsClient::new(config_for(&[&alice, &bob])).expect("client");

    let data = b"two calendars";
    let mut files = vec![file_for(data)];
    client.stamp(&mut files).await.expect("stamp failed");
    let mut file = files.pop().unwrap();
    assert_eq!(file.timestamp().pending_targets().len(), 2);

    alice.confirm_at(500, BLOCK_TIME + 600);
    bob.confirm_at(499, BLOCK_TIME);
    // alice doubles as the explorer
    alice.import_blocks(&bob);

    assert!(client.upgrade(&mut file).await.expect("upgrade failed"));
    let verification = client.verify(&file, &subject(data)).await.expect("verify");
    assert_eq!(verification.verified.len(), 2);
    assert_eq!(verification.time, BLOCK_TIME);
    assert_eq!(verification.earliest().map(|a| a.height), Some(499));
}

#[tokio::test]
async fn test_partial_verification_when_explorer_lacks_block() {
    let alice = TestServer::start().await;
    let bob = TestServer::start().await;
    let client = OtsClient::new(config_for(&[&alice, &bob])).expect("client");

    let data = b"partial";
    let mut files = vec![file_for(data)];
    client.stamp(&mut files).await.expect("stamp failed");
    let mut file = files.pop().unwrap();

    alice.confirm(600);
    bob.confirm(601);
    client.upgrade(&mut file).await.expect("upgrade failed");

    let verification = client.verify(&file, &subject(data)).await.expect("verify");
    assert!(verification.is_partial());
    assert_eq!(verification.verified[0].height, 600);
    assert_eq!(verification.failed.len(), 1);
    assert_eq!(verification.failed[0].height, 601);
}

#[tokio::test]
async fn test_upgrade_drops_resolved_pending() {
    let server = TestServer::start().await;
    let mut config = config_for(&[&server]);
    config.keep_resolved_pending = false;
    let client = OtsClient::new(config).expect("client");

    let mut files = vec![file_for(b"drop pending")];
    client.stamp(&mut files).await.expect("stamp failed");
    let mut file = files.pop().unwrap();

    server.confirm(700);
    assert!(client.upgrade(&mut file).await.expect("upgrade failed"));

    let attestations = file.timestamp().attestation_set();
    assert_eq!(attestations.len(), 1);
    assert!(attestations.contains(&Attestation::bitcoin(700)));
    assert!(file.timestamp().pending_targets().is_empty());
}

#[tokio::test]
async fn test_shrink_after_upgrade_still_verifies() {
    let alice = TestServer::start().await;
    let bob = TestServer::start().await;
    let client = OtsClient::new(config_for(&[&alice, &bob])).expect("client");

    let data = b"shrink me";
    let mut files = vec![file_for(data)];
    client.stamp(&mut files).await.expect("stamp failed");
    let mut file = files.pop().unwrap();

    alice.confirm(800);
    bob.confirm(801);
    alice.import_blocks(&bob);
    client.upgrade(&mut file).await.expect("upgrade failed");

    let before = file.to_bytes().expect("serialize");
    let kept = file.timestamp_mut().shrink().expect("shrink");
    assert_eq!(kept, Attestation::bitcoin(800));
    assert!(file.to_bytes().expect("serialize").len() < before.len());

    let verification = client.verify(&file, &subject(data)).await.expect("verify");
    assert_eq!(verification.verified.len(), 1);
    assert_eq!(verification.verified[0].height, 800);
}

#[tokio::test]
async fn test_ots_file_lifecycle_on_disk() {
    let server = TestServer::start().await;
    let client = OtsClient::new(config_for(&[&server])).expect("client");

    let dir = tempfile::tempdir().expect("tempdir failed");
    let target = dir.path().join("report.txt");
    std::fs::write(&target, b"quarterly numbers").expect("write failed");

    let mut files = vec![DetachedTimestampFile::hash_reader(
        HashAlgorithm::Sha256,
        std::fs::File::open(&target).expect("open"),
    )
    .expect("hash")];
    client.stamp(&mut files).await.expect("stamp failed");

    let ots = storage::ots_path(&target);
    storage::write_new(&ots, &files[0]).expect("write proof");
    assert_eq!(storage::target_path(&ots).as_deref(), Some(target.as_path()));

    server.confirm(900);
    let mut file = storage::read_timestamp(&ots).expect("read proof");
    assert!(client.upgrade(&mut file).await.expect("upgrade failed"));
    let backup = storage::replace_with_backup(&ots, &file).expect("replace");

    assert_eq!(storage::read_timestamp(&backup).expect("read backup"), files[0]);
    let upgraded = storage::read_timestamp(&ots).expect("read upgraded");
    let verification = client
        .verify(&upgraded, &subject(b"quarterly numbers"))
        .await
        .expect("verify");
    assert_eq!(verification.verified[0].height, 900);
}
