//! In-process calendar and block explorer for client tests.
//!
//! One server answers both the calendar API (`POST /digest`,
//! `GET /timestamp/{commitment}`) and the Esplora subset the client uses
//! (`GET /block-height/{h}`, `GET /block/{hash}`). Submitted digests stay
//! pending until [`TestServer::confirm`] mines them into a block.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;

use ots_client::config::RetrySettings;
use ots_client::ClientConfig;
use ots_core::{make_merkle_tree, Timestamp};
use ots_types::{Attestation, Op};

/// Block time used by [`TestServer::confirm`]: 2015-05-28 15:41:18 UTC
pub const BLOCK_TIME: u64 = 1_432_827_678;

const OTS_MEDIA_TYPE: &str = "application/vnd.opentimestamps.v1";

#[derive(Clone)]
struct Block {
    hash: String,
    /// Display (byte-reversed) hex
    merkle_root: String,
    time: u64,
}

#[derive(Default)]
struct Ledger {
    unconfirmed: Vec<Vec<u8>>,
    proofs: HashMap<Vec<u8>, Timestamp>,
    blocks: BTreeMap<u64, Block>,
}

struct Shared {
    url: String,
    ledger: Mutex<Ledger>,
    failing: AtomicBool,
    delay_ms: AtomicU64,
    submissions: AtomicUsize,
}

type AppState = Arc<Shared>;

fn router(shared: AppState) -> Router {
    Router::new()
        .route("/digest", post(submit))
        .route("/timestamp/:commitment", get(get_timestamp))
        .route("/block-height/:height", get(block_height))
        .route("/block/:hash", get(block))
        .layer(middleware::from_fn_with_state(shared.clone(), inject_faults))
        .with_state(shared)
}

/// Delay and failure switches applied to every route.
async fn inject_faults(State(shared): State<AppState>, request: Request, next: Next) -> Response {
    let delay = shared.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if shared.failing.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    next.run(request).await
}

/// Commit to `digest` with `append(url) + sha256` and promise a proof later.
///
/// The URL makes every calendar's commitment distinct, so two calendars
/// form two branches of the stamped proof.
async fn submit(State(shared): State<AppState>, digest: Bytes) -> Response {
    if digest.is_empty() || digest.len() > 64 {
        return StatusCode::BAD_REQUEST.into_response();
    }
    shared.submissions.fetch_add(1, Ordering::SeqCst);

    let mut timestamp = Timestamp::new(digest.to_vec());
    let commitment = timestamp
        .add_op(Op::append(shared.url.as_bytes().to_vec()).expect("valid op"))
        .and_then(|node| node.add_op(Op::sha256()))
        .expect("commitment fits");
    commitment.add_attestation(Attestation::pending(shared.url.clone()).expect("valid uri"));
    let commitment = commitment.msg().to_vec();

    shared
        .ledger
        .lock()
        .expect("ledger poisoned")
        .unconfirmed
        .push(commitment);

    let body = timestamp.to_bytes().expect("response serializes");
    ([(header::CONTENT_TYPE, OTS_MEDIA_TYPE)], body).into_response()
}

async fn get_timestamp(State(shared): State<AppState>, Path(commitment): Path<String>) -> Response {
    let Ok(commitment) = hex::decode(&commitment) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let ledger = shared.ledger.lock().expect("ledger poisoned");
    match ledger.proofs.get(&commitment) {
        Some(proof) => {
            let body = proof.to_bytes().expect("stored proof serializes");
            ([(header::CONTENT_TYPE, OTS_MEDIA_TYPE)], body).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn block_height(State(shared): State<AppState>, Path(height): Path<u64>) -> Response {
    let ledger = shared.ledger.lock().expect("ledger poisoned");
    match ledger.blocks.get(&height) {
        Some(block) => block.hash.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn block(State(shared): State<AppState>, Path(hash): Path<String>) -> Response {
    let ledger = shared.ledger.lock().expect("ledger poisoned");
    match ledger.blocks.iter().find(|(_, b)| b.hash == hash) {
        Some((height, block)) => Json(serde_json::json!({
            "id": block.hash,
            "height": height,
            "merkle_root": block.merkle_root,
            "timestamp": block.time,
        }))
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// A calendar and explorer bound to a random localhost port.
pub struct TestServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().expect("Failed to get local address");

        let shared = Arc::new(Shared {
            url: format!("http://{}", addr),
            ledger: Mutex::new(Ledger::default()),
            failing: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            submissions: AtomicUsize::new(0),
        });

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let server = axum::serve(listener, router(shared.clone()));
        tokio::spawn(async move {
            server
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Test server failed");
        });

        Self {
            addr,
            shared,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Server URL, e.g. "http://127.0.0.1:12345"
    pub fn url(&self) -> String {
        self.shared.url.clone()
    }

    /// Answer every request with 500 while set.
    pub fn set_failing(&self, failing: bool) {
        self.shared.failing.store(failing, Ordering::SeqCst);
    }

    /// Wait this long before answering each request.
    pub fn set_delay(&self, delay: Duration) {
        self.shared
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> usize {
        self.shared.submissions.load(Ordering::SeqCst)
    }

    pub fn pending_commitments(&self) -> usize {
        self.shared.ledger.lock().expect("ledger poisoned").unconfirmed.len()
    }

    /// Mine every pending commitment into block `height`.
    pub fn confirm(&self, height: u64) {
        self.confirm_at(height, BLOCK_TIME);
    }

    pub fn confirm_at(&self, height: u64, time: u64) {
        let mut ledger = self.shared.ledger.lock().expect("ledger poisoned");
        let commitments = std::mem::take(&mut ledger.unconfirmed);
        if commitments.is_empty() {
            return;
        }

        let mut leaves: Vec<Timestamp> = commitments.into_iter().map(Timestamp::new).collect();
        let mut refs: Vec<&mut Timestamp> = leaves.iter_mut().collect();
        let tip = make_merkle_tree(&mut refs).expect("merkle tree over commitments");

        let mut anchor = Timestamp::new(tip.msg().to_vec());
        anchor.add_attestation(Attestation::bitcoin(height));
        for leaf in leaves.iter_mut() {
            leaf.merge_at(&anchor).expect("leaf reaches tip");
        }

        let mut root = tip.msg().to_vec();
        root.reverse();
        ledger.blocks.insert(
            height,
            Block {
                hash: format!("{:064x}", height),
                merkle_root: hex::encode(root),
                time,
            },
        );
        for leaf in leaves {
            ledger.proofs.insert(leaf.msg().to_vec(), leaf);
        }
    }

    /// Serve the blocks mined by `other` from this explorer as well.
    pub fn import_blocks(&self, other: &TestServer) {
        let blocks = other.shared.ledger.lock().expect("ledger poisoned").blocks.clone();
        self.shared
            .ledger
            .lock()
            .expect("ledger poisoned")
            .blocks
            .extend(blocks);
    }

    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Client config using `servers` as calendars, whitelist and explorer.
///
/// Every server must answer a stamp; retries are off.
pub fn config_for(servers: &[&TestServer]) -> ClientConfig {
    let urls: Vec<String> = servers.iter().map(|s| s.url()).collect();
    ClientConfig {
        calendars: urls.clone(),
        whitelist: urls,
        min_responses: servers.len(),
        timeout_secs: 5,
        explorer_url: servers.first().map(|s| s.url()).unwrap_or_default(),
        retry: RetrySettings {
            max_retries: 0,
            ..RetrySettings::default()
        },
        ..ClientConfig::default()
    }
}
