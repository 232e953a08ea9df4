//! Client facade: stamp, upgrade and verify against remote collaborators

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use ots_core::verify::anchors;
use ots_core::{
    make_merkle_tree, verify_file, DetachedTimestampFile, NonceGenerator, PendingTarget, Timestamp,
    Verification, VerificationError,
};
use ots_types::{Attestation, Chain, Digest};

use crate::calendar::{CalendarClient, HttpCalendar};
use crate::config::ClientConfig;
use crate::explorer::{BlockHeaderSource, EsploraExplorer};
use crate::{ClientError, Result};

/// Configuration for retry behavior with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: u32,
    /// Initial backoff duration before first retry
    pub initial_backoff: Duration,
    /// Maximum backoff duration (caps exponential growth)
    pub max_backoff: Duration,
    /// Multiplier applied to backoff after each retry
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate the backoff duration for a given attempt (0-indexed)
    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64()
            * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_backoff.as_secs_f64());

        // Add jitter: random value in [0.5 * capped, 1.0 * capped]
        let jitter = 0.5 + rand::random::<f64>() * 0.5;
        Duration::from_secs_f64(capped * jitter)
    }
}

/// Client for timestamping files through calendar servers
pub struct OtsClient {
    config: ClientConfig,
    calendar: Arc<dyn CalendarClient>,
    headers: Arc<dyn BlockHeaderSource>,
    /// Retry configuration for submissions (None = no retries)
    retry_config: Option<RetryConfig>,
}

impl OtsClient {
    /// Create a client using HTTP calendars and an Esplora explorer
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let calendar = HttpCalendar::new(config.timeout())?;
        let mut explorer = EsploraExplorer::new(config.explorer_url.clone(), config.timeout())?;
        if let Some(url) = &config.litecoin_explorer_url {
            explorer = explorer.with_litecoin(url.clone());
        }
        let retry_config =
            (config.retry.max_retries > 0).then(|| config.retry.to_retry_config());

        Ok(Self {
            config,
            calendar: Arc::new(calendar),
            headers: Arc::new(explorer),
            retry_config,
        })
    }

    pub fn with_calendar_client(mut self, calendar: Arc<dyn CalendarClient>) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn with_header_source(mut self, headers: Arc<dyn BlockHeaderSource>) -> Self {
        self.headers = headers;
        self
    }

    /// Enable retry with the given configuration
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry_config = Some(config);
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.retry_config = None;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.config.timeout(), fut)
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    /// Timestamp every file in one batch.
    ///
    /// The digests are aggregated into a single merkle tip that is submitted
    /// to all configured calendars in parallel. On success each file holds a
    /// complete copy of the calendar proofs; on failure the files are left
    /// unchanged.
    pub async fn stamp(&self, files: &mut [DetachedTimestampFile]) -> Result<()> {
        if files.is_empty() {
            return Err(ots_types::Error::InvariantViolation("nothing to stamp".to_string()).into());
        }

        let mut stamped = files.to_vec();
        let mut nonces = NonceGenerator::new();
        let mut leaves = Vec::with_capacity(stamped.len());
        for file in stamped.iter_mut() {
            let root = file.timestamp_mut();
            let leaf = if self.config.use_nonce {
                nonces.blind(root)?
            } else {
                root
            };
            leaves.push(leaf);
        }

        let mut tip = make_merkle_tree(&mut leaves)?;
        info!(
            files = leaves.len(),
            tip = %hex::encode(tip.msg()),
            "Aggregated digests"
        );

        let required = self.config.quorum();
        let mut received = 0;
        let responses = self.submit_to_calendars(tip.msg()).await;
        for (calendar, result) in responses {
            match result {
                // A proof for some other digest counts as a failed response
                Ok(proof) => match tip.merge(proof) {
                    Ok(_) => {
                        received += 1;
                        debug!(calendar = %calendar, "Calendar accepted digest");
                    }
                    Err(e) => warn!(
                        calendar = %calendar,
                        error = %e,
                        "Calendar returned a proof for another digest"
                    ),
                },
                Err(e) => warn!(calendar = %calendar, error = %e, "Calendar submission failed"),
            }
        }
        if received < required {
            return Err(ClientError::InsufficientResponses { received, required });
        }

        for leaf in leaves.iter_mut() {
            leaf.merge_at(&tip)?;
        }
        for (file, result) in files.iter_mut().zip(stamped) {
            *file = result;
        }
        info!(calendars = received, "Timestamp created");
        Ok(())
    }

    async fn submit_to_calendars(&self, digest: &[u8]) -> Vec<(String, Result<Timestamp>)> {
        let requests = self.config.calendars.iter().map(move |calendar| async move {
            let result = self.submit_with_retry(calendar, digest).await;
            (calendar.clone(), result)
        });
        futures::future::join_all(requests).await
    }

    async fn submit_with_retry(&self, calendar: &str, digest: &[u8]) -> Result<Timestamp> {
        let max_attempts = self
            .retry_config
            .as_ref()
            .map(|c| c.max_retries + 1)
            .unwrap_or(1);

        let mut last_err = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                if let Some(retry) = &self.retry_config {
                    let backoff = retry.backoff_for_attempt(attempt - 1);
                    warn!(
                        "Retry attempt {}/{} for {} after {:?}",
                        attempt,
                        max_attempts - 1,
                        calendar,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }

            match self.with_timeout(self.calendar.submit(calendar, digest)).await {
                Ok(proof) => return Ok(proof),
                Err(e) => {
                    if !is_retryable(&e) || attempt + 1 >= max_attempts {
                        return Err(e);
                    }
                    warn!("Retryable error on attempt {}: {}", attempt + 1, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or(ClientError::Network("No attempts made".to_string())))
    }

    /// Ask calendars to complete the pending parts of `file`.
    ///
    /// Requests to one calendar are sequential; different calendars are
    /// queried in parallel and each answer is merged as soon as it arrives.
    /// Pending attestations revealed by an answer are followed in later
    /// rounds. Returns true if the proof changed.
    pub async fn upgrade(&self, file: &mut DetachedTimestampFile) -> Result<bool> {
        let mut changed = false;
        let mut attempted: HashSet<PendingTarget> = HashSet::new();

        for round in 0..self.config.max_upgrade_rounds {
            let mut by_calendar: BTreeMap<String, Vec<Vec<u8>>> = BTreeMap::new();
            for target in file.timestamp().pending_targets() {
                if !attempted.insert(target.clone()) {
                    continue;
                }
                if !self.config.is_whitelisted(&target.calendar_url) {
                    warn!(
                        calendar = %target.calendar_url,
                        "Ignoring attestation from calendar not in whitelist"
                    );
                    continue;
                }
                by_calendar
                    .entry(target.calendar_url)
                    .or_default()
                    .push(target.commitment);
            }
            if by_calendar.is_empty() {
                break;
            }
            debug!(round, calendars = by_calendar.len(), "Upgrade round");

            let streams = by_calendar.into_iter().map(move |(calendar, commitments)| {
                stream::iter(commitments)
                    .then(move |commitment| {
                        let calendar = calendar.clone();
                        async move {
                            let result = self
                                .with_timeout(self.calendar.get_timestamp(&calendar, &commitment))
                                .await;
                            (calendar, commitment, result)
                        }
                    })
                    .boxed()
            });
            let mut answers = stream::select_all(streams);

            while let Some((calendar, commitment, result)) = answers.next().await {
                match result {
                    Ok(proof) if proof.msg() != commitment.as_slice() => warn!(
                        calendar = %calendar,
                        commitment = %hex::encode(&commitment),
                        "Calendar answered for another commitment"
                    ),
                    Ok(proof) => {
                        let resolved = proof.is_complete()
                            && proof.all_attestations().iter().all(|(_, a)| !a.is_pending());
                        changed |= file.timestamp_mut().merge_at(&proof)?;
                        if resolved && !self.config.keep_resolved_pending {
                            let pending = Attestation::pending(calendar.clone())?;
                            changed |= file
                                .timestamp_mut()
                                .remove_attestation_at(&commitment, &pending);
                        }
                        info!(
                            calendar = %calendar,
                            complete = proof.is_complete(),
                            "Got upgraded proof"
                        );
                    }
                    Err(ClientError::NotFound(_)) => debug!(
                        calendar = %calendar,
                        commitment = %hex::encode(&commitment),
                        "Calendar has nothing new yet"
                    ),
                    Err(e) => warn!(calendar = %calendar, error = %e, "Upgrade request failed"),
                }
            }
        }

        Ok(changed)
    }

    /// Verify `file` as a proof for a file with digest `subject`.
    ///
    /// Block headers are fetched once per (chain, height), in parallel.
    pub async fn verify(
        &self,
        file: &DetachedTimestampFile,
        subject: &Digest,
    ) -> Result<Verification> {
        if !file.matches(subject) {
            return Err(VerificationError::DigestMismatch {
                expected: hex::encode(file.file_digest()),
                actual: subject.to_hex(),
            }
            .into());
        }

        let wanted: BTreeSet<(Chain, u64)> = anchors(file.timestamp(), subject.as_bytes())
            .iter()
            .map(|anchor| (anchor.chain, anchor.height))
            .collect();
        if wanted.is_empty() {
            return Err(VerificationError::NoBlockchainAttestation.into());
        }

        let fetches = wanted.into_iter().map(move |(chain, height)| async move {
            let result = self
                .with_timeout(self.headers.block_header(chain, height))
                .await;
            ((chain, height), result)
        });

        let mut headers = HashMap::new();
        let mut fetch_errors = HashMap::new();
        let mut first_fetch_error = None;
        for (key, result) in futures::future::join_all(fetches).await {
            match result {
                Ok(header) => {
                    headers.insert(key, header);
                }
                Err(e) => {
                    warn!(chain = %key.0, height = key.1, error = %e, "Block header unavailable");
                    fetch_errors.insert(key, e.to_string());
                    first_fetch_error.get_or_insert(e);
                }
            }
        }

        let lookup = |chain: Chain, height: u64| {
            headers
                .get(&(chain, height))
                .cloned()
                .ok_or_else(|| VerificationError::HeaderUnavailable {
                    chain,
                    height,
                    reason: fetch_errors
                        .get(&(chain, height))
                        .cloned()
                        .unwrap_or_default(),
                })
        };

        match verify_file(file, subject, lookup) {
            Ok(verification) => {
                for failed in &verification.failed {
                    warn!(
                        chain = %failed.chain,
                        height = failed.height,
                        reason = %failed.reason,
                        "Attestation did not verify"
                    );
                }
                info!(time = verification.time, "Timestamp verified");
                Ok(verification)
            }
            Err(VerificationError::AllFailed { failures }) => match first_fetch_error {
                Some(e) => Err(e),
                None => Err(VerificationError::AllFailed { failures }.into()),
            },
            Err(e) => Err(e.into()),
        }
    }
}

/// Determine if an error is retryable (transient network issues)
fn is_retryable(err: &ClientError) -> bool {
    match err {
        ClientError::Network(_) | ClientError::Timeout => true,
        ClientError::NotFound(_)
        | ClientError::Verification(_)
        | ClientError::Proof(_)
        | ClientError::Storage(_)
        | ClientError::Config(_)
        | ClientError::InsufficientResponses { .. } => false,
    }
}
