//! Certificate building and the on-chain issuance pipeline.
//!
//! One issuance walks three queued stages. The register task submits the
//! queue-admission transaction. The wait-turn task polls the registry's
//! turn predicate, failing with the retry sentinel until the leaf heads the
//! queue. The issue task waits out the proof service's settling lag,
//! fetches the empty-leaf proof, appends the leaf and composes the issued
//! certificate. Only the final task (or a fatal error on the way) reaches
//! the caller's callback, and it does so exactly once.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use rand::rngs::OsRng;
use rand::Rng;
use tracing::info;

use crate::chain::{field_to_b256, RegistryOps};
use crate::crypto::poseidon;
use crate::domain::{Certificate, HolderCommitment, IssuedCertificate, KycInputs, RegistrationDetails};
use crate::error::{ErrorKind, IssuerError, Result};
use crate::keys::KeyMaterial;
use crate::proof::ProofSource;
use crate::queue::{Task, TaskQueue};

/// Wait inserted before the proof fetch so the proof service observes the
/// registry state.
pub const SETTLE_DELAY: Duration = Duration::from_secs(3);

/// Invoked once per issuance request with the final outcome. Runs on the
/// queue worker and must not panic.
pub type IssueCallback =
    Arc<dyn Fn(Result<IssuedCertificate>) -> BoxFuture<'static, ()> + Send + Sync>;

pub struct IssuerService {
    registry: Arc<dyn RegistryOps>,
    proof_source: Arc<dyn ProofSource>,
    keys: Arc<KeyMaterial>,
    queue: Arc<TaskQueue>,
    settle_delay: Duration,
}

impl IssuerService {
    pub fn new(
        registry: Arc<dyn RegistryOps>,
        proof_source: Arc<dyn ProofSource>,
        keys: Arc<KeyMaterial>,
        queue: Arc<TaskQueue>,
    ) -> Self {
        Self {
            registry,
            proof_source,
            keys,
            queue,
            settle_delay: SETTLE_DELAY,
        }
    }

    /// Override the settling delay. Tests shorten it.
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// Validate the profile, encode it, sign it and assemble an unissued
    /// certificate. Deterministic apart from the salt draw.
    pub fn create_certificate(
        &self,
        holder: &HolderCommitment,
        inputs: KycInputs,
    ) -> Result<Certificate> {
        inputs.validate()?;
        let content = inputs.ff_encode()?;
        let content_hash = content.hash();

        let message = poseidon::hash_two(content_hash, holder.commitment_hash);
        let signature = self.keys.signing_key().sign(message);

        let salt = generate_random_salt();
        let expiration_date = Utc::now() + chrono::Duration::days(365);

        Certificate::new(
            holder.commitment_hash,
            content,
            self.keys.signing_key().public(),
            signature,
            salt,
            expiration_date,
        )
    }

    /// Queue a certificate for issuance. The guardian pre-flight runs
    /// synchronously; nothing is enqueued when it fails.
    pub async fn enqueue(
        self: &Arc<Self>,
        certificate: Certificate,
        callback: IssueCallback,
    ) -> Result<()> {
        let provider_address = self.keys.provider_address();
        let whitelisted = self.registry.guardian_whitelisted(provider_address).await?;
        if !whitelisted {
            return Err(IssuerError::NotAGuardian(provider_address.to_string()));
        }

        self.spawn_register(Arc::new(certificate), callback).await
    }

    /// Stage one: queue admission.
    async fn spawn_register(
        self: &Arc<Self>,
        certificate: Arc<Certificate>,
        callback: IssueCallback,
    ) -> Result<()> {
        let leaf_hash = field_to_b256(&certificate.leaf_hash);

        let registry = self.registry.clone();
        let service = self.clone();
        let task: Task<()> = Task::new(
            Box::new(move || {
                let registry = registry.clone();
                async move { registry.register_to_queue(leaf_hash).await }.boxed()
            }),
            Box::new(move |result| {
                let service = service.clone();
                let certificate = certificate.clone();
                let callback = callback.clone();
                async move {
                    match result {
                        Ok(()) => {
                            if let Err(err) =
                                service.spawn_wait_turn(certificate, callback.clone()).await
                            {
                                callback(Err(err)).await;
                            }
                        }
                        Err(err) if err.kind() == ErrorKind::RequiresRetry => {}
                        Err(err) => callback(Err(err)).await,
                    }
                }
                .boxed()
            }),
            Some(ErrorKind::RequiresRetry),
        );

        self.queue.add(Box::new(task)).await
    }

    /// Stage two: wait until the leaf heads the registry queue. Not our
    /// turn yet is the retry sentinel, which re-enqueues this task at the
    /// tail.
    async fn spawn_wait_turn(
        self: &Arc<Self>,
        certificate: Arc<Certificate>,
        callback: IssueCallback,
    ) -> Result<()> {
        let leaf_hash = field_to_b256(&certificate.leaf_hash);

        let service = self.clone();
        let exec_certificate = certificate.clone();
        let exec_callback = callback.clone();
        let task: Task<()> = Task::new(
            Box::new(move || {
                let service = service.clone();
                let certificate = exec_certificate.clone();
                let callback = exec_callback.clone();
                async move {
                    let my_turn = service.registry.is_in_queue(leaf_hash).await?;
                    if !my_turn {
                        return Err(IssuerError::RequiresRetry);
                    }
                    service.spawn_issue(certificate, callback).await
                }
                .boxed()
            }),
            Box::new(move |result| {
                let callback = callback.clone();
                async move {
                    match result {
                        Ok(()) => {}
                        Err(err) if err.kind() == ErrorKind::RequiresRetry => {}
                        Err(err) => callback(Err(err)).await,
                    }
                }
                .boxed()
            }),
            Some(ErrorKind::RequiresRetry),
        );

        self.queue.add(Box::new(task)).await
    }

    /// Stage three: settle, fetch the proof, append the leaf and hand the
    /// issued certificate to the caller.
    async fn spawn_issue(
        self: &Arc<Self>,
        certificate: Arc<Certificate>,
        callback: IssueCallback,
    ) -> Result<()> {
        let service = self.clone();
        let task: Task<IssuedCertificate> = Task::new(
            Box::new(move || {
                let service = service.clone();
                let certificate = certificate.clone();
                async move { service.issue(&certificate).await }.boxed()
            }),
            Box::new(move |result| {
                let callback = callback.clone();
                async move {
                    match result {
                        Err(err) if err.kind() == ErrorKind::RequiresRetry => {}
                        other => callback(other).await,
                    }
                }
                .boxed()
            }),
            Some(ErrorKind::RequiresRetry),
        );

        self.queue.add(Box::new(task)).await
    }

    async fn issue(&self, certificate: &Certificate) -> Result<IssuedCertificate> {
        // Let the proof service catch up with the registry mutation.
        tokio::time::sleep(self.settle_delay).await;

        let registry_address = self.registry.registry_address();
        let (leaf_index, proof) = self.proof_source.empty_leaf_proof(registry_address).await?;

        let proof_path = proof.path.iter().map(field_to_b256).collect();
        self.registry
            .add_certificate(leaf_index, field_to_b256(&certificate.leaf_hash), proof_path)
            .await?;

        info!(leaf_index, "certificate appended to registry");

        Ok(IssuedCertificate {
            certificate: certificate.clone(),
            registration: RegistrationDetails {
                address: registry_address,
                revocable: true,
                leaf_index,
                chain_id: self.registry.chain_id(),
            },
            merkle_proof: proof,
        })
    }
}

/// Uniform draw from [1, i64::MAX]; zero is excluded to keep downstream
/// commitment derivations well-defined.
fn generate_random_salt() -> i64 {
    OsRng.gen_range(1..=i64::MAX)
}
