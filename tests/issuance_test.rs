//! Issuance pipeline integration tests.
//!
//! Chain and proof collaborators are mocked behind their traits; the tests
//! drive the pipeline directly and through the HTTP router.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{address, Address, B256};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use base64::Engine;
use http_body_util::BodyExt;
use serde_json::json;
use tokio::sync::Mutex;
use tower::ServiceExt;

use zkcert_issuer::api::{router, AppState};
use zkcert_issuer::chain::{field_to_b256, RegistryOps};
use zkcert_issuer::crypto::encrypt::{decrypt_certificate, generate_encryption_keypair, EncryptedCert};
use zkcert_issuer::crypto::FieldElement;
use zkcert_issuer::domain::{HolderCommitment, IssuedCertificate, KycInputs, MerkleProof};
use zkcert_issuer::error::{ErrorKind, IssuerError};
use zkcert_issuer::issuer::{IssuerService, IssueCallback};
use zkcert_issuer::keys::KeyMaterial;
use zkcert_issuer::proof::ProofSource;
use zkcert_issuer::queue::TaskQueue;
use zkcert_issuer::store::PendingStore;

// Well-known development key.
const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

const REGISTRY_ADDRESS: Address = address!("D4C9538F1b9AE2c4bD94cd8CE26B76b6DaB0C057");

// ============================================================================
// Mocks
// ============================================================================

struct MockRegistry {
    whitelisted: bool,
    /// Registration submissions fail with a revert when true.
    submission_reverts: bool,
    /// Scripted turn-predicate answers; exhausted means true.
    in_queue_script: Mutex<VecDeque<bool>>,
    submit_calls: AtomicUsize,
    in_queue_calls: AtomicUsize,
    appended: Mutex<Vec<(u64, B256)>>,
}

impl MockRegistry {
    fn new() -> Self {
        Self {
            whitelisted: true,
            submission_reverts: false,
            in_queue_script: Mutex::new(VecDeque::new()),
            submit_calls: AtomicUsize::new(0),
            in_queue_calls: AtomicUsize::new(0),
            appended: Mutex::new(Vec::new()),
        }
    }

    fn not_whitelisted() -> Self {
        Self {
            whitelisted: false,
            ..Self::new()
        }
    }

    async fn script_turns(&self, answers: impl IntoIterator<Item = bool>) {
        self.in_queue_script.lock().await.extend(answers);
    }
}

#[async_trait]
impl RegistryOps for MockRegistry {
    async fn guardian_whitelisted(&self, _provider_address: Address) -> Result<bool, IssuerError> {
        Ok(self.whitelisted)
    }

    async fn submit_queue_registration(&self, _leaf_hash: B256) -> Result<(), IssuerError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if self.submission_reverts {
            return Err(IssuerError::ChainWrite("execution reverted".into()));
        }
        Ok(())
    }

    async fn is_in_queue(&self, _leaf_hash: B256) -> Result<bool, IssuerError> {
        self.in_queue_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.in_queue_script.lock().await.pop_front().unwrap_or(true))
    }

    async fn add_certificate(
        &self,
        leaf_index: u64,
        leaf_hash: B256,
        _proof_path: Vec<B256>,
    ) -> Result<(), IssuerError> {
        self.appended.lock().await.push((leaf_index, leaf_hash));
        Ok(())
    }

    fn registry_address(&self) -> Address {
        REGISTRY_ADDRESS
    }

    fn chain_id(&self) -> u64 {
        41238
    }
}

struct MockProofSource {
    leaf_index: u64,
}

#[async_trait]
impl ProofSource for MockProofSource {
    async fn empty_leaf_proof(
        &self,
        _registry_address: Address,
    ) -> Result<(u64, MerkleProof), IssuerError> {
        Ok((
            self.leaf_index,
            MerkleProof {
                leaf_index: self.leaf_index,
                path: vec![FieldElement::from_u64(11), FieldElement::from_u64(22)],
            },
        ))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn test_inputs() -> KycInputs {
    KycInputs {
        surname: "A".into(),
        forename: "B".into(),
        year_of_birth: 1990,
        month_of_birth: 1,
        day_of_birth: 2,
        citizenship: "CHE".into(),
        postcode: "1000".into(),
        country: "CHE".into(),
    }
}

fn test_holder() -> (HolderCommitment, [u8; 32]) {
    let (secret, public) = generate_encryption_keypair();
    let holder = HolderCommitment::new(
        FieldElement::from_decimal("1234567890123456789").unwrap(),
        public.to_vec(),
    )
    .unwrap();
    (holder, secret)
}

fn build_issuer(registry: Arc<MockRegistry>, proof: Arc<MockProofSource>) -> Arc<IssuerService> {
    let keys = Arc::new(KeyMaterial::new(TEST_PRIVATE_KEY, None).unwrap());
    let queue = TaskQueue::new(16);
    Arc::new(
        IssuerService::new(registry, proof, keys, queue).with_settle_delay(Duration::ZERO),
    )
}

/// Collects the final pipeline outcome.
fn capturing_callback() -> (IssueCallback, Arc<Mutex<Vec<Result<IssuedCertificate, IssuerError>>>>) {
    let outcomes: Arc<Mutex<Vec<Result<IssuedCertificate, IssuerError>>>> =
        Arc::new(Mutex::new(Vec::new()));
    let sink = outcomes.clone();
    let callback: IssueCallback = Arc::new(move |result| {
        let sink = sink.clone();
        Box::pin(async move {
            sink.lock().await.push(result);
        })
    });
    (callback, outcomes)
}

// ============================================================================
// Pipeline tests
// ============================================================================

#[tokio::test]
async fn guardian_preflight_rejects_and_enqueues_nothing() {
    let registry = Arc::new(MockRegistry::not_whitelisted());
    let proof = Arc::new(MockProofSource { leaf_index: 0 });
    let issuer = build_issuer(registry.clone(), proof);

    let (holder, _) = test_holder();
    let certificate = issuer.create_certificate(&holder, test_inputs()).unwrap();

    let (callback, outcomes) = capturing_callback();
    let err = issuer.enqueue(certificate, callback).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotAGuardian);
    issuer.queue().wait().await;
    assert_eq!(registry.submit_calls.load(Ordering::SeqCst), 0);
    assert!(outcomes.lock().await.is_empty());
}

#[tokio::test]
async fn turn_taking_retries_until_head_of_queue() {
    let registry = Arc::new(MockRegistry::new());
    // Three "not your turn" answers before the slot opens.
    registry.script_turns([false, false, false, true]).await;
    let proof = Arc::new(MockProofSource { leaf_index: 3 });
    let issuer = build_issuer(registry.clone(), proof);

    let (holder, _) = test_holder();
    let certificate = issuer.create_certificate(&holder, test_inputs()).unwrap();
    let leaf_hash = field_to_b256(&certificate.leaf_hash);

    let (callback, outcomes) = capturing_callback();
    issuer.enqueue(certificate, callback).await.unwrap();
    issuer.queue().wait().await;

    // The wait-turn task ran four times, the append exactly once.
    assert_eq!(registry.in_queue_calls.load(Ordering::SeqCst), 4);
    let appended = registry.appended.lock().await;
    assert_eq!(appended.as_slice(), &[(3, leaf_hash)]);

    let outcomes = outcomes.lock().await;
    assert_eq!(outcomes.len(), 1);
    let issued = outcomes[0].as_ref().unwrap();
    assert_eq!(issued.registration.leaf_index, 3);
    assert_eq!(issued.merkle_proof.leaf_index, 3);
}

#[tokio::test]
async fn reverted_registration_with_queued_hash_is_success() {
    let registry = Arc::new(MockRegistry {
        submission_reverts: true,
        ..MockRegistry::new()
    });
    let proof = Arc::new(MockProofSource { leaf_index: 0 });
    let issuer = build_issuer(registry.clone(), proof);

    let (holder, _) = test_holder();
    let certificate = issuer.create_certificate(&holder, test_inputs()).unwrap();

    let (callback, outcomes) = capturing_callback();
    issuer.enqueue(certificate, callback).await.unwrap();
    issuer.queue().wait().await;

    // The submission reverted, but the probe found the hash queued, so the
    // pipeline advanced all the way to the append.
    assert_eq!(registry.submit_calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.appended.lock().await.len(), 1);

    let outcomes = outcomes.lock().await;
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_ok());
}

#[tokio::test]
async fn fatal_chain_error_reaches_callback_once() {
    struct FailingRegistry(MockRegistry);

    #[async_trait]
    impl RegistryOps for FailingRegistry {
        async fn guardian_whitelisted(&self, a: Address) -> Result<bool, IssuerError> {
            self.0.guardian_whitelisted(a).await
        }
        async fn submit_queue_registration(&self, _leaf: B256) -> Result<(), IssuerError> {
            Err(IssuerError::ChainWrite("insufficient funds".into()))
        }
        async fn is_in_queue(&self, _leaf: B256) -> Result<bool, IssuerError> {
            // The idempotency probe must not mask the failure.
            Ok(false)
        }
        async fn add_certificate(
            &self,
            i: u64,
            l: B256,
            p: Vec<B256>,
        ) -> Result<(), IssuerError> {
            self.0.add_certificate(i, l, p).await
        }
        fn registry_address(&self) -> Address {
            self.0.registry_address()
        }
        fn chain_id(&self) -> u64 {
            self.0.chain_id()
        }
    }

    let registry = Arc::new(FailingRegistry(MockRegistry::new()));
    let proof = Arc::new(MockProofSource { leaf_index: 0 });
    let keys = Arc::new(KeyMaterial::new(TEST_PRIVATE_KEY, None).unwrap());
    let queue = TaskQueue::new(16);
    let issuer = Arc::new(
        IssuerService::new(registry, proof, keys, queue).with_settle_delay(Duration::ZERO),
    );

    let (holder, _) = test_holder();
    let certificate = issuer.create_certificate(&holder, test_inputs()).unwrap();

    let (callback, outcomes) = capturing_callback();
    issuer.enqueue(certificate, callback).await.unwrap();
    issuer.queue().wait().await;

    let outcomes = outcomes.lock().await;
    assert_eq!(outcomes.len(), 1);
    let err = outcomes[0].as_ref().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChainWrite);
}

// ============================================================================
// End-to-end HTTP scenario
// ============================================================================

#[tokio::test]
async fn end_to_end_generate_then_get_and_decrypt() {
    let registry = Arc::new(MockRegistry::new());
    registry.script_turns([false, true]).await;
    let proof = Arc::new(MockProofSource { leaf_index: 7 });

    let keys = Arc::new(KeyMaterial::new(TEST_PRIVATE_KEY, None).unwrap());
    let queue = TaskQueue::new(16);
    let issuer = Arc::new(
        IssuerService::new(registry.clone(), proof, keys, queue.clone())
            .with_settle_delay(Duration::from_millis(50)),
    );
    let store = Arc::new(PendingStore::new());
    let state = AppState {
        issuer,
        store: store.clone(),
    };

    let (holder_secret, holder_public) = generate_encryption_keypair();
    let commitment = "123456789012345678901234567890";
    let body = json!({
        "holder_commitment": commitment,
        "encryption_pub_key": base64::engine::general_purpose::STANDARD.encode(holder_public),
        "user_id": "u1",
        "profile": {
            "firstname": "A",
            "lastname": "B",
            "date_of_birth": "1990-01-02",
            "nationality": "CH",
            "postcode": "1000"
        }
    });

    let app = router().with_state(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/cert/generate")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let accepted: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(accepted["status"], "PENDING");

    // Drive the pipeline to completion.
    queue.wait().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/cert/get")
                .header("content-type", "application/json")
                .body(Body::from(json!({"user_id": "u1"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let done: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(done["status"], "DONE");
    assert!(!done["certificate"].is_null());

    // The holder can decrypt the certificate with their secret key.
    let encrypted: EncryptedCert =
        serde_json::from_value(done["certificate"].clone()).unwrap();
    assert_eq!(encrypted.holder_commitment.to_decimal(), commitment);

    let issued: IssuedCertificate = decrypt_certificate(&holder_secret, &encrypted).unwrap();
    assert_eq!(issued.registration.address, REGISTRY_ADDRESS);
    assert_eq!(issued.registration.leaf_index, 7);
    assert_eq!(issued.registration.chain_id, 41238);
    assert!(issued.registration.revocable);

    // The decrypted leaf hash matches what landed on chain.
    let appended = registry.appended.lock().await;
    assert_eq!(
        appended.as_slice(),
        &[(7, field_to_b256(&issued.certificate.leaf_hash))]
    );
    assert_eq!(
        issued.certificate.holder_commitment.to_decimal(),
        commitment
    );
}

#[tokio::test]
async fn unknown_user_is_a_store_error() {
    let registry = Arc::new(MockRegistry::new());
    let proof = Arc::new(MockProofSource { leaf_index: 0 });
    let issuer = build_issuer(registry, proof);
    let state = AppState {
        issuer,
        store: Arc::new(PendingStore::new()),
    };

    let response = router()
        .with_state(state)
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/cert/get")
                .header("content-type", "application/json")
                .body(Body::from(json!({"user_id": "ghost"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("certificate not found"));
}

#[tokio::test]
async fn malformed_requests_are_rejected_with_400() {
    let registry = Arc::new(MockRegistry::new());
    let proof = Arc::new(MockProofSource { leaf_index: 0 });
    let issuer = build_issuer(registry, proof);
    let state = AppState {
        issuer,
        store: Arc::new(PendingStore::new()),
    };
    let app = router().with_state(state);

    let (_, holder_public) = generate_encryption_keypair();
    let valid_key = base64::engine::general_purpose::STANDARD.encode(holder_public);

    let cases = [
        // Commitment is not a decimal integer.
        json!({
            "holder_commitment": "0xabc",
            "encryption_pub_key": valid_key,
            "user_id": "u1",
            "profile": {"firstname": "A", "lastname": "B", "date_of_birth": "1990-01-02", "nationality": "CH", "postcode": "1000"}
        }),
        // Encryption key is not 32 bytes.
        json!({
            "holder_commitment": "123",
            "encryption_pub_key": "AAAA",
            "user_id": "u1",
            "profile": {"firstname": "A", "lastname": "B", "date_of_birth": "1990-01-02", "nationality": "CH", "postcode": "1000"}
        }),
        // Impossible date.
        json!({
            "holder_commitment": "123",
            "encryption_pub_key": valid_key,
            "user_id": "u1",
            "profile": {"firstname": "A", "lastname": "B", "date_of_birth": "1990-02-30", "nationality": "CH", "postcode": "1000"}
        }),
        // Unknown nationality.
        json!({
            "holder_commitment": "123",
            "encryption_pub_key": valid_key,
            "user_id": "u1",
            "profile": {"firstname": "A", "lastname": "B", "date_of_birth": "1990-01-02", "nationality": "XX", "postcode": "1000"}
        }),
        // Oversized user id.
        json!({
            "holder_commitment": "123",
            "encryption_pub_key": valid_key,
            "user_id": "u".repeat(65),
            "profile": {"firstname": "A", "lastname": "B", "date_of_birth": "1990-01-02", "nationality": "CH", "postcode": "1000"}
        }),
    ];

    for body in cases {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/cert/generate")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn preflight_failure_maps_to_500_and_leaves_no_entry() {
    let registry = Arc::new(MockRegistry::not_whitelisted());
    let proof = Arc::new(MockProofSource { leaf_index: 0 });
    let issuer = build_issuer(registry, proof);
    let store = Arc::new(PendingStore::new());
    let state = AppState {
        issuer,
        store: store.clone(),
    };

    let (_, holder_public) = generate_encryption_keypair();
    let body = json!({
        "holder_commitment": "123",
        "encryption_pub_key": base64::engine::general_purpose::STANDARD.encode(holder_public),
        "user_id": "u1",
        "profile": {
            "firstname": "A",
            "lastname": "B",
            "date_of_birth": "1990-01-02",
            "nationality": "CH",
            "postcode": "1000"
        }
    });

    let response = router()
        .with_state(state)
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/cert/generate")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // Pending is only marked after a successful enqueue.
    assert_eq!(store.get("u1").await, None);
}
