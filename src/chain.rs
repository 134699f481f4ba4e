//! Chain adapter for the zk-certificate registry contract.
//!
//! Thin facade over the registry: guardian whitelist check, queue
//! registration, turn predicate, and the Merkle tree append. Every write
//! builds a fresh signer-backed provider bound to the network the client
//! was connected to; the task queue serializes all writes, so nonce
//! management stays with the underlying signer.

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use async_trait::async_trait;
use tracing::info;

use crate::crypto::field::FieldElement;
use crate::error::{IssuerError, Result};

sol! {
    #[sol(rpc)]
    interface IZkCertificateRegistry {
        function guardianRegistry() external view returns (address);
        function checkZkCertificateHashInQueue(bytes32 zkCertificateHash) external view returns (bool);
        function registerToQueue(bytes32 zkCertificateHash) external;
        function addZkCertificate(uint256 leafIndex, bytes32 zkCertificateHash, bytes32[] calldata merkleProof) external;
    }

    #[sol(rpc)]
    interface IGuardianRegistry {
        function guardians(address guardian) external view returns (bool whitelisted);
    }
}

/// The registry operations the issuance pipeline depends on. Implemented by
/// [`RegistryClient`] in production and by mocks in tests.
#[async_trait]
pub trait RegistryOps: Send + Sync {
    /// Whether the address is whitelisted in the guardian registry the
    /// zk-certificate registry points to.
    async fn guardian_whitelisted(&self, provider_address: Address) -> Result<bool>;

    /// Submit the queue registration transaction and wait until mined.
    async fn submit_queue_registration(&self, leaf_hash: B256) -> Result<()>;

    /// Whether the leaf hash currently heads the registry queue.
    async fn is_in_queue(&self, leaf_hash: B256) -> Result<bool>;

    /// Append the leaf at the given index and wait until mined.
    async fn add_certificate(
        &self,
        leaf_index: u64,
        leaf_hash: B256,
        proof_path: Vec<B256>,
    ) -> Result<()>;

    fn registry_address(&self) -> Address;

    fn chain_id(&self) -> u64;

    /// Register a leaf hash, treating an already-queued hash as success:
    /// a reverted submission is probed against the queue before failing.
    async fn register_to_queue(&self, leaf_hash: B256) -> Result<()> {
        match self.submit_queue_registration(leaf_hash).await {
            Ok(()) => Ok(()),
            Err(submit_err) => {
                let exists = self.is_in_queue(leaf_hash).await.map_err(|probe_err| {
                    IssuerError::ChainWrite(format!(
                        "{submit_err}, queue probe also failed: {probe_err}"
                    ))
                })?;
                if exists {
                    Ok(())
                } else {
                    Err(submit_err)
                }
            }
        }
    }
}

/// Alloy-backed registry client.
pub struct RegistryClient {
    rpc_url: String,
    registry_address: Address,
    signer: PrivateKeySigner,
    chain_id: u64,
}

impl RegistryClient {
    /// Connect to the node and record its chain id.
    pub async fn connect(
        rpc_url: &str,
        registry_address: Address,
        signer: PrivateKeySigner,
    ) -> Result<Self> {
        let provider = ProviderBuilder::new().on_http(rpc_url.parse().map_err(invalid_rpc_url)?);
        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| IssuerError::ChainRead(format!("retrieve chain id: {e}")))?;

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            registry_address,
            signer,
            chain_id,
        })
    }

}

#[async_trait]
impl RegistryOps for RegistryClient {
    async fn guardian_whitelisted(&self, provider_address: Address) -> Result<bool> {
        let provider =
            ProviderBuilder::new().on_http(self.rpc_url.parse().map_err(invalid_rpc_url)?);
        let registry = IZkCertificateRegistry::new(self.registry_address, &provider);

        let guardian_registry_address = registry
            .guardianRegistry()
            .call()
            .await
            .map_err(|e| {
                IssuerError::ChainRead(format!("retrieve guardian registry address: {e}"))
            })?
            ._0;

        let guardian_registry = IGuardianRegistry::new(guardian_registry_address, &provider);
        let guardian = guardian_registry
            .guardians(provider_address)
            .call()
            .await
            .map_err(|e| {
                IssuerError::ChainRead(format!("retrieve guardian whitelist status: {e}"))
            })?;

        Ok(guardian.whitelisted)
    }

    async fn submit_queue_registration(&self, leaf_hash: B256) -> Result<()> {
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(self.signer.clone()))
            .on_http(self.rpc_url.parse().map_err(invalid_rpc_url)?);
        let registry = IZkCertificateRegistry::new(self.registry_address, &provider);

        let pending = registry
            .registerToQueue(leaf_hash)
            .send()
            .await
            .map_err(|e| IssuerError::ChainWrite(format!("register to queue failed: {e}")))?;

        info!(tx_hash = %pending.tx_hash(), "queue registration sent");

        let receipt = pending.get_receipt().await.map_err(|e| {
            IssuerError::ChainWrite(format!(
                "wait until queue registration transaction is mined: {e}"
            ))
        })?;
        if !receipt.status() {
            return Err(IssuerError::ChainWrite(format!(
                "queue registration transaction {} reverted",
                receipt.transaction_hash
            )));
        }

        Ok(())
    }

    async fn is_in_queue(&self, leaf_hash: B256) -> Result<bool> {
        let provider =
            ProviderBuilder::new().on_http(self.rpc_url.parse().map_err(invalid_rpc_url)?);
        let registry = IZkCertificateRegistry::new(self.registry_address, &provider);

        let result = registry
            .checkZkCertificateHashInQueue(leaf_hash)
            .call()
            .await
            .map_err(|e| {
                IssuerError::ChainRead(format!("retrieve certificate hash queue state: {e}"))
            })?;

        Ok(result._0)
    }

    async fn add_certificate(
        &self,
        leaf_index: u64,
        leaf_hash: B256,
        proof_path: Vec<B256>,
    ) -> Result<()> {
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(self.signer.clone()))
            .on_http(self.rpc_url.parse().map_err(invalid_rpc_url)?);
        let registry = IZkCertificateRegistry::new(self.registry_address, &provider);

        let pending = registry
            .addZkCertificate(U256::from(leaf_index), leaf_hash, proof_path)
            .send()
            .await
            .map_err(|e| {
                IssuerError::ChainWrite(format!(
                    "construct transaction to add record to registry: {e}"
                ))
            })?;

        info!(tx_hash = %pending.tx_hash(), leaf_index, "registry append sent");

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| IssuerError::ChainWrite(format!("wait until transaction is mined: {e}")))?;
        if !receipt.status() {
            return Err(IssuerError::ChainWrite(format!(
                "registry append transaction {} reverted",
                receipt.transaction_hash
            )));
        }

        Ok(())
    }

    fn registry_address(&self) -> Address {
        self.registry_address
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

/// Big-endian `bytes32` form of a field element, as the contracts expect.
pub fn field_to_b256(element: &FieldElement) -> B256 {
    B256::from(element.to_be_bytes())
}

fn invalid_rpc_url(err: url::ParseError) -> IssuerError {
    IssuerError::Configuration(format!("invalid RPC URL: {err}"))
}
