//! Merkle proof service client.
//!
//! The external proof service indexes the registry tree and answers a unary
//! query for the next empty leaf and its authentication path. It lags the
//! chain; callers insert a settling delay before querying. The wire types
//! are declared inline and the call goes through the tonic client core,
//! matching what generated stubs produce for a single unary method.

use alloy::primitives::Address;
use async_trait::async_trait;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, ClientTlsConfig};
use tracing::debug;

use crate::crypto::field::FieldElement;
use crate::domain::MerkleProof;
use crate::error::{IssuerError, Result};

const EMPTY_LEAF_PROOF_METHOD: &str = "/galactica.merkle.Query/GetEmptyLeafProof";

/// Wire messages of the empty-leaf proof query.
pub mod wire {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct EmptyLeafProofRequest {
        /// Registry contract address, EIP-55 hex.
        #[prost(string, tag = "1")]
        pub registry: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct EmptyLeafProofResponse {
        #[prost(uint64, tag = "1")]
        pub leaf_index: u64,
        /// Authentication path as decimal field elements, leaf to root.
        #[prost(string, repeated, tag = "2")]
        pub path: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    }
}

/// Source of empty-leaf inclusion proofs. Implemented by
/// [`MerkleProofClient`] in production and by mocks in tests.
#[async_trait]
pub trait ProofSource: Send + Sync {
    /// Fetch the next empty leaf index and its authentication path. Only
    /// meaningful after registry mutations have propagated to the service.
    async fn empty_leaf_proof(&self, registry_address: Address) -> Result<(u64, MerkleProof)>;
}

/// gRPC client for the proof service, plaintext or TLS per configuration.
pub struct MerkleProofClient {
    channel: Channel,
}

impl MerkleProofClient {
    pub async fn connect(url: &str, tls: bool) -> Result<Self> {
        let mut endpoint = Channel::from_shared(url.to_string()).map_err(|e| {
            IssuerError::Configuration(format!("invalid merkle proof service URL: {e}"))
        })?;

        if tls {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|e| {
                    IssuerError::Configuration(format!("merkle proof service TLS setup: {e}"))
                })?;
        }

        let channel = endpoint.connect().await.map_err(|e| {
            IssuerError::ProofService(format!("connect to merkle proof service: {e}"))
        })?;

        Ok(Self { channel })
    }
}

#[async_trait]
impl ProofSource for MerkleProofClient {
    async fn empty_leaf_proof(&self, registry_address: Address) -> Result<(u64, MerkleProof)> {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| IssuerError::ProofService(format!("proof service not ready: {e}")))?;

        let codec: tonic::codec::ProstCodec<
            wire::EmptyLeafProofRequest,
            wire::EmptyLeafProofResponse,
        > = tonic::codec::ProstCodec::default();
        let request = tonic::Request::new(wire::EmptyLeafProofRequest {
            registry: registry_address.to_string(),
        });

        let response = grpc
            .unary(
                request,
                PathAndQuery::from_static(EMPTY_LEAF_PROOF_METHOD),
                codec,
            )
            .await
            .map_err(|e| IssuerError::ProofService(format!("query empty leaf proof: {e}")))?
            .into_inner();

        let mut path = Vec::with_capacity(response.path.len());
        for node in &response.path {
            path.push(FieldElement::from_decimal(node).map_err(|_| {
                IssuerError::ProofService(format!("malformed proof node {node:?}"))
            })?);
        }

        debug!(leaf_index = response.leaf_index, depth = path.len(), "fetched empty leaf proof");

        Ok((
            response.leaf_index,
            MerkleProof {
                leaf_index: response.leaf_index,
                path,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn wire_messages_roundtrip() {
        let request = wire::EmptyLeafProofRequest {
            registry: "0x0000000000000000000000000000000000000001".into(),
        };
        let bytes = request.encode_to_vec();
        let back = wire::EmptyLeafProofRequest::decode(bytes.as_slice()).unwrap();
        assert_eq!(request, back);

        let response = wire::EmptyLeafProofResponse {
            leaf_index: 7,
            path: vec!["1".into(), "2".into()],
        };
        let bytes = response.encode_to_vec();
        let back = wire::EmptyLeafProofResponse::decode(bytes.as_slice()).unwrap();
        assert_eq!(back.leaf_index, 7);
        assert_eq!(back.path.len(), 2);
    }
}
