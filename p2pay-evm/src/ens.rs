//! ENS name resolution.
//!
//! Resolves a name through the registry indirection: the registry maps the
//! name's node to a resolver contract, and that resolver maps the node to an
//! address. Off-chain (CCIP-read) resolvers are not followed.

use std::sync::Arc;

use alloy_primitives::{Address, B256, address, keccak256};
use alloy_provider::RootProvider;
use alloy_rpc_client::RpcClient;
use p2pay::resolver::{DefaultResolver, NameResolver};
use p2pay::Error;
use url::Url;

use crate::chains::DEFAULT_MAINNET_RPC_URL;
use crate::contract::{IEnsRegistry, IEnsResolver};

/// The ENS registry, at the same address on mainnet and testnets.
pub const ENS_REGISTRY_ADDRESS: Address = address!("00000000000C2E074eC69A0dFb2997BA6C7d2e1e");

/// Computes the EIP-137 namehash of `name`.
///
/// ASCII letters are lowercased first, so `Shop.ETH` and `shop.eth` share a
/// node. Full UTS-46 normalization of non-ASCII labels is not applied.
#[must_use]
pub fn namehash(name: &str) -> B256 {
    if name.is_empty() {
        return B256::ZERO;
    }
    name.rsplit('.').fold(B256::ZERO, |node, label| {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(node.as_slice());
        let label = label.to_ascii_lowercase();
        buf[32..].copy_from_slice(keccak256(label.as_bytes()).as_slice());
        keccak256(buf)
    })
}

/// Resolves ENS names against a mainnet node.
#[derive(Debug, Clone)]
pub struct EnsResolver {
    provider: RootProvider,
    registry: Address,
}

impl EnsResolver {
    /// A resolver talking to `rpc_url`.
    #[must_use]
    pub fn new(rpc_url: Url) -> Self {
        Self {
            provider: RootProvider::new_http(rpc_url),
            registry: ENS_REGISTRY_ADDRESS,
        }
    }

    /// A resolver over a pre-built RPC client, e.g. from [`crate::signer::rpc_client`].
    #[must_use]
    pub fn with_client(client: RpcClient) -> Self {
        Self {
            provider: RootProvider::new(client),
            registry: ENS_REGISTRY_ADDRESS,
        }
    }

    /// Uses a different registry deployment.
    #[must_use]
    pub const fn with_registry(mut self, registry: Address) -> Self {
        self.registry = registry;
        self
    }

    /// An application default handle bound to the public mainnet endpoint.
    ///
    /// The resolver is built on first use and shared afterwards.
    #[must_use]
    pub fn default_handle() -> DefaultResolver {
        DefaultResolver::new(|| {
            let url = Url::parse(DEFAULT_MAINNET_RPC_URL).ok()?;
            Some(Arc::new(Self::new(url)) as Arc<dyn NameResolver>)
        })
    }
}

#[async_trait::async_trait]
impl NameResolver for EnsResolver {
    async fn resolve_name(&self, name: &str) -> Result<Option<Address>, Error> {
        let node = namehash(name);
        let resolver = IEnsRegistry::new(self.registry, &self.provider)
            .resolver(node)
            .call()
            .await
            .map_err(|e| Error::Rpc(format!("ENS registry lookup for {name}: {e}")))?;
        if resolver.is_zero() {
            return Ok(None);
        }
        let resolved = IEnsResolver::new(resolver, &self.provider)
            .addr(node)
            .call()
            .await
            .map_err(|e| Error::Rpc(format!("ENS address lookup for {name}: {e}")))?;
        Ok((!resolved.is_zero()).then_some(resolved))
    }
}
