//! Recipient address resolution.
//!
//! A recipient is either a canonical address (`0x` followed by 40 hex digits)
//! or a human-readable alias such as `myapp.fkey.eth`. Canonical addresses are
//! returned as-is; aliases go through a [`NameResolver`].
//!
//! Results are never cached: every call to [`AddressResolver::resolve`] asks the
//! provider again, so a rebound alias takes effect immediately.

use std::fmt::{Debug, Formatter};
use std::sync::{Arc, LazyLock, OnceLock};

use alloy_primitives::Address;
use regex::Regex;

use crate::error::Error;

static CANONICAL_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[a-fA-F0-9]{40}$").expect("valid pattern"));

/// Returns `true` when `identifier` is a canonical `0x`-prefixed 20-byte hex address.
#[must_use]
pub fn is_canonical_address(identifier: &str) -> bool {
    CANONICAL_ADDRESS.is_match(identifier)
}

/// Looks up the address currently bound to a name.
#[async_trait::async_trait]
pub trait NameResolver: Send + Sync {
    /// Returns the bound address, or `None` when the name has no binding.
    ///
    /// # Errors
    ///
    /// Returns an error when the lookup itself fails (transport, RPC).
    async fn resolve_name(&self, name: &str) -> Result<Option<Address>, Error>;
}

type ResolverFactory = Box<dyn Fn() -> Option<Arc<dyn NameResolver>> + Send + Sync>;

/// Application-owned, lazily created fallback resolver.
///
/// The factory runs at most once, on first use, even when several flows race
/// to resolve a name. A factory returning `None` is remembered too.
pub struct DefaultResolver {
    factory: ResolverFactory,
    cell: OnceLock<Option<Arc<dyn NameResolver>>>,
}

impl Debug for DefaultResolver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultResolver")
            .field("initialized", &self.cell.get().is_some())
            .finish_non_exhaustive()
    }
}

impl DefaultResolver {
    /// Creates a handle that builds its resolver with `factory` on first use.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Option<Arc<dyn NameResolver>> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            cell: OnceLock::new(),
        }
    }

    /// Creates a handle around an already constructed resolver.
    #[must_use]
    pub fn from_resolver(resolver: Arc<dyn NameResolver>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Some(resolver));
        Self {
            factory: Box::new(|| None),
            cell,
        }
    }

    /// Returns the shared resolver, creating it if needed.
    #[must_use]
    pub fn get(&self) -> Option<Arc<dyn NameResolver>> {
        self.cell.get_or_init(|| (self.factory)()).clone()
    }
}

/// Maps recipient identifiers to canonical addresses.
#[derive(Debug, Default)]
pub struct AddressResolver {
    default: Option<DefaultResolver>,
}

impl AddressResolver {
    /// A resolver with no fallback; aliases require an explicit provider.
    #[must_use]
    pub const fn new() -> Self {
        Self { default: None }
    }

    /// A resolver that falls back to `default` when no provider is passed.
    #[must_use]
    pub const fn with_default(default: DefaultResolver) -> Self {
        Self {
            default: Some(default),
        }
    }

    /// Resolves `identifier` to a canonical address.
    ///
    /// `provider` takes precedence over the default handle. Canonical input
    /// never touches either.
    ///
    /// # Errors
    ///
    /// - [`Error::ResolutionUnavailable`] if `identifier` is an alias and no
    ///   provider is available.
    /// - [`Error::NameNotFound`] if the provider has no binding.
    /// - Any error the provider itself returns.
    pub async fn resolve(
        &self,
        identifier: &str,
        provider: Option<&dyn NameResolver>,
    ) -> Result<Address, Error> {
        if is_canonical_address(identifier) {
            return identifier
                .parse()
                .map_err(|_| Error::InvalidAddress(identifier.to_owned()));
        }
        let fallback;
        let provider = match provider {
            Some(provider) => provider,
            None => {
                fallback = self
                    .default
                    .as_ref()
                    .and_then(DefaultResolver::get)
                    .ok_or(Error::ResolutionUnavailable)?;
                fallback.as_ref()
            }
        };
        #[cfg(feature = "telemetry")]
        tracing::debug!(name = identifier, "resolving recipient name");
        provider
            .resolve_name(identifier)
            .await?
            .ok_or_else(|| Error::NameNotFound(identifier.to_owned()))
    }
}
