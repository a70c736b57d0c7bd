//! Registry of supported EVM chains, tokens and well-known contracts.

use alloy_primitives::{Address, B256, address, b256};

/// Numeric EIP-155 chain id.
pub type ChainId = u64;

/// Ethereum Mainnet chain ID.
pub const ETHEREUM_MAINNET: ChainId = 1;

/// Base Mainnet chain ID.
pub const BASE_MAINNET: ChainId = 8453;

/// Polygon Mainnet chain ID.
pub const POLYGON_MAINNET: ChainId = 137;

/// Arbitrum One chain ID.
pub const ARBITRUM_ONE: ChainId = 42161;

/// OP Mainnet chain ID.
pub const OP_MAINNET: ChainId = 10;

/// Sentinel address standing for the chain's native token.
pub const NATIVE_TOKEN_ADDRESS: Address = Address::ZERO;

/// `keccak256("Transfer(address,address,uint256)")`.
pub const ERC20_TRANSFER_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

/// The escrow contract on Base.
pub const ESCROW_ADDRESS: Address = address!("CA38607D85E8F6294Dc10728669605E6664C2D70");

/// Public mainnet endpoint used for name resolution.
pub const DEFAULT_MAINNET_RPC_URL: &str = "https://ethereum.publicnode.com";

/// USDC contract address on Ethereum Mainnet.
pub const USDC_ETHEREUM: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

/// USDC contract address on Base Mainnet.
pub const USDC_BASE: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

/// USDC contract address on Polygon Mainnet.
pub const USDC_POLYGON: Address = address!("3c499c542cEF5E3811e1192ce70d8cC03d5c3359");

/// USDC contract address on Arbitrum One.
pub const USDC_ARBITRUM: Address = address!("af88d065e77c8cC2239327C5EDb3A432268e5831");

/// USDC contract address on OP Mainnet.
pub const USDC_OPTIMISM: Address = address!("0b2C639c533813f4Aa9D7837CAf62653d097Ff85");

/// USDT contract address on Ethereum Mainnet.
pub const USDT_ETHEREUM: Address = address!("dAC17F958D2ee523a2206206994597C13D831ec7");

/// USDT contract address on Base Mainnet.
pub const USDT_BASE: Address = address!("fde4C96c8593536E31F229EA8f37b2ADa2699bb2");

/// USDT contract address on Polygon Mainnet.
pub const USDT_POLYGON: Address = address!("c2132D05D31c914a87C6611C10748AEb04B58e8F");

/// USDT contract address on Arbitrum One.
pub const USDT_ARBITRUM: Address = address!("Fd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9");

/// USDT contract address on OP Mainnet.
pub const USDT_OPTIMISM: Address = address!("94b008aA00579c1307B0EF2c499aD98a8ce58e58");

/// Payment verifier contracts, by lower-case platform name.
pub const VERIFIERS: &[(&str, Address)] = &[
    ("venmo", address!("9a733B55a875D0DB4915c6B36350b24F8AB99dF5")),
    ("revolut", address!("AA5A1B62B01781E789C900d616300717CD9A41aB")),
    ("cashapp", address!("76D33A33068D86016B806dF02376dDBb23Dd3703")),
    ("wise", address!("FF0149799631D7A5bdE2e7eA9b306c42b3d9a9ca")),
    ("mercadopago", address!("f2AC5be14F32Cbe6A613CFF8931d95460D6c33A3")),
    ("zelle", address!("431a078A5029146aAB239c768A615CD484519aF7")),
];

/// Looks up the payment verifier for a platform, case-insensitively.
#[must_use]
pub fn verifier_for(platform: &str) -> Option<Address> {
    VERIFIERS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(platform))
        .map(|(_, address)| *address)
}

/// A token deployed on a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInfo {
    /// Ticker symbol.
    pub symbol: &'static str,
    /// Contract address, or [`NATIVE_TOKEN_ADDRESS`].
    pub address: Address,
    /// Decimal places.
    pub decimals: u8,
}

impl TokenInfo {
    /// Whether this is the chain's native token.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.address == NATIVE_TOKEN_ADDRESS
    }
}

/// A supported chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConfig {
    /// EIP-155 chain id.
    pub chain_id: ChainId,
    /// Display name.
    pub name: &'static str,
    /// Default public RPC endpoint.
    pub rpc_url: &'static str,
    /// Native token, USDC and USDT.
    pub tokens: [TokenInfo; 3],
}

impl ChainConfig {
    /// Finds a token by symbol, case-insensitively.
    #[must_use]
    pub fn token(&self, symbol: &str) -> Option<&TokenInfo> {
        self.tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }
}

const fn tokens(usdc: Address, usdt: Address) -> [TokenInfo; 3] {
    [
        TokenInfo {
            symbol: "ETH",
            address: NATIVE_TOKEN_ADDRESS,
            decimals: 18,
        },
        TokenInfo {
            symbol: "USDC",
            address: usdc,
            decimals: 6,
        },
        TokenInfo {
            symbol: "USDT",
            address: usdt,
            decimals: 6,
        },
    ]
}

static CHAINS: [ChainConfig; 5] = [
    ChainConfig {
        chain_id: ETHEREUM_MAINNET,
        name: "Ethereum",
        rpc_url: DEFAULT_MAINNET_RPC_URL,
        tokens: tokens(USDC_ETHEREUM, USDT_ETHEREUM),
    },
    ChainConfig {
        chain_id: BASE_MAINNET,
        name: "Base",
        rpc_url: "https://mainnet.base.org",
        tokens: tokens(USDC_BASE, USDT_BASE),
    },
    ChainConfig {
        chain_id: POLYGON_MAINNET,
        name: "Polygon",
        rpc_url: "https://polygon-rpc.com",
        tokens: tokens(USDC_POLYGON, USDT_POLYGON),
    },
    ChainConfig {
        chain_id: ARBITRUM_ONE,
        name: "Arbitrum One",
        rpc_url: "https://arb1.arbitrum.io/rpc",
        tokens: tokens(USDC_ARBITRUM, USDT_ARBITRUM),
    },
    ChainConfig {
        chain_id: OP_MAINNET,
        name: "OP Mainnet",
        rpc_url: "https://mainnet.optimism.io",
        tokens: tokens(USDC_OPTIMISM, USDT_OPTIMISM),
    },
];

/// All supported chains.
#[must_use]
pub fn supported_chains() -> &'static [ChainConfig] {
    &CHAINS
}

/// The configuration for `chain_id`, if supported.
#[must_use]
pub fn chain_config(chain_id: ChainId) -> Option<&'static ChainConfig> {
    CHAINS.iter().find(|c| c.chain_id == chain_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let base = chain_config(BASE_MAINNET).unwrap();
        assert_eq!(base.rpc_url, "https://mainnet.base.org");
        assert_eq!(base.token("usdc").unwrap().address, USDC_BASE);
        assert!(base.token("ETH").unwrap().is_native());
        assert!(chain_config(84532).is_none());
        assert_eq!(supported_chains().len(), 5);
    }

    #[test]
    fn test_verifier_lookup_ignores_case() {
        assert_eq!(
            verifier_for("Venmo"),
            Some(address!("9a733B55a875D0DB4915c6B36350b24F8AB99dF5"))
        );
        assert!(verifier_for("paypal").is_none());
    }
}
