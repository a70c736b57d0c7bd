//! Solidity interface definitions for on-chain interactions.
//!
//! Contains the minimal ABI surface the payer touches:
//! - [`IEscrow`] - intent registration and fulfillment
//! - [`IERC20`] - token transfer for the direct payment path
//! - [`IEnsRegistry`] / [`IEnsResolver`] - name resolution on mainnet

use alloy_sol_types::sol;

sol! {
    /// Escrow entry points used by a payer.
    ///
    /// `signalIntent` registers a verifier-signed intent and returns its hash;
    /// `fulfillIntent` submits the payment proof for that hash and releases
    /// the deposit.
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IEscrow {
        function signalIntent(
            uint256 depositId,
            uint256 amount,
            address to,
            address verifier,
            bytes32 fiatCurrency,
            bytes gatingServiceSignature
        ) external returns (bytes32);
        function fulfillIntent(bytes paymentProof, bytes32 intentHash) external;
    }
}

sol! {
    /// Minimal ERC-20 interface.
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

sol! {
    /// ENS registry, resolving a node to its resolver contract.
    ///
    /// Reference: <https://docs.ens.domains/registry/ens>
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IEnsRegistry {
        function resolver(bytes32 node) external view returns (address);
    }
}

sol! {
    /// ENS public resolver, mapping a node to an address.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IEnsResolver {
        function addr(bytes32 node) external view returns (address);
    }
}
