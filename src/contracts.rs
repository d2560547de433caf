//! Centralized Contract Definitions
//!
//! Solidity interfaces read by the decorator and the token registry,
//! defined using alloy's `sol!` macro.
//!
//! Each interface is annotated with `#[sol(rpc)]` to generate
//! contract instance types that can make RPC calls via any alloy Provider.
//!
//! Created: 2026-10-19

use alloy::sol;

// ── ERC20 ─────────────────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
    }
}

// ── Balancer V2 Vault ─────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IVault {
        function getPoolTokens(bytes32 poolId) external view returns (address[] tokens, uint256[] balances, uint256 lastChangeBlock);
    }
}

// ── Balancer V2 pools ─────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IBasePool {
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function getSwapFeePercentage() external view returns (uint256);
    }
}

sol! {
    #[sol(rpc)]
    interface IWeightedPool {
        function getNormalizedWeights() external view returns (uint256[] memory);
    }
}

sol! {
    #[sol(rpc)]
    interface IStablePool {
        function getAmplificationParameter() external view returns (uint256 value, bool isUpdating, uint256 precision);
    }
}

sol! {
    #[sol(rpc)]
    interface IComposableStablePool {
        function getActualSupply() external view returns (uint256);
    }
}

sol! {
    #[sol(rpc)]
    interface IStablePhantomPool {
        function getVirtualSupply() external view returns (uint256);
    }
}
