// Protocol-family simulators
// Each module parses its snapshot blobs once and implements PoolSimulator

pub mod clmm;
pub mod curve;
pub mod curve_oracle;
pub mod kyber_pmm;
pub mod lo1inch;
pub mod share_vault;
pub mod uniswap_v2;
pub mod xpress;

/// Pool type strings understood by the default factory
pub mod pool_types {
    pub const UNISWAP_V2: &str = "uniswap-v2";
    pub const SHARE_VAULT: &str = "share-vault";
    pub const CURVE_PLAIN: &str = "curve-plain";
    pub const CURVE_PLAIN_ORACLE: &str = "curve-plain-oracle";
    pub const CLMM: &str = "clmm";
    pub const XPRESS: &str = "xpress";
    pub const KYBER_PMM: &str = "kyber-pmm";
    pub const LO1INCH: &str = "lo1inch";
}

// Re-export the trait
pub use crate::pool_simulator::PoolSimulator;
