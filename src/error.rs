use crate::fixed_point::MathError;
use crate::swap_limit::InventoryError;
use crate::types::conversions::ConversionError;
use crate::v3_math::V3MathError;

/// Errors returned by simulator construction and pricing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulatorError {
    // input validation
    #[error("Invalid token")]
    InvalidToken,
    #[error("Invalid amount in")]
    InvalidAmountIn,
    #[error("Invalid amount out")]
    InvalidAmountOut,
    #[error("Insufficient input amount")]
    InsufficientInputAmount,
    #[error("Insufficient output amount")]
    InsufficientOutputAmount,
    #[error("Exact-output quoting is not supported by this pool")]
    CalcAmountInUnsupported,

    // liquidity exhaustion
    #[error("Insufficient liquidity")]
    InsufficientLiquidity,
    #[error("Empty price levels")]
    EmptyPriceLevels,
    #[error("No order available")]
    NoOrderAvailable,
    #[error("Cannot fulfill amount in")]
    CannotFulfillAmountIn,
    #[error("Ticks are empty")]
    TicksEmpty,

    // arithmetic safety
    #[error("Overflow")]
    Overflow,
    #[error("Invalid liquidity")]
    InvalidLiquidity,
    #[error("Math error: {0}")]
    Math(#[from] MathError),
    #[error("Invariant did not converge")]
    NotConverged,

    // protocol safety
    #[error("Price of token0 deviates from the oracle beyond the threshold")]
    PriceDiffToken0,
    #[error("Price of token1 deviates from the oracle beyond the threshold")]
    PriceDiffToken1,

    // inventory sharing
    #[error("Swap limit is required for this pool")]
    NoSwapLimit,
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    // snapshot / configuration
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),
    #[error("Unsupported pool type: {0}")]
    UnsupportedPoolType(String),

    #[error("CalcAmountOut panicked: {0}")]
    CalcAmountOutPanic(String),
}

/// Coarse classification used by callers to decide how to react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InputValidation,
    LiquidityExhausted,
    ArithmeticSafety,
    ProtocolSafety,
    Inventory,
    Snapshot,
    Panic,
}

impl SimulatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SimulatorError::InvalidToken
            | SimulatorError::InvalidAmountIn
            | SimulatorError::InvalidAmountOut
            | SimulatorError::InsufficientInputAmount
            | SimulatorError::InsufficientOutputAmount
            | SimulatorError::CalcAmountInUnsupported => ErrorKind::InputValidation,
            SimulatorError::InsufficientLiquidity
            | SimulatorError::EmptyPriceLevels
            | SimulatorError::NoOrderAvailable
            | SimulatorError::CannotFulfillAmountIn
            | SimulatorError::TicksEmpty => ErrorKind::LiquidityExhausted,
            SimulatorError::Overflow
            | SimulatorError::InvalidLiquidity
            | SimulatorError::Math(_)
            | SimulatorError::NotConverged => ErrorKind::ArithmeticSafety,
            SimulatorError::PriceDiffToken0 | SimulatorError::PriceDiffToken1 => {
                ErrorKind::ProtocolSafety
            }
            SimulatorError::NoSwapLimit | SimulatorError::Inventory(_) => ErrorKind::Inventory,
            SimulatorError::InvalidSnapshot(_)
            | SimulatorError::Conversion(_)
            | SimulatorError::UnsupportedPoolType(_) => ErrorKind::Snapshot,
            SimulatorError::CalcAmountOutPanic(_) => ErrorKind::Panic,
        }
    }

    /// Short stable label, used for metrics.
    pub fn label(&self) -> &'static str {
        match self.kind() {
            ErrorKind::InputValidation => "input_validation",
            ErrorKind::LiquidityExhausted => "liquidity_exhausted",
            ErrorKind::ArithmeticSafety => "arithmetic_safety",
            ErrorKind::ProtocolSafety => "protocol_safety",
            ErrorKind::Inventory => "inventory",
            ErrorKind::Snapshot => "snapshot",
            ErrorKind::Panic => "panic",
        }
    }
}

impl From<V3MathError> for SimulatorError {
    fn from(e: V3MathError) -> Self {
        match e {
            V3MathError::Math(m) => SimulatorError::Math(m),
            V3MathError::LiquidityOverflow | V3MathError::LiquidityUnderflow => {
                SimulatorError::InvalidLiquidity
            }
            V3MathError::InvalidPriceOrLiquidity => SimulatorError::InsufficientLiquidity,
            V3MathError::TickOutOfBounds(_) | V3MathError::SqrtPriceOutOfBounds => {
                SimulatorError::Overflow
            }
        }
    }
}
