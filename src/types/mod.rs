/// Number, decimal and address conversions plus serde adapters
pub mod conversions;
