//! Domain types mirroring the remote tables, plus validated input DTOs.
//!
//! Column names and enum values are fixed by the remote schema (the domain
//! vocabulary is Spanish); the serde attributes spell out every divergence
//! from the Rust-side names.

use rust_decimal::Decimal;
use validator::ValidationError;

mod inventory;
mod production;
mod sellers;

pub use inventory::*;
pub use production::*;
pub use sellers::*;

pub(crate) fn validate_positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("must_be_positive"));
    }
    Ok(())
}

pub(crate) fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("must_not_be_negative"));
    }
    Ok(())
}
