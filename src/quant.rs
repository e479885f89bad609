//! Boundary quantization for venue-reported quantities.
//!
//! The gateway reports amounts and prices with more precision than assets
//! actually support. Everything crossing into the engine is snapped to the
//! asset's minimal increment exactly once, on ingestion, so comparisons and
//! event payloads always agree.

use std::collections::HashMap;

use rust_decimal::Decimal;

/// Minimal increments per asset symbol, supplied externally.
///
/// Assets without an entry pass through [`quantize`] unchanged; absence
/// means "no increment known," not zero precision.
pub type QuantumMap = HashMap<String, Decimal>;

/// Snap `value` to a multiple of `quantum`, truncating toward zero.
///
/// A zero or negative quantum is treated as "no increment" and returns the
/// value unchanged.
#[must_use]
pub fn quantize(value: Decimal, quantum: Decimal) -> Decimal {
    if quantum <= Decimal::ZERO {
        return value;
    }
    (value / quantum).trunc() * quantum
}

/// Quantize `value` using the increment configured for `asset`, if any.
#[must_use]
pub fn quantize_asset(quantums: &QuantumMap, asset: &str, value: Decimal) -> Decimal {
    match quantums.get(asset) {
        Some(quantum) => quantize(value, *quantum),
        None => value,
    }
}
