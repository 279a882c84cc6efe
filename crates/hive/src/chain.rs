//! Built-in chain items
//!
//! Chain kinds every server knows, usable in `[[templates]]` chains without a
//! plugin.

use std::sync::Arc;

use hive_runtime::Hive;
use hive_runtime::factory::ChainItem;
use hive_types::{Attributes, Variant};

/// Register the built-in chain items with a hive
pub fn register_builtin(hive: &Hive) {
    hive.register_chain_item(Negate::KIND, || Arc::new(Negate));
    hive.register_chain_item(Round::KIND, || Arc::new(Round));
    tracing::debug!("Registered built-in chain items");
}

/// Inverts booleans and negates numbers, for inverted signals
pub struct Negate;

impl Negate {
    pub const KIND: &'static str = "negate";
}

impl ChainItem for Negate {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn process(&self, value: Variant, _attributes: &mut Attributes) -> Variant {
        match value {
            Variant::Bool(b) => Variant::Bool(!b),
            Variant::Int32(i) => Variant::Int32(i.wrapping_neg()),
            Variant::Int64(i) => Variant::Int64(i.wrapping_neg()),
            Variant::Double(d) => Variant::Double(-d),
            other => other,
        }
    }
}

/// Rounds doubles to the nearest integer
pub struct Round;

impl Round {
    pub const KIND: &'static str = "round";
}

impl ChainItem for Round {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn process(&self, value: Variant, _attributes: &mut Attributes) -> Variant {
        match value {
            Variant::Double(d) if d.is_finite() => Variant::Int64(d.round() as i64),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negate() {
        let mut attributes = Attributes::new();
        assert_eq!(Negate.process(Variant::Bool(true), &mut attributes), Variant::Bool(false));
        assert_eq!(Negate.process(Variant::Int32(5), &mut attributes), Variant::Int32(-5));
        assert_eq!(Negate.process(Variant::Double(1.5), &mut attributes), Variant::Double(-1.5));
        assert_eq!(
            Negate.process(Variant::from("open"), &mut attributes),
            Variant::from("open")
        );
        assert!(attributes.is_empty());
    }

    #[test]
    fn test_round() {
        let mut attributes = Attributes::new();
        assert_eq!(Round.process(Variant::Double(2.5), &mut attributes), Variant::Int64(3));
        assert_eq!(Round.process(Variant::Double(-1.4), &mut attributes), Variant::Int64(-1));
        assert_eq!(
            Round.process(Variant::Double(f64::NAN), &mut attributes).as_f64().map(f64::is_nan),
            Some(true)
        );
        assert_eq!(Round.process(Variant::Int32(7), &mut attributes), Variant::Int32(7));
    }
}
