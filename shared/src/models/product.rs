//! Product Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Product entity with optional nested variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    /// Owning seller
    pub tenant_id: String,
    pub name: String,
    pub price: Decimal,
    /// Takes precedence over `price` when set and positive
    #[serde(default)]
    pub promo_price: Option<Decimal>,
    /// Root stock, never negative
    pub quantity: u32,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub name: String,
    /// Price override used when the product has no price of its own
    #[serde(default)]
    pub price: Option<Decimal>,
    pub quantity: u32,
}

impl Product {
    pub fn variant(&self, variant_id: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    pub fn variant_mut(&mut self, variant_id: &str) -> Option<&mut Variant> {
        self.variants.iter_mut().find(|v| v.id == variant_id)
    }

    /// Authoritative unit price: promo price, else base price, else the
    /// variant's own price. `None` when nothing positive is configured.
    pub fn unit_price(&self, variant_id: Option<&str>) -> Option<Decimal> {
        let positive = |p: Option<Decimal>| p.filter(|v| *v > Decimal::ZERO);
        positive(self.promo_price)
            .or_else(|| positive(Some(self.price)))
            .or_else(|| positive(variant_id.and_then(|id| self.variant(id)).and_then(|v| v.price)))
    }

    /// Stock available for the given line. A missing variant has no stock.
    pub fn available(&self, variant_id: Option<&str>) -> u32 {
        match variant_id {
            Some(id) => self.variant(id).map(|v| v.quantity.min(self.quantity)).unwrap_or(0),
            None => self.quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn product() -> Product {
        Product {
            id: "p1".into(),
            tenant_id: "t1".into(),
            name: "Camiseta".into(),
            price: d("49.90"),
            promo_price: None,
            quantity: 10,
            variants: vec![Variant {
                id: "v1".into(),
                name: "M".into(),
                price: Some(d("39.90")),
                quantity: 3,
            }],
            is_active: true,
        }
    }

    #[test]
    fn test_unit_price_precedence() {
        let mut p = product();
        assert_eq!(p.unit_price(None), Some(d("49.90")));

        p.promo_price = Some(d("29.90"));
        assert_eq!(p.unit_price(Some("v1")), Some(d("29.90")));

        p.promo_price = Some(Decimal::ZERO);
        p.price = Decimal::ZERO;
        assert_eq!(p.unit_price(Some("v1")), Some(d("39.90")));
        assert_eq!(p.unit_price(None), None);
    }

    #[test]
    fn test_available_with_variant() {
        let p = product();
        assert_eq!(p.available(None), 10);
        assert_eq!(p.available(Some("v1")), 3);
        assert_eq!(p.available(Some("missing")), 0);
    }
}
