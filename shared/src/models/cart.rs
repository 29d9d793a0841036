//! Buyer cart

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: String,
    pub product_id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
    /// Seller of the product, captured when the item was added
    pub tenant_id: String,
    pub product_name: String,
    pub quantity: u32,
    /// Informational; orders are always re-priced
    pub unit_price: Decimal,
    pub added_at: i64,
}

/// Cart document, keyed by buyer id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub buyer_id: String,
    pub items: Vec<CartItem>,
    pub updated_at: i64,
}

impl Cart {
    pub fn empty(buyer_id: impl Into<String>, now: i64) -> Self {
        Self {
            buyer_id: buyer_id.into(),
            items: Vec::new(),
            updated_at: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The single seller of every item, or `None` if the cart mixes sellers
    pub fn single_tenant(&self) -> Option<&str> {
        let first = self.items.first()?.tenant_id.as_str();
        self.items
            .iter()
            .all(|i| i.tenant_id == first)
            .then_some(first)
    }

    /// Merge into an existing line for the same product/variant, else append
    pub fn add(&mut self, item: CartItem) -> &CartItem {
        let pos = self
            .items
            .iter()
            .position(|i| i.product_id == item.product_id && i.variant_id == item.variant_id);
        let idx = match pos {
            Some(idx) => {
                let line = &mut self.items[idx];
                line.quantity = line.quantity.saturating_add(item.quantity);
                line.unit_price = item.unit_price;
                idx
            }
            None => {
                self.items.push(item);
                self.items.len() - 1
            }
        };
        &self.items[idx]
    }

    pub fn subtotal(&self) -> Decimal {
        self.items
            .iter()
            .map(|i| i.unit_price * Decimal::from(i.quantity))
            .sum()
    }
}
