//! Buyer cart
//!
//! Prices stored on cart lines are informational; checkout re-prices every
//! line from the product. Stock is only checked, never reserved, here.

use serde::Deserialize;
use shared::error::{AppError, ErrorCode};
use shared::models::{Cart, CartItem, Product};
use validator::Validate;

use crate::error::{ServiceError, ServiceResult, validate};
use crate::store::{LedgerStore, Txn};

pub const MAX_LINE_QUANTITY: u32 = 99;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddItemRequest {
    #[validate(length(min = 1))]
    pub product_id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, max = 99))]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateItemRequest {
    /// Zero removes the line
    #[validate(range(max = 99))]
    pub quantity: u32,
}

#[derive(Clone)]
pub struct CartService {
    store: LedgerStore,
}

fn load_or_empty(txn: &Txn<'_>, buyer_id: &str, now: i64) -> ServiceResult<Cart> {
    Ok(txn
        .get::<Cart>(buyer_id)?
        .unwrap_or_else(|| Cart::empty(buyer_id, now)))
}

impl CartService {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    pub fn get(&self, buyer_id: &str, now: i64) -> ServiceResult<Cart> {
        Ok(self
            .store
            .get::<Cart>(buyer_id)?
            .unwrap_or_else(|| Cart::empty(buyer_id, now)))
    }

    /// Add a product line, merging with an existing line for the same
    /// product and variant
    pub fn add_item(&self, buyer_id: &str, request: &AddItemRequest, now: i64) -> ServiceResult<Cart> {
        validate(request)?;
        let item_id = uuid::Uuid::new_v4().to_string();

        self.store.transact(|txn| {
            let product = txn
                .get::<Product>(&request.product_id)?
                .ok_or_else(|| AppError::new(ErrorCode::ProductNotFound))?;
            if !product.is_active {
                return Err(AppError::new(ErrorCode::ProductUnavailable).into());
            }
            let variant_id = request.variant_id.as_deref().filter(|v| !v.is_empty());
            if let Some(id) = variant_id
                && product.variant(id).is_none()
            {
                return Err(AppError::new(ErrorCode::VariantNotFound).into());
            }
            let unit_price = product
                .unit_price(variant_id)
                .ok_or_else(|| AppError::new(ErrorCode::ProductUnavailable))?;

            let mut cart = load_or_empty(txn, buyer_id, now)?;
            let in_cart = cart
                .items
                .iter()
                .find(|i| i.product_id == product.id && i.variant_id.as_deref() == variant_id)
                .map_or(0, |i| i.quantity);
            let wanted = in_cart.saturating_add(request.quantity);
            if wanted > MAX_LINE_QUANTITY {
                return Err(AppError::validation(format!(
                    "At most {MAX_LINE_QUANTITY} units per product"
                ))
                .into());
            }
            let available = product.available(variant_id);
            if wanted > available {
                return Err(AppError::insufficient_stock(&product.id, i64::from(available)).into());
            }

            let name = match variant_id.and_then(|id| product.variant(id)) {
                Some(v) => format!("{} - {}", product.name, v.name),
                None => product.name.clone(),
            };
            cart.add(CartItem {
                id: item_id.clone(),
                product_id: product.id.clone(),
                variant_id: variant_id.map(str::to_string),
                tenant_id: product.tenant_id.clone(),
                product_name: name,
                quantity: request.quantity,
                unit_price,
                added_at: now,
            });
            cart.updated_at = now;
            txn.put(&cart)?;
            Ok::<_, ServiceError>(cart)
        })
    }

    pub fn update_item(
        &self,
        buyer_id: &str,
        item_id: &str,
        request: &UpdateItemRequest,
        now: i64,
    ) -> ServiceResult<Cart> {
        validate(request)?;

        self.store.transact(|txn| {
            let mut cart = load_or_empty(txn, buyer_id, now)?;
            let pos = cart
                .items
                .iter()
                .position(|i| i.id == item_id)
                .ok_or_else(|| AppError::not_found("Cart item"))?;
            if request.quantity == 0 {
                cart.items.remove(pos);
            } else {
                let line = &cart.items[pos];
                if let Some(product) = txn.get::<Product>(&line.product_id)? {
                    let available = product.available(line.variant_id.as_deref());
                    if request.quantity > available {
                        return Err(
                            AppError::insufficient_stock(&product.id, i64::from(available)).into()
                        );
                    }
                }
                cart.items[pos].quantity = request.quantity;
            }
            cart.updated_at = now;
            txn.put(&cart)?;
            Ok::<_, ServiceError>(cart)
        })
    }

    pub fn clear(&self, buyer_id: &str) -> ServiceResult<()> {
        self.store
            .transact(|txn| txn.delete::<Cart>(buyer_id).map(|_| ()))?;
        Ok(())
    }
}
