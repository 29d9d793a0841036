//! Stock reservation and restoration
//!
//! Stock lives on the product document: a root quantity plus an optional
//! quantity per variant. A line for a variant draws from both, so the root
//! quantity always covers every variant's stock.
//!
//! `reserve` validates every line before touching any product, then writes all
//! decrements in the caller's transaction: either every line is reserved or
//! nothing is.

use shared::error::{AppError, ErrorCode};
use shared::models::{CartItem, Product};
use shared::order::{Order, OrderItem};
use std::collections::HashMap;

use crate::error::ServiceResult;
use crate::store::{LedgerStore, StorageResult, Txn};

/// Quantity of one product (or product variant) to reserve or restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLine {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: u32,
}

impl From<&OrderItem> for StockLine {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id.clone(),
            variant_id: item.variant_id.clone(),
            quantity: item.quantity,
        }
    }
}

impl From<&CartItem> for StockLine {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product_id.clone(),
            variant_id: item.variant_id.clone(),
            quantity: item.quantity,
        }
    }
}

pub fn lines_of(items: &[OrderItem]) -> Vec<StockLine> {
    items.iter().map(StockLine::from).collect()
}

/// Reserve every line or none.
///
/// Returns the products as they were before the reservation, keyed by id.
pub fn reserve(txn: &Txn<'_>, lines: &[StockLine]) -> ServiceResult<HashMap<String, Product>> {
    let mut products: HashMap<String, Product> = HashMap::new();
    let mut root_demand: HashMap<&str, u32> = HashMap::new();
    let mut variant_demand: HashMap<(&str, &str), u32> = HashMap::new();

    for line in lines {
        if line.quantity == 0 {
            return Err(AppError::validation("Quantity must be at least 1")
                .with_detail("product_id", line.product_id.clone())
                .into());
        }
        if !products.contains_key(&line.product_id) {
            let product = txn
                .get::<Product>(&line.product_id)?
                .ok_or_else(|| {
                    AppError::new(ErrorCode::ProductNotFound)
                        .with_detail("product_id", line.product_id.clone())
                })?;
            if !product.is_active {
                return Err(AppError::new(ErrorCode::ProductUnavailable)
                    .with_detail("product_id", line.product_id.clone())
                    .into());
            }
            products.insert(line.product_id.clone(), product);
        }

        *root_demand.entry(line.product_id.as_str()).or_default() += line.quantity;
        if let Some(variant_id) = line.variant_id.as_deref() {
            *variant_demand
                .entry((line.product_id.as_str(), variant_id))
                .or_default() += line.quantity;
        }
    }

    // Validate everything before the first write
    for ((product_id, variant_id), wanted) in &variant_demand {
        let product = &products[*product_id];
        let variant = product.variant(variant_id).ok_or_else(|| {
            AppError::new(ErrorCode::VariantNotFound)
                .with_detail("product_id", product_id.to_string())
                .with_detail("variant_id", variant_id.to_string())
        })?;
        let available = variant.quantity.min(product.quantity);
        if *wanted > available {
            return Err(shortage(product, available).into());
        }
    }
    for (product_id, wanted) in &root_demand {
        let product = &products[*product_id];
        if *wanted > product.quantity {
            return Err(shortage(product, product.quantity).into());
        }
    }

    for (product_id, wanted) in &root_demand {
        let mut product = products[*product_id].clone();
        product.quantity -= wanted;
        for ((pid, variant_id), n) in &variant_demand {
            if pid == product_id
                && let Some(variant) = product.variant_mut(variant_id)
            {
                variant.quantity -= n;
            }
        }
        txn.put(&product)?;
    }

    tracing::debug!(lines = lines.len(), "Stock reserved");
    Ok(products)
}

fn shortage(product: &Product, available: u32) -> AppError {
    AppError::insufficient_stock(product.id.clone(), i64::from(available))
        .with_detail("product_name", product.name.clone())
}

/// Exact inverse of [`reserve`]. Products or variants deleted in the
/// meantime are skipped.
pub fn restore(txn: &Txn<'_>, lines: &[StockLine]) -> StorageResult<()> {
    for line in lines {
        let Some(mut product) = txn.get::<Product>(&line.product_id)? else {
            tracing::warn!(product_id = %line.product_id, "Product gone, stock not restored");
            continue;
        };
        product.quantity = product.quantity.saturating_add(line.quantity);
        if let Some(variant_id) = line.variant_id.as_deref() {
            match product.variant_mut(variant_id) {
                Some(variant) => variant.quantity = variant.quantity.saturating_add(line.quantity),
                None => tracing::warn!(
                    product_id = %line.product_id,
                    variant_id,
                    "Variant gone, restoring root stock only"
                ),
            }
        }
        txn.put(&product)?;
    }
    Ok(())
}

/// Restore an order's stock at most once. The caller persists `order`.
/// Returns whether stock was restored by this call.
pub fn restore_for_order(txn: &Txn<'_>, order: &mut Order, now: i64) -> StorageResult<bool> {
    if order.stock_restored_at.is_some() {
        return Ok(false);
    }
    restore(txn, &lines_of(&order.items))?;
    order.stock_restored_at = Some(now);
    Ok(true)
}

/// Compensating restoration outside any other transaction
pub fn restore_now(store: &LedgerStore, lines: &[StockLine]) -> StorageResult<()> {
    store.transact(|txn| restore(txn, lines))
}
