//! Catalog product as seen by the stock ledger.

use serde::{Deserialize, Serialize};

use crate::error::StockError;
use crate::order::{Money, ProductId};

/// A product and its two stock counters.
///
/// `available_stock + reserved_stock` is the physical stock on hand.
/// Reserve and release only move units between the counters; confirm
/// removes units from `reserved_stock` because they have been sold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    available_stock: u32,
    reserved_stock: u32,
}

impl Product {
    /// Creates a product with `stock` units available and none reserved.
    pub fn new(id: impl Into<ProductId>, name: impl Into<String>, price: Money, stock: u32) -> Self {
        Self::with_counters(id, name, price, stock, 0)
    }

    /// Creates a product with explicit counters, as loaded from storage.
    pub fn with_counters(
        id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Money,
        available_stock: u32,
        reserved_stock: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            available_stock,
            reserved_stock,
        }
    }

    pub fn available_stock(&self) -> u32 {
        self.available_stock
    }

    pub fn reserved_stock(&self) -> u32 {
        self.reserved_stock
    }

    /// Physical units on hand, sold units excluded.
    pub fn total_stock(&self) -> u64 {
        u64::from(self.available_stock) + u64::from(self.reserved_stock)
    }

    /// Moves `quantity` units from available to reserved.
    pub fn reserve(&mut self, quantity: u32) -> Result<(), StockError> {
        self.check_quantity(quantity)?;
        if self.available_stock < quantity {
            return Err(StockError::InsufficientStock {
                product_id: self.id.clone(),
                available: self.available_stock,
                requested: quantity,
            });
        }
        let reserved = self.checked_add_reserved(quantity)?;
        self.available_stock -= quantity;
        self.reserved_stock = reserved;
        Ok(())
    }

    /// Moves `quantity` reserved units back to available.
    pub fn release(&mut self, quantity: u32) -> Result<(), StockError> {
        self.check_quantity(quantity)?;
        let reserved = self.checked_sub_reserved(quantity)?;
        let available = self.available_stock.checked_add(quantity).ok_or_else(|| {
            StockError::CounterUnderflow {
                product_id: self.id.clone(),
                counter: "available_stock",
                held: self.available_stock,
                requested: quantity,
            }
        })?;
        self.reserved_stock = reserved;
        self.available_stock = available;
        Ok(())
    }

    /// Removes `quantity` reserved units permanently (sold).
    pub fn confirm(&mut self, quantity: u32) -> Result<(), StockError> {
        self.check_quantity(quantity)?;
        self.reserved_stock = self.checked_sub_reserved(quantity)?;
        Ok(())
    }

    fn check_quantity(&self, quantity: u32) -> Result<(), StockError> {
        if quantity == 0 {
            return Err(StockError::InvalidQuantity {
                product_id: self.id.clone(),
                quantity,
            });
        }
        Ok(())
    }

    fn checked_sub_reserved(&self, quantity: u32) -> Result<u32, StockError> {
        self.reserved_stock
            .checked_sub(quantity)
            .ok_or_else(|| StockError::CounterUnderflow {
                product_id: self.id.clone(),
                counter: "reserved_stock",
                held: self.reserved_stock,
                requested: quantity,
            })
    }

    fn checked_add_reserved(&self, quantity: u32) -> Result<u32, StockError> {
        self.reserved_stock
            .checked_add(quantity)
            .ok_or_else(|| StockError::CounterUnderflow {
                product_id: self.id.clone(),
                counter: "reserved_stock",
                held: self.reserved_stock,
                requested: quantity,
            })
    }
}
