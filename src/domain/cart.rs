//! Session-local shopping cart. Never written to the ledger.

use bigdecimal::BigDecimal;
use serde::Serialize;
use thiserror::Error;

use crate::domain::{LifecycleStage, Product};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("Quantity must be at least 1, got {0}")]
    InvalidQuantity(u32),
    #[error("Product {0} is not in the cart")]
    LineNotFound(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub product_id: u64,
    pub name: String,
    /// Snapshot of the product's total price when it was added. Display only:
    /// checkout pays whatever the ledger's retailer fee is at that moment.
    pub unit_price: BigDecimal,
    pub quantity: u32,
}

impl CartLine {
    pub fn line_total(&self) -> BigDecimal {
        self.unit_price.clone() * BigDecimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one unit of a retailer-held product. Anything else is ignored and
    /// `false` is returned.
    pub fn add_line(&mut self, product: &Product) -> bool {
        if product.stage != LifecycleStage::WithRetailer {
            return false;
        }
        let Some(unit_price) = product.total_price() else {
            return false;
        };

        match self.line_mut(product.id) {
            Some(line) => line.quantity += 1,
            None => self.lines.push(CartLine {
                product_id: product.id,
                name: product.name.clone(),
                unit_price,
                quantity: 1,
            }),
        }
        true
    }

    pub fn remove_line(&mut self, product_id: u64) {
        self.lines.retain(|line| line.product_id != product_id);
    }

    pub fn set_quantity(&mut self, product_id: u64, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        let line = self
            .line_mut(product_id)
            .ok_or(CartError::LineNotFound(product_id))?;
        line.quantity = quantity;
        Ok(())
    }

    pub fn total(&self) -> BigDecimal {
        self.lines
            .iter()
            .map(CartLine::line_total)
            .fold(BigDecimal::from(0), |acc, x| acc + x)
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn line(&self, product_id: u64) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.product_id == product_id)
    }

    pub fn product_ids(&self) -> Vec<u64> {
        self.lines.iter().map(|line| line.product_id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    fn line_mut(&mut self, product_id: u64) -> Option<&mut CartLine> {
        self.lines.iter_mut().find(|line| line.product_id == product_id)
    }
}
