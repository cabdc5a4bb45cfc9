use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

/// A product and its quantity on hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub unit_price: Money,
    /// Never negative.
    pub quantity: i64,
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub unit_price: Money,
    pub quantity: i64,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, unit_price: Money, quantity: i64) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            unit_price,
            quantity,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::Validation("Product name is required".to_string()));
        }
        if self.unit_price.is_negative() {
            return Err(LedgerError::Validation(format!(
                "Invalid unit price {} (must not be negative)",
                self.unit_price
            )));
        }
        if self.quantity < 0 {
            return Err(LedgerError::Validation(format!(
                "Invalid quantity {} (must not be negative)",
                self.quantity
            )));
        }
        Ok(())
    }

    /// Builds the stored product once an id is assigned.
    pub fn into_product(self, id: ProductId) -> Product {
        Product {
            id,
            name: self.name,
            description: self.description,
            unit_price: self.unit_price,
            quantity: self.quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation() {
        assert!(NewProduct::new("Widget", Money::from_cents(100), 0).validate().is_ok());
        assert!(NewProduct::new("  ", Money::from_cents(100), 1).validate().is_err());
        assert!(NewProduct::new("Widget", Money::from_cents(-1), 1).validate().is_err());
        assert!(NewProduct::new("Widget", Money::from_cents(1), -1).validate().is_err());
    }

    #[test]
    fn wire_shape() {
        let product = NewProduct::new("Widget", Money::from_cents(250), 4)
            .with_description("Blue")
            .into_product(ProductId::new(3));
        let json = serde_json::to_value(&product).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["unitPrice"], 250);
        assert_eq!(json["quantity"], 4);
        assert_eq!(json["description"], "Blue");
    }
}
