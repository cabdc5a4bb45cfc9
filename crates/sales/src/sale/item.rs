use common::{Money, ProductId, SaleItemMessage};
use serde::{Deserialize, Serialize};

/// A line item of a sale.
///
/// The unit price is a snapshot taken when the item was added; later price
/// changes in the catalogue do not affect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
}

impl SaleItem {
    pub fn new(product_id: ProductId, quantity: i64, unit_price: Money) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
        }
    }

    /// Returns quantity × unit price.
    pub fn subtotal(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    /// Copy carried inside saga messages.
    pub fn to_message(&self) -> SaleItemMessage {
        SaleItemMessage::new(self.product_id, self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtotal_is_quantity_times_price() {
        let item = SaleItem::new(ProductId::new(1), 3, Money::from_cents(1000));
        assert_eq!(item.subtotal().cents(), 3000);
        assert_eq!(item.to_message(), SaleItemMessage::new(ProductId::new(1), 3));
    }
}
