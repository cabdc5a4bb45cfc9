//! Sale aggregate implementation.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, ProductId, SaleId, SaleItemMessage, Version};
use serde::{Deserialize, Serialize};

use super::{SaleItem, SaleStatus};
use crate::error::{Result, SaleError};

/// Sale aggregate root.
///
/// Status only changes through the named transition methods. The total is
/// derived from the items and recomputed whenever they change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    /// Assigned by the store on first insert.
    id: Option<SaleId>,
    customer_id: CustomerId,
    created_at: DateTime<Utc>,
    status: SaleStatus,
    total: Money,
    items: Vec<SaleItem>,
    /// Row version for optimistic concurrency.
    version: Version,
}

// Construction
impl Sale {
    /// Creates a new, unsaved sale in `PendingPayment`.
    pub fn new(customer_id: CustomerId) -> Self {
        Self {
            id: None,
            customer_id,
            created_at: Utc::now(),
            status: SaleStatus::PendingPayment,
            total: Money::zero(),
            items: Vec::new(),
            version: Version::initial(),
        }
    }

    /// Rebuilds a stored sale.
    pub fn restore(
        id: SaleId,
        customer_id: CustomerId,
        created_at: DateTime<Utc>,
        status: SaleStatus,
        items: Vec<SaleItem>,
        version: Version,
    ) -> Self {
        let total = items.iter().map(SaleItem::subtotal).sum();
        Self {
            id: Some(id),
            customer_id,
            created_at,
            status,
            total,
            items,
            version,
        }
    }

    /// Records the identity assigned by the store.
    pub fn assign_id(&mut self, id: SaleId) {
        self.id = Some(id);
    }

    /// Records the version written by the store.
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

// Query methods
impl Sale {
    pub fn id(&self) -> Option<SaleId> {
        self.id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> SaleStatus {
        self.status
    }

    /// Sum of the line-item subtotals.
    pub fn total(&self) -> Money {
        self.total
    }

    pub fn items(&self) -> &[SaleItem] {
        &self.items
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Items as carried by saga messages.
    pub fn item_messages(&self) -> Vec<SaleItemMessage> {
        self.items.iter().map(SaleItem::to_message).collect()
    }
}

// Transitions
impl Sale {
    /// Appends a line item and recomputes the total.
    pub fn add_item(&mut self, product_id: ProductId, quantity: i64, unit_price: Money) -> Result<()> {
        if !self.status.can_add_items() {
            return Err(SaleError::InvalidState {
                current: self.status,
                action: "add item",
            });
        }
        if quantity <= 0 {
            return Err(SaleError::Validation(format!(
                "Invalid quantity {quantity} for product {product_id} (must be greater than 0)"
            )));
        }
        if unit_price.is_negative() {
            return Err(SaleError::Validation(format!(
                "Invalid unit price {unit_price} for product {product_id}"
            )));
        }

        let total = unit_price
            .checked_multiply(quantity)
            .and_then(|subtotal| self.total.checked_add(subtotal))
            .ok_or_else(|| {
                SaleError::Validation(format!("Sale total overflows at product {product_id}"))
            })?;

        self.items.push(SaleItem::new(product_id, quantity, unit_price));
        self.total = total;
        Ok(())
    }

    /// Marks the sale paid. The caller is responsible for publishing `SalePaid`.
    pub fn mark_paid(&mut self) -> Result<()> {
        self.transition(SaleStatus::can_mark_paid, SaleStatus::Paid, "mark paid")
    }

    pub fn mark_shipped(&mut self) -> Result<()> {
        self.transition(SaleStatus::can_ship, SaleStatus::Shipped, "mark shipped")
    }

    pub fn mark_completed(&mut self) -> Result<()> {
        self.transition(SaleStatus::can_complete, SaleStatus::Completed, "mark completed")
    }

    /// Cancels the sale and returns the status it had before.
    ///
    /// A previous status other than `PendingPayment` means stock may already
    /// have been deducted and must be compensated by the caller.
    pub fn cancel(&mut self) -> Result<SaleStatus> {
        let previous = self.status;
        self.transition(SaleStatus::can_cancel, SaleStatus::Cancelled, "cancel")?;
        Ok(previous)
    }

    /// Validates a request to move to `target` through the generic status
    /// update entry point.
    ///
    /// `Cancelled` is never a valid target here, and the target must be
    /// strictly ahead of the current status. Whether the specific transition
    /// is allowed is still checked by the matching transition method.
    pub fn validate_status_change(&self, target: SaleStatus) -> Result<()> {
        if target == SaleStatus::Cancelled {
            return Err(SaleError::Validation(
                "Sales are cancelled through the cancel operation".to_string(),
            ));
        }
        if self.status == SaleStatus::Cancelled || target.ordinal() <= self.status.ordinal() {
            return Err(SaleError::InvalidState {
                current: self.status,
                action: "move backwards or stay in place",
            });
        }
        Ok(())
    }

    fn transition(
        &mut self,
        allowed: fn(&SaleStatus) -> bool,
        next: SaleStatus,
        action: &'static str,
    ) -> Result<()> {
        if !allowed(&self.status) {
            return Err(SaleError::InvalidState {
                current: self.status,
                action,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sale_with_item() -> Sale {
        let mut sale = Sale::new(CustomerId::new(1));
        sale.add_item(ProductId::new(10), 3, Money::from_cents(1000))
            .unwrap();
        sale
    }

    fn sale_in(status: SaleStatus) -> Sale {
        let mut sale = sale_with_item();
        match status {
            SaleStatus::PendingPayment => {}
            SaleStatus::Paid => sale.mark_paid().unwrap(),
            SaleStatus::Shipped => {
                sale.mark_paid().unwrap();
                sale.mark_shipped().unwrap();
            }
            SaleStatus::Completed => {
                sale.mark_paid().unwrap();
                sale.mark_shipped().unwrap();
                sale.mark_completed().unwrap();
            }
            SaleStatus::Cancelled => {
                sale.cancel().unwrap();
            }
        }
        sale
    }

    #[test]
    fn test_new_sale_is_pending_and_unsaved() {
        let sale = Sale::new(CustomerId::new(1));
        assert_eq!(sale.status(), SaleStatus::PendingPayment);
        assert_eq!(sale.id(), None);
        assert_eq!(sale.version(), Version::initial());
        assert_eq!(sale.total(), Money::zero());
    }

    #[test]
    fn test_total_tracks_items() {
        let mut sale = sale_with_item();
        sale.add_item(ProductId::new(11), 2, Money::from_cents(250))
            .unwrap();
        assert_eq!(sale.total().cents(), 3500);
        assert_eq!(sale.items().len(), 2);
    }

    #[test]
    fn test_add_item_rejects_bad_input() {
        let mut sale = Sale::new(CustomerId::new(1));
        assert!(matches!(
            sale.add_item(ProductId::new(1), 0, Money::from_cents(1)),
            Err(SaleError::Validation(_))
        ));
        assert!(matches!(
            sale.add_item(ProductId::new(1), 1, Money::from_cents(-1)),
            Err(SaleError::Validation(_))
        ));
        assert!(sale.items().is_empty());
    }

    #[test]
    fn test_add_item_rejects_overflowing_total() {
        let mut sale = sale_with_item();
        assert!(matches!(
            sale.add_item(ProductId::new(2), i64::MAX, Money::from_cents(2)),
            Err(SaleError::Validation(_))
        ));
        assert!(matches!(
            sale.add_item(ProductId::new(2), 1, Money::from_cents(i64::MAX)),
            Err(SaleError::Validation(_))
        ));
        assert_eq!(sale.items().len(), 1);
        assert_eq!(sale.total().cents(), 3000);
    }

    #[test]
    fn test_add_item_only_while_pending() {
        let mut sale = sale_in(SaleStatus::Paid);
        let result = sale.add_item(ProductId::new(2), 1, Money::from_cents(100));
        assert!(matches!(result, Err(SaleError::InvalidState { .. })));
        assert_eq!(sale.items().len(), 1);
    }

    #[test]
    fn test_full_lifecycle() {
        let mut sale = sale_with_item();
        sale.mark_paid().unwrap();
        assert_eq!(sale.status(), SaleStatus::Paid);
        sale.mark_shipped().unwrap();
        assert_eq!(sale.status(), SaleStatus::Shipped);
        sale.mark_completed().unwrap();
        assert_eq!(sale.status(), SaleStatus::Completed);
    }

    #[test]
    fn test_mark_shipped_on_pending_payment_is_rejected() {
        let mut sale = sale_in(SaleStatus::PendingPayment);
        let before = sale.clone();
        let result = sale.mark_shipped();
        assert!(matches!(
            result,
            Err(SaleError::InvalidState {
                current: SaleStatus::PendingPayment,
                ..
            })
        ));
        assert_eq!(sale, before);
    }

    #[test]
    fn test_mark_paid_twice_is_rejected() {
        let mut sale = sale_in(SaleStatus::Paid);
        assert!(matches!(sale.mark_paid(), Err(SaleError::InvalidState { .. })));
    }

    #[test]
    fn test_mark_completed_requires_shipped() {
        let mut sale = sale_in(SaleStatus::Paid);
        assert!(matches!(sale.mark_completed(), Err(SaleError::InvalidState { .. })));
    }

    #[test]
    fn test_cancel_returns_previous_status() {
        let mut pending = sale_in(SaleStatus::PendingPayment);
        assert_eq!(pending.cancel().unwrap(), SaleStatus::PendingPayment);
        assert_eq!(pending.status(), SaleStatus::Cancelled);

        let mut paid = sale_in(SaleStatus::Paid);
        assert_eq!(paid.cancel().unwrap(), SaleStatus::Paid);
    }

    #[test]
    fn test_cannot_cancel_shipped_completed_or_cancelled() {
        for status in [SaleStatus::Shipped, SaleStatus::Completed, SaleStatus::Cancelled] {
            let mut sale = sale_in(status);
            assert!(matches!(sale.cancel(), Err(SaleError::InvalidState { .. })));
            assert_eq!(sale.status(), status);
        }
    }

    #[test]
    fn test_status_change_must_move_forward() {
        let sale = sale_in(SaleStatus::Paid);
        assert!(sale.validate_status_change(SaleStatus::Shipped).is_ok());
        assert!(sale.validate_status_change(SaleStatus::Completed).is_ok());
        assert!(matches!(
            sale.validate_status_change(SaleStatus::Paid),
            Err(SaleError::InvalidState { .. })
        ));
        assert!(matches!(
            sale.validate_status_change(SaleStatus::PendingPayment),
            Err(SaleError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_status_change_never_targets_cancelled() {
        let sale = sale_in(SaleStatus::PendingPayment);
        assert!(matches!(
            sale.validate_status_change(SaleStatus::Cancelled),
            Err(SaleError::Validation(_))
        ));
    }

    #[test]
    fn test_cancelled_sale_accepts_no_status_change() {
        let sale = sale_in(SaleStatus::Cancelled);
        for target in [SaleStatus::Paid, SaleStatus::Shipped, SaleStatus::Completed] {
            assert!(sale.validate_status_change(target).is_err());
        }
    }

    #[test]
    fn test_restore_recomputes_total() {
        let items = vec![
            SaleItem::new(ProductId::new(1), 2, Money::from_cents(150)),
            SaleItem::new(ProductId::new(2), 1, Money::from_cents(50)),
        ];
        let sale = Sale::restore(
            SaleId::new(7),
            CustomerId::new(3),
            Utc::now(),
            SaleStatus::Paid,
            items,
            Version::new(4),
        );
        assert_eq!(sale.id(), Some(SaleId::new(7)));
        assert_eq!(sale.total().cents(), 350);
        assert_eq!(sale.item_messages().len(), 2);
    }

    #[test]
    fn test_serialization() {
        let sale = sale_with_item();
        let json = serde_json::to_string(&sale).unwrap();
        let back: Sale = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sale);
    }
}
