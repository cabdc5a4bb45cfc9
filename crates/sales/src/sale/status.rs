//! Sale status state machine.

use serde::{Deserialize, Serialize};

/// The status of a sale in its lifecycle.
///
/// ```text
/// PendingPayment ──► Paid ──► Shipped ──► Completed
///        │            │
///        └────────────┴──► Cancelled
/// ```
///
/// The forward statuses are ordered by [`ordinal`](Self::ordinal); progress
/// only ever increases it. `Cancelled` sits outside that order and is only
/// reached through the dedicated cancel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SaleStatus {
    /// Created, awaiting payment. Items can still be added.
    #[default]
    PendingPayment,

    /// Payment confirmed; stock deduction requested.
    Paid,

    Shipped,

    /// Terminal.
    Completed,

    /// Terminal.
    Cancelled,
}

impl SaleStatus {
    pub const ALL: [SaleStatus; 5] = [
        SaleStatus::PendingPayment,
        SaleStatus::Paid,
        SaleStatus::Shipped,
        SaleStatus::Completed,
        SaleStatus::Cancelled,
    ];

    /// Position in the forward order; `Cancelled` is 4 and never compared.
    pub fn ordinal(&self) -> i16 {
        match self {
            SaleStatus::PendingPayment => 0,
            SaleStatus::Paid => 1,
            SaleStatus::Shipped => 2,
            SaleStatus::Completed => 3,
            SaleStatus::Cancelled => 4,
        }
    }

    /// Inverse of [`ordinal`](Self::ordinal).
    pub fn from_ordinal(ordinal: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.ordinal() == ordinal)
    }

    /// Returns true if items can be added in this status.
    pub fn can_add_items(&self) -> bool {
        matches!(self, SaleStatus::PendingPayment)
    }

    pub fn can_mark_paid(&self) -> bool {
        matches!(self, SaleStatus::PendingPayment)
    }

    pub fn can_ship(&self) -> bool {
        matches!(self, SaleStatus::Paid)
    }

    pub fn can_complete(&self) -> bool {
        matches!(self, SaleStatus::Shipped)
    }

    /// Returns true if the sale can be cancelled in this status.
    ///
    /// Shipped goods cannot be cancelled.
    pub fn can_cancel(&self) -> bool {
        matches!(self, SaleStatus::PendingPayment | SaleStatus::Paid)
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, SaleStatus::Completed | SaleStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::PendingPayment => "PendingPayment",
            SaleStatus::Paid => "Paid",
            SaleStatus::Shipped => "Shipped",
            SaleStatus::Completed => "Completed",
            SaleStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SaleStatus {
    type Err = String;

    /// Parses a status name, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown sale status: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_pending_payment() {
        assert_eq!(SaleStatus::default(), SaleStatus::PendingPayment);
    }

    #[test]
    fn test_forward_statuses_are_ordered() {
        assert!(SaleStatus::PendingPayment.ordinal() < SaleStatus::Paid.ordinal());
        assert!(SaleStatus::Paid.ordinal() < SaleStatus::Shipped.ordinal());
        assert!(SaleStatus::Shipped.ordinal() < SaleStatus::Completed.ordinal());
    }

    #[test]
    fn test_ordinal_round_trip() {
        for status in SaleStatus::ALL {
            assert_eq!(SaleStatus::from_ordinal(status.ordinal()), Some(status));
        }
        assert_eq!(SaleStatus::from_ordinal(9), None);
    }

    #[test]
    fn test_only_pending_payment_accepts_items_and_payment() {
        for status in SaleStatus::ALL {
            let pending = status == SaleStatus::PendingPayment;
            assert_eq!(status.can_add_items(), pending);
            assert_eq!(status.can_mark_paid(), pending);
        }
    }

    #[test]
    fn test_ship_and_complete_preconditions() {
        assert!(SaleStatus::Paid.can_ship());
        assert!(!SaleStatus::PendingPayment.can_ship());
        assert!(!SaleStatus::Shipped.can_ship());
        assert!(SaleStatus::Shipped.can_complete());
        assert!(!SaleStatus::Paid.can_complete());
        assert!(!SaleStatus::Completed.can_complete());
    }

    #[test]
    fn test_can_cancel_before_shipping() {
        assert!(SaleStatus::PendingPayment.can_cancel());
        assert!(SaleStatus::Paid.can_cancel());
        assert!(!SaleStatus::Shipped.can_cancel());
        assert!(!SaleStatus::Completed.can_cancel());
        assert!(!SaleStatus::Cancelled.can_cancel());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!SaleStatus::PendingPayment.is_terminal());
        assert!(!SaleStatus::Paid.is_terminal());
        assert!(!SaleStatus::Shipped.is_terminal());
        assert!(SaleStatus::Completed.is_terminal());
        assert!(SaleStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_parse_ignores_case() {
        assert_eq!("paid".parse::<SaleStatus>(), Ok(SaleStatus::Paid));
        assert_eq!("PendingPayment".parse::<SaleStatus>(), Ok(SaleStatus::PendingPayment));
        assert!("Refunded".parse::<SaleStatus>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(SaleStatus::PendingPayment.to_string(), "PendingPayment");
        assert_eq!(SaleStatus::Cancelled.to_string(), "Cancelled");
    }
}
