//! Per-sale deduction journal.
//!
//! The stock service records what it did to stock for each sale. The
//! journal makes the compensating restock exact: a cancellation only
//! returns stock that a deduction actually took, and a cancellation that
//! overtakes its payment voids the sale so the late payment deducts nothing.

use chrono::{DateTime, Utc};
use common::{SaleId, SaleItemMessage};
use serde::{Deserialize, Serialize};

/// What the stock service has done for one sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeductionState {
    /// Stock for every item was deducted.
    Deducted,
    /// A deduction was returned after the sale was cancelled.
    Returned,
    /// The sale was cancelled before any deduction happened.
    Voided,
}

impl DeductionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeductionState::Deducted => "deducted",
            DeductionState::Returned => "returned",
            DeductionState::Voided => "voided",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deducted" => Some(DeductionState::Deducted),
            "returned" => Some(DeductionState::Returned),
            "voided" => Some(DeductionState::Voided),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeductionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Journal entry for one sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleDeduction {
    pub sale_id: SaleId,
    pub state: DeductionState,
    /// Items as they were deducted (or would have been).
    pub items: Vec<SaleItemMessage>,
    pub updated_at: DateTime<Utc>,
}

impl SaleDeduction {
    pub fn deducted(sale_id: SaleId, items: Vec<SaleItemMessage>) -> Self {
        Self::with_state(sale_id, DeductionState::Deducted, items)
    }

    pub fn voided(sale_id: SaleId, items: Vec<SaleItemMessage>) -> Self {
        Self::with_state(sale_id, DeductionState::Voided, items)
    }

    fn with_state(sale_id: SaleId, state: DeductionState, items: Vec<SaleItemMessage>) -> Self {
        Self {
            sale_id,
            state,
            items,
            updated_at: Utc::now(),
        }
    }

    pub fn mark_returned(&mut self) {
        self.state = DeductionState::Returned;
        self.updated_at = Utc::now();
    }
}

/// What to do with a `SalePaid` given the sale's journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaidAction {
    /// Nothing recorded yet: deduct.
    Deduct,
    /// Already deducted under another message; report success again.
    AlreadyDeducted,
    /// Cancelled before or after deduction; do nothing.
    Skip(DeductionState),
}

/// What to do with a `SaleCancelled` given the sale's journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelAction {
    /// Return the recorded deduction.
    Restock(Vec<SaleItemMessage>),
    /// No deduction yet: void the sale.
    Void,
    /// Already returned or voided.
    Nothing(DeductionState),
}

pub fn on_sale_paid(entry: Option<&SaleDeduction>) -> PaidAction {
    match entry.map(|e| e.state) {
        None => PaidAction::Deduct,
        Some(DeductionState::Deducted) => PaidAction::AlreadyDeducted,
        Some(state) => PaidAction::Skip(state),
    }
}

pub fn on_sale_cancelled(entry: Option<&SaleDeduction>) -> CancelAction {
    match entry {
        None => CancelAction::Void,
        Some(e) if e.state == DeductionState::Deducted => CancelAction::Restock(e.items.clone()),
        Some(e) => CancelAction::Nothing(e.state),
    }
}
