//! Society ledger and the billing report built from it
//!
//! Amounts are integer minor units (paise/cents) so totals are exact.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryKind {
    /// Money owed to or received by the society (maintenance dues, fines)
    Income,
    /// Money the society spends (repairs, salaries, utilities)
    Expense,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub society_id: String,
    /// Set for dues billed to a resident
    #[serde(default)]
    pub resident_id: Option<String>,
    pub kind: EntryKind,
    pub category: String,
    pub amount: i64,
    pub description: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.amount <= 0 {
            return Err(DomainError::Validation("amount must be positive".into()));
        }
        if self.category.trim().is_empty() {
            return Err(DomainError::Validation("category is required".into()));
        }
        Ok(())
    }

    pub fn mark_paid(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        if self.paid {
            return Err(DomainError::Validation("entry is already paid".into()));
        }
        self.paid = true;
        self.paid_at = Some(at);
        Ok(())
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.paid && self.due_date.is_some_and(|due| today > due)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: String,
    pub kind: EntryKind,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDue {
    pub resident_id: String,
    pub amount: i64,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Paid income
    pub total_income: i64,
    /// Paid expenses
    pub total_expense: i64,
    pub balance: i64,
    /// Unpaid income (dues still to collect)
    pub outstanding: i64,
    pub by_category: Vec<CategoryTotal>,
    pub pending_dues: Vec<PendingDue>,
}

impl BillingReport {
    /// Summarize entries dated within `from..=to`
    pub fn build(
        entries: &[LedgerEntry],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Self, DomainError> {
        if to < from {
            return Err(DomainError::Validation(
                "report range ends before it starts".into(),
            ));
        }

        let mut total_income = 0;
        let mut total_expense = 0;
        let mut outstanding = 0;
        let mut by_category: BTreeMap<(String, EntryKind), i64> = BTreeMap::new();
        let mut dues: BTreeMap<String, (i64, usize)> = BTreeMap::new();

        for entry in entries.iter().filter(|e| e.date >= from && e.date <= to) {
            if entry.paid {
                match entry.kind {
                    EntryKind::Income => total_income += entry.amount,
                    EntryKind::Expense => total_expense += entry.amount,
                }
                *by_category
                    .entry((entry.category.clone(), entry.kind))
                    .or_default() += entry.amount;
            } else if entry.kind == EntryKind::Income {
                outstanding += entry.amount;
                if let Some(resident) = &entry.resident_id {
                    let due = dues.entry(resident.clone()).or_default();
                    due.0 += entry.amount;
                    due.1 += 1;
                }
            }
        }

        let mut pending_dues: Vec<PendingDue> = dues
            .into_iter()
            .map(|(resident_id, (amount, entries))| PendingDue {
                resident_id,
                amount,
                entries,
            })
            .collect();
        pending_dues.sort_by(|a, b| b.amount.cmp(&a.amount));

        Ok(Self {
            from,
            to,
            total_income,
            total_expense,
            balance: total_income - total_expense,
            outstanding,
            by_category: by_category
                .into_iter()
                .map(|((category, kind), amount)| CategoryTotal {
                    category,
                    kind,
                    amount,
                })
                .collect(),
            pending_dues,
        })
    }
}
