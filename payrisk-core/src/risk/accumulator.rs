use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Result of [`Accumulator::reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The amount was added; `total` is the new running total.
    Reserved { total: Decimal },
    /// Adding the amount would pass the ceiling; nothing changed.
    Exceeded { current: Decimal },
}

/// Per-customer running total of accepted amounts.
///
/// Each customer has their own lock, so reservations for the same customer
/// are serialised while different customers never contend beyond the brief
/// map lookup. Totals live in process memory only.
#[derive(Default)]
pub struct Accumulator {
    totals: RwLock<HashMap<Uuid, Arc<Mutex<Decimal>>>>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    async fn cell(&self, customer_id: Uuid) -> Arc<Mutex<Decimal>> {
        if let Some(cell) = self.totals.read().await.get(&customer_id) {
            return cell.clone();
        }
        self.totals
            .write()
            .await
            .entry(customer_id)
            .or_default()
            .clone()
    }

    /// Add `amount` to the customer's total if the result stays within `ceiling`.
    ///
    /// Check and update happen under the customer's lock.
    pub async fn reserve(&self, customer_id: Uuid, amount: Decimal, ceiling: Decimal) -> Reservation {
        let cell = self.cell(customer_id).await;
        let mut total = cell.lock().await;
        match total.checked_add(amount) {
            Some(next) if next <= ceiling => {
                *total = next;
                Reservation::Reserved { total: next }
            }
            _ => Reservation::Exceeded { current: *total },
        }
    }

    /// Current total for a customer, zero if never seen.
    pub async fn total(&self, customer_id: Uuid) -> Decimal {
        let cell = self.totals.read().await.get(&customer_id).cloned();
        match cell {
            Some(cell) => *cell.lock().await,
            None => Decimal::ZERO,
        }
    }

    /// Copy of every customer's total.
    pub async fn snapshot(&self) -> HashMap<Uuid, Decimal> {
        let cells: Vec<(Uuid, Arc<Mutex<Decimal>>)> = self
            .totals
            .read()
            .await
            .iter()
            .map(|(id, cell)| (*id, cell.clone()))
            .collect();
        let mut snapshot = HashMap::with_capacity(cells.len());
        for (id, cell) in cells {
            snapshot.insert(id, *cell.lock().await);
        }
        snapshot
    }
}
