//! Domain events emitted after successful ledger-affecting operations.
//!
//! Delivery is best-effort: the UI uses these to refresh views, and a full
//! channel must never fail a write that already landed in the store.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::models::SellerMovementType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    StockAdjusted {
        inventory_id: i64,
        delta: Decimal,
        new_quantity: Decimal,
    },
    MovementCancelled {
        movement_id: i64,
        inventory_id: i64,
    },
    ProductionLogged {
        log_id: i64,
        inventory_id: i64,
        quantity: Decimal,
        production_date: NaiveDate,
    },
    ProductionReversed {
        log_id: i64,
        inventory_id: i64,
        quantity: Decimal,
    },
    OrderCompleted {
        order_id: i64,
    },
    TruckMovement {
        seller_id: i64,
        inventory_id: i64,
        movement_type: SellerMovementType,
        quantity: Decimal,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Non-blocking, best-effort publish.
    pub fn emit(&self, event: Event) {
        if let Err(err) = self.sender.try_send(event) {
            warn!("Dropping domain event, channel unavailable: {}", err);
        }
    }
}

/// Creates the event channel pair with a bounded buffer.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging each event. A real frontend would hang
/// its refresh hooks here instead.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");
    while let Some(event) = rx.recv().await {
        info!("Domain event: {:?}", event);
    }
    info!("Event channel closed, stopping event processing loop");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn emit_delivers_and_never_blocks() {
        let (sender, mut rx) = channel(2);
        sender.emit(Event::OrderCompleted { order_id: 1 });
        sender.emit(Event::StockAdjusted {
            inventory_id: 3,
            delta: dec!(-5),
            new_quantity: dec!(95),
        });
        // Buffer full: dropped, not blocked.
        sender.emit(Event::OrderCompleted { order_id: 2 });

        assert!(matches!(
            rx.recv().await,
            Some(Event::OrderCompleted { order_id: 1 })
        ));
        assert!(matches!(rx.recv().await, Some(Event::StockAdjusted { .. })));
        assert!(rx.try_recv().is_err());
    }
}
