//! Consumer-supplied event handler.
//!
//! The handler is a capability set: status and error callbacks are required,
//! transaction and mempool callbacks are optional and their presence decides
//! whether the matching channel is subscribed at all.

use std::sync::Arc;

use crate::error::DispatchError;
use crate::event::{ControlEvent, TransactionEvent};

pub type StatusCallback = Arc<dyn Fn(&ControlEvent) + Send + Sync>;
pub type TransactionCallback = Arc<dyn Fn(&TransactionEvent) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(DispatchError) + Send + Sync>;

/// Callbacks invoked by a running subscription.
///
/// Callbacks run on the session task, one at a time, in delivery order.
/// Keep them short; a slow callback delays every channel of the session.
///
/// ```
/// use chainsub_core::EventHandler;
///
/// let handler = EventHandler::new(
///     |status| println!("{}: {}", status.status, status.message),
///     |err| eprintln!("{err}"),
/// )
/// .on_transaction(|tx| println!("tx {} at {}", tx.id, tx.block_height));
///
/// assert!(handler.wants_transactions());
/// assert!(!handler.wants_mempool());
/// ```
#[derive(Clone)]
pub struct EventHandler {
    on_status: StatusCallback,
    on_error: ErrorCallback,
    on_transaction: Option<TransactionCallback>,
    on_mempool: Option<TransactionCallback>,
}

impl EventHandler {
    pub fn new<S, E>(on_status: S, on_error: E) -> Self
    where
        S: Fn(&ControlEvent) + Send + Sync + 'static,
        E: Fn(DispatchError) + Send + Sync + 'static,
    {
        Self {
            on_status: Arc::new(on_status),
            on_error: Arc::new(on_error),
            on_transaction: None,
            on_mempool: None,
        }
    }

    /// Receive confirmed transactions; enables the main channel.
    pub fn on_transaction<F>(mut self, f: F) -> Self
    where
        F: Fn(&TransactionEvent) + Send + Sync + 'static,
    {
        self.on_transaction = Some(Arc::new(f));
        self
    }

    /// Receive mempool transactions; enables the mempool channel.
    pub fn on_mempool<F>(mut self, f: F) -> Self
    where
        F: Fn(&TransactionEvent) + Send + Sync + 'static,
    {
        self.on_mempool = Some(Arc::new(f));
        self
    }

    pub fn wants_transactions(&self) -> bool {
        self.on_transaction.is_some()
    }

    pub fn wants_mempool(&self) -> bool {
        self.on_mempool.is_some()
    }

    pub fn notify_status(&self, event: &ControlEvent) {
        (self.on_status)(event)
    }

    pub fn notify_error(&self, error: DispatchError) {
        (self.on_error)(error)
    }

    /// Returns `false` when the handler has no transaction callback.
    pub fn notify_transaction(&self, tx: &TransactionEvent) -> bool {
        match &self.on_transaction {
            Some(f) => {
                f(tx);
                true
            }
            None => false,
        }
    }

    /// Returns `false` when the handler has no mempool callback.
    pub fn notify_mempool(&self, tx: &TransactionEvent) -> bool {
        match &self.on_mempool {
            Some(f) => {
                f(tx);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandler")
            .field("on_transaction", &self.wants_transactions())
            .field("on_mempool", &self.wants_mempool())
            .finish_non_exhaustive()
    }
}
