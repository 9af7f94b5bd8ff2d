//! Active transaction table
//!
//! Transactions that have a start record but no commit or abort yet, in
//! the order they started. The table has its own mutex, separate from the
//! log lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::op::RedoableOp;
use crate::txn::TransactionId;

#[derive(Default)]
struct Table {
    next_slot: u64,
    by_slot: BTreeMap<u64, Arc<dyn RedoableOp>>,
    slots: HashMap<TransactionId, u64>,
}

/// Insertion-ordered map of open transactions
#[derive(Default)]
pub struct ActiveOps {
    table: Mutex<Table>,
}

impl std::fmt::Debug for ActiveOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveOps").field("ids", &self.ids()).finish()
    }
}

impl ActiveOps {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts `op` under its transaction id. Re-inserting an id replaces
    /// the operation but keeps its original position.
    pub fn put(&self, op: Arc<dyn RedoableOp>) {
        let mut table = self.lock();
        let txn_id = op.txn_id();
        match table.slots.get(&txn_id).copied() {
            Some(slot) => {
                table.by_slot.insert(slot, op);
            }
            None => {
                let slot = table.next_slot;
                table.next_slot += 1;
                table.slots.insert(txn_id, slot);
                table.by_slot.insert(slot, op);
            }
        }
    }

    pub fn remove(&self, txn_id: &TransactionId) -> Option<Arc<dyn RedoableOp>> {
        let mut table = self.lock();
        let slot = table.slots.remove(txn_id)?;
        table.by_slot.remove(&slot)
    }

    /// Applies an operation's markers: start inserts, end removes.
    pub fn apply(&self, op: &Arc<dyn RedoableOp>) {
        if op.is_start_marker() {
            self.put(Arc::clone(op));
        }
        if op.is_end_marker() {
            self.remove(&op.txn_id());
        }
    }

    /// Transaction ids in start order
    pub fn ids(&self) -> Vec<TransactionId> {
        self.lock().by_slot.values().map(|op| op.txn_id()).collect()
    }

    /// Operations in start order
    pub fn ops(&self) -> Vec<Arc<dyn RedoableOp>> {
        self.lock().by_slot.values().cloned().collect()
    }
}
