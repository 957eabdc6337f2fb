//! Compound-write bookkeeping.
//!
//! The remote store offers no transaction spanning multiple rows, so every
//! multi-step operation in this crate is atomic only in intent: the caller
//! issues the steps in a deliberate order and, on failure, issues the inverse
//! of whatever already landed. This module tracks that lifecycle and produces
//! the operator-facing report when even the inverse writes fail.

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

/// Lifecycle of one compound operation.
///
/// `Reconciled` covers both the happy path (every step landed) and the
/// recovered path (a step failed and the inverses of the applied steps all
/// landed). `Abandoned` is terminal: at least one inverse write failed, and
/// the rows it names are now wrong in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationState {
    Started,
    PartiallyApplied,
    Reconciled,
    Abandoned,
}

/// One write that landed in the store as part of a compound operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerChange {
    pub table: &'static str,
    pub row_id: i64,
    pub delta: Decimal,
}

impl fmt::Display for LedgerChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} row {} delta {:+}", self.table, self.row_id, self.delta)
    }
}

/// One write that failed, with the store's reason.
#[derive(Debug, Clone, Serialize)]
pub struct FailedWrite {
    pub table: &'static str,
    pub row_id: i64,
    pub delta: Decimal,
    pub reason: String,
}

impl fmt::Display for FailedWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} row {} delta {:+} failed: {}",
            self.table, self.row_id, self.delta, self.reason
        )
    }
}

/// The full account of an operation that could not be reconciled.
///
/// Shown to the operator verbatim; it must name every row still carrying an
/// unwanted effect (`applied`) and every write that never landed (`failed`).
#[derive(Debug, Clone, Serialize)]
pub struct Discrepancy {
    pub operation: String,
    pub applied: Vec<LedgerChange>,
    pub failed: Vec<FailedWrite>,
}

impl Discrepancy {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            applied: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Inconsistent state after '{}': manual correction required.",
            self.operation
        )?;
        if !self.applied.is_empty() {
            write!(f, " Applied but not undone:")?;
            for change in &self.applied {
                write!(f, " [{}]", change)?;
            }
        }
        if !self.failed.is_empty() {
            write!(f, " Failed writes:")?;
            for failure in &self.failed {
                write!(f, " [{}]", failure)?;
            }
        }
        Ok(())
    }
}

/// Tracks the steps of one compound operation as they land.
///
/// Services record each applied write immediately after it succeeds; when a
/// later step fails they either undo the applied writes (and report
/// `Reconciled`) or, if an undo fails too, call [`CompoundWrite::abandon`]
/// to obtain the terminal [`Discrepancy`].
#[derive(Debug)]
pub struct CompoundWrite {
    operation: String,
    applied: Vec<LedgerChange>,
    state: CompensationState,
}

impl CompoundWrite {
    pub fn begin(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            applied: Vec::new(),
            state: CompensationState::Started,
        }
    }

    /// Records a write that landed.
    pub fn applied(&mut self, table: &'static str, row_id: i64, delta: Decimal) {
        self.applied.push(LedgerChange { table, row_id, delta });
        self.state = CompensationState::PartiallyApplied;
    }

    /// Marks a previously-applied write as undone by its inverse.
    pub fn compensated(&mut self, table: &'static str, row_id: i64) {
        self.applied
            .retain(|c| !(c.table == table && c.row_id == row_id));
        if self.applied.is_empty() {
            self.state = CompensationState::Reconciled;
        }
    }

    /// All steps landed; the operation is complete.
    pub fn complete(mut self) -> CompensationState {
        self.state = CompensationState::Reconciled;
        self.state
    }

    pub fn state(&self) -> CompensationState {
        self.state
    }

    /// Terminal failure: a compensating write did not land. Consumes the
    /// tracker and returns the report naming everything still applied plus
    /// the writes that failed.
    pub fn abandon(self, failed: Vec<FailedWrite>) -> Discrepancy {
        Discrepancy {
            operation: self.operation,
            applied: self.applied,
            failed,
        }
    }
}
