// ============================================================================
// Step Transactions
// ============================================================================
//
// Every migration step and every consumer write runs against a copy-on-write
// working set of tables. The store publishes it in one commit (snapshot file
// replaced atomically, then the in-memory tables swapped) or drops it.
//
// ============================================================================

pub mod step_transaction;

pub use step_transaction::StepTransaction;
