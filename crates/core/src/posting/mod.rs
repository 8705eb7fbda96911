//! Transaction posting domain logic.
//!
//! Defines the input and canonical output types for posting a transaction
//! and the double-entry validation applied before anything durable happens.

pub mod types;
pub mod validation;

pub use types::{PostTransactionInput, PostedPosting, PostedTransaction, PostingInput, TransactionStatus};
pub use validation::{ValidationError, validate};
