pub mod error;
pub mod models;
pub mod store;

pub use error::TransactionError;
pub use models::{Transaction, TransactionKind, TransactionResult, TransactionStatus};
pub use store::{InMemoryTransactionStore, TransactionStore};
