//! mempool-data crate

pub mod backend;
pub mod esplora;
pub mod types;

pub use backend::MempoolBackend;
pub use types::{MempoolInfo, RawTransaction, StrippedTransaction, TransactionExtended};
