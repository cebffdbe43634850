pub mod models;
pub mod repository;

pub use models::{ReceiptEntry, ReceiptKind};
pub use repository::ReceiptLedger;
