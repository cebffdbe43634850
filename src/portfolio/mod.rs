pub mod aggregator;
pub mod reader;

pub use aggregator::{aggregate, PortfolioSnapshot};
pub use reader::{VaultReadResult, VaultReader};
