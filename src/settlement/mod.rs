pub mod client;
pub mod models;
pub mod submitter;

pub use client::{GatewaySettlementClient, SettlementClient};
pub use submitter::{ActionSubmitter, PreparedAction};
