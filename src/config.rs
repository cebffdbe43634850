use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    pub settlement_gateway_url: String,
    pub attestation_url: String,
    pub attestation_api_key: Option<String>,
    /// Upper bound on one attestation call; keeps AwaitingAttestation finite.
    pub attestation_timeout_ms: u64,
    /// Interval between receipt polls while a submission is pending.
    pub confirmation_poll_ms: u64,
    /// Per-field timeout for the portfolio batch reads.
    pub batch_read_timeout_ms: u64,
    /// Penalty applied when a Create request does not specify one (10%).
    pub default_penalty_bps: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:safevault.db".to_string()),
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            settlement_gateway_url: std::env::var("SETTLEMENT_GATEWAY_URL")
                .unwrap_or_else(|_| "http://localhost:9545".to_string()),
            attestation_url: std::env::var("ATTESTATION_URL")
                .unwrap_or_else(|_| "http://localhost:9700".to_string()),
            attestation_api_key: std::env::var("ATTESTATION_API_KEY").ok(),
            attestation_timeout_ms: env_u64("ATTESTATION_TIMEOUT_MS", 10_000),
            confirmation_poll_ms: env_u64("CONFIRMATION_POLL_MS", 2_000),
            batch_read_timeout_ms: env_u64("BATCH_READ_TIMEOUT_MS", 5_000),
            default_penalty_bps: env_u64("DEFAULT_PENALTY_BPS", 1_000) as u32,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
