use stack_string::StackString;
use thiserror::Error;

/// Error classes which alter retry / recovery policy somewhere in the sync
/// path. Everything else travels as a plain `anyhow::Error`.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Fitbit api rate limit reached, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Transient transport failure {0}")]
    TransientTransport(StackString),
    #[error("Authorization expired")]
    Unauthorized,
    #[error("DataSource {0} not found")]
    DataSourceNotFound(StackString),
    #[error("Configuration fault: {0}")]
    ConfigurationFault(StackString),
}
