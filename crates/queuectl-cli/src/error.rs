use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid job descriptor: {0}")]
    InvalidJobDescriptor(String),
    #[error(transparent)]
    Store(#[from] queuectl_shared::StoreError),
    #[error(transparent)]
    Config(#[from] queuectl_shared::ConfigError),
    #[error("confirmation required: pass --confirm to proceed")]
    ConfirmationRequired,
}
