use std::future::Future;
use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("unable to infer cluster config: {0}")]
    InferConfig(#[from] kube::config::InferConfigError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),

    #[error("failed to decode {kind} {name}: {source}")]
    Decode {
        kind: &'static str,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("timed out after {after:?} waiting for {operation}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Await `fut`, failing with [`Error::Timeout`] once `limit` elapses.
pub async fn within<T, F>(operation: &'static str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation,
            after: limit,
        }),
    }
}
