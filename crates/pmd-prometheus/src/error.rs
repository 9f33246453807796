use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrometheusError {
    #[error("metric registration failed: {0}")]
    Register(#[from] prometheus::Error),
}
