//! Domain error types.

/// Top-level error type for kline-backtester.
#[derive(Debug, thiserror::Error)]
pub enum BacktestError {
    #[error("invalid input{}: {reason}", fmt_bar(.index))]
    InvalidInput {
        index: Option<usize>,
        reason: String,
    },

    #[error("invalid parameter {parameter}: {reason}")]
    InvalidParameters { parameter: String, reason: String },

    #[error("invalid backtest config {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("ledger corruption on lot {lot_id}: {reason}")]
    LedgerCorruption { lot_id: u64, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn fmt_bar(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" at bar {i}"),
        None => String::new(),
    }
}

impl BacktestError {
    pub(crate) fn input(index: usize, reason: impl Into<String>) -> Self {
        BacktestError::InvalidInput {
            index: Some(index),
            reason: reason.into(),
        }
    }

    pub(crate) fn parameter(parameter: &str, reason: impl Into<String>) -> Self {
        BacktestError::InvalidParameters {
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config(field: &str, reason: impl Into<String>) -> Self {
        BacktestError::InvalidConfig {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&BacktestError> for std::process::ExitCode {
    fn from(err: &BacktestError) -> Self {
        let code: u8 = match err {
            BacktestError::Io(_) | BacktestError::Data { .. } => 1,
            BacktestError::ConfigParse { .. }
            | BacktestError::ConfigMissing { .. }
            | BacktestError::ConfigInvalid { .. } => 2,
            BacktestError::InvalidInput { .. } => 3,
            BacktestError::InvalidParameters { .. } | BacktestError::InvalidConfig { .. } => 4,
            BacktestError::LedgerCorruption { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
