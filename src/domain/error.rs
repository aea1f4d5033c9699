//! Domain error types.
//!
//! Three categories never abort a batch: `InsufficientData` and `MissingFeed`
//! become per-symbol or per-window skips, and `DegenerateRisk` rejects a single
//! trade or feature. Everything else is a setup failure surfaced by the CLI.

/// Top-level error type for wfsim.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("data error: {reason}")]
    Data { reason: String },

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

    #[error("no bars returned for {symbol}")]
    MissingFeed { symbol: String },

    #[error("insufficient data for {context}: have {bars} bars, need {minimum}")]
    InsufficientData {
        context: String,
        bars: usize,
        minimum: usize,
    },

    #[error("degenerate risk: {reason}")]
    DegenerateRisk { reason: String },

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SimError {
    /// True for the error kinds that skip a symbol or window instead of failing a run.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            SimError::MissingFeed { .. }
                | SimError::InsufficientData { .. }
                | SimError::DegenerateRisk { .. }
        )
    }
}

impl From<&SimError> for std::process::ExitCode {
    fn from(err: &SimError) -> Self {
        let code: u8 = match err {
            SimError::Io(_) => 1,
            SimError::ConfigParse { .. }
            | SimError::ConfigMissing { .. }
            | SimError::ConfigInvalid { .. } => 2,
            SimError::Data { .. } => 3,
            SimError::DegenerateRisk { .. } => 4,
            SimError::MissingFeed { .. } | SimError::InsufficientData { .. } => 5,
            SimError::Cancelled => 6,
        };
        std::process::ExitCode::from(code)
    }
}
