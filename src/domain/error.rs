//! Domain error types.

/// A parse error with position information for node DSL parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for stratlab.
#[derive(Debug, thiserror::Error)]
pub enum StratlabError {
    #[error("no price data loaded")]
    NoPriceData,

    #[error("no assets supplied")]
    NoAssets,

    #[error("simulation produced a non-finite result: {value}")]
    NonFiniteResult { value: f64 },

    #[error(transparent)]
    StrategyParse(#[from] ParseError),

    #[error("invalid strategy node {node}: {reason}")]
    StrategyInvalid { node: String, reason: String },

    #[error("unknown preset strategy: {id}")]
    PresetNotFound { id: String },

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

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&StratlabError> for std::process::ExitCode {
    fn from(err: &StratlabError) -> Self {
        let code: u8 = match err {
            StratlabError::Io(_) => 1,
            StratlabError::ConfigParse { .. }
            | StratlabError::ConfigMissing { .. }
            | StratlabError::ConfigInvalid { .. } => 2,
            StratlabError::Data { .. } => 3,
            StratlabError::StrategyParse(_)
            | StratlabError::StrategyInvalid { .. }
            | StratlabError::PresetNotFound { .. } => 4,
            StratlabError::NoData { .. }
            | StratlabError::NoPriceData
            | StratlabError::NoAssets => 5,
            StratlabError::NonFiniteResult { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
