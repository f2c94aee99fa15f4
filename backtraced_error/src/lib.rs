use std::backtrace::Backtrace;

/// Longest piece of offending input kept inside an error message.
pub const BAD_INPUT_SAMPLE_CHARS_LIMIT: usize = 256;

pub fn error_chain_to_pretty_formatted<E>(error: E) -> String
where
    E: std::error::Error,
{
    let mut err = format!("{}", error);
    let mut source = error.source();
    while let Some(inner_err) = source {
        err.push_str(&format!("\nCaused by: \n{}", inner_err));
        source = inner_err.source();
    }
    err
}

#[derive(Debug, thiserror::Error)]
#[error("SqlxError Context: {context}\n{backtrace}")]
pub struct SqlxError {
    #[source]
    pub source: sqlx::Error,
    pub context: String,
    pub backtrace: OptionBacktracePrettyPrinter,
}

impl SqlxError {
    pub fn from_sqlx_error<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self {
            source,
            context: context.into(),
            backtrace: OptionBacktracePrettyPrinter::capture(),
        }
    }

    pub fn is_row_not_found(&self) -> bool {
        matches!(self.source, sqlx::Error::RowNotFound)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("SerdeJsonError Context: {context}\n{bad_input_sample}\n{backtrace}")]
pub struct SerdeJsonError {
    #[source]
    pub source: serde_json::Error,
    pub context: String,
    pub bad_input_sample: String,
    pub backtrace: OptionBacktracePrettyPrinter,
}

impl SerdeJsonError {
    pub fn from_serde_json_error<S: Into<String>>(
        source: serde_json::Error,
        context: S,
        bad_input: &[u8],
    ) -> Self {
        Self {
            source,
            context: context.into(),
            bad_input_sample: bad_input_sample(bad_input),
            backtrace: OptionBacktracePrettyPrinter::capture(),
        }
    }
}

fn bad_input_sample(bad_input: &[u8]) -> String {
    String::from_utf8_lossy(bad_input)
        .chars()
        .take(BAD_INPUT_SAMPLE_CHARS_LIMIT)
        .collect()
}

#[derive(Debug)]
pub struct OptionBacktracePrettyPrinter(pub Option<Backtrace>);

impl OptionBacktracePrettyPrinter {
    pub fn capture() -> Self {
        Self::from(Backtrace::capture())
    }
}

impl From<Backtrace> for OptionBacktracePrettyPrinter {
    fn from(value: Backtrace) -> Self {
        Self(Some(value))
    }
}

impl std::fmt::Display for OptionBacktracePrettyPrinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_ref() {
            Some(child) => write!(f, "{}", child),
            None => write!(f, "No backtrace"),
        }
    }
}
