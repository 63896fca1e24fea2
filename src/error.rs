use std::path::Path;

/// Errors that abort polling a repository (or the whole run).
///
/// Every variant is fatal: there is no local recovery or retry. The variants
/// mirror the pipeline stage that failed so the log line says where the run
/// stopped.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// Missing or malformed environment configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential or region resolution failed while building the ECR client
    #[error("Failed to resolve AWS configuration: {0}")]
    AuthConfig(String),

    /// A describe-images page could not be fetched
    #[error("Failed to list images in repository '{repository}': {message}")]
    List { repository: String, message: String },

    /// Reading, parsing, serializing or writing the output document failed
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PollError {
    pub fn io(context: impl Into<String>, source: impl Into<std::io::Error>) -> Self {
        Self::Io {
            context: context.into(),
            source: source.into(),
        }
    }

    pub(crate) fn io_at(action: &str, path: &Path, source: impl Into<std::io::Error>) -> Self {
        Self::io(format!("Failed to {} {}", action, path.display()), source)
    }
}

/// Extract a clean error message from an AWS SDK error's Debug output
///
/// The AWS SDK errors have verbose Debug output, but we can extract just the
/// meaningful message by parsing for the `message: Some("...")` pattern.
pub fn format_sdk_error<E: std::fmt::Debug>(err: &E) -> String {
    let debug_str = format!("{:?}", err);

    // Pattern: message: Some("actual error message")
    if let Some(start) = debug_str.find("message: Some(\"") {
        let start = start + 15;
        if let Some(end) = debug_str[start..].find("\")") {
            return debug_str[start..start + end].to_string();
        }
    }

    // JSON response body: "Message":"..."
    if let Some(start) = debug_str.find("\"Message\":\"") {
        let start = start + 11;
        if let Some(end) = debug_str[start..].find('"') {
            return debug_str[start..start + end].to_string();
        }
    }

    if debug_str.len() > 200 {
        let cut = (0..=200)
            .rev()
            .find(|i| debug_str.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}...", &debug_str[..cut])
    } else {
        debug_str
    }
}
