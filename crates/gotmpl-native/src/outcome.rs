use std::borrow::Cow;
use std::fmt;

/// Status codes of the v1 surface.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GotmplStatus {
    Ok = 0,
    JsonError = 1,
    TemplateParseError = 2,
    TemplateExecuteError = 3,
    InvalidInput = 4,
    Internal = 5,
}

/// Why a render failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    JsonError,
    TemplateParseError,
    TemplateExecuteError,
    InvalidInput,
    Internal,
}

impl ErrorKind {
    /// Prefix used on the legacy single-string surface.
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::JsonError => "JSON_ERROR",
            ErrorKind::TemplateParseError => "TEMPLATE_PARSE_ERROR",
            ErrorKind::TemplateExecuteError => "TEMPLATE_EXECUTE_ERROR",
            ErrorKind::InvalidInput => "INPUT_ERROR",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    pub fn status(self) -> GotmplStatus {
        match self {
            ErrorKind::JsonError => GotmplStatus::JsonError,
            ErrorKind::TemplateParseError => GotmplStatus::TemplateParseError,
            ErrorKind::TemplateExecuteError => GotmplStatus::TemplateExecuteError,
            ErrorKind::InvalidInput => GotmplStatus::InvalidInput,
            ErrorKind::Internal => GotmplStatus::Internal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A classified render failure. Displays as `LABEL: message`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RenderFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl RenderFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

pub type RenderOutcome = Result<String, RenderFailure>;

/// The single string the legacy surface returns: output verbatim, or the
/// prefixed failure.
pub fn encode_legacy(outcome: &RenderOutcome) -> Cow<'_, str> {
    match outcome {
        Ok(text) => Cow::Borrowed(text),
        Err(failure) => Cow::Owned(failure.to_string()),
    }
}

/// Status plus unprefixed payload for the v1 surface.
pub fn encode_v1(outcome: &RenderOutcome) -> (GotmplStatus, &str) {
    match outcome {
        Ok(text) => (GotmplStatus::Ok, text),
        Err(failure) => (failure.kind.status(), &failure.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_carry_their_label() {
        let outcome: RenderOutcome = Err(RenderFailure::new(ErrorKind::JsonError, "bad"));
        assert_eq!(encode_legacy(&outcome), "JSON_ERROR: bad");
        assert_eq!(encode_v1(&outcome), (GotmplStatus::JsonError, "bad"));
    }

    #[test]
    fn success_is_unprefixed() {
        let outcome: RenderOutcome = Ok("JSON_ERROR: looks like one".to_string());
        assert_eq!(encode_legacy(&outcome), "JSON_ERROR: looks like one");
        assert_eq!(encode_v1(&outcome).0, GotmplStatus::Ok);
    }
}
