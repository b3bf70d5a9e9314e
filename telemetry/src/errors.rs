//! Catalogue of user-facing service errors.
//!
//! Each entry has a stable id and a documentation page under
//! `ERROR_DOCS_BASE_URL`. Entries are constants; `wrap` attaches the
//! underlying cause to a fresh copy.

use std::borrow::Cow;
use std::error::Error;
use std::fmt;

use serde::{Serialize, Serializer};

pub const ERROR_DOCS_BASE_URL: &str = "https://ledgerlord.proper.ai/errors/";

pub const FAILED_TO_LOGIN: ServiceError = ServiceError::from_static("0001", "Failed to login");
pub const ACCOUNT_NOT_FOUND: ServiceError =
    ServiceError::from_static("0002", "Account not found");
pub const SECOND_FACTOR_AUTH: ServiceError =
    ServiceError::from_static("0003", "Error during second factor authentication");
pub const LAUNCHING_BOT: ServiceError =
    ServiceError::from_static("0004", "Error while launching bot");

/// An identified error, optionally wrapping its cause.
#[derive(Debug)]
pub struct ServiceError {
    id: Cow<'static, str>,
    message: Cow<'static, str>,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ServiceError {
    pub fn new(id: impl Into<Cow<'static, str>>, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            source: None,
        }
    }

    pub const fn from_static(id: &'static str, message: &'static str) -> Self {
        Self {
            id: Cow::Borrowed(id),
            message: Cow::Borrowed(message),
            source: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Documentation URL for this error id.
    pub fn description(&self) -> String {
        format!("{ERROR_DOCS_BASE_URL}{}", self.id)
    }

    pub fn wrap(mut self, cause: impl Into<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        self.source = Some(cause.into());
        self
    }

    /// Same id as `other`, regardless of wrapped cause.
    pub fn is(&self, other: &ServiceError) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} desc:{}", self.id, self.message, self.description())?;
        if let Some(source) = &self.source {
            write!(f, " w:{source}")?;
        }
        Ok(())
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn Error + 'static))
    }
}

#[derive(Serialize)]
struct WireError<'a> {
    id: &'a str,
    error: &'a str,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    info: Option<String>,
}

impl Serialize for ServiceError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireError {
            id: &self.id,
            error: &self.message,
            description: self.description(),
            info: self.source.as_ref().map(|source| source.to_string()),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_prints_its_wrapped_error() {
        let err = LAUNCHING_BOT.wrap("foo");
        assert_eq!(
            err.to_string(),
            "0004: Error while launching bot desc:https://ledgerlord.proper.ai/errors/0004 w:foo"
        );
        assert_eq!(err.source().unwrap().to_string(), "foo");
    }

    #[test]
    fn unwrapped_error_has_no_suffix() {
        assert_eq!(
            ACCOUNT_NOT_FOUND.to_string(),
            "0002: Account not found desc:https://ledgerlord.proper.ai/errors/0002"
        );
        assert!(ACCOUNT_NOT_FOUND.source().is_none());
    }

    #[test]
    fn constants_are_independent_copies() {
        let wrapped = FAILED_TO_LOGIN.wrap("bad password");
        assert!(wrapped.is(&FAILED_TO_LOGIN));
        assert!(FAILED_TO_LOGIN.source().is_none());
        assert!(!wrapped.is(&SECOND_FACTOR_AUTH));
    }

    #[test]
    fn serializes_with_wire_keys() {
        let json = serde_json::to_value(SECOND_FACTOR_AUTH.wrap("timeout")).unwrap();
        assert_eq!(json["id"], "0003");
        assert_eq!(json["error"], "Error during second factor authentication");
        assert_eq!(json["description"], "https://ledgerlord.proper.ai/errors/0003");
        assert_eq!(json["info"], "timeout");

        let json = serde_json::to_value(ServiceError::new("0100", "Custom")).unwrap();
        assert!(json.get("info").is_none());
    }
}
