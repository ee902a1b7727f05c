use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for retrace
#[derive(Debug)]
pub enum Error {
    /// Configuration errors
    Config(String),

    /// Database errors (SQLx wrapped)
    Database(sqlx::Error),

    /// Missing or invalid credentials
    Unauthorized(String),

    /// Authenticated but not allowed
    Forbidden(String),

    /// Malformed input with structured issues
    Validation(Vec<Issue>),

    /// Unknown id
    NotFound(String),

    /// Uniqueness violation
    Conflict(String),

    /// DB, broker, or worker introspection unreachable
    Dependency(String),

    /// Serialization errors
    Serialization(serde_json::Error),

    /// IO errors
    Io(std::io::Error),

    /// Anything uncaught
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// A single validation issue (path, code, message)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub path: String,
    pub code: String,
    pub message: String,
}

impl Issue {
    pub fn new(
        path: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Database(e) => write!(f, "Database error: {}", e),
            Error::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            Error::Forbidden(msg) => write!(f, "{}", msg),
            Error::Validation(issues) => {
                write!(f, "Validation failed ({} issue(s))", issues.len())
            }
            Error::NotFound(msg) => write!(f, "{}", msg),
            Error::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Error::Dependency(msg) => write!(f, "Dependency unavailable: {}", msg),
            Error::Serialization(e) => write!(f, "Serialization error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(e) => Some(e),
            Error::Serialization(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

// Conversions from external error types
impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        // Unique-constraint violations surface as 409, not 500
        if let sqlx::Error::Database(ref db_err) = error {
            if db_err.is_unique_violation() {
                return Error::Conflict(db_err.message().to_string());
            }
        }
        Error::Database(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Config(error.to_string())
    }
}

impl From<uuid::Error> for Error {
    fn from(error: uuid::Error) -> Self {
        Error::Validation(vec![Issue::new(
            "id",
            "invalid_uuid",
            error.to_string(),
        )])
    }
}

// Common error constructors
impl Error {
    /// Create a new configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error from a single issue
    pub fn validation(
        path: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Validation(vec![Issue::new(path, code, message)])
    }

    /// Create a new not found error
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a new unauthorized error
    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        Error::Unauthorized(msg.into())
    }

    /// Create a new forbidden error
    pub fn forbidden<T: Into<String>>(msg: T) -> Self {
        Error::Forbidden(msg.into())
    }

    /// Create a new conflict error
    pub fn conflict<T: Into<String>>(msg: T) -> Self {
        Error::Conflict(msg.into())
    }

    /// Create a new dependency-unavailable error
    pub fn dependency<T: Into<String>>(msg: T) -> Self {
        Error::Dependency(msg.into())
    }

    /// Create a new internal error
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        Error::Internal(msg.into())
    }
}

impl Error {
    /// Get HTTP status code for error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::Validation(_) => 422,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::Dependency(_) => 503,
            Error::Config(_)
            | Error::Database(_)
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Internal(_) => 500,
        }
    }

    /// Error name used in the response envelope
    pub fn name(&self) -> &'static str {
        match self {
            Error::Config(_) => "ConfigError",
            Error::Database(_) => "DatabaseError",
            Error::Unauthorized(_) => "AuthError",
            Error::Forbidden(_) => "AuthError",
            Error::Validation(_) => "ValidationError",
            Error::NotFound(_) => "NotFound",
            Error::Conflict(_) => "Conflict",
            Error::Dependency(_) => "DependencyUnavailable",
            Error::Serialization(_) => "SerializationError",
            Error::Io(_) => "IoError",
            Error::Internal(_) => "InternalError",
        }
    }

    /// Structured issues, when present
    pub fn issues(&self) -> Option<&[Issue]> {
        match self {
            Error::Validation(issues) => Some(issues),
            _ => None,
        }
    }
}

/// Accumulator for field-level validation issues
#[derive(Debug, Default, Clone)]
pub struct IssueList {
    issues: Vec<Issue>,
}

impl IssueList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        path: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.issues.push(Issue::new(path, code, message));
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Return Ok(()) when empty, otherwise a Validation error
    pub fn into_result(self) -> Result<()> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self.issues))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::unauthorized("no token").status_code(), 401);
        assert_eq!(Error::forbidden("Admin access required").status_code(), 403);
        assert_eq!(Error::not_found("nope").status_code(), 404);
        assert_eq!(Error::conflict("dup").status_code(), 409);
        assert_eq!(
            Error::validation("name", "required", "name is required").status_code(),
            422
        );
        assert_eq!(Error::dependency("db down").status_code(), 503);
        assert_eq!(Error::internal("boom").status_code(), 500);
    }

    #[test]
    fn test_error_names() {
        assert_eq!(Error::unauthorized("x").name(), "AuthError");
        assert_eq!(Error::forbidden("x").name(), "AuthError");
        assert_eq!(
            Error::validation("a", "b", "c").name(),
            "ValidationError"
        );
        assert_eq!(Error::dependency("x").name(), "DependencyUnavailable");
    }

    #[test]
    fn test_issue_list() {
        let mut issues = IssueList::new();
        assert!(issues.clone().into_result().is_ok());

        issues.push("age", "invalid_type", "expected number");
        let err = issues.into_result().unwrap_err();
        let issues = err.issues().unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "age");
    }
}
