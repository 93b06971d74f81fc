//! Feature extraction from raw errors.

use serde::{Deserialize, Serialize};

/// Category of the operation that produced an error, guessed from the
/// calling operation's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationCategory {
    /// Read-style operation (get, fetch, list, query).
    Read,
    /// Write-style operation (create, insert, save).
    Write,
    /// Update-style operation (update, patch, modify).
    Update,
    /// Delete-style operation (delete, remove, drop).
    Delete,
    /// Anything else.
    Other,
}

impl OperationCategory {
    /// Guess the category from an operation name.
    pub fn from_operation(name: &str) -> Self {
        let name = name.to_lowercase();
        if ["get", "fetch", "list", "query", "read", "find"]
            .iter()
            .any(|p| name.contains(p))
        {
            OperationCategory::Read
        } else if ["create", "insert", "save", "write", "put", "add"]
            .iter()
            .any(|p| name.contains(p))
        {
            OperationCategory::Write
        } else if ["update", "patch", "modify", "set", "edit"]
            .iter()
            .any(|p| name.contains(p))
        {
            OperationCategory::Update
        } else if ["delete", "remove", "drop", "clear", "purge"]
            .iter()
            .any(|p| name.contains(p))
        {
            OperationCategory::Delete
        } else {
            OperationCategory::Other
        }
    }
}

impl std::fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationCategory::Read => "read",
            OperationCategory::Write => "write",
            OperationCategory::Update => "update",
            OperationCategory::Delete => "delete",
            OperationCategory::Other => "other",
        };
        write!(f, "{}", name)
    }
}

/// Boolean feature flags extracted from an error's message and type.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorFeatures {
    /// Network or connectivity error.
    pub network: bool,
    /// Timeout or deadline error.
    pub timeout: bool,
    /// Database error.
    pub database: bool,
    /// Filesystem error.
    pub filesystem: bool,
    /// Authentication or authorization error.
    pub auth: bool,
    /// Resource exhaustion (memory, disk, quota).
    pub resource: bool,
    /// Rate limiting.
    pub rate_limit: bool,
    /// Infrastructure or platform failure.
    pub infrastructure: bool,
    /// Validation failure.
    pub validation: bool,
    /// Configuration failure.
    pub configuration: bool,
}

impl ErrorFeatures {
    /// Extract feature flags from an error's type and message.
    pub fn extract(error_type: &str, message: &str) -> Self {
        let haystack = format!("{} {}", error_type, message).to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| haystack.contains(n));

        Self {
            network: has(&[
                "network",
                "connection",
                "econnrefused",
                "econnreset",
                "socket",
                "dns",
                "unreachable",
            ]),
            timeout: has(&["timeout", "timed out", "deadline", "etimedout"]),
            database: has(&[
                "database", "sql", "postgres", "sqlite", "deadlock", "constraint", "transaction",
            ]),
            filesystem: has(&[
                "enoent",
                "file not found",
                "no such file",
                "permission denied",
                "eacces",
                "filesystem",
                "disk",
            ]),
            auth: has(&[
                "unauthorized",
                "forbidden",
                "auth",
                "token",
                "credential",
                "permission",
            ]),
            resource: has(&[
                "out of memory",
                "oom",
                "quota",
                "exhausted",
                "too many open",
                "enomem",
            ]),
            rate_limit: has(&["rate limit", "ratelimit", "throttl", "too many requests"]),
            infrastructure: has(&[
                "infrastructure",
                "kubernetes",
                "container",
                "node down",
                "cluster",
                "host down",
            ]),
            validation: has(&["validation", "invalid", "malformed", "schema", "parse error"]),
            configuration: has(&["config", "configuration", "missing env", "misconfigured"]),
        }
    }

    /// Guess an HTTP status code implied by the features, if any.
    pub fn http_status_guess(&self, message: &str) -> Option<u16> {
        // An explicit status in the message wins
        for status in [400u16, 401, 403, 404, 408, 409, 429, 500, 502, 503, 504] {
            if message.contains(&status.to_string()) {
                return Some(status);
            }
        }
        if self.rate_limit {
            Some(429)
        } else if self.auth {
            Some(401)
        } else if self.validation {
            Some(400)
        } else if self.timeout {
            Some(504)
        } else if self.network {
            Some(502)
        } else if self.infrastructure || self.database {
            Some(500)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_category_guesses() {
        assert_eq!(
            OperationCategory::from_operation("getUserProfile"),
            OperationCategory::Read
        );
        assert_eq!(
            OperationCategory::from_operation("createSwarm"),
            OperationCategory::Write
        );
        assert_eq!(
            OperationCategory::from_operation("updateLedger"),
            OperationCategory::Update
        );
        assert_eq!(
            OperationCategory::from_operation("removeCheckpoint"),
            OperationCategory::Delete
        );
        assert_eq!(
            OperationCategory::from_operation("navigate"),
            OperationCategory::Other
        );
    }

    #[test]
    fn test_feature_extraction() {
        let features = ErrorFeatures::extract("ConnectionError", "connection refused by host");
        assert!(features.network);
        assert!(!features.database);

        let features = ErrorFeatures::extract("QueryError", "SQL deadlock detected");
        assert!(features.database);

        let features = ErrorFeatures::extract("Error", "request timed out after 30s");
        assert!(features.timeout);
    }

    #[test]
    fn test_http_status_guess() {
        let features = ErrorFeatures::extract("Error", "rate limit exceeded");
        assert_eq!(features.http_status_guess("rate limit exceeded"), Some(429));

        let features = ErrorFeatures::extract("Error", "upstream returned 503");
        assert_eq!(features.http_status_guess("upstream returned 503"), Some(503));

        let features = ErrorFeatures::extract("Error", "something odd");
        assert_eq!(features.http_status_guess("something odd"), None);
    }
}
