use std::path::PathBuf;

/// Failure kinds raised while cleaning up subscriptions.
///
/// Callers decide per kind whether to skip the current item or abort the run.
#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error("authentication failed for site '{site}': {reason}")]
    Authentication { site: String, reason: String },

    #[error("lookup of {resource} failed: {reason}")]
    Lookup { resource: String, reason: String },

    #[error("failed to delete subscription {id}: {reason}")]
    Delete { id: String, reason: String },

    #[error("failed to notify {recipient}: {reason}")]
    Notification { recipient: String, reason: String },

    #[error("failed to write report {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("log sweep failed at {path}: {source}")]
    Sweep {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CleanupError {
    pub fn authentication(site: &str, reason: impl ToString) -> Self {
        Self::Authentication {
            site: site.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn lookup(resource: impl Into<String>, reason: impl ToString) -> Self {
        Self::Lookup {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }

    pub fn delete(id: &str, reason: impl ToString) -> Self {
        Self::Delete {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn notification(recipient: &str, reason: impl ToString) -> Self {
        Self::Notification {
            recipient: recipient.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = CleanupError> = std::result::Result<T, E>;
