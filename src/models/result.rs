//! Connection outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ProviderKind;

/// Summary of one successful sequencer run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionResult {
    pub run_id: Uuid,
    pub provider: ProviderKind,
    /// Repositories the backend accepted
    pub repository_count: usize,
    /// Repositories returned by the provider listing
    pub listed_count: usize,
    /// Connect calls that failed and were skipped
    pub failed_count: usize,
    pub completed_at: DateTime<Utc>,
}

impl ConnectionResult {
    /// Confirmation shown to the user, e.g. "Connected 3 GitHub repositories".
    pub fn summary(&self) -> String {
        let noun = if self.repository_count == 1 {
            "repository"
        } else {
            "repositories"
        };
        format!(
            "Connected {} {} {}",
            self.repository_count,
            self.provider.display_name(),
            noun
        )
    }
}

/// User-visible outcome of a connection attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Notice {
    Success {
        message: String,
        repository_count: usize,
    },
    Failure {
        message: String,
    },
}

impl Notice {
    pub fn message(&self) -> &str {
        match self {
            Notice::Success { message, .. } | Notice::Failure { message } => message,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Notice::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(count: usize) -> ConnectionResult {
        ConnectionResult {
            run_id: Uuid::new_v4(),
            provider: ProviderKind::GitHub,
            repository_count: count,
            listed_count: count,
            failed_count: 0,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn summary_pluralizes() {
        assert_eq!(result(3).summary(), "Connected 3 GitHub repositories");
        assert_eq!(result(1).summary(), "Connected 1 GitHub repository");
        assert_eq!(result(0).summary(), "Connected 0 GitHub repositories");
    }

    #[test]
    fn notice_serializes_with_status_tag() {
        let notice = Notice::Failure {
            message: "denied".to_string(),
        };
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["message"], "denied");
    }
}
