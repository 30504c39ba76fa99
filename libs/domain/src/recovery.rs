//! The recovery record: an append-only audit trail of recovery
//! decisions made for a failed step attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

use crate::enums::{ErrorType, RecoveryStrategy};
use crate::ids::TaskId;

/// One recovery decision recorded against a step failure.
#[typeshare]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRecord {
    pub task_id: TaskId,
    pub step_name: String,
    pub error_type: ErrorType,
    pub error_message: String,
    pub strategy: RecoveryStrategy,
    pub attempt_number: u32,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_record_roundtrip() {
        let record = RecoveryRecord {
            task_id: TaskId::new(),
            step_name: "code_generation".to_string(),
            error_type: ErrorType::LlmError,
            error_message: "timed out".to_string(),
            strategy: RecoveryStrategy::RetryWithBackoff,
            attempt_number: 1,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let parsed: RecoveryRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.attempt_number, 1);
        assert_eq!(parsed.strategy, RecoveryStrategy::RetryWithBackoff);
    }
}
