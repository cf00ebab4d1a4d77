use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One admin change-log row written per record saved by the safe updater
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub table_name: String,
    pub object_id: i64,
    pub user_name: String,
    pub change_message: String,
    pub action_time: DateTime<Utc>,
}

impl ChangeLogEntry {
    pub fn new(
        table_name: impl Into<String>,
        object_id: i64,
        user_name: impl Into<String>,
        change_message: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            object_id,
            user_name: user_name.into(),
            change_message: change_message.into(),
            action_time: Utc::now(),
        }
    }
}
