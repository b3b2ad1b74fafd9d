// Example JSON output:
//
// Success case:
// {
//   "command": "version",
//   "status": "success",
//   "data": { "version": 4, "dirty": false },
//   "error": null,
//   "timestamp": "2025-01-10T15:52:12Z"
// }
//
// Error case:
// {
//   "command": "up",
//   "status": "error",
//   "data": null,
//   "error": {
//     "type": "dirty_database",
//     "message": "MigrateError: database is dirty at version 3: ..."
//   },
//   "timestamp": "2025-01-10T15:52:12Z"
// }
//
// Notes:
// - `status` is either `"success"` or `"error"`
// - `data` is optional and command-specific
// - `error` is a structured object with a `type` and human-readable `message`
// - `timestamp` is an RFC 3339 UTC timestamp indicating when the command completed
use crate::error::{MigrateError, MigrateErrorKind};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorJson {
    DirtyDatabase { message: String },
    Locked { message: String },
    MissingDirection { message: String },
    Version { message: String },
    Usage { message: String },
    Source { message: String },
    Database { message: String },
}

impl From<&MigrateError> for ErrorJson {
    fn from(error: &MigrateError) -> Self {
        let message = format!("{error}");

        match &error.kind {
            // NoChange is reported as success before this conversion runs;
            // mapping it here keeps the conversion total.
            MigrateErrorKind::NoChange => Self::Usage { message },
            MigrateErrorKind::DirtyDatabase { .. } => Self::DirtyDatabase { message },
            MigrateErrorKind::Locked | MigrateErrorKind::NotLocked => Self::Locked { message },
            MigrateErrorKind::MissingDirection { .. } => Self::MissingDirection { message },
            MigrateErrorKind::InvalidVersion(_) => Self::Version { message },
            MigrateErrorKind::Usage(_) => Self::Usage { message },
            MigrateErrorKind::Source(_) => Self::Source { message },
            MigrateErrorKind::Database(_) => Self::Database { message },
        }
    }
}

#[derive(PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Success,
    Error,
}

#[derive(Serialize)]
pub struct CommandOutput {
    pub command: String,
    pub status: CommandStatus,
    pub data: Option<Value>,
    pub error: Option<ErrorJson>,
    pub timestamp: DateTime<Utc>,
}

impl CommandOutput {
    pub fn from_result(
        command: impl Into<String>,
        result: &Result<Option<Value>, MigrateError>,
    ) -> Self {
        let timestamp = Utc::now();

        match result {
            Ok(data) => Self {
                command: command.into(),
                status: CommandStatus::Success,
                data: data.clone(),
                error: None,
                timestamp,
            },
            Err(e) => Self {
                command: command.into(),
                status: CommandStatus::Error,
                data: None,
                error: Some(e.into()),
                timestamp,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wraps_errors_with_a_type_tag() {
        let err = MigrateError {
            kind: MigrateErrorKind::DirtyDatabase { version: 3 },
        };

        let output = CommandOutput::from_result("up", &Err(err));
        let s = serde_json::to_string(&output).unwrap();
        let v: Value = serde_json::from_str(&s).unwrap();

        assert_eq!(v["status"], "error");
        assert_eq!(v["command"], "up");
        assert_eq!(v["error"]["type"], "dirty_database");
        assert!(v["error"]["message"].as_str().unwrap().contains("version 3"));
    }

    #[test]
    fn wraps_success_with_optional_data() {
        let output = CommandOutput::from_result(
            "version",
            &Ok(Some(json!({ "version": 4, "dirty": false }))),
        );
        let v: Value = serde_json::to_value(&output).unwrap();

        assert_eq!(v["status"], "success");
        assert_eq!(v["data"]["version"], 4);
        assert!(v["error"].is_null());
    }
}
