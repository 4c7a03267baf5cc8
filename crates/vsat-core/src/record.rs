//! Result records and dispatch items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::{CoreError, TaskArgs, TaskError, TaskState, TaskUuid};

/// Durable state of one task invocation.
///
/// Persisted as one JSON document per invocation. Producer and worker hand
/// ownership of the record back and forth; only one of them should be
/// writing at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Unique invocation identifier.
    pub task_uuid: TaskUuid,

    /// Registered name of the task to execute.
    pub task_name: String,

    /// Positional arguments.
    pub args: Vec<Value>,

    /// Keyword arguments.
    pub kwargs: Map<String, Value>,

    /// Current lifecycle state.
    pub state: TaskState,

    /// Return value or failure payload; null until terminal.
    pub result: Value,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl ResultRecord {
    /// Create a new record in the CREATED state.
    pub fn new(task_name: impl Into<String>, args: TaskArgs) -> Self {
        let now = Utc::now();
        Self {
            task_uuid: TaskUuid::generate(),
            task_name: task_name.into(),
            args: args.args,
            kwargs: args.kwargs,
            state: TaskState::Created,
            result: Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    /// The stored arguments as a [`TaskArgs`].
    pub fn task_args(&self) -> TaskArgs {
        TaskArgs {
            args: self.args.clone(),
            kwargs: self.kwargs.clone(),
        }
    }

    /// Move to `state`, rejecting backward or post-terminal moves.
    pub fn transition(&mut self, state: TaskState) -> Result<(), CoreError> {
        self.state.validate_transition(&state)?;
        self.state = state;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a successful return value.
    pub fn finish(&mut self, value: Value) -> Result<(), CoreError> {
        self.transition(TaskState::Finished)?;
        self.result = value;
        Ok(())
    }

    /// Record a failure payload.
    pub fn fail(&mut self, payload: Value) -> Result<(), CoreError> {
        self.transition(TaskState::Error)?;
        self.result = payload;
        Ok(())
    }

    /// Check if the record is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Serializable description of a failed invocation.
///
/// Stored as the `result` of a record in the ERROR state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Failure kind (`failed`, `panicked`, `unknown_task`, ...).
    pub kind: String,

    /// Human-readable message.
    pub message: String,
}

impl TaskFailure {
    /// Create a new TaskFailure.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Convert to the JSON payload written into the record.
    pub fn to_payload(&self) -> Value {
        serde_json::json!({
            "kind": self.kind,
            "message": self.message,
        })
    }

    /// Read a failure back from a persisted payload.
    ///
    /// Payloads written by something other than a worker are kept verbatim
    /// as the message.
    pub fn from_payload(payload: &Value) -> Self {
        serde_json::from_value(payload.clone())
            .unwrap_or_else(|_| Self::new("error", payload.to_string()))
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<&TaskError> for TaskFailure {
    fn from(err: &TaskError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<&CoreError> for TaskFailure {
    fn from(err: &CoreError) -> Self {
        let kind = match err {
            CoreError::UnknownTask(_) => "unknown_task",
            CoreError::InvalidStateTransition { .. } => "invalid_state_transition",
            CoreError::InvalidInput(_) => "invalid_input",
        };
        Self::new(kind, err.to_string())
    }
}

/// Sentinel string telling a worker to leave its loop.
pub const STOP_SENTINEL: &str = "stop";

/// Item carried on a worker pool's dispatch channel.
///
/// On the wire a `Run` is `{"task_uuid": "..."}` and `Stop` is the literal
/// string `"stop"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchItem {
    /// Execute the record with this identifier.
    Run { task_uuid: TaskUuid },
    /// Stop the worker that receives it.
    Stop,
}

impl DispatchItem {
    /// Dispatch item referencing `record`.
    pub fn run(record: &ResultRecord) -> Self {
        Self::Run {
            task_uuid: record.task_uuid,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireItem {
    Reference { task_uuid: TaskUuid },
    Sentinel(String),
}

impl Serialize for DispatchItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match *self {
            Self::Run { task_uuid } => WireItem::Reference { task_uuid },
            Self::Stop => WireItem::Sentinel(STOP_SENTINEL.to_string()),
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DispatchItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match WireItem::deserialize(deserializer)? {
            WireItem::Reference { task_uuid } => Ok(Self::Run { task_uuid }),
            WireItem::Sentinel(s) if s == STOP_SENTINEL => Ok(Self::Stop),
            WireItem::Sentinel(s) => Err(serde::de::Error::custom(format!(
                "unexpected dispatch sentinel '{}'",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_record_is_created() {
        let record = ResultRecord::new("atask", TaskArgs::positional([1]).with_kwarg("k", "v"));
        assert_eq!(record.task_name, "atask");
        assert_eq!(record.state, TaskState::Created);
        assert_eq!(record.result, Value::Null);
        assert_eq!(record.task_args().kwarg::<String>("k").unwrap(), "v");
    }

    #[test]
    fn test_record_persisted_fields() {
        let record = ResultRecord::new("atask", TaskArgs::positional([1, 2]));
        let value = serde_json::to_value(&record).unwrap();
        let object = value.as_object().unwrap();
        for field in ["task_uuid", "task_name", "args", "kwargs", "state", "result"] {
            assert!(object.contains_key(field), "missing field {}", field);
        }
        assert_eq!(object["state"], json!("CREATED"));

        let back: ResultRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_finish_and_fail_are_terminal() {
        let mut record = ResultRecord::new("atask", TaskArgs::new());
        record.transition(TaskState::Running).unwrap();
        record.finish(json!(9)).unwrap();
        assert!(record.is_terminal());
        assert_eq!(record.result, json!(9));

        let err = record.fail(json!("late")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidStateTransition { .. }));
        assert_eq!(record.state, TaskState::Finished);
    }

    #[test]
    fn test_failure_payload_round_trip() {
        let failure = TaskFailure::from(&TaskError::Failed("division by zero".to_string()));
        let payload = failure.to_payload();
        assert_eq!(payload, json!({"kind": "failed", "message": "division by zero"}));
        assert_eq!(TaskFailure::from_payload(&payload), failure);

        let foreign = TaskFailure::from_payload(&json!(42));
        assert_eq!(foreign, TaskFailure::new("error", "42"));
    }

    #[test]
    fn test_dispatch_item_wire_format() {
        let task_uuid = TaskUuid::generate();
        let run = DispatchItem::Run { task_uuid };

        assert_eq!(
            serde_json::to_value(run).unwrap(),
            json!({ "task_uuid": task_uuid.to_string() })
        );
        assert_eq!(serde_json::to_value(DispatchItem::Stop).unwrap(), json!("stop"));

        let back: DispatchItem =
            serde_json::from_value(json!({ "task_uuid": task_uuid.to_string() })).unwrap();
        assert_eq!(back, run);
        let stop: DispatchItem = serde_json::from_value(json!("stop")).unwrap();
        assert_eq!(stop, DispatchItem::Stop);
        assert!(serde_json::from_value::<DispatchItem>(json!("halt")).is_err());
    }
}
