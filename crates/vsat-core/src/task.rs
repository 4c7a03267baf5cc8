//! Task definitions and their arguments.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure raised by a task body.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    /// A positional or keyword argument was not supplied.
    #[error("Missing argument: {0}")]
    MissingArgument(String),

    /// An argument could not be converted to the expected type.
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    /// The body reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The body returned a value that has no JSON representation.
    #[error("Result is not serializable: {0}")]
    Unserializable(String),

    /// The body panicked.
    #[error("Task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Short machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingArgument(_) => "missing_argument",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::Failed(_) => "failed",
            Self::Unserializable(_) => "unserializable",
            Self::Panicked(_) => "panicked",
        }
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self::Failed(message.to_owned())
    }
}

/// Positional and keyword arguments of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskArgs {
    /// Ordered positional arguments.
    pub args: Vec<Value>,

    /// Keyword arguments.
    pub kwargs: Map<String, Value>,
}

impl TaskArgs {
    /// Create an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an argument set from positional arguments only.
    pub fn positional<I, V>(args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            kwargs: Map::new(),
        }
    }

    /// Builder method to set a keyword argument.
    pub fn with_kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Get positional argument `index` converted to `T`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, TaskError> {
        let value = self
            .args
            .get(index)
            .ok_or_else(|| TaskError::MissingArgument(format!("#{}", index)))?;
        convert(&format!("#{}", index), value)
    }

    /// Get keyword argument `name` converted to `T`.
    pub fn kwarg<T: DeserializeOwned>(&self, name: &str) -> Result<T, TaskError> {
        let value = self
            .kwargs
            .get(name)
            .ok_or_else(|| TaskError::MissingArgument(name.to_string()))?;
        convert(name, value)
    }

    /// Get keyword argument `name`, falling back to `default` when absent.
    pub fn kwarg_or<T: DeserializeOwned>(&self, name: &str, default: T) -> Result<T, TaskError> {
        match self.kwargs.get(name) {
            Some(value) => convert(name, value),
            None => Ok(default),
        }
    }
}

fn convert<T: DeserializeOwned>(name: &str, value: &Value) -> Result<T, TaskError> {
    serde_json::from_value(value.clone()).map_err(|e| TaskError::InvalidArgument {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Free-form options attached at registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskOptions {
    /// Human-readable description.
    pub description: Option<String>,

    /// Task labels/metadata.
    pub labels: HashMap<String, String>,
}

impl TaskOptions {
    /// Builder method to set description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Builder method to add a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Type-erased task body.
pub type TaskBody = Arc<dyn Fn(&TaskArgs) -> Result<Value, TaskError> + Send + Sync>;

/// A named, invocable unit of work.
///
/// Immutable once registered; shared as `Arc<TaskDefinition>`.
#[derive(Clone)]
pub struct TaskDefinition {
    name: String,
    body: TaskBody,
    options: TaskOptions,
}

impl TaskDefinition {
    /// Create a definition from a body that already produces JSON.
    pub fn new(name: impl Into<String>, body: TaskBody) -> Self {
        Self {
            name: name.into(),
            body,
            options: TaskOptions::default(),
        }
    }

    /// Create a definition from any function returning a serializable value.
    ///
    /// The return value is converted to JSON after every call. A value with no
    /// JSON form (for example a map with non-string keys) becomes
    /// [`TaskError::Unserializable`].
    pub fn from_fn<F, R, E>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&TaskArgs) -> Result<R, E> + Send + Sync + 'static,
        R: Serialize,
        E: Into<TaskError>,
    {
        let body: TaskBody = Arc::new(move |args: &TaskArgs| {
            let value = func(args).map_err(Into::into)?;
            serde_json::to_value(value).map_err(|e| TaskError::Unserializable(e.to_string()))
        });
        Self::new(name, body)
    }

    /// Builder method to attach options.
    pub fn with_options(mut self, options: TaskOptions) -> Self {
        self.options = options;
        self
    }

    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registration options.
    pub fn options(&self) -> &TaskOptions {
        &self.options
    }

    /// Run the body on the current thread.
    pub fn call(&self, args: &TaskArgs) -> Result<Value, TaskError> {
        (self.body)(args)
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Derive the registry name of a function: `<module path>::<function>`.
///
/// Two different functions deriving the same name collide silently; the
/// first one registered wins.
#[macro_export]
macro_rules! task_name {
    ($func:ident) => {
        concat!(module_path!(), "::", stringify!($func))
    };
}

/// Register a function under its derived [`task_name!`].
///
/// Evaluates to the `Arc<TaskDefinition>` held by the registry.
#[macro_export]
macro_rules! register_task {
    ($registry:expr, $func:ident) => {
        $registry.register($crate::TaskDefinition::from_fn(
            $crate::task_name!($func),
            $func,
        ))
    };
    ($registry:expr, $func:ident, $options:expr) => {
        $registry.register(
            $crate::TaskDefinition::from_fn($crate::task_name!($func), $func)
                .with_options($options),
        )
    };
}
