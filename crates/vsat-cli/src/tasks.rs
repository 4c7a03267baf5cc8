//! Demo tasks shipped with the CLI.
//!
//! Producer and worker must register the same set, so both go through
//! [`register_all`].

use std::sync::Arc;

use vsat_worker::{task_name, Context, Task, TaskArgs, TaskDefinition, TaskError, TaskOptions};

pub fn multiply(args: &TaskArgs) -> Result<i64, TaskError> {
    let a: i64 = args.arg(0)?;
    let b: i64 = args.arg(1)?;
    a.checked_mul(b)
        .ok_or_else(|| TaskError::Failed(format!("{a} * {b} overflows")))
}

pub fn square(args: &TaskArgs) -> Result<i64, TaskError> {
    let y: i64 = args.arg(0)?;
    y.checked_mul(y)
        .ok_or_else(|| TaskError::Failed(format!("{y} squared overflows")))
}

pub fn fail(args: &TaskArgs) -> Result<(), TaskError> {
    let message: String = args.arg(0)?;
    Err(TaskError::Failed(message))
}

/// The demo tasks, bound to the context they were registered with.
#[derive(Debug, Clone)]
pub struct DemoTasks {
    pub multiply: Task,
    pub square: Task,
    pub fail: Task,
}

/// Register every demo task with `ctx`.
pub fn register_all(ctx: &Arc<Context>) -> DemoTasks {
    DemoTasks {
        multiply: ctx.register(
            TaskDefinition::from_fn(task_name!(multiply), multiply)
                .with_options(TaskOptions::default().with_description("Multiply two integers")),
        ),
        square: ctx.register(
            TaskDefinition::from_fn(task_name!(square), square)
                .with_options(TaskOptions::default().with_description("Square one integer")),
        ),
        fail: ctx.register(
            TaskDefinition::from_fn(task_name!(fail), fail).with_options(
                TaskOptions::default()
                    .with_description("Always fails with the given message")
                    .with_label("kind", "demo"),
            ),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use vsat_worker::{Config, StoreConfig};

    #[test]
    fn test_multiply() {
        assert_eq!(multiply(&TaskArgs::positional([3, 3])).unwrap(), 9);
        assert!(matches!(
            multiply(&TaskArgs::positional([i64::MAX, 2])),
            Err(TaskError::Failed(_))
        ));
        assert!(matches!(
            multiply(&TaskArgs::positional([3])),
            Err(TaskError::MissingArgument(_))
        ));
    }

    #[test]
    fn test_fail_uses_message() {
        match fail(&TaskArgs::positional(["boom"])) {
            Err(TaskError::Failed(message)) => assert_eq!(message, "boom"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_register_all() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            store: StoreConfig::new(dir.path()),
            ..Config::default()
        };
        let ctx = Context::from_config(&config).await.unwrap();
        let demo = register_all(&ctx);

        assert_eq!(
            ctx.registry().names(),
            vec![
                "vsat::tasks::fail".to_string(),
                "vsat::tasks::multiply".to_string(),
                "vsat::tasks::square".to_string(),
            ]
        );
        assert_eq!(task_name!(square), "vsat::tasks::square");

        assert_eq!(demo.multiply.name(), "vsat::tasks::multiply");
        assert_eq!(demo.fail.definition().options().labels["kind"], "demo");

        let task = ctx.task(task_name!(square)).unwrap();
        assert_eq!(task.apply(&TaskArgs::positional([7])).unwrap(), json!(49));
        assert_eq!(
            demo.square.definition().options().description.as_deref(),
            Some("Square one integer")
        );
    }
}
