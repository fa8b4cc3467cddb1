use sam_types::{ActionLabel, ComponentName};

/// Misconfiguration reported when an engine is built or a component mounted.
///
/// Failures inside a cycle never surface here; they land in the model's error
/// slot instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Synchronized engine requires a running tokio runtime")]
    NoRuntime,
    #[error("Duplicate component registered: {name}")]
    DuplicateComponent { name: ComponentName },
    #[error("Component name must not be empty")]
    EmptyComponentName,
    #[error("Component-local acceptors and reactors require a named component")]
    UnnamedComponent,
    #[error("Asynchronous actions are disabled on instance {instance}: {label}")]
    AsyncActionsDisabled {
        instance: String,
        label: ActionLabel,
    },
}
