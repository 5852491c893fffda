use thiserror::Error;

/// Errors surfaced while parsing, building or activating a signal graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to create node '{id}': {reason}")]
    NodeBuild { id: String, reason: String },

    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),

    #[error("multiple connections into input port {node}/{port}")]
    DuplicateInput { node: String, port: String },
}

/// Errors surfaced while parsing an event batch.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("schedule JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown event type: {0}")]
    UnknownEventType(String),
}

/// Engine-level errors returned to the control process.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("no active graph")]
    NoGraph,

    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("render error: {0}")]
    Render(String),
}
