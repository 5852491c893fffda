//! Ostinato Engine
//! ===============
//! A realtime audio engine that renders a user-defined signal graph driven
//! by a beat-timed event schedule. A control process submits a graph
//! description and a timeline of musical events; the engine runs the graph
//! block-by-block on a dedicated audio callback thread to produce stereo
//! PCM, either to a live output stream or to an offline buffer.

pub mod adapter;
pub mod backend;
pub mod engine;
pub mod error;
pub mod graph;
pub mod node;
pub mod nodes;
pub mod pool;
pub mod render;
pub mod schedule;

pub use adapter::PluginAdapterNode;
pub use backend::{AudioBackend, StreamConfig};
pub use engine::{AudioEngine, EngineConfig};
pub use error::{EngineError, GraphError, ScheduleError};
pub use graph::{ConnectionDesc, Graph, GraphDesc, GraphEvent, NodeSpec};
pub use node::{PortBuffer, PortDecl, PortKind};
pub use nodes::{Node, NodeKind};
pub use pool::{BufferPool, SILENT_BUFFER};
pub use render::encode_wav;
pub use schedule::{Dispatcher, EventBatchDesc, EventDesc, EventKind, SchedEvent, Schedule};

#[cfg(feature = "cpal")]
pub use backend::CpalBackend;
