//! Real-time safe building blocks shared between the engine core and the
//! audio IO backends: the transport clock, the command queue, and the
//! callback handle a backend drives once per hardware block.

pub mod callback;
pub mod queue;
pub mod transport;

pub use callback::{AudioCallback, CallbackHandle};
pub use queue::CommandQueue;
pub use transport::{BeatClock, GraphEpoch, LoopRegion};
