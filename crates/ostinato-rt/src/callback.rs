//! Audio callback wrapper shared between the engine and IO backends.

use std::cell::UnsafeCell;
use std::sync::Arc;

/// Trait implemented by the engine's real-time renderer. `output` is
/// interleaved stereo: `output.len() == frames * 2`.
pub trait AudioCallback: Send {
    fn render(&mut self, output: &mut [f32], frames: usize);
}

struct CallbackCell {
    callback: UnsafeCell<Box<dyn AudioCallback>>,
}

// Safety: backends invoke `render` from the single thread that owns the
// stream; the handle is never rendered from two threads at once.
unsafe impl Send for CallbackCell {}
unsafe impl Sync for CallbackCell {}

/// Cloneable handle a backend stores and drives once per hardware block.
#[derive(Clone)]
pub struct CallbackHandle {
    inner: Arc<CallbackCell>,
}

impl CallbackHandle {
    pub fn new(callback: Box<dyn AudioCallback>) -> Self {
        Self {
            inner: Arc::new(CallbackCell {
                callback: UnsafeCell::new(callback),
            }),
        }
    }

    pub fn render(&self, output: &mut [f32], frames: usize) {
        // Safety: see CallbackCell; a single stream thread calls this.
        unsafe {
            let callback = &mut *self.inner.callback.get();
            callback.render(output, frames);
        }
    }
}
