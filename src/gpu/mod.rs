//! GPU compute backend (feature `gpu`)
//!
//! Runs the layout kernel as a WGSL compute shader through wgpu. Node state
//! is uploaded every tick, one invocation per node writes its own output
//! slot, and the result is read back before the tick returns.

mod backend;
mod shaders;

pub use backend::GpuBackend;
pub use shaders::layout_shader;
