//! GPU-Seite des Viewers: Kontext-Abstraktion, Buffer-Vertrag, Layer-Vertrag
//! und die wgpu-Implementierung.

pub mod buffer;
pub mod gpu;
pub mod layer;
mod memory_buffer;
pub mod wgpu_context;

pub use buffer::{
    BufferChannel, BufferEntry, BufferId, BufferStore, ColorWrite, EditBounds, EditScope,
    GeometryBuffer, IdRange, InstanceRecord, TransparencyClass, COLOR_EDIT_CHANNELS,
};
pub use gpu::{
    BlendMode, ClearRequest, CullFace, GpuContext, RasterState, RenderTarget, StencilCompare,
    StencilOp, StencilState,
};
pub use layer::{
    DirtyLevel, FrameContext, LayerBuffers, LayerId, RenderLayer, RenderSelector, SelectorMode,
    SelectorPass,
};
pub use memory_buffer::MemoryBuffer;
pub use wgpu_context::WgpuContext;
