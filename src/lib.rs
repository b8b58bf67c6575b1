//! BIM Tile Viewer Library.
//! Render- und Objektzustands-Engine für gekachelte BIM-Modelle mit
//! LOD-Streaming, als Library exportiert für Tests und Wiederverwendung.

pub mod core;
pub mod error;
pub mod loader;
pub mod render;
pub mod shared;
pub mod viewer;

pub use core::{
    Aabb, Camera3D, FreezableIdSet, IdOrdering, ObjectId, Rgba, SectionAxis, SectionPlaneHelper,
    SectionPlaneWidget, UniqueIdRegistry, ViewObject, ViewerEvent,
};
pub use error::ViewerError;
pub use loader::{GeometryService, LayerSource, LoadOrchestrator, ServiceRequest};
pub use render::{DirtyLevel, GeometryBuffer, GpuContext, RenderLayer, WgpuContext};
pub use shared::{LoaderOptions, ViewerOptions};
pub use viewer::{FpsReport, FrameOutcome, PickRequest, PickResult, Viewer, ViewerShortcut};
