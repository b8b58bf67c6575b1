//! Core-Domänentypen: IDs, Bounds, ViewObjects, ID-Sets, Registry, Kamera,
//! Schnittebenen-Helfer und Events.

pub mod bounds;
pub mod camera;
pub mod events;
pub mod freezable_set;
pub mod ids;
pub mod registry;
pub mod section_plane;
pub mod view_object;

pub use bounds::Aabb;
pub use camera::{Camera3D, CameraMatrices};
pub use events::{EventBus, Rgba, SubscriptionId, ViewerEvent};
pub use freezable_set::FreezableIdSet;
pub use ids::{IdOrdering, ObjectId, OVERRIDE_FLAG};
pub use registry::UniqueIdRegistry;
pub use section_plane::{
    cap_quad, dominant_axis, SectionAxis, SectionPlaneHelper, SectionPlaneWidget, SectionScale,
    DISABLED_PLANE,
};
pub use view_object::{decode_pick_color, encode_pick_color, ObjectIndex, PickId, ViewObject};
