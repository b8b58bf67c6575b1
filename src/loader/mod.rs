//! Laden einer Revision vom Geometrie-Dienst in den Viewer.

pub mod executor;
pub mod orchestrator;
pub mod service;

pub use executor::{Executor, LoadJob};
pub use orchestrator::{LayerQuery, LayerSource, LoadOrchestrator, LoadSummary, LoadedBatch};
pub use service::{
    DensityAtThreshold, GeometryService, RevisionInfo, ServiceBounds, ServiceRequest,
    ServiceResponse, ServiceVector, SERVICE_INTERFACE,
};
