//! Fehlertypen des Viewers.

use crate::core::ObjectId;
use crate::render::BufferId;

/// Fehler, die von öffentlichen Viewer-Operationen gemeldet werden.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    /// Es konnte kein GPU-Kontext erstellt werden (fatal beim Konstruieren).
    #[error("GPU-Kontext nicht verfügbar: {0}")]
    GpuUnavailable(String),

    /// Pick ohne Canvas-Koordinaten aufgerufen (Vertragsverletzung des Aufrufers).
    #[error("Parameter erwartet: canvas_pos")]
    MissingPickCoordinates,

    /// `view_fit` über Objekte ohne Bounding-Box.
    #[error("Keine Bounding-Box für {} Objekte", .0.len())]
    NoBoundingBoxes(Vec<ObjectId>),

    /// Buffer-ID ist im Store nicht (mehr) registriert.
    #[error("Unbekannter Buffer: {0:?}")]
    UnknownBuffer(BufferId),

    /// Scoped GPU-Zugriff auf einen Buffer ist fehlgeschlagen.
    #[error("Buffer-Bearbeitung fehlgeschlagen: {0}")]
    BufferEdit(String),

    /// Read-back aus einem Offscreen-Target ist fehlgeschlagen.
    #[error("GPU-Readback fehlgeschlagen: {0}")]
    Readback(String),

    /// Aufruf des Geometrie-Dienstes ist fehlgeschlagen.
    #[error("Service-Aufruf fehlgeschlagen: {0}")]
    Service(String),
}
