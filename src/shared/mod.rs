//! Geteilte Konfiguration für Viewer, Loader und Binary.

pub mod options;

pub use options::{LoaderOptions, ViewerOptions, EXCLUDED_TYPES};
