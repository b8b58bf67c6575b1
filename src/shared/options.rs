//! Zentrale Konfiguration für den BIM-Kachel-Viewer.
//!
//! `ViewerOptions` enthält alle zur Laufzeit änderbaren Werte.
//! Die `const`-Werte bleiben als Fallback/Default erhalten.

use crate::core::IdOrdering;
use serde::{Deserialize, Serialize};

// ── Frame-Loop ──────────────────────────────────────────────────────

/// Mindestabstand zwischen zwei Soft-Redraws in Millisekunden.
pub const SOFT_REPAINT_INTERVAL_MS: f64 = 500.0;
/// Länge eines FPS-Messfensters in Millisekunden.
pub const FPS_WINDOW_MS: f64 = 1000.0;
/// Hintergrundfarbe des Haupt-Targets (RGBA: Weiß).
pub const CLEAR_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

// ── Schnittebene ────────────────────────────────────────────────────

/// Relativer Versatz der Schnittebene Richtung Auge gegen Z-Fighting.
pub const SECTION_PLANE_EPSILON: f32 = 1e-3;
/// Farbe der Schnitt-Kappe (RGBA: Hellgrau).
pub const SECTION_CAP_COLOR: [f32; 4] = [0.75, 0.75, 0.78, 1.0];

// ── Viewport ────────────────────────────────────────────────────────

/// Standard-Breite des Canvas in Pixeln.
pub const VIEWPORT_WIDTH: u32 = 800;
/// Standard-Höhe des Canvas in Pixeln.
pub const VIEWPORT_HEIGHT: u32 = 600;

// ── Laden ───────────────────────────────────────────────────────────

/// Dreiecks-Budget des Default-Layers (Rest geht in den Kachel-Layer).
pub const TRIANGLE_THRESHOLD_DEFAULT_LAYER: u64 = 1_000_000;
/// Angenommener freier GPU-Speicher in Bytes.
pub const ASSUME_GPU_MEMORY_AVAILABLE: u64 = 1024 * 1024 * 1024;
/// Parallele Slots des Lade-Executors.
pub const EXECUTOR_PARALLELISM: usize = 4;
/// Typen, die nie geladen werden.
pub const EXCLUDED_TYPES: [&str; 3] = ["IfcSpace", "IfcOpeningElement", "IfcAnnotation"];

/// Einstellungen, die an den Geometrie-Dienst durchgereicht werden.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoaderOptions {
    /// Objekt-IDs als UUID + RID statt numerischer OID
    #[serde(default)]
    pub use_uuid_and_rid: bool,
    /// Normalen quantisiert übertragen
    pub quantize_normals: bool,
    /// Vertices quantisiert übertragen
    pub quantize_vertices: bool,
    /// Objektfarben statt Vertex-Farben
    pub use_object_colors: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            use_uuid_and_rid: false,
            quantize_normals: true,
            quantize_vertices: true,
            use_object_colors: false,
        }
    }
}

// ── Laufzeit-Optionen (serialisierbar) ─────────────────────────────

/// Alle zur Laufzeit änderbaren Viewer-Optionen.
/// Wird als `bim_tile_viewer.toml` neben der Binary gespeichert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerOptions {
    // ── Rendering ───────────────────────────────────────────────
    /// Order-independent transparency statt einfachem Alpha-Blending
    pub order_independent_transparency: bool,
    /// Hintergrundfarbe
    pub clear_color: [f32; 4],
    /// Farbe der Schnitt-Kappe
    #[serde(default = "default_section_cap_color")]
    pub section_cap_color: [f32; 4],
    /// Relativer Z-Fighting-Versatz der Schnittebene
    pub section_plane_epsilon: f32,
    /// Versatz beim Picken wieder abziehen
    #[serde(default = "default_true")]
    pub pick_plane_adjustment: bool,

    // ── Frame-Loop ──────────────────────────────────────────────
    /// Mindestabstand zwischen Soft-Redraws (ms)
    pub soft_repaint_interval_ms: f64,

    // ── Viewport ────────────────────────────────────────────────
    /// Canvas-Breite in Pixeln
    pub viewport_width: u32,
    /// Canvas-Höhe in Pixeln
    pub viewport_height: u32,

    // ── Laden ───────────────────────────────────────────────────
    /// Default-Layer laden
    pub default_layer_enabled: bool,
    /// Kachel-Layer laden
    pub tiling_layer_enabled: bool,
    /// Dreiecks-Budget des Default-Layers
    pub triangle_threshold_default_layer: u64,
    /// Angenommener freier GPU-Speicher (Bytes)
    pub assume_gpu_memory_available: u64,
    /// Parallele Slots des Lade-Executors
    #[serde(default = "default_executor_parallelism")]
    pub executor_parallelism: usize,
    /// Kleine (16-Bit) Indizes, wenn möglich
    #[serde(default = "default_true")]
    pub use_small_indices_if_possible: bool,
    /// Einstellungen für den Geometrie-Dienst
    #[serde(default)]
    pub loader: LoaderOptions,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            order_independent_transparency: true,
            clear_color: CLEAR_COLOR,
            section_cap_color: SECTION_CAP_COLOR,
            section_plane_epsilon: SECTION_PLANE_EPSILON,
            pick_plane_adjustment: true,

            soft_repaint_interval_ms: SOFT_REPAINT_INTERVAL_MS,

            viewport_width: VIEWPORT_WIDTH,
            viewport_height: VIEWPORT_HEIGHT,

            default_layer_enabled: true,
            tiling_layer_enabled: true,
            triangle_threshold_default_layer: TRIANGLE_THRESHOLD_DEFAULT_LAYER,
            assume_gpu_memory_available: ASSUME_GPU_MEMORY_AVAILABLE,
            executor_parallelism: EXECUTOR_PARALLELISM,
            use_small_indices_if_possible: true,
            loader: LoaderOptions::default(),
        }
    }
}

/// Serde-Default für `section_cap_color` (Abwärtskompatibilität).
fn default_section_cap_color() -> [f32; 4] {
    SECTION_CAP_COLOR
}

fn default_executor_parallelism() -> usize {
    EXECUTOR_PARALLELISM
}

fn default_true() -> bool {
    true
}

impl ViewerOptions {
    /// Lädt Optionen aus einer TOML-Datei. Fehlt die Datei, werden Defaults verwendet.
    pub fn load_from_file(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(opts) => {
                    log::info!("Optionen geladen aus: {}", path.display());
                    opts
                }
                Err(e) => {
                    log::warn!("Optionen-Datei fehlerhaft, verwende Standardwerte: {}", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("Keine Optionen-Datei gefunden, verwende Standardwerte");
                Self::default()
            }
        }
    }

    /// Speichert Optionen als TOML-Datei.
    pub fn save_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        log::info!("Optionen gespeichert nach: {}", path.display());
        Ok(())
    }

    /// Ermittelt den Pfad zur Optionen-Datei neben der Binary.
    pub fn config_path() -> std::path::PathBuf {
        std::env::current_exe()
            .unwrap_or_else(|_| std::path::PathBuf::from("bim_tile_viewer"))
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .join("bim_tile_viewer.toml")
    }

    /// ID-Ordnung passend zur Loader-Einstellung.
    pub fn id_ordering(&self) -> IdOrdering {
        IdOrdering::for_string_ids(self.loader.use_uuid_and_rid)
    }

    /// Geschätzte GPU-Bytes pro nicht wiederverwendetem Dreieck.
    ///
    /// Drei Vertices mit Position, Normale, Farbe und Pick-Farbe plus drei Indizes.
    pub fn bytes_per_triangle(&self) -> u64 {
        let position = if self.loader.quantize_vertices { 3 * 2 } else { 3 * 4 };
        let normal = if self.loader.quantize_normals { 3 } else { 3 * 4 };
        let color = if self.loader.use_object_colors { 0 } else { 4 };
        let pick_color = 4;
        let index = if self.use_small_indices_if_possible { 2 } else { 4 };
        3 * (position + normal + color + pick_color) + 3 * index
    }

    /// Umrechnung Dreiecke → Bytes.
    pub fn triangles_to_bytes(&self, triangles: u64) -> u64 {
        triangles * self.bytes_per_triangle()
    }

    /// Umrechnung Bytes → Dreiecke (abgerundet).
    pub fn bytes_to_triangles(&self, bytes: u64) -> u64 {
        bytes / self.bytes_per_triangle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let options = ViewerOptions::default();
        assert_eq!(options.soft_repaint_interval_ms, SOFT_REPAINT_INTERVAL_MS);
        assert_eq!(options.executor_parallelism, 4);
        assert_eq!(options.id_ordering(), IdOrdering::Numeric);
    }

    #[test]
    fn toml_roundtrip_keeps_loader_settings() {
        let mut options = ViewerOptions::default();
        options.loader.use_uuid_and_rid = true;
        options.order_independent_transparency = false;

        let text = toml::to_string_pretty(&options).expect("serialisierbar");
        let parsed: ViewerOptions = toml::from_str(&text).expect("parsebar");
        assert!(parsed.loader.use_uuid_and_rid);
        assert!(!parsed.order_independent_transparency);
        assert_eq!(parsed.id_ordering(), IdOrdering::Lexicographic);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let options = ViewerOptions::load_from_file(std::path::Path::new(
            "/nonexistent/bim_tile_viewer.toml",
        ));
        assert!(options.default_layer_enabled);
    }

    #[test]
    fn triangle_byte_estimate_roundtrips() {
        let options = ViewerOptions::default();
        let bytes = options.triangles_to_bytes(1000);
        assert_eq!(options.bytes_to_triangles(bytes), 1000);
        assert!(options.bytes_per_triangle() > 0);
    }
}
