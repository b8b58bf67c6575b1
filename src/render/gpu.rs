//! Abstraktion des GPU-Kontexts, über die der Viewer seinen Frame steuert.
//!
//! Der Viewer setzt nur Zustände und delegiert Geometrie an Render-Layer.
//! Die wgpu-Implementierung liegt in `wgpu_context`, Tests verwenden
//! einen aufzeichnenden Kontext.

use crate::error::ViewerError;
use glam::{Mat4, Vec3, Vec4};

/// Ziel, in das gezeichnet wird.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// Sichtbares Haupt-Target (Farbe + Depth/Stencil)
    Main,
    /// Offscreen-Pick-Target (Pick-ID, Normale, Tiefe)
    Pick,
    /// Akkumulations-Target für order-independent transparency
    Oit,
}

/// Welche Dreiecksseite verworfen wird.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullFace {
    /// Vorderseiten verwerfen
    Front,
    /// Rückseiten verwerfen
    Back,
}

/// Blend-Modus für Farb-Writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Kein Blending
    #[default]
    Off,
    /// `ONE, ONE` (OIT-Akkumulation)
    Additive,
    /// `ONE, ONE_MINUS_SRC_ALPHA`
    PremultipliedAlpha,
}

/// Vergleichsfunktion des Stencil-Tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilCompare {
    /// Immer bestehen
    Always,
    /// Bestehen, wenn Stencil == Referenz
    Equal,
    /// Bestehen, wenn Stencil != Referenz
    NotEqual,
}

/// Stencil-Operation bei bestandenem Depth-Test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    /// Wert behalten
    Keep,
    /// Referenzwert schreiben
    Replace,
    /// Hochzählen (sättigend)
    Increment,
    /// Runterzählen (sättigend)
    Decrement,
}

/// Vollständiger Stencil-Zustand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilState {
    /// Vergleichsfunktion
    pub compare: StencilCompare,
    /// Referenzwert
    pub reference: u32,
    /// Operation bei bestandenem Test
    pub pass_op: StencilOp,
    /// Schreibmaske (0 = Stencil nur lesen)
    pub write_mask: u32,
}

impl StencilState {
    /// Test immer bestehen, `op` anwenden.
    pub const fn always(op: StencilOp) -> Self {
        Self {
            compare: StencilCompare::Always,
            reference: 1,
            pass_op: op,
            write_mask: 0xff,
        }
    }

    /// Nur lesen: bestehen bei `compare` gegen Referenz 1.
    pub const fn test(compare: StencilCompare) -> Self {
        Self {
            compare,
            reference: 1,
            pass_op: StencilOp::Keep,
            write_mask: 0x00,
        }
    }
}

/// Rasterizer- und Output-Merger-Zustand für die nächsten Draw-Calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    /// Depth-Test (LESS_EQUAL) aktiv
    pub depth_test: bool,
    /// Depth-Writes aktiv
    pub depth_write: bool,
    /// Face-Culling
    pub cull: Option<CullFace>,
    /// Blend-Modus
    pub blend: BlendMode,
    /// Farb-Writes aktiv
    pub color_writes: bool,
    /// Stencil-Test (`None` = aus)
    pub stencil: Option<StencilState>,
}

impl RasterState {
    /// Standardzustand am Frame-Beginn: Depth-Test an, kein Culling.
    pub const DEFAULT: RasterState = RasterState {
        depth_test: true,
        depth_write: true,
        cull: None,
        blend: BlendMode::Off,
        color_writes: true,
        stencil: None,
    };
}

impl Default for RasterState {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Was beim Löschen des gebundenen Targets zurückgesetzt wird.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearRequest {
    /// Farbe (`None` = Farbe behalten)
    pub color: Option<[f32; 4]>,
    /// Tiefe auf 1.0 setzen
    pub depth: bool,
    /// Stencil auf 0 setzen
    pub stencil: bool,
}

impl ClearRequest {
    /// Alles löschen.
    pub const fn all(color: [f32; 4]) -> Self {
        Self {
            color: Some(color),
            depth: true,
            stencil: true,
        }
    }

    /// Nur die Tiefe löschen.
    pub const fn depth_only() -> Self {
        Self {
            color: None,
            depth: true,
            stencil: false,
        }
    }
}

/// Gemeinsame Schnittstelle aller GPU-Kontexte.
///
/// Alle Aufrufe erfolgen vom Render-Thread, der den Viewer besitzt.
pub trait GpuContext {
    /// Setzt den Viewport in Pixeln.
    fn set_viewport(&mut self, width: u32, height: u32);

    /// Bindet ein Target für die folgenden Clears und Draws.
    fn bind_target(&mut self, target: RenderTarget);

    /// Aktuell gebundenes Target.
    fn bound_target(&self) -> RenderTarget;

    /// Löscht das gebundene Target.
    fn clear(&mut self, request: ClearRequest);

    /// Übernimmt einen neuen Raster-Zustand.
    fn apply_state(&mut self, state: RasterState);

    /// Aktueller Raster-Zustand.
    fn state(&self) -> RasterState;

    /// Setzt die Clip-Ebene `(n.x, n.y, n.z, d)`, die Layer im Shader anwenden.
    fn set_clip_plane(&mut self, plane: Vec4);

    /// Aktuelle Clip-Ebene.
    fn clip_plane(&self) -> Vec4;

    /// Zeichnet ein Quad in Weltkoordinaten mit dem aktuellen Zustand.
    fn draw_section_quad(&mut self, corners: &[Vec3; 4], view_projection: Mat4);

    /// Komponiert das OIT-Target (Farbe × Alpha) auf das Haupt-Target.
    fn composite_oit(&mut self);

    /// Liest die 4 Pick-ID-Bytes an Pixel `(x, y)`.
    fn read_pick_color(&mut self, x: u32, y: u32) -> Result<[u8; 4], ViewerError>;

    /// Liest die Normale an Pixel `(x, y)`.
    fn read_pick_normal(&mut self, x: u32, y: u32) -> Result<Vec3, ViewerError>;

    /// Liest die rohe Tiefe in `[0, 1]` an Pixel `(x, y)`.
    fn read_pick_depth(&mut self, x: u32, y: u32) -> Result<f32, ViewerError>;
}
