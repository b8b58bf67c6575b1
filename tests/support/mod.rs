//! Test-Doubles: aufzeichnender GPU-Kontext und ein Layer, der
//! Selektoren auswertet und Pick-Pixel malt.

#![allow(dead_code)]

use bim_tile_viewer::core::ObjectId;
use bim_tile_viewer::render::{
    ClearRequest, DirtyLevel, FrameContext, GeometryBuffer, GpuContext, LayerBuffers, RasterState,
    RenderLayer, RenderSelector, RenderTarget, SelectorPass,
};
use bim_tile_viewer::{FreezableIdSet, ViewerError};
use glam::{Mat4, Vec3, Vec4};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Aufgezeichneter GPU-Aufruf.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    Viewport(u32, u32),
    Bind(RenderTarget),
    Clear(ClearRequest),
    State(RasterState),
    ClipPlane(Vec4),
    SectionQuad,
    CompositeOit,
}

#[derive(Debug, Clone, Copy)]
pub struct PickPixel {
    pub color: [u8; 4],
    pub normal: Vec3,
    pub depth: f32,
}

/// GPU-Double, das alle Aufrufe protokolliert.
#[derive(Debug)]
pub struct RecordingGpu {
    pub calls: Vec<GpuCall>,
    pub target: RenderTarget,
    pub state: RasterState,
    pub plane: Vec4,
    pub pick_pixels: HashMap<(u32, u32), PickPixel>,
    pub color_reads: usize,
    pub depth_reads: usize,
    pub viewport: (u32, u32),
}

impl RecordingGpu {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            target: RenderTarget::Main,
            state: RasterState::DEFAULT,
            plane: Vec4::new(0.0, 0.0, 0.0, 1.0),
            pick_pixels: HashMap::new(),
            color_reads: 0,
            depth_reads: 0,
            viewport: (1, 1),
        }
    }

    /// Wie der echte Read-back: Pixel außerhalb des Viewports sind ein Fehler.
    fn check_pixel(&self, x: u32, y: u32) -> Result<(), ViewerError> {
        let (width, height) = self.viewport;
        if x >= width || y >= height {
            return Err(ViewerError::Readback(format!("Pixel ({x}, {y}) außerhalb")));
        }
        Ok(())
    }

    /// Schreibt ein Pick-Pixel, nur wenn das Pick-Target gebunden ist.
    pub fn paint_pick(&mut self, x: u32, y: u32, pixel: PickPixel) {
        if self.target == RenderTarget::Pick {
            self.pick_pixels.insert((x, y), pixel);
        }
    }

    pub fn states(&self) -> Vec<RasterState> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                GpuCall::State(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &GpuCall) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }
}

impl GpuContext for RecordingGpu {
    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.calls.push(GpuCall::Viewport(width, height));
    }

    fn bind_target(&mut self, target: RenderTarget) {
        self.target = target;
        self.calls.push(GpuCall::Bind(target));
    }

    fn bound_target(&self) -> RenderTarget {
        self.target
    }

    fn clear(&mut self, request: ClearRequest) {
        if self.target == RenderTarget::Pick && request.color.is_some() {
            self.pick_pixels.clear();
        }
        self.calls.push(GpuCall::Clear(request));
    }

    fn apply_state(&mut self, state: RasterState) {
        self.state = state;
        self.calls.push(GpuCall::State(state));
    }

    fn state(&self) -> RasterState {
        self.state
    }

    fn set_clip_plane(&mut self, plane: Vec4) {
        self.plane = plane;
        self.calls.push(GpuCall::ClipPlane(plane));
    }

    fn clip_plane(&self) -> Vec4 {
        self.plane
    }

    fn draw_section_quad(&mut self, _corners: &[Vec3; 4], _view_projection: Mat4) {
        self.calls.push(GpuCall::SectionQuad);
    }

    fn composite_oit(&mut self) {
        self.calls.push(GpuCall::CompositeOit);
    }

    fn read_pick_color(&mut self, x: u32, y: u32) -> Result<[u8; 4], ViewerError> {
        self.check_pixel(x, y)?;
        self.color_reads += 1;
        Ok(self.pick_pixels.get(&(x, y)).map(|p| p.color).unwrap_or([0; 4]))
    }

    fn read_pick_normal(&mut self, x: u32, y: u32) -> Result<Vec3, ViewerError> {
        self.check_pixel(x, y)?;
        Ok(self
            .pick_pixels
            .get(&(x, y))
            .map(|p| p.normal)
            .unwrap_or(Vec3::ZERO))
    }

    fn read_pick_depth(&mut self, x: u32, y: u32) -> Result<f32, ViewerError> {
        self.check_pixel(x, y)?;
        self.depth_reads += 1;
        Ok(self.pick_pixels.get(&(x, y)).map(|p| p.depth).unwrap_or(1.0))
    }
}

/// Ein gezeichneter Pass des Test-Layers.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub target: RenderTarget,
    pub pass: SelectorPass,
    pub transparent: bool,
    pub ids: Vec<ObjectId>,
}

/// Gemeinsamer Zustand zwischen Test und Layer.
#[derive(Debug, Default)]
pub struct LayerLog {
    pub draws: Vec<DrawRecord>,
    pub outlines: Vec<(Vec<ObjectId>, f32)>,
    pub prepared: Vec<DirtyLevel>,
    /// Wo ein Objekt im Pick-Pass landet
    pub placements: HashMap<ObjectId, ((u32, u32), PickPixel)>,
}

/// Layer, der pro Pass die zugelassenen IDs protokolliert.
pub struct RecordingLayer {
    pub log: Rc<RefCell<LayerLog>>,
}

impl RecordingLayer {
    pub fn new() -> (Self, Rc<RefCell<LayerLog>>) {
        let log = Rc::new(RefCell::new(LayerLog::default()));
        (Self { log: Rc::clone(&log) }, log)
    }
}

impl RenderLayer<RecordingGpu> for RecordingLayer {
    fn prepare_render(&mut self, reason: DirtyLevel) {
        self.log.borrow_mut().prepared.push(reason);
    }

    fn render_lines(&mut self, _gpu: &mut RecordingGpu, _frame: &FrameContext<'_>) {}

    fn render(
        &mut self,
        gpu: &mut RecordingGpu,
        _frame: &FrameContext<'_>,
        buffers: LayerBuffers<'_>,
        transparent: bool,
        selector: &RenderSelector<'_>,
    ) {
        let mut ids = Vec::new();
        for (_, entry) in buffers.selected(selector, transparent) {
            for id in entry.buffer().ids() {
                if selector.admits_in(entry, &id) {
                    ids.push(id);
                }
            }
        }

        let mut log = self.log.borrow_mut();
        if selector.pass == SelectorPass::Pick {
            for id in &ids {
                if let Some(((x, y), pixel)) = log.placements.get(id).copied() {
                    gpu.paint_pick(x, y, pixel);
                }
            }
        }
        log.draws.push(DrawRecord {
            target: gpu.bound_target(),
            pass: selector.pass,
            transparent,
            ids,
        });
    }

    fn render_selection_outlines(
        &mut self,
        _gpu: &mut RecordingGpu,
        _frame: &FrameContext<'_>,
        _buffers: LayerBuffers<'_>,
        selected: &FreezableIdSet,
        width_offset: f32,
    ) {
        self.log
            .borrow_mut()
            .outlines
            .push((selected.to_vec(), width_offset));
    }
}

impl LayerLog {
    /// IDs, die im letzten Farb-Pass der Transparenzklasse gezeichnet wurden
    /// (bei OIT landet der transparente Pass im OIT-Target).
    pub fn last_color_pass(&self, transparent: bool) -> Vec<ObjectId> {
        self.draws
            .iter()
            .rev()
            .find(|d| d.pass == SelectorPass::Color && d.transparent == transparent)
            .map(|d| d.ids.clone())
            .unwrap_or_default()
    }
}

pub fn id(n: i64) -> ObjectId {
    ObjectId::Numeric(n)
}
