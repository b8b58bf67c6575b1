//! Der eigentliche Frame: Linien, Schnittebenen-Carve, Opak/Transparent
//! (OIT oder einfach), Selektions-Outlines und Kachel-Ränder.

use super::Viewer;
use crate::core::{cap_quad, FreezableIdSet, DISABLED_PLANE};
use crate::render::{
    BlendMode, BufferStore, ClearRequest, CullFace, DirtyLevel, FrameContext, GpuContext,
    LayerBuffers, LayerId, RasterState, RenderLayer, RenderSelector, RenderTarget, SelectorPass,
    StencilCompare, StencilOp, StencilState,
};

const OPAQUE: &[bool] = &[false];
const TRANSPARENT: &[bool] = &[true];
const BOTH: &[bool] = &[false, true];

/// Lässt alle Layer die angegebenen Transparenz-Pässe zeichnen.
pub(super) fn render_layers<G: GpuContext>(
    layers: &mut [Box<dyn RenderLayer<G>>],
    gpu: &mut G,
    frame: &FrameContext<'_>,
    buffers: &BufferStore,
    transparencies: &[bool],
    selector: &RenderSelector<'_>,
) {
    for &transparent in transparencies {
        for (index, layer) in layers.iter_mut().enumerate() {
            layer.render(
                gpu,
                frame,
                LayerBuffers::new(buffers, LayerId(index)),
                transparent,
                selector,
            );
        }
    }
}

fn render_outlines<G: GpuContext>(
    layers: &mut [Box<dyn RenderLayer<G>>],
    gpu: &mut G,
    frame: &FrameContext<'_>,
    buffers: &BufferStore,
    selected: &FreezableIdSet,
    width_offset: f32,
) {
    for (index, layer) in layers.iter_mut().enumerate() {
        layer.render_selection_outlines(
            gpu,
            frame,
            LayerBuffers::new(buffers, LayerId(index)),
            selected,
            width_offset,
        );
    }
}

impl<G: GpuContext> Viewer<G> {
    /// Zeichnet die komplette Szene ins Haupt-Target.
    pub(super) fn draw_scene(&mut self, reason: DirtyLevel) {
        // Maus-Events dürfen die Matrizen bis zum Frame-Ende nicht ändern
        self.camera.lock();
        let matrices = *self.camera.matrices();
        let frame = FrameContext {
            camera: &matrices,
            eye: matrices.view_inverse.w_axis.truncate(),
            width: self.width,
            height: self.height,
        };
        log::debug!("draw_scene: reason={:?}", reason);

        let gpu = &mut self.gpu;
        gpu.bind_target(RenderTarget::Main);
        gpu.apply_state(RasterState::DEFAULT);
        gpu.clear(ClearRequest::all(self.options.clear_color));
        gpu.set_clip_plane(self.section.plane);

        for layer in &mut self.layers {
            layer.prepare_render(reason);
            layer.render_lines(gpu, &frame);
        }

        let culled = RasterState {
            cull: Some(CullFace::Back),
            ..RasterState::DEFAULT
        };
        gpu.apply_state(culled);

        if let Some(bounds) = self.model_bounds {
            if !self.camera_set {
                // Einmalig auf das Modell ausrichten, sobald Bounds bekannt sind
                self.camera.reset_to_origin();
                self.camera.view_fit(&bounds);
                self.camera_set = true;
                self.dirty = self.dirty.max(DirtyLevel::Hard);
            }

            if self.section.enabled {
                let exclude = RenderSelector::exclude(&self.invisible);
                let quad = cap_quad(&bounds, self.section.plane);

                // Ebene nur in die Tiefe schreiben
                gpu.apply_state(RasterState {
                    color_writes: false,
                    cull: None,
                    ..RasterState::DEFAULT
                });
                gpu.draw_section_quad(&quad, matrices.view_projection);

                // Stencil-Carve: Rückseiten +1, Vorderseiten -1, ohne Clipping
                gpu.set_clip_plane(DISABLED_PLANE);
                let carve = RasterState {
                    depth_write: false,
                    color_writes: false,
                    cull: Some(CullFace::Back),
                    stencil: Some(StencilState::always(StencilOp::Increment)),
                    ..RasterState::DEFAULT
                };
                gpu.apply_state(carve);
                render_layers(&mut self.layers, gpu, &frame, &self.buffers, OPAQUE, &exclude);

                gpu.apply_state(RasterState {
                    cull: Some(CullFace::Front),
                    stencil: Some(StencilState::always(StencilOp::Decrement)),
                    ..carve
                });
                render_layers(&mut self.layers, gpu, &frame, &self.buffers, OPAQUE, &exclude);

                // Ebene leicht Richtung Auge schieben gegen Z-Fighting mit der Kappe
                let plane = self.section.plane;
                let eye_plane_distance = (frame.eye.dot(plane.truncate()) - plane.w).abs();
                self.section.last_adjustment = eye_plane_distance;
                let mut nudged = plane;
                nudged.w -= self.options.section_plane_epsilon * eye_plane_distance;
                gpu.set_clip_plane(nudged);

                // Kappe dort, wo der Stencil genau 1 ist
                gpu.apply_state(RasterState {
                    cull: None,
                    stencil: Some(StencilState::test(StencilCompare::Equal)),
                    ..RasterState::DEFAULT
                });
                gpu.clear(ClearRequest::depth_only());
                gpu.draw_section_quad(&quad, matrices.view_projection);

                gpu.apply_state(culled);
            }
        }

        let exclude = RenderSelector::exclude(&self.invisible);
        if self.options.order_independent_transparency {
            gpu.bind_target(RenderTarget::Main);
            gpu.apply_state(culled);
            render_layers(&mut self.layers, gpu, &frame, &self.buffers, OPAQUE, &exclude);

            // Opake Geometrie nochmal, nur um die OIT-Tiefe zu füllen
            gpu.bind_target(RenderTarget::Oit);
            gpu.clear(ClearRequest::all([0.0; 4]));
            render_layers(&mut self.layers, gpu, &frame, &self.buffers, OPAQUE, &exclude);
            gpu.clear(ClearRequest {
                color: Some([0.0; 4]),
                depth: false,
                stencil: false,
            });

            gpu.apply_state(RasterState {
                blend: BlendMode::Additive,
                depth_write: false,
                ..culled
            });
            render_layers(&mut self.layers, gpu, &frame, &self.buffers, TRANSPARENT, &exclude);

            gpu.bind_target(RenderTarget::Main);
            gpu.set_viewport(self.width, self.height);
            gpu.composite_oit();
        } else {
            gpu.apply_state(culled);
            render_layers(&mut self.layers, gpu, &frame, &self.buffers, OPAQUE, &exclude);
            gpu.apply_state(RasterState {
                blend: BlendMode::PremultipliedAlpha,
                ..culled
            });
            render_layers(&mut self.layers, gpu, &frame, &self.buffers, TRANSPARENT, &exclude);
        }

        // Ab hier ohne Schnittebene; Outlines brauchen abgeschaltetes Culling
        gpu.set_clip_plane(DISABLED_PLANE);
        let current = gpu.state();
        gpu.apply_state(RasterState {
            cull: None,
            ..current
        });

        if !self.selected.is_empty() {
            let silhouette = RenderSelector::include(&self.selected, SelectorPass::Stencil);
            gpu.apply_state(RasterState {
                depth_test: false,
                depth_write: false,
                cull: None,
                blend: BlendMode::Off,
                color_writes: false,
                stencil: Some(StencilState::always(StencilOp::Replace)),
            });
            render_layers(&mut self.layers, gpu, &frame, &self.buffers, BOTH, &silhouette);

            // Nur außerhalb der Silhouette zeichnen
            gpu.apply_state(RasterState {
                depth_test: false,
                depth_write: false,
                cull: None,
                blend: BlendMode::Off,
                color_writes: true,
                stencil: Some(StencilState::test(StencilCompare::NotEqual)),
            });
            render_outlines(&mut self.layers, gpu, &frame, &self.buffers, &self.selected, 0.0);

            let current = gpu.state();
            gpu.apply_state(RasterState {
                stencil: None,
                ..current
            });
            render_outlines(&mut self.layers, gpu, &frame, &self.buffers, &self.selected, 0.001);
        }

        for layer in &mut self.layers {
            layer.render_tile_borders(gpu, &frame);
        }

        self.camera.unlock();
    }
}
