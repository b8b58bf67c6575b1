mod support;

use approx::assert_abs_diff_eq;
use bim_tile_viewer::core::{Aabb, ViewObject, ViewerEvent};
use bim_tile_viewer::render::{
    BufferId, DirtyLevel, GeometryBuffer, MemoryBuffer, RenderTarget, StencilOp, TransparencyClass,
};
use bim_tile_viewer::viewer::OverrideKind;
use bim_tile_viewer::{
    FpsReport, PickRequest, Viewer, ViewerError, ViewerOptions, ViewerShortcut,
};
use glam::{Mat4, Vec3};
use std::cell::RefCell;
use std::rc::Rc;
use support::{id, GpuCall, LayerLog, PickPixel, RecordingGpu, RecordingLayer};

const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const GLASS: [f32; 4] = [0.2, 0.4, 0.9, 0.5];

struct Scene {
    viewer: Viewer<RecordingGpu>,
    log: Rc<RefCell<LayerLog>>,
    walls: BufferId,
    instances: BufferId,
}

fn unit_box(offset: f32) -> Option<Aabb> {
    Some(Aabb::new(
        Vec3::splat(offset),
        Vec3::splat(offset + 1.0),
    ))
}

/// Objekte 1-3 in einem veränderbaren, 10/11 als Instanzen in einem
/// eingefrorenen opaken Buffer.
fn scene_with(options: ViewerOptions) -> Scene {
    let mut viewer = Viewer::new(RecordingGpu::new(), options);
    let (layer, log) = RecordingLayer::new();
    let layer_id = viewer.add_layer(Box::new(layer));

    for (n, type_name) in [(1, "IfcWall"), (2, "IfcWindow"), (3, "IfcSlab"), (10, "IfcColumn"), (11, "IfcColumn")] {
        viewer.add_view_object(ViewObject::new(n as i64, type_name, unit_box(n as f32)));
    }

    let mut walls = MemoryBuffer::new(TransparencyClass::Opaque);
    walls.push_object(id(1), 36, WHITE);
    walls.push_object(id(2), 12, WHITE);
    walls.push_object(id(3), 24, WHITE);
    let walls = viewer.register_buffer(layer_id, Box::new(walls));

    let mut columns = MemoryBuffer::frozen(TransparencyClass::Opaque);
    columns.push_object(id(500), 36, WHITE);
    columns.push_instance(id(10), Mat4::IDENTITY);
    columns.push_instance(id(11), Mat4::from_translation(Vec3::X * 5.0));
    let instances = viewer.register_buffer(layer_id, Box::new(columns));

    Scene {
        viewer,
        log,
        walls,
        instances,
    }
}

fn scene() -> Scene {
    scene_with(ViewerOptions::default())
}

fn color_in(viewer: &Viewer<RecordingGpu>, buffer: BufferId, n: i64) -> Option<[f32; 4]> {
    viewer.buffers().get(buffer).and_then(|b| b.color_of(&id(n)))
}

fn instance_ids(viewer: &Viewer<RecordingGpu>, buffer: BufferId) -> Vec<i64> {
    viewer
        .buffers()
        .get(buffer)
        .map(|b| {
            b.objects()
                .iter()
                .filter_map(|r| r.id.numeric_value())
                .collect()
        })
        .unwrap_or_default()
}

// ── Farb-Overrides ─────────────────────────────────────────────────

#[test]
fn same_class_color_is_written_in_place_and_restored() {
    let mut s = scene();

    s.viewer.set_color(&[id(1)], RED).expect("set_color");
    assert_eq!(s.viewer.override_of(&id(1)), Some(OverrideKind::InPlace));
    assert_eq!(color_in(&s.viewer, s.walls, 1), Some(RED));
    assert_eq!(s.viewer.buffers().len(), 2);

    s.viewer.reset_color(&[id(1)]).expect("reset_color");
    assert_eq!(s.viewer.override_of(&id(1)), None);
    assert_eq!(color_in(&s.viewer, s.walls, 1), Some(WHITE));
}

#[test]
fn other_class_color_splits_into_override_buffer() {
    let mut s = scene();

    s.viewer.set_color(&[id(2)], GLASS).expect("set_color");
    assert_eq!(s.viewer.override_of(&id(2)), Some(OverrideKind::Split));
    assert!(s.viewer.invisible().contains(&id(2)));
    assert_eq!(s.viewer.buffers().len(), 3);
    // Quelle bleibt primärer Besitzer, die Kopie kommt dazu
    let owners = s.viewer.owners_of(&id(2)).map(<[BufferId]>::to_vec).unwrap_or_default();
    assert_eq!(owners.len(), 2);
    assert_eq!(owners[0], s.walls);
    assert_eq!(color_in(&s.viewer, s.walls, 2), Some(WHITE));

    s.viewer.render_frame(0.0);
    let log = s.log.borrow();
    assert!(!log.last_color_pass(false).contains(&id(2)));
    assert!(log.last_color_pass(true).contains(&id(2)));
}

#[test]
fn hidden_object_stays_hidden_after_split() {
    let mut s = scene();
    s.viewer.set_visibility(vec![id(2)], false);

    s.viewer.set_color(&[id(2)], GLASS).expect("set_color");
    assert_eq!(s.viewer.override_of(&id(2)), Some(OverrideKind::Split));
    s.viewer.render_frame(0.0);
    assert!(!s.log.borrow().last_color_pass(true).contains(&id(2)));
    assert!(!s.log.borrow().last_color_pass(false).contains(&id(2)));

    // Einblenden zeigt nur die Kopie
    s.viewer.set_visibility(vec![id(2)], true);
    s.viewer.render_frame(100.0);
    assert!(s.log.borrow().last_color_pass(true).contains(&id(2)));
    assert!(!s.log.borrow().last_color_pass(false).contains(&id(2)));
}

#[test]
fn resetting_a_split_removes_the_copy_and_shows_the_source() {
    let mut s = scene();
    s.viewer.set_color(&[id(2)], GLASS).expect("set_color");

    s.viewer.reset_color(&[id(2)]).expect("reset_color");
    assert_eq!(s.viewer.buffers().len(), 2);
    assert!(!s.viewer.invisible().contains(&id(2)));
    assert_eq!(s.viewer.owners_of(&id(2)), Some(&[s.walls][..]));

    s.viewer.render_frame(0.0);
    assert!(s.log.borrow().last_color_pass(false).contains(&id(2)));
    assert!(!s.log.borrow().last_color_pass(true).contains(&id(2)));
}

#[test]
fn frozen_instance_migrates_and_returns_on_reset() {
    let mut s = scene();

    s.viewer.set_color(&[id(10)], GLASS).expect("set_color");
    assert_eq!(s.viewer.override_of(&id(10)), Some(OverrideKind::InstanceMigrated));
    assert_eq!(instance_ids(&s.viewer, s.instances), vec![11]);
    let override_buffer = s
        .viewer
        .owners_of(&id(10))
        .and_then(|owners| owners.first().copied())
        .expect("Override-Buffer registriert");
    assert_ne!(override_buffer, s.instances);
    assert_eq!(instance_ids(&s.viewer, override_buffer), vec![10]);
    // Instanzen werden nicht ausgeblendet
    assert!(!s.viewer.invisible().contains(&id(10)));

    s.viewer.reset_color(&[id(10)]).expect("reset_color");
    assert_eq!(s.viewer.override_of(&id(10)), None);
    assert_eq!(s.viewer.buffers().len(), 2);
    assert!(s.viewer.buffers().get(override_buffer).is_none());
    let mut restored = instance_ids(&s.viewer, s.instances);
    restored.sort();
    assert_eq!(restored, vec![10, 11]);
    assert_eq!(s.viewer.owners_of(&id(10)), Some(&[s.instances][..]));
}

#[test]
fn same_class_color_on_instance_migrates_to_own_buffer() {
    let mut s = scene();

    s.viewer.set_color(&[id(10)], RED).expect("set_color");
    assert_eq!(s.viewer.override_of(&id(10)), Some(OverrideKind::InstanceMigrated));
    assert_eq!(instance_ids(&s.viewer, s.instances), vec![11]);
    let override_buffer = s
        .viewer
        .owners_of(&id(10))
        .and_then(|owners| owners.first().copied())
        .expect("Override-Buffer registriert");
    assert_ne!(override_buffer, s.instances);
    assert_eq!(instance_ids(&s.viewer, override_buffer), vec![10]);
    assert_eq!(color_in(&s.viewer, override_buffer, 10), Some(RED));
    assert_eq!(color_in(&s.viewer, override_buffer, 500), Some(RED));
    // Geteilte Geometrie der Quelle bleibt unverändert
    assert_eq!(color_in(&s.viewer, s.instances, 11), Some(WHITE));
    assert_eq!(
        s.viewer.buffers().get(override_buffer).map(|b| b.transparency()),
        Some(TransparencyClass::Opaque)
    );

    s.viewer.render_frame(0.0);
    let drawn = s.log.borrow().last_color_pass(false);
    assert!(drawn.contains(&id(10)));
    assert!(drawn.contains(&id(11)));
}

#[test]
fn reset_colors_restores_mixed_overrides_on_instances() {
    let mut s = scene();
    s.viewer.set_color(&[id(1)], RED).expect("in-place");
    s.viewer.set_color(&[id(2)], GLASS).expect("split");
    s.viewer.set_color(&[id(10)], GLASS).expect("migration, andere Klasse");
    s.viewer.set_color(&[id(11)], RED).expect("migration, gleiche Klasse");
    assert_eq!(s.viewer.buffers().len(), 5);
    assert!(instance_ids(&s.viewer, s.instances).is_empty());

    s.viewer.reset_colors().expect("reset_colors");

    assert_eq!(s.viewer.buffers().len(), 2);
    assert!(s.viewer.invisible().is_empty());
    assert_eq!(color_in(&s.viewer, s.walls, 1), Some(WHITE));
    assert_eq!(color_in(&s.viewer, s.walls, 2), Some(WHITE));
    let mut restored = instance_ids(&s.viewer, s.instances);
    restored.sort();
    assert_eq!(restored, vec![10, 11]);
    for n in [10, 11] {
        assert_eq!(s.viewer.override_of(&id(n)), None);
        assert_eq!(s.viewer.owners_of(&id(n)), Some(&[s.instances][..]));
        assert_eq!(color_in(&s.viewer, s.instances, n), Some(WHITE));
    }
}

#[test]
fn reset_colors_is_idempotent_across_all_override_kinds() {
    let mut s = scene();
    s.viewer.set_color(&[id(1)], RED).expect("in-place");
    s.viewer.set_color(&[id(2)], GLASS).expect("split");
    s.viewer.set_color(&[id(10)], GLASS).expect("migration");
    assert_eq!(s.viewer.buffers().len(), 4);

    s.viewer.reset_colors().expect("erstes reset");
    s.viewer.reset_colors().expect("zweites reset");

    assert_eq!(s.viewer.buffers().len(), 2);
    assert!(s.viewer.invisible().is_empty());
    for n in [1, 2, 3] {
        assert_eq!(color_in(&s.viewer, s.walls, n), Some(WHITE));
        assert_eq!(s.viewer.override_of(&id(n)), None);
    }
    assert_eq!(s.viewer.owners_of(&id(10)), Some(&[s.instances][..]));
}

#[test]
fn recoloring_a_split_object_regroups_to_its_source() {
    let mut s = scene();
    s.viewer.set_color(&[id(2)], GLASS).expect("split");

    s.viewer.set_color(&[id(2)], RED).expect("zurück in opak");
    assert_eq!(s.viewer.override_of(&id(2)), Some(OverrideKind::InPlace));
    assert_eq!(s.viewer.buffers().len(), 2);
    assert!(!s.viewer.invisible().contains(&id(2)));
    assert_eq!(color_in(&s.viewer, s.walls, 2), Some(RED));
}

#[test]
fn set_color_publishes_one_event_and_marks_hard() {
    let mut s = scene();
    s.viewer.render_frame(0.0);
    s.viewer.render_frame(16.0);
    assert_eq!(s.viewer.dirty(), DirtyLevel::Clean);

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    s.viewer.subscribe(move |event| sink.borrow_mut().push(event.clone()));

    s.viewer.set_color(&[id(1), id(3)], RED).expect("set_color");
    assert_eq!(s.viewer.dirty(), DirtyLevel::Hard);
    assert_eq!(
        *events.borrow(),
        vec![ViewerEvent::ColorChanged {
            ids: vec![id(1), id(3)],
            rgba: RED
        }]
    );
}

#[test]
fn unknown_ids_are_skipped() {
    let mut s = scene();
    s.viewer.set_color(&[id(999), id(1)], RED).expect("set_color");
    assert_eq!(color_in(&s.viewer, s.walls, 1), Some(RED));
    assert_eq!(s.viewer.override_of(&id(999)), None);
}

// ── Sichtbarkeit ───────────────────────────────────────────────────

#[test]
fn hidden_objects_are_not_drawn() {
    let mut s = scene();
    s.viewer.set_visibility(vec![id(3), id(1)], false);
    s.viewer.render_frame(0.0);

    let drawn = s.log.borrow().last_color_pass(false);
    assert!(!drawn.contains(&id(1)));
    assert!(!drawn.contains(&id(3)));
    assert!(drawn.contains(&id(2)));
}

#[test]
fn hiding_a_split_object_hides_its_copy_and_show_all_keeps_source_hidden() {
    let mut s = scene();
    s.viewer.set_color(&[id(2)], GLASS).expect("split");

    s.viewer.set_visibility(vec![id(2)], false);
    s.viewer.render_frame(0.0);
    assert!(!s.log.borrow().last_color_pass(true).contains(&id(2)));
    assert!(!s.log.borrow().last_color_pass(false).contains(&id(2)));

    s.viewer.apply_shortcut(ViewerShortcut::ShowAll).expect("ShowAll");
    assert!(s.viewer.invisible().contains(&id(2)));
    s.viewer.render_frame(100.0);
    assert!(s.log.borrow().last_color_pass(true).contains(&id(2)));
    assert!(!s.log.borrow().last_color_pass(false).contains(&id(2)));
}

#[test]
fn visibility_change_publishes_sorted_ids() {
    let mut s = scene();
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    s.viewer.subscribe(move |event| sink.borrow_mut().push(event.clone()));

    s.viewer.set_visibility(vec![id(3), id(1)], false);
    assert_eq!(
        events.borrow().last(),
        Some(&ViewerEvent::VisibilityChanged {
            ids: vec![id(1), id(3)],
            visible: false
        })
    );
}

#[test]
fn hide_selected_shortcut_hides_and_clears_selection() {
    let mut s = scene();
    s.viewer.set_selection_state(vec![id(1), id(2)], true, false);
    assert_eq!(s.viewer.selected().len(), 2);

    s.viewer
        .apply_shortcut(ViewerShortcut::HideSelected)
        .expect("HideSelected");
    assert!(s.viewer.selection().is_empty());
    assert!(s.viewer.invisible().contains(&id(1)));
    assert!(s.viewer.invisible().contains(&id(2)));
}

#[test]
fn color_selected_shortcut_colors_and_clears_selection() {
    let mut s = scene();
    s.viewer.set_selection_state(vec![id(3)], true, true);
    s.viewer
        .apply_shortcut(ViewerShortcut::ColorSelected(RED))
        .expect("ColorSelected");
    assert_eq!(color_in(&s.viewer, s.walls, 3), Some(RED));
    assert!(s.viewer.selection().is_empty());
}

#[test]
fn ids_of_types_finds_registered_objects() {
    let s = scene();
    let mut columns = s.viewer.ids_of_types(&["IfcColumn"]);
    s.viewer.ordering().sort(&mut columns);
    assert_eq!(columns, vec![id(10), id(11)]);
}

// ── Picking ────────────────────────────────────────────────────────

fn place(s: &Scene, n: i64, x: u32, y: u32, depth: f32) {
    let color = s.viewer.pick_color(&id(n)).expect("registriert");
    s.log.borrow_mut().placements.insert(
        id(n),
        (
            (x, y),
            PickPixel {
                color,
                normal: Vec3::Z,
                depth,
            },
        ),
    );
}

#[test]
fn pick_resolves_object_and_unprojects_center() {
    let mut s = scene();
    place(&s, 1, 400, 300, 0.5);

    let result = s
        .viewer
        .pick(PickRequest::inspect(400.0, 300.0))
        .expect("pick");
    assert_eq!(result.object.map(|o| o.unique_id), Some(id(1)));
    assert_eq!(result.normal, Vec3::Z);
    assert!(result.depth > 0.0);
    // Kamera blickt von (0, 1, 0) entlang -Y
    assert_abs_diff_eq!(result.coordinates.x, 0.0, epsilon = 1e-3);
    assert_abs_diff_eq!(result.coordinates.z, 0.0, epsilon = 1e-3);
    assert_abs_diff_eq!(result.coordinates.y, 1.0 - result.depth, epsilon = 1e-3);
    assert!(s.viewer.selection().is_empty());
    assert_eq!(s.viewer.gpu().target, RenderTarget::Main);
}

#[test]
fn repeated_picks_toggle_selection() {
    let mut s = scene();
    place(&s, 1, 100, 100, 0.5);

    s.viewer.pick(PickRequest::at(100.0, 100.0)).expect("pick");
    assert!(s.viewer.selection().contains(&id(1)));
    s.viewer.pick(PickRequest::at(100.0, 100.0)).expect("pick");
    assert!(s.viewer.selection().is_empty());
    s.viewer.pick(PickRequest::at(100.0, 100.0)).expect("pick");
    assert!(s.viewer.selection().contains(&id(1)));
}

#[test]
fn modifier_pick_adds_without_clearing() {
    let mut s = scene();
    place(&s, 1, 100, 100, 0.5);
    place(&s, 3, 200, 100, 0.5);

    s.viewer.pick(PickRequest::at(100.0, 100.0)).expect("pick");
    s.viewer
        .pick(PickRequest::at(200.0, 100.0).with_modifier())
        .expect("pick");
    assert_eq!(s.viewer.selection().to_vec(), vec![id(1), id(3)]);

    // Modifier-Pick auf Selektiertes entfernt nur dieses
    s.viewer
        .pick(PickRequest::at(100.0, 100.0).with_modifier())
        .expect("pick");
    assert_eq!(s.viewer.selection().to_vec(), vec![id(3)]);
}

#[test]
fn miss_clears_selection_without_reading_depth() {
    let mut s = scene();
    s.viewer.set_selection_state(vec![id(2)], true, false);

    let result = s.viewer.pick(PickRequest::at(5.0, 5.0)).expect("pick");
    assert!(result.object.is_none());
    assert!(s.viewer.selection().is_empty());
    assert_eq!(s.viewer.gpu().depth_reads, 0);
}

#[test]
fn positions_outside_the_viewport_are_misses() {
    let mut s = scene();
    place(&s, 1, 799, 10, 0.5);
    s.viewer.set_selection_state(vec![id(2)], true, false);

    for (x, y) in [(5000.0, 10.0), (10.0, 600.0), (-3.0, 10.0)] {
        let result = s.viewer.pick(PickRequest::at(x, y)).expect("kein Readback-Fehler");
        assert!(result.object.is_none());
        assert_eq!(result.normal, Vec3::ZERO);
    }
    assert!(s.viewer.selection().is_empty());
    assert_eq!(s.viewer.gpu().color_reads, 0);
    assert_eq!(s.viewer.gpu().depth_reads, 0);
    assert_eq!(s.viewer.gpu().target, RenderTarget::Main);

    // Letzte Spalte liegt noch im Viewport
    let edge = s.viewer.pick(PickRequest::inspect(799.4, 10.0)).expect("pick");
    assert_eq!(edge.object.map(|o| o.unique_id), Some(id(1)));
}

#[test]
fn hidden_objects_cannot_be_picked() {
    let mut s = scene();
    place(&s, 1, 100, 100, 0.5);
    s.viewer.set_visibility(vec![id(1)], false);

    let result = s.viewer.pick(PickRequest::inspect(100.0, 100.0)).expect("pick");
    assert!(result.object.is_none());
}

#[test]
fn pick_without_position_is_rejected() {
    let mut s = scene();
    let result = s.viewer.pick(PickRequest::default());
    assert!(matches!(result, Err(ViewerError::MissingPickCoordinates)));
}

#[test]
fn pick_selection_publishes_events() {
    let mut s = scene();
    place(&s, 3, 10, 10, 0.5);
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    s.viewer.subscribe(move |event| sink.borrow_mut().push(event.clone()));

    s.viewer.pick(PickRequest::at(10.0, 10.0)).expect("pick");
    assert_eq!(
        *events.borrow(),
        vec![ViewerEvent::SelectionStateChanged {
            ids: vec![id(3)],
            selected: true
        }]
    );
}

// ── Frame-Loop ─────────────────────────────────────────────────────

#[test]
fn soft_dirty_is_rate_limited() {
    let mut s = scene();
    assert!(s.viewer.render_frame(0.0).redrawn);
    assert!(!s.viewer.render_frame(16.0).redrawn);

    s.viewer.mark_dirty(DirtyLevel::Soft);
    assert!(!s.viewer.render_frame(100.0).redrawn);
    assert_eq!(s.viewer.dirty(), DirtyLevel::Soft);
    assert!(s.viewer.render_frame(600.0).redrawn);
    assert_eq!(s.viewer.dirty(), DirtyLevel::Clean);

    s.viewer.mark_dirty(DirtyLevel::Hard);
    s.viewer.mark_dirty(DirtyLevel::Soft);
    assert_eq!(s.viewer.dirty(), DirtyLevel::Hard);
    assert!(s.viewer.render_frame(616.0).redrawn);
}

#[test]
fn soft_redraw_interval_is_inclusive() {
    let mut s = scene();
    assert!(s.viewer.render_frame(1000.0).redrawn);

    s.viewer.mark_dirty(DirtyLevel::Soft);
    assert!(!s.viewer.render_frame(1499.5).redrawn);
    assert!(s.viewer.render_frame(1500.0).redrawn);
    assert_eq!(s.viewer.dirty(), DirtyLevel::Clean);
}

#[test]
fn fps_is_reported_per_window_and_off_without_redraws() {
    let mut s = scene();
    s.viewer.render_frame(0.0);
    s.viewer.render_frame(500.0);
    let report = s.viewer.render_frame(1000.5).fps;
    match report {
        Some(FpsReport::Sampled(fps)) => assert_abs_diff_eq!(fps, 3.0, epsilon = 1e-2),
        other => panic!("unerwartet: {other:?}"),
    }

    assert_eq!(s.viewer.render_frame(1500.0).fps, None);
    assert_eq!(s.viewer.render_frame(2001.0).fps, Some(FpsReport::Off));
}

#[test]
fn animation_listeners_receive_delta_seconds() {
    let mut s = scene();
    let deltas = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&deltas);
    s.viewer.add_animation_listener(move |dt| sink.borrow_mut().push(dt));

    s.viewer.render_frame(1000.0);
    s.viewer.render_frame(1250.0);
    let deltas = deltas.borrow();
    assert_eq!(deltas.len(), 2);
    assert_abs_diff_eq!(deltas[1], 0.25, epsilon = 1e-6);
}

#[test]
fn model_bounds_trigger_one_auto_fit() {
    let mut s = scene();
    s.viewer
        .set_model_bounds(Aabb::new(Vec3::ZERO, Vec3::splat(10.0)));
    let before = *s.viewer.camera().matrices();

    assert!(s.viewer.render_frame(0.0).redrawn);
    assert_ne!(*s.viewer.camera().matrices(), before);
    // Auto-Fit fordert einen weiteren Frame an
    assert_eq!(s.viewer.dirty(), DirtyLevel::Hard);
    assert!(s.viewer.render_frame(16.0).redrawn);
    assert!(!s.viewer.render_frame(32.0).redrawn);
}

#[test]
fn oit_frame_composites_once() {
    let mut s = scene();
    s.viewer.render_frame(0.0);
    let gpu = s.viewer.gpu();
    assert_eq!(gpu.count(&GpuCall::CompositeOit), 1);
    assert_eq!(gpu.count(&GpuCall::Bind(RenderTarget::Oit)), 1);
    assert_eq!(gpu.target, RenderTarget::Main);
}

#[test]
fn simple_transparency_skips_oit_target() {
    let options = ViewerOptions {
        order_independent_transparency: false,
        ..ViewerOptions::default()
    };
    let mut s = scene_with(options);
    s.viewer.render_frame(0.0);
    let gpu = s.viewer.gpu();
    assert_eq!(gpu.count(&GpuCall::CompositeOit), 0);
    assert_eq!(gpu.count(&GpuCall::Bind(RenderTarget::Oit)), 0);
}

#[test]
fn selection_draws_outlines_in_two_widths() {
    let mut s = scene();
    s.viewer.set_selection_state(vec![id(2)], true, false);
    s.viewer.render_frame(0.0);

    let log = s.log.borrow();
    assert_eq!(log.outlines.len(), 2);
    assert_eq!(log.outlines[0], (vec![id(2)], 0.0));
    assert_eq!(log.outlines[1], (vec![id(2)], 0.001));
}

#[test]
fn view_fit_without_bounds_is_an_error() {
    let mut s = scene();
    s.viewer.add_view_object(ViewObject::new(77i64, "IfcProxy", None));

    let result = s.viewer.view_fit(&[id(77)]);
    assert!(matches!(result, Err(ViewerError::NoBoundingBoxes(ids)) if ids == vec![id(77)]));
    assert!(s.viewer.view_fit(&[id(1), id(2)]).is_ok());
}

// ── Schnittebene ───────────────────────────────────────────────────

#[test]
fn section_plane_enables_on_hit_only() {
    let mut s = scene();
    s.viewer
        .set_model_bounds(Aabb::new(Vec3::splat(-10.0), Vec3::splat(10.0)));
    s.viewer.render_frame(0.0);
    place(&s, 1, 400, 300, 0.5);

    assert!(!s.viewer.enable_section_plane([5.0, 5.0]).expect("pick"));
    assert!(s.viewer.section_plane().is_none());

    assert!(s.viewer.enable_section_plane([400.0, 300.0]).expect("pick"));
    let plane = s.viewer.section_plane().expect("aktiv");
    assert_abs_diff_eq!(plane.truncate().length(), 1.0, epsilon = 1e-4);
    // Aktivieren per Pick ändert die Selektion nicht
    assert!(s.viewer.selection().is_empty());
}

#[test]
fn section_frame_carves_stencil_and_draws_cap() {
    let mut s = scene();
    s.viewer
        .set_model_bounds(Aabb::new(Vec3::splat(-10.0), Vec3::splat(10.0)));
    s.viewer.render_frame(0.0);
    place(&s, 1, 400, 300, 0.5);
    s.viewer.enable_section_plane([400.0, 300.0]).expect("pick");

    s.viewer.gpu_mut().calls.clear();
    assert!(s.viewer.render_frame(16.0).redrawn);
    let gpu = s.viewer.gpu();
    assert_eq!(gpu.count(&GpuCall::SectionQuad), 2);
    let ops: Vec<StencilOp> = gpu
        .states()
        .iter()
        .filter_map(|state| state.stencil.map(|st| st.pass_op))
        .collect();
    let increment = ops.iter().position(|op| *op == StencilOp::Increment);
    let decrement = ops.iter().position(|op| *op == StencilOp::Decrement);
    assert!(matches!((increment, decrement), (Some(i), Some(d)) if i < d));
}

#[test]
fn moving_a_disabled_plane_is_ignored() {
    let mut s = scene();
    s.viewer.move_section_plane([10.0, 10.0]);
    assert!(s.viewer.section_plane().is_none());
    assert!(!s.viewer.is_section_plane_moving());
}

#[test]
fn dragging_moves_plane_along_its_normal_and_disable_resets() {
    let mut s = scene();
    s.viewer
        .set_model_bounds(Aabb::new(Vec3::splat(-10.0), Vec3::splat(10.0)));
    s.viewer.render_frame(0.0);
    place(&s, 1, 400, 300, 0.5);
    s.viewer.enable_section_plane([400.0, 300.0]).expect("pick");
    let start = s.viewer.section_plane().expect("aktiv");

    s.viewer.move_section_plane([400.0, 200.0]);
    let moved = s.viewer.section_plane().expect("aktiv");
    assert_eq!(moved.truncate(), start.truncate());
    assert!(s.viewer.is_section_plane_moving());

    s.viewer.disable_section_plane();
    assert!(s.viewer.section_plane().is_none());
    assert!(!s.viewer.is_section_plane_moving());
}
