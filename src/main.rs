//! Viewer-Probe.
//!
//! Erstellt einen headless GPU-Kontext, rendert einen Frame und pickt in
//! der Bildmitte. Dient als Smoke-Test für Treiber und Konfiguration.

use anyhow::Context;
use bim_tile_viewer::{PickRequest, Viewer, ViewerOptions, WgpuContext};

fn main() -> anyhow::Result<()> {
    // Logger initialisieren
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("BIM Tile Viewer v{} startet...", env!("CARGO_PKG_VERSION"));

    let options = ViewerOptions::load_from_file(&ViewerOptions::config_path());
    let mut gpu = WgpuContext::new_headless(options.viewport_width, options.viewport_height)
        .context("GPU-Kontext konnte nicht erstellt werden")?;
    gpu.set_section_cap_color(options.section_cap_color);

    let mut viewer = Viewer::new(gpu, options);
    let outcome = viewer.render_frame(0.0);
    log::info!("Erster Frame: neu gezeichnet={}", outcome.redrawn);

    let (width, height) = viewer.dimensions();
    let picked = viewer
        .pick(PickRequest::inspect(width as f32 * 0.5, height as f32 * 0.5))
        .context("Pick in der Bildmitte fehlgeschlagen")?;
    match &picked.object {
        Some(object) => log::info!("Getroffen: {} ({})", object.unique_id, object.type_name),
        None => log::info!(
            "Kein Objekt getroffen, Far-Plane bei {:?}",
            picked.coordinates
        ),
    }

    Ok(())
}
