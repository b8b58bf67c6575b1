//! Frame-Loop: Dirty-Zustandsmaschine, Rate-Limit und FPS-Fenster.

use super::Viewer;
use crate::render::{DirtyLevel, GpuContext};
use crate::shared::options::FPS_WINDOW_MS;

/// FPS-Meldung am Ende eines Messfensters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FpsReport {
    /// Frames pro Sekunde im Fenster (mindestens ein Redraw)
    Sampled(f64),
    /// Kein Redraw im Fenster
    Off,
}

/// Ergebnis eines Frame-Callbacks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOutcome {
    /// Szene wurde neu gezeichnet
    pub redrawn: bool,
    /// Gesetzt, wenn ein FPS-Fenster abgeschlossen wurde
    pub fps: Option<FpsReport>,
}

impl<G: GpuContext> Viewer<G> {
    /// Frame-Callback mit dem Zeitstempel des Displays in Millisekunden.
    ///
    /// Hard → sofort neu zeichnen, Soft → nur wenn seit dem letzten
    /// Redraw mindestens das Soft-Intervall vergangen ist, Clean → nichts tun.
    pub fn render_frame(&mut self, now_ms: f64) -> FrameOutcome {
        let seconds = now_ms * 0.001;
        let delta = seconds - self.timing.then;
        self.timing.then = seconds;
        self.timing.frames += 1;

        let redraw = match self.dirty {
            DirtyLevel::Hard => true,
            DirtyLevel::Soft => {
                now_ms - self.timing.last_repaint >= self.options.soft_repaint_interval_ms
            }
            DirtyLevel::Clean => false,
        };

        if redraw {
            let reason = self.dirty;
            self.dirty = DirtyLevel::Clean;
            self.draw_scene(reason);
            self.timing.last_repaint = now_ms;
            self.timing.redraws += 1;
        }

        let elapsed = seconds - self.timing.window_start;
        let fps = if elapsed * 1000.0 >= FPS_WINDOW_MS {
            let report = if self.timing.redraws > 0 {
                FpsReport::Sampled(f64::from(self.timing.frames) / elapsed)
            } else {
                FpsReport::Off
            };
            log::debug!("FPS: {:?}", report);
            self.timing.window_start = seconds;
            self.timing.frames = 0;
            self.timing.redraws = 0;
            Some(report)
        } else {
            None
        };

        for listener in &mut self.animation_listeners {
            listener(delta as f32);
        }

        FrameOutcome { redrawn: redraw, fps }
    }
}
