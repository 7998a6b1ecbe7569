//! Playhead synchronizer: per-frame playback ticking and view
//! reconciliation.

use crate::view::View;

/// `(current_time, playing?)`, owned by the external audio player and read
/// by the core.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Playhead {
    pub current_time: f64,
    pub playing: bool,
}

/// Drives the per-display-frame loop while playing and decides when a
/// repaint is owed.
pub struct PlayheadSync {
    playhead: Playhead,
    last_view: Option<View>,
}

impl Default for PlayheadSync {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayheadSync {
    pub fn new() -> Self {
        Self {
            playhead: Playhead {
                current_time: 0.0,
                playing: false,
            },
            last_view: None,
        }
    }

    pub fn set_playhead(&mut self, current_time: f64, playing: bool) {
        self.playhead = Playhead { current_time, playing };
    }

    pub fn playhead(&self) -> Playhead {
        self.playhead
    }

    /// Called once per display frame. Returns `true` if the view changed
    /// enough to warrant a repaint, per the reconciliation epsilon below.
    /// While paused (`playing == false`), always returns `false` — the loop
    /// only reacts to explicit user events in that state, handled elsewhere.
    pub fn tick(&mut self, current_view: &View) -> bool {
        if !self.playhead.playing {
            return false;
        }
        self.reconcile(current_view)
    }

    /// View-change detection, usable outside playback too (e.g. a
    /// programmatic `setView` while paused).
    pub fn reconcile(&mut self, current_view: &View) -> bool {
        let eps = (current_view.view_duration * 1e-3).max(1e-4);
        let changed = match &self.last_view {
            None => true,
            Some(last) => {
                (current_view.view_start - last.view_start).abs() > eps
                    || (current_view.view_duration - last.view_duration).abs() > eps
            }
        };
        if changed {
            self.last_view = Some(*current_view);
        }
        changed
    }

    /// `x_css` position of the playhead marker, or `None` if there is no
    /// spectrogram loaded (marker hidden).
    pub fn playhead_x_css(
        &self,
        view: &View,
        pps_css: f64,
        w_css: f64,
        has_spectrogram: bool,
    ) -> Option<f64> {
        if !has_spectrogram {
            return None;
        }
        let max_x = w_css.min(view.view_duration * pps_css);
        let x = ((self.playhead.current_time - view.view_start) * pps_css).clamp(0.0, max_x);
        Some(x)
    }
}
