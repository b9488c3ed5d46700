//! Live view controls
//!
//! Everything the surrounding application may poke between frames lives
//! here: background color, source pan/zoom, debug tint, shard selection and
//! per-slot visibility. The geometric shard data itself is immutable; these
//! knobs are published through an atomic swap so every frame reads one
//! consistent snapshot without locking the render path.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One frame's worth of view settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewState {
    /// Clear color, RGBA in 0..=1.
    pub background: [f32; 4],

    /// Pan offset applied to normalized source coordinates.
    pub pan_x: f64,
    pub pan_y: f64,

    /// Zoom multiplier applied to normalized source coordinates.
    pub zoom: f64,

    /// Blend a flat per-slot color 50/50 over the sampled output.
    pub debug_tint: bool,

    /// Render every visible shard, or only `current_shard`.
    pub show_all: bool,

    /// Selected shard slot when `show_all` is off.
    pub current_shard: usize,

    /// Per-slot visibility, indexed by registry order. Slots beyond the
    /// vector default to visible.
    pub visible: Vec<bool>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            background: [0.0, 0.0, 0.0, 0.0],
            pan_x: 0.0,
            pan_y: 0.0,
            zoom: 1.0,
            debug_tint: false,
            show_all: true,
            current_shard: 0,
            visible: Vec::new(),
        }
    }
}

impl ViewState {
    pub fn is_visible(&self, slot: usize) -> bool {
        self.visible.get(slot).copied().unwrap_or(true)
    }
}

/// Shared publisher for [`ViewState`].
///
/// Writers replace the whole state; readers grab an `Arc` snapshot. A frame
/// rendered from a snapshot can never observe a half-applied update.
pub struct Controls {
    state: ArcSwap<ViewState>,
}

impl Controls {
    pub fn new(initial: ViewState) -> Self {
        Self {
            state: ArcSwap::from_pointee(initial),
        }
    }

    /// The current state; holds whatever was published at call time even if
    /// a writer swaps afterwards.
    pub fn snapshot(&self) -> Arc<ViewState> {
        self.state.load_full()
    }

    fn update(&self, f: impl Fn(&mut ViewState)) {
        self.state.rcu(|current| {
            let mut next = ViewState::clone(current);
            f(&mut next);
            next
        });
    }

    pub fn set_background(&self, background: [f32; 4]) {
        self.update(|s| s.background = background);
    }

    pub fn set_pan_zoom(&self, pan_x: f64, pan_y: f64, zoom: f64) {
        self.update(|s| {
            s.pan_x = pan_x;
            s.pan_y = pan_y;
            s.zoom = zoom;
        });
    }

    pub fn set_debug_tint(&self, on: bool) {
        self.update(|s| s.debug_tint = on);
    }

    pub fn set_show_all(&self, on: bool) {
        self.update(|s| s.show_all = on);
    }

    pub fn select_shard(&self, slot: usize) {
        self.update(|s| s.current_shard = slot);
    }

    /// Toggle one slot, growing the visibility vector as needed.
    pub fn set_visible(&self, slot: usize, on: bool) {
        self.update(|s| {
            if s.visible.len() <= slot {
                s.visible.resize(slot + 1, true);
            }
            s.visible[slot] = on;
        });
    }
}

impl Default for Controls {
    fn default() -> Self {
        Self::new(ViewState::default())
    }
}
