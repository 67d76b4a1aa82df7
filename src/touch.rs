//! Pointer-drag rotation input.
//!
//! Converts raw pointer deltas into an accumulated rotation angle. Dragging
//! below the vertical midline or left of the horizontal midline reverses the
//! respective delta, so a circular drag around the viewport center spins the
//! triangle consistently in one direction.

use std::sync::Mutex;

/// Degrees of rotation per pixel of drag, calibrated at a 320-pixel-wide
/// reference viewport.
pub const TOUCH_SCALE_FACTOR: f32 = 180.0 / 320.0;

/// What the pointer did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerAction {
    Down,
    Move,
    Up,
}

/// A single pointer event in viewport pixel coordinates.
#[derive(Clone, Copy, Debug)]
pub struct PointerEvent {
    pub action: PointerAction,
    pub x: f32,
    pub y: f32,
}

impl PointerEvent {
    pub fn new(action: PointerAction, x: f32, y: f32) -> Self {
        Self { action, x, y }
    }
}

/// Angle plus the last known pointer position.
///
/// The position updates on every event kind, so a press establishes the
/// baseline for the next move's delta.
#[derive(Debug, Default)]
struct InteractionState {
    angle: f32,
    previous_x: f32,
    previous_y: f32,
}

/// Shared rotation state, written by the input side and read by the render
/// side.
///
/// The whole state sits behind one lock so the angle never observes a
/// half-updated position pair. Wrap in an `Arc` to hand the input half to
/// another thread.
#[derive(Debug, Default)]
pub struct RotationInput {
    state: Mutex<InteractionState>,
}

impl RotationInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulated rotation angle in degrees. Unbounded; rotation math
    /// wraps it implicitly.
    pub fn angle(&self) -> f32 {
        self.state.lock().unwrap().angle
    }

    /// Feeds one pointer event, with `viewport` as the current surface size
    /// in pixels. Returns `true` when a new frame should be rendered.
    pub fn apply(&self, event: PointerEvent, viewport: (f32, f32)) -> bool {
        let (width, height) = viewport;
        let mut state = self.state.lock().unwrap();
        let mut rerender = false;

        if event.action == PointerAction::Move {
            let mut dx = event.x - state.previous_x;
            let mut dy = event.y - state.previous_y;

            // Reverse the direction of rotation below the midline.
            if event.y > height / 2.0 {
                dx = -dx;
            }

            // Reverse the direction of rotation left of the midline.
            if event.x < width / 2.0 {
                dy = -dy;
            }

            state.angle += (dx + dy) * TOUCH_SCALE_FACTOR;
            rerender = true;
        }

        state.previous_x = event.x;
        state.previous_y = event.y;
        rerender
    }
}
