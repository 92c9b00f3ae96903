//! Display and keyboard collaborator.
//!
//! The tracker hands each frame to a [`DisplayInterface`] along with the
//! annotations for the configured verbosity level, and gets back at most one
//! key press. Polling must not block the loop.

use ndarray::ArrayView2;
use shared::camera_interface::RegionGeometry;
use std::collections::VecDeque;

/// Key codes a display can report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Left,
    Up,
    Right,
    Down,
}

/// Manual mirror nudge direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeDirection {
    Left,
    Up,
    Right,
    Down,
}

impl NudgeDirection {
    /// Mirror change for one nudge of size `increment`
    pub fn delta(self, increment: f64) -> (f64, f64) {
        match self {
            NudgeDirection::Left => (-increment, 0.0),
            NudgeDirection::Right => (increment, 0.0),
            NudgeDirection::Up => (0.0, increment),
            NudgeDirection::Down => (0.0, -increment),
        }
    }
}

/// What a key press asks the tracker to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    ToggleTracking,
    Nudge(NudgeDirection),
}

/// Fixed key map: `q` quits, `t` toggles tracking, arrows nudge the mirror
pub fn key_action(key: Key) -> Option<KeyAction> {
    match key {
        Key::Char('q') => Some(KeyAction::Quit),
        Key::Char('t') => Some(KeyAction::ToggleTracking),
        Key::Left => Some(KeyAction::Nudge(NudgeDirection::Left)),
        Key::Up => Some(KeyAction::Nudge(NudgeDirection::Up)),
        Key::Right => Some(KeyAction::Nudge(NudgeDirection::Right)),
        Key::Down => Some(KeyAction::Nudge(NudgeDirection::Down)),
        Key::Char(_) => None,
    }
}

/// Overlays to draw on a frame, all in the frame's own pixel coordinates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayAnnotations {
    pub spot: Option<(f64, f64)>,
    pub setpoint: Option<(f64, f64)>,
    pub region_outline: Option<RegionGeometry>,
}

impl DisplayAnnotations {
    /// Annotations for a verbosity level.
    ///
    /// 0 draws nothing, 1 adds the spot, 2 adds the setpoint and 3 adds the
    /// region outline while full-frame readout is active.
    pub fn for_level(
        level: u8,
        spot: Option<(f64, f64)>,
        setpoint: (f64, f64),
        roi_region: RegionGeometry,
        region_mode_active: bool,
    ) -> Self {
        Self {
            spot: if level >= 1 { spot } else { None },
            setpoint: (level >= 2).then_some(setpoint),
            region_outline: (level >= 3 && !region_mode_active).then_some(roi_region),
        }
    }
}

/// Frame viewer that also reports key presses
pub trait DisplayInterface {
    /// Show `frame` with `annotations` and return a pending key, if any.
    fn render_and_poll_key(
        &mut self,
        frame: ArrayView2<u16>,
        annotations: &DisplayAnnotations,
    ) -> Option<Key>;
}

impl DisplayInterface for Box<dyn DisplayInterface> {
    fn render_and_poll_key(
        &mut self,
        frame: ArrayView2<u16>,
        annotations: &DisplayAnnotations,
    ) -> Option<Key> {
        (**self).render_and_poll_key(frame, annotations)
    }
}

/// Display that renders nothing and replays a scripted key per frame
#[derive(Debug, Default)]
pub struct ScriptedDisplay {
    keys: VecDeque<Option<Key>>,
    frames_rendered: usize,
    last_annotations: Option<DisplayAnnotations>,
}

impl ScriptedDisplay {
    /// `keys[i]` is returned for the i-th rendered frame; afterwards no keys
    pub fn new(keys: Vec<Option<Key>>) -> Self {
        Self {
            keys: keys.into(),
            ..Default::default()
        }
    }

    /// Press `key` on the frame rendered for step `step`
    pub fn key_at(step: usize, key: Key) -> Self {
        let mut keys = vec![None; step];
        keys.push(Some(key));
        Self::new(keys)
    }

    pub fn frames_rendered(&self) -> usize {
        self.frames_rendered
    }

    pub fn last_annotations(&self) -> Option<&DisplayAnnotations> {
        self.last_annotations.as_ref()
    }
}

impl DisplayInterface for ScriptedDisplay {
    fn render_and_poll_key(
        &mut self,
        _frame: ArrayView2<u16>,
        annotations: &DisplayAnnotations,
    ) -> Option<Key> {
        self.frames_rendered += 1;
        self.last_annotations = Some(annotations.clone());
        self.keys.pop_front().flatten()
    }
}
