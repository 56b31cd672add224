use std::collections::HashSet;

use winit::{
    event::{ElementState, KeyEvent, MouseButton},
    keyboard::{KeyCode, PhysicalKey},
};

use crate::math::Vec2;
use crate::render::ViewportMapper;

/// Keyboard, mouse button and cursor state, updated from winit events.
pub struct InputState {
    keys_down: HashSet<KeyCode>,
    keys_pressed: HashSet<KeyCode>,
    buttons_down: HashSet<MouseButton>,
    buttons_pressed: HashSet<MouseButton>,
    /// Cursor in physical window pixels.
    cursor: Vec2,
}

impl InputState {
    pub fn new() -> Self {
        Self {
            keys_down: HashSet::new(),
            keys_pressed: HashSet::new(),
            buttons_down: HashSet::new(),
            buttons_pressed: HashSet::new(),
            cursor: Vec2::ZERO,
        }
    }

    /// Clear per-frame pressed flags.
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
        self.buttons_pressed.clear();
    }

    pub fn handle_key(&mut self, event: &KeyEvent) {
        if let PhysicalKey::Code(code) = event.physical_key {
            self.set_key(code, event.state);
        }
    }

    pub fn set_key(&mut self, code: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => {
                if self.keys_down.insert(code) {
                    self.keys_pressed.insert(code);
                }
            }
            ElementState::Released => {
                self.keys_down.remove(&code);
            }
        }
    }

    pub fn handle_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        match state {
            ElementState::Pressed => {
                if self.buttons_down.insert(button) {
                    self.buttons_pressed.insert(button);
                }
            }
            ElementState::Released => {
                self.buttons_down.remove(&button);
            }
        }
    }

    pub fn handle_cursor_moved(&mut self, x: f64, y: f64) {
        self.cursor = Vec2::new(x as f32, y as f32);
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys_down.contains(&key)
    }

    /// True only on the frame the key went down.
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    pub fn is_mouse_down(&self, button: MouseButton) -> bool {
        self.buttons_down.contains(&button)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.buttons_pressed.contains(&button)
    }

    /// Cursor position in physical window pixels.
    pub fn cursor(&self) -> Vec2 {
        self.cursor
    }

    /// Cursor position in the virtual coordinates content is drawn in.
    pub fn cursor_virtual(&self, viewport: &ViewportMapper) -> Vec2 {
        viewport.screen_to_virtual(self.cursor)
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pressed_lasts_one_frame() {
        let mut input = InputState::new();
        input.set_key(KeyCode::Digit1, ElementState::Pressed);
        assert!(input.is_key_pressed(KeyCode::Digit1));
        input.begin_frame();
        assert!(!input.is_key_pressed(KeyCode::Digit1));
        assert!(input.is_key_down(KeyCode::Digit1));
        // key repeat does not re-trigger
        input.set_key(KeyCode::Digit1, ElementState::Pressed);
        assert!(!input.is_key_pressed(KeyCode::Digit1));
    }

    #[test]
    fn cursor_maps_through_viewport() {
        let mut viewport = ViewportMapper::new(0.0, 0.0, 960, 540);
        viewport.resize(1280, 1024);
        let mut input = InputState::new();
        input.handle_cursor_moved(640.0, 512.0);
        let virt = input.cursor_virtual(&viewport);
        assert!((virt.x - 480.0).abs() < 1e-3);
        assert!((virt.y - 270.0).abs() < 1e-3);
    }
}
