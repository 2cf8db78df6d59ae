// requestAnimationFrame loop that reschedules itself until stopped
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use crate::console_error;
use crate::error::SceneError;

type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut()>>>>;

pub struct RenderLoop {
    callback: FrameCallback,
    pending: Rc<Cell<Option<i32>>>,
}

fn request_frame(callback: &Closure<dyn FnMut()>) -> Result<i32, SceneError> {
    let window = web_sys::window().ok_or_else(|| SceneError::Dom("no window".to_string()))?;
    window
        .request_animation_frame(callback.as_ref().unchecked_ref())
        .map_err(|e| SceneError::Dom(format!("requestAnimationFrame failed: {:?}", e)))
}

impl RenderLoop {
    /// Call `on_frame` once per animation frame, starting with the next one.
    pub fn start(mut on_frame: impl FnMut() + 'static) -> Result<Self, SceneError> {
        let callback: FrameCallback = Rc::new(RefCell::new(None));
        let pending = Rc::new(Cell::new(None));

        let self_ref = callback.clone();
        let pending_ref = pending.clone();
        *callback.borrow_mut() = Some(Closure::new(move || {
            pending_ref.set(None);
            on_frame();
            // The slot is emptied by `stop`; then the loop ends here.
            if let Some(cb) = self_ref.borrow().as_ref() {
                match request_frame(cb) {
                    Ok(id) => pending_ref.set(Some(id)),
                    Err(e) => console_error!("Render loop stopped: {}", e),
                }
            }
        }));

        let id = match callback.borrow().as_ref() {
            Some(cb) => request_frame(cb)?,
            None => return Err(SceneError::Dom("render callback missing".to_string())),
        };
        pending.set(Some(id));
        Ok(Self { callback, pending })
    }

    pub fn stop(&self) {
        if let Some(id) = self.pending.take() {
            if let Some(window) = web_sys::window() {
                let _ = window.cancel_animation_frame(id);
            }
        }
        // Dropping the closure breaks the Rc cycle it holds on itself.
        self.callback.borrow_mut().take();
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
