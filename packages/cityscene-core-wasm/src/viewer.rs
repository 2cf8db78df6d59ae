// Browser entry point: canvas, input, asset loads and the frame loop
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use gloo_net::http::Request;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{EventTarget, HtmlCanvasElement, HtmlElement, PointerEvent, WheelEvent};

use crate::config::ViewerConfig;
use crate::error::SceneError;
use crate::gltf_model::load_glb;
use crate::gpu_renderer::GpuRenderer;
use crate::render_loop::RenderLoop;
use crate::scene::{AssetState, SceneContext};
use crate::{console_error, console_log};

const BUTTON_PRIMARY: i16 = 0;

type Listener = (EventTarget, &'static str, Closure<dyn FnMut(web_sys::Event)>);

async fn fetch_bytes(url: &str) -> Result<Vec<u8>, SceneError> {
    let fetch_err = |reason: String| SceneError::Fetch {
        url: url.to_string(),
        reason,
    };
    let response = Request::get(url)
        .send()
        .await
        .map_err(|e| fetch_err(e.to_string()))?;
    if !response.ok() {
        return Err(fetch_err(format!("HTTP {}", response.status())));
    }
    response.binary().await.map_err(|e| fetch_err(e.to_string()))
}

async fn fetch_text(url: &str) -> Result<String, SceneError> {
    let bytes = fetch_bytes(url).await?;
    String::from_utf8(bytes).map_err(|e| SceneError::Parse {
        what: "GeoJSON",
        reason: e.to_string(),
    })
}

fn dom_err(e: JsValue) -> SceneError {
    SceneError::Dom(format!("{:?}", e))
}

fn window_size() -> Result<(u32, u32), SceneError> {
    let window = web_sys::window().ok_or_else(|| SceneError::Dom("no window".to_string()))?;
    let read = |v: Result<JsValue, JsValue>| v.ok().and_then(|v| v.as_f64()).unwrap_or(1.0);
    Ok((read(window.inner_width()) as u32, read(window.inner_height()) as u32))
}

struct ViewerInner {
    context: Rc<RefCell<SceneContext>>,
    renderer: Rc<RefCell<GpuRenderer>>,
    canvas: HtmlCanvasElement,
    labels: Rc<Vec<HtmlElement>>,
    listeners: RefCell<Vec<Listener>>,
    render_loop: RefCell<Option<RenderLoop>>,
}

impl ViewerInner {
    fn listen(
        &self,
        target: &EventTarget,
        event: &'static str,
        handler: impl FnMut(web_sys::Event) + 'static,
    ) -> Result<(), SceneError> {
        let closure = Closure::<dyn FnMut(web_sys::Event)>::new(handler);
        target
            .add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())
            .map_err(dom_err)?;
        self.listeners
            .borrow_mut()
            .push((target.clone(), event, closure));
        Ok(())
    }

    fn resize(&self) -> Result<(), SceneError> {
        let (width, height) = window_size()?;
        self.canvas.set_width(width.max(1));
        self.canvas.set_height(height.max(1));
        let mut renderer = self.renderer.borrow_mut();
        self.context
            .borrow_mut()
            .resize(width, height, &mut *renderer);
        Ok(())
    }
}

/// A running scene bound to one canvas.
#[wasm_bindgen]
pub struct Viewer {
    inner: Rc<ViewerInner>,
}

#[wasm_bindgen]
impl Viewer {
    /// Set up the canvas with id `canvas_id`, start loading the configured assets
    /// and begin rendering. `config` may be `undefined` for the defaults.
    pub async fn start(canvas_id: String, config: JsValue) -> Result<Viewer, JsValue> {
        let config = ViewerConfig::from_js(config)?;
        let window = web_sys::window().ok_or_else(|| SceneError::Dom("no window".to_string()))?;
        let document = window
            .document()
            .ok_or_else(|| SceneError::Dom("no document".to_string()))?;
        let canvas = document
            .get_element_by_id(&canvas_id)
            .ok_or_else(|| SceneError::Dom(format!("no element with id '{}'", canvas_id)))?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| SceneError::Dom(format!("'{}' is not a canvas", canvas_id)))?;

        let (width, height) = window_size()?;
        canvas.set_width(width.max(1));
        canvas.set_height(height.max(1));

        let renderer = GpuRenderer::new(canvas.clone(), width, height).await?;
        let context = SceneContext::new(config, width, height);

        let mut labels = Vec::new();
        let body = document
            .body()
            .ok_or_else(|| SceneError::Dom("no body".to_string()))?;
        for label in &context.scene.labels {
            let element = document
                .create_element("div")
                .map_err(dom_err)?
                .dyn_into::<HtmlElement>()
                .map_err(|_| SceneError::Dom("label is not an HtmlElement".to_string()))?;
            element.set_text_content(Some(&label.text));
            element.set_class_name("scene-label");
            let style = element.style();
            for (name, value) in [
                ("position", "fixed"),
                ("pointer-events", "none"),
                ("transform", "translate(-50%, -50%)"),
                ("font", "14px sans-serif"),
                ("display", "none"),
            ] {
                style.set_property(name, value).map_err(dom_err)?;
            }
            body.append_child(&element).map_err(dom_err)?;
            labels.push(element);
        }

        let inner = Rc::new(ViewerInner {
            context: Rc::new(RefCell::new(context)),
            renderer: Rc::new(RefCell::new(renderer)),
            canvas,
            labels: Rc::new(labels),
            listeners: RefCell::new(Vec::new()),
            render_loop: RefCell::new(None),
        });

        wire_controls(&inner)?;
        {
            let weak = Rc::downgrade(&inner);
            inner.listen(window.as_ref(), "resize", move |_| {
                if let Some(inner) = weak.upgrade() {
                    if let Err(e) = inner.resize() {
                        console_error!("Resize failed: {}", e);
                    }
                }
            })?;
        }

        spawn_loads(&inner.context);
        let render_loop = start_render_loop(&inner)?;
        *inner.render_loop.borrow_mut() = Some(render_loop);

        console_log!("Viewer started on #{} ({}x{})", canvas_id, width, height);
        Ok(Viewer { inner })
    }

    /// Match the drawing buffer and camera to the current window size.
    pub fn resize(&self) -> Result<(), JsValue> {
        Ok(self.inner.resize()?)
    }

    #[wasm_bindgen(getter, js_name = modelState)]
    pub fn model_state(&self) -> String {
        match &self.inner.context.borrow().model_state {
            AssetState::Idle => "idle".to_string(),
            AssetState::Loading => "loading".to_string(),
            AssetState::Loaded => "loaded".to_string(),
            AssetState::Failed(reason) => format!("failed: {}", reason),
        }
    }

    /// Stop rendering, detach listeners and labels, and drop scene content.
    pub fn dispose(&self) {
        if let Some(render_loop) = self.inner.render_loop.borrow_mut().take() {
            render_loop.stop();
        }
        for (target, event, closure) in self.inner.listeners.borrow_mut().drain(..) {
            let _ = target.remove_event_listener_with_callback(event, closure.as_ref().unchecked_ref());
        }
        for label in self.inner.labels.iter() {
            label.remove();
        }
        self.inner.context.borrow_mut().dispose();
        console_log!("Viewer disposed");
    }
}

fn spawn_loads(context: &Rc<RefCell<SceneContext>>) {
    let (model_url, buildings_url) = {
        let ctx = context.borrow();
        (ctx.config.model_url.clone(), ctx.config.buildings_url.clone())
    };

    if let Some(url) = model_url {
        context.borrow_mut().begin_model_load();
        let context = context.clone();
        spawn_local(async move {
            let result = match fetch_bytes(&url).await {
                Ok(bytes) => load_glb(&bytes),
                Err(e) => Err(e),
            };
            context.borrow_mut().finish_model_load(result);
        });
    }

    if let Some(url) = buildings_url {
        context.borrow_mut().begin_buildings_load();
        let context = context.clone();
        spawn_local(async move {
            let result = fetch_text(&url).await;
            context.borrow_mut().finish_buildings_load(result);
        });
    }
}

fn start_render_loop(inner: &Rc<ViewerInner>) -> Result<RenderLoop, SceneError> {
    let context = inner.context.clone();
    let renderer = inner.renderer.clone();
    let labels = inner.labels.clone();
    let canvas = inner.canvas.clone();
    let mut last_error: Option<String> = None;

    RenderLoop::start(move || {
        let mut ctx = context.borrow_mut();
        let mut renderer = renderer.borrow_mut();
        match ctx.render(&mut *renderer) {
            Ok(()) => last_error = None,
            Err(e) => {
                let message = e.to_string();
                // Report each distinct failure once instead of every frame.
                if last_error.as_deref() != Some(message.as_str()) {
                    console_error!("Render failed: {}", message);
                    last_error = Some(message);
                }
            }
        }

        let rect = canvas.get_bounding_client_rect();
        let positions = ctx.label_positions(rect.width(), rect.height());
        for (element, position) in labels.iter().zip(positions) {
            let style = element.style();
            let _ = match position {
                Some([x, y]) => style
                    .set_property("left", &format!("{}px", rect.left() + x))
                    .and_then(|_| style.set_property("top", &format!("{}px", rect.top() + y)))
                    .and_then(|_| style.set_property("display", "block")),
                None => style.set_property("display", "none"),
            };
        }
    })
}

fn wire_controls(inner: &Rc<ViewerInner>) -> Result<(), SceneError> {
    let canvas: EventTarget = inner.canvas.clone().into();
    // Last pointer position and whether the drag pans instead of rotating.
    let drag: Rc<Cell<Option<(f64, f64, bool)>>> = Rc::new(Cell::new(None));

    {
        let drag = drag.clone();
        let canvas_el = inner.canvas.clone();
        inner.listen(&canvas, "pointerdown", move |event| {
            if let Some(event) = event.dyn_ref::<PointerEvent>() {
                let pan = event.button() != BUTTON_PRIMARY || event.shift_key();
                drag.set(Some((event.client_x() as f64, event.client_y() as f64, pan)));
                let _ = canvas_el.set_pointer_capture(event.pointer_id());
            }
        })?;
    }
    {
        let drag = drag.clone();
        let context = inner.context.clone();
        let canvas_el = inner.canvas.clone();
        inner.listen(&canvas, "pointermove", move |event| {
            let (Some(event), Some((x, y, pan))) = (event.dyn_ref::<PointerEvent>(), drag.get()) else {
                return;
            };
            let (nx, ny) = (event.client_x() as f64, event.client_y() as f64);
            let viewport_height = canvas_el.client_height() as f64;
            let mut ctx = context.borrow_mut();
            let ctx = &mut *ctx;
            if pan {
                ctx.controls.pan(nx - x, ny - y, viewport_height, &ctx.camera);
            } else {
                ctx.controls.rotate(nx - x, ny - y, viewport_height);
            }
            drag.set(Some((nx, ny, pan)));
        })?;
    }
    for event in ["pointerup", "pointercancel"] {
        let drag = drag.clone();
        inner.listen(&canvas, event, move |_| drag.set(None))?;
    }
    {
        let context = inner.context.clone();
        inner.listen(&canvas, "wheel", move |event| {
            if let Some(wheel) = event.dyn_ref::<WheelEvent>() {
                event.prevent_default();
                context.borrow_mut().controls.zoom(wheel.delta_y());
            }
        })?;
    }
    // Secondary drag pans, so keep the browser menu out of the way.
    inner.listen(&canvas, "contextmenu", |event| event.prevent_default())?;
    Ok(())
}
