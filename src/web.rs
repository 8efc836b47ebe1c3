// Browser host: implements `Host` over web-sys and exposes the runtime to JS.
// DOM events, script loads and timers are queued and drained into the
// controller, so effect code that dispatches events synchronously cannot
// re-enter it.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::rc::{Rc, Weak};
use std::time::Duration;

use gloo_timers::callback::Timeout;
use js_sys::{Function, Reflect};
use tracing::{debug, Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, Event, FocusEvent, HtmlLinkElement, HtmlScriptElement};

use crate::catalog::{EffectManifest, EntryPoint};
use crate::config::EmbedConfig;
use crate::controller::EmbedController;
use crate::effect::{Effect, Mounted, RuntimeHandle, Stoppable, StyleOnly};
use crate::error::{EffectError, EmbedError};
use crate::host::Host;
use crate::registry::EffectRegistry;
use crate::resource::{Requested, ResourceLoader};
use crate::types::{Locator, RegionId, TimerId, Trigger};

/// Set on a `<script data-src>` once it has executed.
const LOADED_ATTRIBUTE: &str = "data-loaded";

const ENTER_EVENTS: [&str; 2] = ["pointerenter", "focusin"];
const LEAVE_EVENTS: [&str; 2] = ["pointerleave", "focusout"];

enum Signal {
    Attach(Element),
    Trigger(RegionId, Trigger<Element>),
    Settled(Locator, Result<(), String>),
    Timer(TimerId),
    StopAll,
    Shutdown,
}

struct Dispatcher {
    controller: RefCell<EmbedController<WebHost>>,
    inbox: RefCell<VecDeque<Signal>>,
}

impl Dispatcher {
    fn post(&self, signal: Signal) {
        self.inbox.borrow_mut().push_back(signal);
        self.drain();
    }

    fn drain(&self) {
        // Already draining further up the stack; the loop there picks it up.
        let Ok(mut controller) = self.controller.try_borrow_mut() else {
            return;
        };
        loop {
            let next = self.inbox.borrow_mut().pop_front();
            let Some(signal) = next else {
                break;
            };
            match signal {
                Signal::Attach(root) => {
                    controller.attach(&root);
                }
                Signal::Trigger(region, trigger) => controller.handle(region, trigger),
                Signal::Settled(locator, outcome) => controller.resource_settled(&locator, outcome),
                Signal::Timer(timer) => controller.timer_fired(timer),
                Signal::StopAll => controller.stop_all(),
                Signal::Shutdown => {
                    controller.detach_all();
                    controller.host_mut().cancel_timers();
                }
            }
        }
    }
}

fn post(dispatcher: &Weak<Dispatcher>, signal: Signal) {
    if let Some(dispatcher) = dispatcher.upgrade() {
        dispatcher.post(signal);
    }
}

struct Listeners {
    card: Element,
    enter: Closure<dyn FnMut(Event)>,
    leave: Closure<dyn FnMut(Event)>,
}

impl Listeners {
    fn detach(&self) {
        for name in ENTER_EVENTS {
            let _ = self
                .card
                .remove_event_listener_with_callback(name, self.enter.as_ref().unchecked_ref());
        }
        for name in LEAVE_EVENTS {
            let _ = self
                .card
                .remove_event_listener_with_callback(name, self.leave.as_ref().unchecked_ref());
        }
    }
}

pub struct WebHost {
    document: Document,
    dispatcher: Weak<Dispatcher>,
    listeners: HashMap<RegionId, Listeners>,
    timers: HashMap<TimerId, Timeout>,
    next_timer: u64,
}

impl WebHost {
    fn new(document: Document, dispatcher: Weak<Dispatcher>) -> Self {
        WebHost {
            document,
            dispatcher,
            listeners: HashMap::new(),
            timers: HashMap::new(),
            next_timer: 0,
        }
    }

    fn cancel_timers(&mut self) {
        self.timers.clear();
    }

    /// Report the outcome of `script` into the queue. A failed element is
    /// removed so the next request for `locator` creates a fresh one.
    fn watch_script(&self, script: &HtmlScriptElement, locator: &Locator) -> Result<(), String> {
        let onload = {
            let dispatcher = self.dispatcher.clone();
            let locator = locator.clone();
            let script = script.clone();
            Closure::once(move || {
                let _ = script.set_attribute(LOADED_ATTRIBUTE, "");
                post(&dispatcher, Signal::Settled(locator, Ok(())));
            })
        };
        let onerror = {
            let dispatcher = self.dispatcher.clone();
            let locator = locator.clone();
            let script = script.clone();
            Closure::once(move || {
                script.remove();
                let reason = format!("failed to load {locator}");
                post(&dispatcher, Signal::Settled(locator, Err(reason)));
            })
        };
        script
            .add_event_listener_with_callback("load", onload.as_ref().unchecked_ref())
            .map_err(describe)?;
        script
            .add_event_listener_with_callback("error", onerror.as_ref().unchecked_ref())
            .map_err(describe)?;
        onload.forget();
        onerror.forget();
        Ok(())
    }

    fn append_to_head(&self, element: &Element) -> Result<(), String> {
        let head = self.document.head().ok_or("document has no <head>")?;
        head.append_child(element).map_err(describe)?;
        Ok(())
    }
}

impl ResourceLoader for WebHost {
    fn load_script(&mut self, locator: &Locator) -> Result<Requested, String> {
        let existing = format!("script[data-src=\"{locator}\"]");
        if let Ok(Some(existing)) = self.document.query_selector(&existing) {
            if existing.has_attribute(LOADED_ATTRIBUTE) {
                return Ok(Requested::Complete);
            }
            // Still in flight, requested by another runtime on this page.
            let existing: HtmlScriptElement = existing
                .dyn_into()
                .map_err(|_| "data-src element is not a <script>".to_string())?;
            self.watch_script(&existing, locator)?;
            return Ok(Requested::Pending);
        }

        let script: HtmlScriptElement = self
            .document
            .create_element("script")
            .map_err(describe)?
            .dyn_into()
            .map_err(|_| "created element is not a <script>".to_string())?;
        script.set_src(locator.as_str());
        // Preserve execution order between dependent scripts.
        script.set_async(false);
        script.set_attribute("data-src", locator.as_str()).map_err(describe)?;
        self.watch_script(&script, locator)?;
        self.append_to_head(&script)?;
        Ok(Requested::Pending)
    }

    fn load_style(&mut self, locator: &Locator) -> Result<(), String> {
        let existing = format!("link[data-href=\"{locator}\"]");
        if let Ok(Some(_)) = self.document.query_selector(&existing) {
            return Ok(());
        }

        let link: HtmlLinkElement = self
            .document
            .create_element("link")
            .map_err(describe)?
            .dyn_into()
            .map_err(|_| "created element is not a <link>".to_string())?;
        link.set_rel("stylesheet");
        link.set_href(locator.as_str());
        link.set_attribute("data-href", locator.as_str()).map_err(describe)?;
        self.append_to_head(&link)
    }
}

impl Host for WebHost {
    type Node = Element;

    fn find_all(&self, root: &Element, attribute: &str) -> Vec<Element> {
        let Ok(nodes) = root.query_selector_all(&format!("[{attribute}]")) else {
            return Vec::new();
        };
        (0..nodes.length())
            .filter_map(|i| nodes.item(i))
            .filter_map(|node| node.dyn_into::<Element>().ok())
            .collect()
    }

    fn attribute(&self, node: &Element, name: &str) -> Option<String> {
        node.get_attribute(name)
    }

    fn query(&self, node: &Element, selector: &str) -> Option<Element> {
        node.query_selector(selector).ok().flatten()
    }

    fn contains(&self, ancestor: &Element, node: &Element) -> bool {
        ancestor.contains(Some(node.as_ref()))
    }

    fn is_connected(&self, node: &Element) -> bool {
        node.is_connected()
    }

    fn add_class(&mut self, node: &Element, class: &str) {
        let _ = node.class_list().add_1(class);
    }

    fn remove_class(&mut self, node: &Element, class: &str) {
        let _ = node.class_list().remove_1(class);
    }

    fn has_class(&self, node: &Element, class: &str) -> bool {
        node.class_list().contains(class)
    }

    fn bind(&mut self, card: &Element, region: RegionId) {
        let enter = {
            let dispatcher = self.dispatcher.clone();
            Closure::wrap(Box::new(move |event: Event| {
                let trigger = if event.type_() == "focusin" {
                    Trigger::FocusIn
                } else {
                    Trigger::PointerEnter
                };
                post(&dispatcher, Signal::Trigger(region, trigger));
            }) as Box<dyn FnMut(Event)>)
        };
        let leave = {
            let dispatcher = self.dispatcher.clone();
            Closure::wrap(Box::new(move |event: Event| {
                let trigger = match event.dyn_ref::<FocusEvent>() {
                    Some(focus) => Trigger::FocusOut {
                        related: focus
                            .related_target()
                            .and_then(|target| target.dyn_into::<Element>().ok()),
                    },
                    None => Trigger::PointerLeave,
                };
                post(&dispatcher, Signal::Trigger(region, trigger));
            }) as Box<dyn FnMut(Event)>)
        };

        for name in ENTER_EVENTS {
            let _ = card.add_event_listener_with_callback(name, enter.as_ref().unchecked_ref());
        }
        for name in LEAVE_EVENTS {
            let _ = card.add_event_listener_with_callback(name, leave.as_ref().unchecked_ref());
        }

        debug_assert!(!self.listeners.contains_key(&region), "{region} bound twice");
        self.listeners.insert(
            region,
            Listeners {
                card: card.clone(),
                enter,
                leave,
            },
        );
    }

    fn unbind(&mut self, _card: &Element, region: RegionId) {
        if let Some(listeners) = self.listeners.remove(&region) {
            listeners.detach();
        }
    }

    fn set_timer(&mut self, delay: Duration) -> TimerId {
        let id = TimerId::new(self.next_timer);
        self.next_timer += 1;
        let dispatcher = self.dispatcher.clone();
        let millis = u32::try_from(delay.as_millis()).unwrap_or(u32::MAX);
        let timeout = Timeout::new(millis, move || post(&dispatcher, Signal::Timer(id)));
        self.timers.insert(id, timeout);
        id
    }

    fn clear_timer(&mut self, timer: TimerId) {
        // Dropping a Timeout cancels it.
        self.timers.remove(&timer);
    }
}

#[derive(Debug, Clone, Copy)]
enum Convention {
    Cleanup,
    Controller,
    Instance,
}

/// A JS-side runtime handle, normalized to a single teardown call.
enum JsHandle {
    Cleanup(Function),
    Method { target: JsValue, method: &'static str },
}

impl Stoppable<WebHost> for JsHandle {
    fn stop(self: Box<Self>, _host: &mut WebHost) -> Result<(), EffectError> {
        match *self {
            JsHandle::Cleanup(cleanup) => cleanup.call0(&JsValue::NULL).map(drop).map_err(js_error),
            JsHandle::Method { target, method } => call_method(&target, method),
        }
    }
}

fn resolve_entry(manifest: &EffectManifest) -> Result<Box<dyn Effect<WebHost>>, EmbedError> {
    let (convention, global, mount) = match &manifest.entry {
        EntryPoint::None => return Ok(Box::new(StyleOnly)),
        EntryPoint::Cleanup { global, mount } => (Convention::Cleanup, global.clone(), mount.clone()),
        EntryPoint::Controller { global, mount } => {
            (Convention::Controller, global.clone(), mount.clone())
        }
        EntryPoint::Instance { global, mount } => (Convention::Instance, global.clone(), mount.clone()),
    };
    Ok(Box::new(Mounted::new(mount, move |_host: &mut WebHost, target: &Element| {
        launch(convention, &global, target)
    })))
}

fn launch(
    convention: Convention,
    global: &str,
    target: &Element,
) -> Result<Option<RuntimeHandle<WebHost>>, EffectError> {
    let Some(window) = web_sys::window() else {
        return Ok(None);
    };
    let entry = Reflect::get(&window, &JsValue::from_str(global)).map_err(js_error)?;
    let Some(entry) = entry.dyn_ref::<Function>() else {
        debug!(global, "entry point not defined on window");
        return Ok(None);
    };

    let produced = entry.call1(&JsValue::NULL, target).map_err(js_error)?;
    if produced.is_undefined() || produced.is_null() {
        return Ok(None);
    }

    let handle = match convention {
        Convention::Cleanup => match produced.dyn_into::<Function>() {
            Ok(cleanup) => JsHandle::Cleanup(cleanup),
            Err(_) => return Ok(None),
        },
        Convention::Controller => {
            call_method(&produced, "start")?;
            JsHandle::Method {
                target: produced,
                method: "stop",
            }
        }
        Convention::Instance => JsHandle::Method {
            target: produced,
            method: "unmount",
        },
    };
    Ok(Some(RuntimeHandle::new(handle)))
}

/// Call `target[name]()` if it is a function.
fn call_method(target: &JsValue, name: &str) -> Result<(), EffectError> {
    let method = Reflect::get(target, &JsValue::from_str(name)).map_err(js_error)?;
    match method.dyn_ref::<Function>() {
        Some(method) => method.call0(target).map(drop).map_err(js_error),
        None => Ok(()),
    }
}

fn js_error(err: JsValue) -> EffectError {
    EffectError::new(describe(err))
}

fn describe(err: JsValue) -> String {
    if let Some(message) = err.as_string() {
        return message;
    }
    if let Some(error) = err.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    format!("{err:?}")
}

/// Buffers one formatted event and writes it to the browser console on drop.
struct ConsoleWriter {
    level: Level,
    buffer: Vec<u8>,
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.buffer);
        let line = JsValue::from_str(text.trim_end());
        if self.level == Level::ERROR {
            web_sys::console::error_1(&line);
        } else if self.level == Level::WARN {
            web_sys::console::warn_1(&line);
        } else if self.level == Level::INFO {
            web_sys::console::info_1(&line);
        } else {
            web_sys::console::debug_1(&line);
        }
    }
}

struct ConsoleMakeWriter;

impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter {
            level: Level::INFO,
            buffer: Vec::new(),
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        ConsoleWriter {
            level: *meta.level(),
            buffer: Vec::new(),
        }
    }
}

fn init_logging(level: Level) {
    // A second runtime on the same page keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_writer(ConsoleMakeWriter)
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .try_init();
}

fn to_js(err: EmbedError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Embed controller exposed to the gallery page.
#[wasm_bindgen]
pub struct EmbedRuntime {
    dispatcher: Rc<Dispatcher>,
}

#[wasm_bindgen]
impl EmbedRuntime {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<EmbedRuntime, JsValue> {
        let config = EmbedConfig::from_json(config_json).map_err(to_js)?;
        init_logging(config.level().map_err(to_js)?);

        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| JsValue::from_str("no document available"))?;
        let registry = EffectRegistry::from_manifests(&config.effects, resolve_entry).map_err(to_js)?;
        let settings = config.settings;

        let dispatcher = Rc::new_cyclic(|weak| Dispatcher {
            controller: RefCell::new(EmbedController::new(
                settings,
                registry,
                WebHost::new(document, weak.clone()),
            )),
            inbox: RefCell::new(VecDeque::new()),
        });
        Ok(EmbedRuntime { dispatcher })
    }

    /// Bind the cards under `root`. Call again after every re-render.
    pub fn attach(&self, root: Element) {
        self.dispatcher.post(Signal::Attach(root));
    }

    /// Stop every running effect. Cards stay bound.
    pub fn stop_all(&self) {
        self.dispatcher.post(Signal::StopAll);
    }

    pub fn region_count(&self) -> u32 {
        self.dispatcher
            .controller
            .try_borrow()
            .map(|controller| controller.region_count() as u32)
            .unwrap_or(0)
    }
}

impl Drop for EmbedRuntime {
    fn drop(&mut self) {
        self.dispatcher.post(Signal::Shutdown);
    }
}

/// Stock gallery setup: default catalog and markup conventions.
#[wasm_bindgen(js_name = attachEmbedController)]
pub fn attach_embed_controller(root: Element) -> Result<EmbedRuntime, JsValue> {
    let runtime = EmbedRuntime::new("{}")?;
    runtime.attach(root);
    Ok(runtime)
}
