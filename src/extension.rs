//! Extension points: data-driven behavior contributed by plugins.
//!
//! Host types do not get patched. Instead the host defines named extension
//! points up front and its call sites iterate the registered handlers,
//! skipping any whose owning plugin is currently disabled. What used to be a
//! hidden mangled method name is a plain [`HandlerId`] token returned at
//! registration time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::settings::EnabledCheck;

/// Boxed handler function. Receives the call-site arguments as a JSON value
/// and produces a JSON value.
pub type HandlerFn = Box<dyn Fn(&Value) -> Value + Send + Sync>;

/// Opaque identifier for a registered handler, unique across plugins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) String);

impl HandlerId {
    /// The identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Model lifecycle events a plugin can hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackEvent {
    /// Before a record is first persisted.
    BeforeCreate,
    /// After a record is first persisted.
    AfterCreate,
    /// Before any save.
    BeforeSave,
    /// After any save.
    AfterSave,
    /// Before a record is destroyed.
    BeforeDestroy,
    /// After a record is destroyed.
    AfterDestroy,
}

impl CallbackEvent {
    /// Wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeCreate => "before_create",
            Self::AfterCreate => "after_create",
            Self::BeforeSave => "before_save",
            Self::AfterSave => "after_save",
            Self::BeforeDestroy => "before_destroy",
            Self::AfterDestroy => "after_destroy",
        }
    }

    /// Extension-point name for this event on a model, e.g.
    /// `post.before_save`.
    pub fn point_name(&self, model: &str) -> String {
        format!("{}.{}", model.to_lowercase(), self.as_str())
    }
}

impl std::fmt::Display for CallbackEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered handler plus the state needed to gate it at call time.
pub struct Handler {
    /// Generated identifier.
    pub id: HandlerId,
    /// Owning plugin name.
    pub plugin: String,
    /// Call-time enablement predicate of the owning plugin.
    pub enabled: EnabledCheck,
    func: HandlerFn,
}

impl Handler {
    /// Create a handler.
    pub fn new(id: HandlerId, plugin: impl Into<String>, enabled: EnabledCheck, func: HandlerFn) -> Self {
        Self {
            id,
            plugin: plugin.into(),
            enabled,
            func,
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("plugin", &self.plugin)
            .finish()
    }
}

/// Registry of host-defined extension points and their ordered handler
/// lists.
pub struct ExtensionPoints {
    points: RwLock<HashMap<String, Vec<Handler>>>,
    frozen: AtomicBool,
}

impl ExtensionPoints {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            points: RwLock::new(HashMap::new()),
            frozen: AtomicBool::new(false),
        }
    }

    /// Define an extension point. Host call sites own the vocabulary;
    /// registering against an undefined name is a typed error rather than a
    /// reflective lookup.
    pub fn define(&self, name: impl Into<String>) {
        self.points.write().entry(name.into()).or_default();
    }

    /// Check whether a point is defined.
    pub fn is_defined(&self, name: &str) -> bool {
        self.points.read().contains_key(name)
    }

    /// Register a handler against a defined point.
    pub fn register(&self, point: &str, handler: Handler) -> Result<HandlerId> {
        if self.frozen.load(Ordering::Acquire) {
            return Err(Error::frozen("extension points"));
        }

        let mut points = self.points.write();
        let handlers = points
            .get_mut(point)
            .ok_or_else(|| Error::UnknownExtensionPoint(point.to_string()))?;

        let id = handler.id.clone();
        handlers.push(handler);
        Ok(id)
    }

    /// Remove a handler by id. Allowed only before the registry freezes.
    pub fn unregister(&self, point: &str, id: &HandlerId) -> Result<bool> {
        if self.frozen.load(Ordering::Acquire) {
            return Err(Error::frozen("extension points"));
        }

        let mut points = self.points.write();
        let handlers = points
            .get_mut(point)
            .ok_or_else(|| Error::UnknownExtensionPoint(point.to_string()))?;

        let before = handlers.len();
        handlers.retain(|h| &h.id != id);
        Ok(handlers.len() != before)
    }

    /// Invoke the first enabled handler on a point and return its value.
    ///
    /// Returns `Ok(None)` when the point has no handler or every handler's
    /// owner is disabled; a disabled handler's body is never executed.
    pub fn dispatch_first(&self, point: &str, args: &Value) -> Result<Option<Value>> {
        let points = self.points.read();
        let handlers = points
            .get(point)
            .ok_or_else(|| Error::UnknownExtensionPoint(point.to_string()))?;

        for handler in handlers {
            if handler.enabled.enabled() {
                return Ok(Some((handler.func)(args)));
            }
        }
        Ok(None)
    }

    /// Invoke every enabled handler on a point in registration order,
    /// skipping disabled ones. Returns the number of handlers that ran.
    pub fn notify(&self, point: &str, args: &Value) -> Result<usize> {
        let points = self.points.read();
        let handlers = points
            .get(point)
            .ok_or_else(|| Error::UnknownExtensionPoint(point.to_string()))?;

        let mut ran = 0;
        for handler in handlers {
            if handler.enabled.enabled() {
                (handler.func)(args);
                ran += 1;
            }
        }
        Ok(ran)
    }

    /// Handler ids registered on a point, in order.
    pub fn handler_ids(&self, point: &str) -> Vec<HandlerId> {
        self.points
            .read()
            .get(point)
            .map(|hs| hs.iter().map(|h| h.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Total number of handlers on a point.
    pub fn handler_count(&self, point: &str) -> usize {
        self.points.read().get(point).map(Vec::len).unwrap_or(0)
    }

    /// Freeze the registry: further registration is rejected, dispatch
    /// continues read-only.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    /// Whether the registry is frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }
}

impl Default for ExtensionPoints {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExtensionPoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionPoints")
            .field("point_count", &self.points.read().len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
