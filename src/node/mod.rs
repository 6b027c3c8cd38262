use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

pub mod graph_io;
pub mod hooks;
pub mod registry;

pub use hooks::NodeHooks;
pub use registry::{NodeType, NodeTypeDescriptor, NodeTypeRegistry};

/// Node body size in canvas units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Component-wise maximum, never shrinks `self`
    pub fn at_least(self, min: Size) -> Self {
        Self {
            width: self.width.max(min.width),
            height: self.height.max(min.height),
        }
    }
}

/// Input control drawn on the node body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub name: String,
    pub value: Value,
    #[serde(default)]
    pub hide: bool,
}

impl Widget {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            hide: false,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hide = true;
        self
    }
}

/// One placed node on the canvas.
///
/// Extensions attach their own per-instance state through the typed slot map
/// instead of ad hoc fields.
pub struct NodeInstance {
    pub id: String,
    pub type_id: String,
    pub size: Size,
    pub widgets: Vec<Widget>,
    /// Whether widget values are written when the graph is saved
    pub serialize_widgets: bool,
    extensions: HashMap<TypeId, Box<dyn Any>>,
}

impl NodeInstance {
    pub fn new(id: impl Into<String>, type_id: impl Into<String>, size: Size) -> Self {
        Self {
            id: id.into(),
            type_id: type_id.into(),
            size,
            widgets: Vec::new(),
            serialize_widgets: false,
            extensions: HashMap::new(),
        }
    }

    pub fn with_widget(mut self, widget: Widget) -> Self {
        self.widgets.push(widget);
        self
    }

    pub fn widget(&self, name: &str) -> Option<&Widget> {
        self.widgets.iter().find(|w| w.name == name)
    }

    pub fn widget_mut(&mut self, name: &str) -> Option<&mut Widget> {
        self.widgets.iter_mut().find(|w| w.name == name)
    }

    pub fn visible_widget_count(&self) -> usize {
        self.widgets.iter().filter(|w| !w.hide).count()
    }

    /// Attach per-instance state, replacing any previous value of the same type
    pub fn insert_extension<T: 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn extension<T: 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn remove_extension<T: 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

impl fmt::Debug for NodeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeInstance")
            .field("id", &self.id)
            .field("type_id", &self.type_id)
            .field("size", &self.size)
            .field("widgets", &self.widgets)
            .field("serialize_widgets", &self.serialize_widgets)
            .field("extensions", &self.extensions.len())
            .finish()
    }
}

/// Result delivered by the backend after a node's task finished
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMessage {
    #[serde(default)]
    pub outputs: Map<String, Value>,
}

impl ExecutionMessage {
    pub fn with_output(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(name.into(), value.into());
        self
    }

    pub fn output(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name)
    }
}
