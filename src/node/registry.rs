use log::{debug, info, warn};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::node::{ExecutionMessage, NodeHooks, NodeInstance, Size, Widget};
use crate::ui::canvas::PaintContext;
use crate::ui::extension::Extension;

pub const IMAGE_DOWNLOADER_TYPE: &str = "KLingAIImageDownloader";
pub const API_KEY_TYPE: &str = "KLingAIAPIKey";

/// Static description of a node class, as announced when the class is registered
#[derive(Debug, Clone)]
pub struct NodeTypeDescriptor {
    /// Class identifier, e.g. "KLingAIImageDownloader"
    pub type_id: String,
    pub display_name: String,
    pub category: String,
    pub description: String,
}

impl NodeTypeDescriptor {
    pub fn new(
        type_id: impl Into<String>,
        display_name: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            type_id: type_id.into(),
            display_name: display_name.into(),
            category: category.into(),
            description: description.into(),
        }
    }
}

/// A registered node class: descriptor, instance defaults and hook chains
pub struct NodeType {
    pub descriptor: NodeTypeDescriptor,
    pub default_size: Size,
    pub default_widgets: Vec<Widget>,
    pub hooks: NodeHooks,
}

impl NodeType {
    pub fn new(descriptor: NodeTypeDescriptor, default_size: Size, default_widgets: Vec<Widget>) -> Self {
        Self {
            descriptor,
            default_size,
            default_widgets,
            hooks: NodeHooks::new(),
        }
    }
}

/// Node class registry of the editor.
///
/// Extensions must be added before the node classes they want to see; each
/// extension is offered every class exactly once, at registration time.
#[derive(Default)]
pub struct NodeTypeRegistry {
    extensions: Vec<Box<dyn Extension>>,
    types: HashMap<String, NodeType>,
}

impl NodeTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_extension(&mut self, extension: impl Extension + 'static) {
        if !self.types.is_empty() {
            warn!(
                "[NodeRegistry] Extension '{}' added after {} node types were registered; they will not be offered to it",
                extension.name(),
                self.types.len()
            );
        }
        info!("[NodeRegistry] Extension registered: {}", extension.name());
        self.extensions.push(Box::new(extension));
    }

    /// Register a node class and let every extension install its hooks on it
    pub fn register(
        &mut self,
        descriptor: NodeTypeDescriptor,
        default_size: Size,
        default_widgets: Vec<Widget>,
    ) -> Result<()> {
        if self.types.contains_key(&descriptor.type_id) {
            return Err(Error::ValidationError(format!(
                "Node type '{}' already registered",
                descriptor.type_id
            )));
        }

        let mut node_type = NodeType::new(descriptor, default_size, default_widgets);
        for extension in &self.extensions {
            extension.before_register_node_def(&mut node_type);
        }

        debug!(
            "[NodeRegistry] Registered node type {} ({})",
            node_type.descriptor.type_id, node_type.descriptor.display_name
        );
        self.types
            .insert(node_type.descriptor.type_id.clone(), node_type);
        Ok(())
    }

    pub fn node_type(&self, type_id: &str) -> Option<&NodeType> {
        self.types.get(type_id)
    }

    fn require_type(&self, type_id: &str) -> Result<&NodeType> {
        self.types.get(type_id).ok_or_else(|| {
            Error::ValidationError(format!("Node type '{}' not registered", type_id))
        })
    }

    /// Create a new node instance by type ID
    pub fn create_node(&self, type_id: &str, id: impl Into<String>) -> Result<NodeInstance> {
        let node_type = self.require_type(type_id)?;

        let mut node = NodeInstance::new(id, type_id, node_type.default_size);
        node.widgets = node_type.default_widgets.clone();
        node.size = node_type.hooks.compute_size(&node, node_type.default_size)?;
        node_type.hooks.run_created(&mut node)?;

        debug!(
            "[NodeRegistry] Created node {} ({}) size {}x{}",
            node.id, type_id, node.size.width, node.size.height
        );
        Ok(node)
    }

    pub fn compute_size(&self, node: &NodeInstance) -> Result<Size> {
        let node_type = self.require_type(&node.type_id)?;
        node_type.hooks.compute_size(node, node_type.default_size)
    }

    /// Deliver a finished execution result to the node's hooks
    pub fn node_executed(&self, node: &mut NodeInstance, message: &ExecutionMessage) -> Result<()> {
        let node_type = self.require_type(&node.type_id)?;
        node_type.hooks.run_executed(node, message)
    }

    pub fn draw_node_foreground(&self, node: &NodeInstance, ctx: &mut dyn PaintContext) -> Result<()> {
        let node_type = self.require_type(&node.type_id)?;
        node_type.hooks.run_draw_foreground(node, ctx)
    }

    /// Get all registered node types
    pub fn get_all_types(&self) -> Vec<NodeTypeDescriptor> {
        self.types.values().map(|t| t.descriptor.clone()).collect()
    }

    /// Get node types by category
    pub fn get_types_by_category(&self, category: &str) -> Vec<NodeTypeDescriptor> {
        self.types
            .values()
            .filter(|t| t.descriptor.category == category)
            .map(|t| t.descriptor.clone())
            .collect()
    }

    /// Get all categories
    pub fn get_categories(&self) -> Vec<String> {
        let mut categories: Vec<_> = self
            .types
            .values()
            .map(|t| t.descriptor.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }
}

/// Register the node classes shipped with the KLingAI node pack
pub fn init_node_registry(registry: &mut NodeTypeRegistry) -> Result<()> {
    registry.register(
        NodeTypeDescriptor::new(
            IMAGE_DOWNLOADER_TYPE,
            "KLingAI Image Downloader",
            "JM-KLingAI-API",
            "Downloads an image from a URL into the output directory",
        ),
        Size::new(300.0, 150.0),
        vec![
            Widget::new("image_url", ""),
            Widget::new("filename_prefix", "KLingAI"),
            Widget::new("custom_output_dir", ""),
            Widget::new("node_id", "").hidden(),
        ],
    )?;

    registry.register(
        NodeTypeDescriptor::new(
            API_KEY_TYPE,
            "KLingAI API Key",
            "JM-KLingAI-API",
            "Provides the access key pair for KLingAI requests",
        ),
        Size::new(300.0, 110.0),
        vec![Widget::new("access_key", ""), Widget::new("secret_key", "")],
    )?;

    Ok(())
}
