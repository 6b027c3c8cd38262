use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::node::{NodeInstance, NodeTypeRegistry, Size};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeGraphDefinition {
    pub nodes: Vec<NodeDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: String,
    pub node_type: String,
    pub size: Size,
    /// Only written for nodes with `serialize_widgets` set
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub widgets_values: Vec<WidgetValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetValue {
    pub name: String,
    pub value: Value,
}

pub fn load_graph_definition_from_json(path: impl AsRef<Path>) -> Result<NodeGraphDefinition> {
    let content = fs::read_to_string(path.as_ref())?;
    let graph: NodeGraphDefinition = serde_json::from_str(&content)?;
    Ok(graph)
}

pub fn save_graph_definition_to_json(
    path: impl AsRef<Path>,
    graph: &NodeGraphDefinition,
) -> Result<()> {
    let content = serde_json::to_string_pretty(graph)?;
    fs::write(path.as_ref(), content)?;
    Ok(())
}

pub fn node_to_definition(node: &NodeInstance) -> NodeDefinition {
    let widgets_values = if node.serialize_widgets {
        node.widgets
            .iter()
            .map(|w| WidgetValue {
                name: w.name.clone(),
                value: w.value.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    NodeDefinition {
        id: node.id.clone(),
        node_type: node.type_id.clone(),
        size: node.size,
        widgets_values,
    }
}

pub fn build_definition_from_nodes<'a>(
    nodes: impl IntoIterator<Item = &'a NodeInstance>,
) -> NodeGraphDefinition {
    NodeGraphDefinition {
        nodes: nodes.into_iter().map(node_to_definition).collect(),
    }
}

/// Recreate node instances through the registry, then re-apply the stored
/// size and widget values. Extension state (e.g. previews) starts fresh.
pub fn restore_nodes(
    registry: &NodeTypeRegistry,
    graph: &NodeGraphDefinition,
) -> Result<Vec<NodeInstance>> {
    let mut nodes = Vec::with_capacity(graph.nodes.len());
    for node_def in &graph.nodes {
        let mut node = registry.create_node(&node_def.node_type, node_def.id.clone())?;

        // Stored size may be smaller than what the hooks require now
        let minimum = registry.compute_size(&node)?;
        node.size = node_def.size.at_least(minimum);

        for stored in &node_def.widgets_values {
            if let Some(widget) = node.widget_mut(&stored.name) {
                widget.value = stored.value.clone();
            }
        }
        nodes.push(node);
    }
    Ok(nodes)
}
