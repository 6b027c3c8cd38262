pub mod canvas;
pub mod extension;
pub mod node_render;
