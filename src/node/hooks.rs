//! Per-node-type lifecycle hook chains.
//!
//! Each hook point is an ordered list of handlers run in registration order
//! with the same arguments. A handler error stops the chain and is returned
//! to the caller unchanged.

use crate::error::Result;
use crate::node::{ExecutionMessage, NodeInstance, Size};
use crate::ui::canvas::PaintContext;

pub type ComputeSizeHandler = Box<dyn Fn(&NodeInstance, Size) -> Result<Size>>;
pub type CreatedHandler = Box<dyn Fn(&mut NodeInstance) -> Result<()>>;
pub type ExecutedHandler = Box<dyn Fn(&mut NodeInstance, &ExecutionMessage) -> Result<()>>;
pub type DrawHandler = Box<dyn Fn(&NodeInstance, &mut dyn PaintContext) -> Result<()>>;

#[derive(Default)]
pub struct NodeHooks {
    compute_size: Vec<ComputeSizeHandler>,
    on_created: Vec<CreatedHandler>,
    on_executed: Vec<ExecutedHandler>,
    on_draw_foreground: Vec<DrawHandler>,
}

impl NodeHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The handler receives the size computed so far and returns the new one
    pub fn add_compute_size(
        &mut self,
        handler: impl Fn(&NodeInstance, Size) -> Result<Size> + 'static,
    ) {
        self.compute_size.push(Box::new(handler));
    }

    pub fn add_on_created(&mut self, handler: impl Fn(&mut NodeInstance) -> Result<()> + 'static) {
        self.on_created.push(Box::new(handler));
    }

    pub fn add_on_executed(
        &mut self,
        handler: impl Fn(&mut NodeInstance, &ExecutionMessage) -> Result<()> + 'static,
    ) {
        self.on_executed.push(Box::new(handler));
    }

    pub fn add_on_draw_foreground(
        &mut self,
        handler: impl Fn(&NodeInstance, &mut dyn PaintContext) -> Result<()> + 'static,
    ) {
        self.on_draw_foreground.push(Box::new(handler));
    }

    pub fn compute_size(&self, node: &NodeInstance, base: Size) -> Result<Size> {
        let mut size = base;
        for handler in &self.compute_size {
            size = handler(node, size)?;
        }
        Ok(size)
    }

    pub fn run_created(&self, node: &mut NodeInstance) -> Result<()> {
        for handler in &self.on_created {
            handler(node)?;
        }
        Ok(())
    }

    pub fn run_executed(&self, node: &mut NodeInstance, message: &ExecutionMessage) -> Result<()> {
        for handler in &self.on_executed {
            handler(node, message)?;
        }
        Ok(())
    }

    pub fn run_draw_foreground(&self, node: &NodeInstance, ctx: &mut dyn PaintContext) -> Result<()> {
        for handler in &self.on_draw_foreground {
            handler(node, ctx)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.compute_size.is_empty()
            && self.on_created.is_empty()
            && self.on_executed.is_empty()
            && self.on_draw_foreground.is_empty()
    }
}
