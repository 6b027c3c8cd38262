use serde::Serialize;
use std::cell::Cell;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::util::image_fetch::PreviewImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub color: &'static str,
    pub size_px: f32,
    pub align: TextAlign,
}

/// 2D drawing surface the host hands to node paint hooks
pub trait PaintContext {
    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: &str);

    fn stroke_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: &str, line_width: f32);

    fn draw_image(&mut self, image: &PreviewImage, x: f32, y: f32, width: f32, height: f32) -> Result<()>;

    fn fill_text(&mut self, text: &str, x: f32, y: f32, style: &TextStyle);
}

/// Canvas-level repaint request. Advisory; the host coalesces requests.
pub trait RepaintRequester {
    fn request_repaint(&self);
}

/// Shared dirty flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CanvasDirtyFlag {
    dirty: Rc<Cell<bool>>,
    requests: Rc<Cell<u64>>,
}

impl CanvasDirtyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Read and clear, as the host does at the start of a frame
    pub fn take_dirty(&self) -> bool {
        self.dirty.replace(false)
    }

    pub fn request_count(&self) -> u64 {
        self.requests.get()
    }
}

impl RepaintRequester for CanvasDirtyFlag {
    fn request_repaint(&self) {
        self.dirty.set(true);
        self.requests.set(self.requests.get() + 1);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    FillRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: String,
    },
    StrokeRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: String,
        line_width: f32,
    },
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        native_width: u32,
        native_height: u32,
    },
    Text {
        text: String,
        x: f32,
        y: f32,
        color: String,
        size_px: f32,
        align: TextAlign,
    },
}

/// Recording paint context
#[derive(Debug, Default, Serialize)]
pub struct DrawList {
    pub commands: Vec<DrawCommand>,
    #[serde(skip)]
    reject_images: bool,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    /// A list whose `draw_image` always fails, to exercise render-failure paths
    pub fn rejecting_images() -> Self {
        Self {
            commands: Vec::new(),
            reject_images: true,
        }
    }

    pub fn images(&self) -> Vec<&DrawCommand> {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Image { .. }))
            .collect()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl PaintContext for DrawList {
    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: &str) {
        self.commands.push(DrawCommand::FillRect {
            x,
            y,
            width,
            height,
            color: color.to_string(),
        });
    }

    fn stroke_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: &str, line_width: f32) {
        self.commands.push(DrawCommand::StrokeRect {
            x,
            y,
            width,
            height,
            color: color.to_string(),
            line_width,
        });
    }

    fn draw_image(&mut self, image: &PreviewImage, x: f32, y: f32, width: f32, height: f32) -> Result<()> {
        if self.reject_images {
            return Err(Error::RenderFailure("image drawing disabled".to_string()));
        }
        self.commands.push(DrawCommand::Image {
            x,
            y,
            width,
            height,
            native_width: image.width(),
            native_height: image.height(),
        });
        Ok(())
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, style: &TextStyle) {
        self.commands.push(DrawCommand::Text {
            text: text.to_string(),
            x,
            y,
            color: style.color.to_string(),
            size_px: style.size_px,
            align: style.align,
        });
    }
}
