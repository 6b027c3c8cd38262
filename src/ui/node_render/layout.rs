use serde::Serialize;

use crate::node::NodeInstance;

/// Approximate node title bar height
pub const HEADER_HEIGHT: f32 = 30.0;
/// Height taken by one visible widget row
pub const WIDGET_HEIGHT: f32 = 32.0;
pub const MARGIN: f32 = 10.0;
/// Total inset between the preview rectangle and the image, split evenly
pub const PAD: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PreviewRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PreviewRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

/// Region below the header and the visible widgets, recomputed every frame
pub fn preview_rect(node: &NodeInstance) -> PreviewRect {
    let widgets_height = node.visible_widget_count() as f32 * WIDGET_HEIGHT;
    let y0 = HEADER_HEIGHT + widgets_height + MARGIN;
    PreviewRect {
        x: MARGIN,
        y: y0,
        width: node.size.width - MARGIN * 2.0,
        height: node.size.height - MARGIN - y0,
    }
}

/// Largest rectangle with `image_aspect` (width / height) that fits inside
/// `rect` minus `PAD`, centered in `rect`.
pub fn fit_image(rect: PreviewRect, image_aspect: f32) -> Option<PreviewRect> {
    let inner_width = rect.width - PAD;
    let inner_height = rect.height - PAD;
    if inner_width <= 0.0 || inner_height <= 0.0 || !(image_aspect.is_finite() && image_aspect > 0.0) {
        return None;
    }

    let (width, height) = if image_aspect > inner_width / inner_height {
        (inner_width, inner_width / image_aspect)
    } else {
        (inner_height * image_aspect, inner_height)
    };

    Some(PreviewRect {
        x: rect.x + (rect.width - width) / 2.0,
        y: rect.y + (rect.height - height) / 2.0,
        width,
        height,
    })
}
