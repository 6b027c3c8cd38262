//! Inline image preview for nodes whose execution result carries an image
//! path (or an inline data URI).
//!
//! State lives in a [`PreviewHandle`] stored in the node's extension slots.
//! `update` hands the fetch for a new key to the injected [`LocalSpawner`]
//! and returns immediately; the completion writes back through a weak handle and
//! requests a repaint. Nothing here returns an error to the host: failures
//! end up as the error text inside the preview rectangle.

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::rc::Rc;

use super::layout::{fit_image, preview_rect, PreviewRect};
use super::preview_state::{LoadTicket, PreviewHandle, PreviewState, PreviewStatus};
use crate::error::{Error, Result};
use crate::node::{ExecutionMessage, NodeInstance, Size};
use crate::ui::canvas::{PaintContext, RepaintRequester, TextAlign, TextStyle};
use crate::util::image_fetch::{ImageFetcher, PreviewImage};
use crate::util::local_spawn::LocalSpawner;
use crate::util::url_utils::{build_fallback_url, build_view_url, cache_bust_token};
use futures_util::future::{FutureExt, LocalBoxFuture};

pub const MIN_WIDTH: f32 = 350.0;
pub const MIN_HEIGHT: f32 = 450.0;

/// Prefix the backend puts on `image_path` when the download failed
pub const DEFAULT_ERROR_SENTINEL: &str = "错误:";

pub const PLACEHOLDER_TEXT: &str = "Image will appear here after the node runs";
pub const ERROR_TEXT: &str = "Failed to load or render image";

const BACKGROUND_COLOR: &str = "#1a1a1a";
const BORDER_COLOR: &str = "#555555";

const PLACEHOLDER_STYLE: TextStyle = TextStyle {
    color: "#aaaaaa",
    size_px: 14.0,
    align: TextAlign::Center,
};

const ERROR_STYLE: TextStyle = TextStyle {
    color: "#ff5555",
    size_px: 12.0,
    align: TextAlign::Center,
};

const DIMENSIONS_STYLE: TextStyle = TextStyle {
    color: "#ffffff",
    size_px: 12.0,
    align: TextAlign::Left,
};

/// Where the image key is read from. One convention per deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConvention {
    /// Server-side file path, fetched through the view endpoint
    FilePath { field: String },
    /// `data:image/...;base64,` URI decoded locally
    InlinePayload { field: String },
}

impl SourceConvention {
    pub fn file_path() -> Self {
        Self::FilePath {
            field: "image_path".to_string(),
        }
    }

    pub fn inline_payload() -> Self {
        Self::InlinePayload {
            field: "image_data".to_string(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::FilePath { field } | Self::InlinePayload { field } => field,
        }
    }
}

impl Default for SourceConvention {
    fn default() -> Self {
        Self::file_path()
    }
}

#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Class identifier of the node type that gets the preview
    pub target_class: String,
    /// Fallback match on the declared display name
    pub target_display_name: String,
    /// Origin of the backend, e.g. "http://127.0.0.1:8188"
    pub server_url: String,
    pub view_endpoint: String,
    pub fallback_prefix: String,
    pub error_sentinel: String,
    pub source: SourceConvention,
    /// Widgets hidden on creation; they carry data, not user input
    pub hidden_widgets: Vec<String>,
    /// Widget that receives the node id on creation, if present
    pub node_id_widget: String,
    pub min_size: Size,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            target_class: "KLingAIImageDownloader".to_string(),
            target_display_name: "KLingAI Image Downloader".to_string(),
            server_url: "http://127.0.0.1:8188".to_string(),
            view_endpoint: "/view".to_string(),
            fallback_prefix: "/output".to_string(),
            error_sentinel: DEFAULT_ERROR_SENTINEL.to_string(),
            source: SourceConvention::default(),
            hidden_widgets: vec!["preview_image".to_string(), "image_data".to_string()],
            node_id_widget: "node_id".to_string(),
            min_size: Size::new(MIN_WIDTH, MIN_HEIGHT),
        }
    }
}

pub struct ImagePreviewWidget {
    config: PreviewConfig,
    fetcher: Rc<dyn ImageFetcher>,
    repaint: Rc<dyn RepaintRequester>,
    spawner: Rc<dyn LocalSpawner>,
}

impl ImagePreviewWidget {
    pub fn new(
        config: PreviewConfig,
        fetcher: Rc<dyn ImageFetcher>,
        repaint: Rc<dyn RepaintRequester>,
        spawner: Rc<dyn LocalSpawner>,
    ) -> Self {
        Self {
            config,
            fetcher,
            repaint,
            spawner,
        }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    /// Typed accessor for the preview state attached to `node`
    pub fn state(node: &NodeInstance) -> Option<PreviewHandle> {
        node.extension::<PreviewHandle>().cloned()
    }

    pub fn status(node: &NodeInstance) -> PreviewStatus {
        match node.extension::<PreviewHandle>() {
            Some(handle) => handle.borrow().status(),
            None => PreviewStatus::Empty,
        }
    }

    /// Widen `size` to the minimum needed for a usable preview
    pub fn min_size(&self, size: Size) -> Size {
        size.at_least(self.config.min_size)
    }

    pub fn initialize(&self, node: &mut NodeInstance) {
        node.size = self.min_size(node.size);
        node.insert_extension::<PreviewHandle>(PreviewState::new_handle());
        node.serialize_widgets = true;

        for widget in node.widgets.iter_mut() {
            if self.config.hidden_widgets.iter().any(|name| *name == widget.name) {
                widget.hide = true;
            }
        }

        let node_id = node.id.clone();
        match node.widget_mut(&self.config.node_id_widget) {
            Some(widget) => widget.value = Value::String(node_id),
            None => debug!(
                "[ImagePreview] node {} has no '{}' widget",
                node.id, self.config.node_id_widget
            ),
        }

        debug!(
            "[ImagePreview] initialized node {} at {}x{}",
            node.id, node.size.width, node.size.height
        );
        self.repaint.request_repaint();
    }

    pub fn layout(&self, node: &NodeInstance) -> PreviewRect {
        preview_rect(node)
    }

    /// Paint-hook entry point
    pub fn draw(&self, node: &NodeInstance, ctx: &mut dyn PaintContext) {
        let rect = self.layout(node);
        self.paint(ctx, node, rect);
    }

    pub fn paint(&self, ctx: &mut dyn PaintContext, node: &NodeInstance, rect: PreviewRect) {
        if rect.is_degenerate() {
            return;
        }

        ctx.fill_rect(rect.x, rect.y, rect.width, rect.height, BACKGROUND_COLOR);
        ctx.stroke_rect(rect.x, rect.y, rect.width, rect.height, BORDER_COLOR, 1.0);

        let Some(handle) = node.extension::<PreviewHandle>() else {
            paint_centered(ctx, rect, PLACEHOLDER_TEXT, &PLACEHOLDER_STYLE);
            return;
        };

        let state = handle.borrow();
        match (state.status(), state.image()) {
            (PreviewStatus::Ready, Some(image)) => {
                if let Err(e) = paint_image(ctx, rect, image) {
                    debug!("[ImagePreview] node {}: {}", node.id, e);
                    paint_centered(ctx, rect, ERROR_TEXT, &ERROR_STYLE);
                }
            }
            (PreviewStatus::Ready, None) | (PreviewStatus::Failed, _) => {
                paint_centered(ctx, rect, ERROR_TEXT, &ERROR_STYLE);
            }
            (PreviewStatus::Empty, _) | (PreviewStatus::Loading, _) => {
                paint_centered(ctx, rect, PLACEHOLDER_TEXT, &PLACEHOLDER_STYLE);
            }
        }
    }

    /// Result hook entry point. Invalid or repeated keys are ignored.
    pub fn update(&self, node: &NodeInstance, message: &ExecutionMessage) {
        let Some(handle) = Self::state(node) else {
            let violation = Error::HostContractViolation(format!(
                "node {} received a result before the preview was initialized",
                node.id
            ));
            warn!("[ImagePreview] {}", violation);
            return;
        };

        let key = match self.extract_key(message) {
            Ok(key) => key,
            Err(e) => {
                debug!("[ImagePreview] node {}: {}", node.id, e);
                return;
            }
        };

        let next = handle.borrow().next_ticket(key);
        let Some(ticket) = next else {
            debug!("[ImagePreview] node {}: key unchanged, not reloading", node.id);
            return;
        };

        match &self.config.source {
            SourceConvention::FilePath { .. } => {
                // State only changes once the fetch is queued
                let task = self.fetch_task(&handle, ticket.clone());
                if let Err(e) = self.spawner.spawn(task) {
                    warn!("[ImagePreview] node {}: cannot load {}: {}", node.id, ticket.key, e);
                    return;
                }
                info!("[ImagePreview] node {}: loading {}", node.id, ticket.key);
                handle.borrow_mut().accept(&ticket);
                self.repaint.request_repaint();
            }
            SourceConvention::InlinePayload { .. } => {
                handle.borrow_mut().accept(&ticket);
                let applied = match PreviewImage::from_data_uri(&ticket.key) {
                    Ok(image) => handle.borrow_mut().complete(&ticket, image),
                    Err(e) => {
                        error!("[ImagePreview] node {}: inline image rejected: {}", node.id, e);
                        handle.borrow_mut().fail(&ticket)
                    }
                };
                if applied {
                    self.repaint.request_repaint();
                }
            }
        }
    }

    fn extract_key<'a>(&self, message: &'a ExecutionMessage) -> Result<&'a str> {
        let field = self.config.source.field();
        let value = message
            .output(field)
            .ok_or_else(|| Error::InvalidResult(format!("no '{}' output", field)))?;

        let key = value
            .as_str()
            .ok_or_else(|| Error::InvalidResult(format!("'{}' is not a string", field)))?;

        if key.is_empty() {
            return Err(Error::InvalidResult(format!("'{}' is empty", field)));
        }
        if !self.config.error_sentinel.is_empty() && key.starts_with(&self.config.error_sentinel) {
            return Err(Error::InvalidResult(format!("backend reported: {}", key)));
        }
        Ok(key)
    }

    fn fetch_task(&self, handle: &PreviewHandle, ticket: LoadTicket) -> LocalBoxFuture<'static, ()> {
        let weak = Rc::downgrade(handle);
        let fetcher = Rc::clone(&self.fetcher);
        let repaint = Rc::clone(&self.repaint);
        let server = self.config.server_url.clone();
        let fallback_prefix = self.config.fallback_prefix.clone();
        let primary_url = build_view_url(
            &self.config.server_url,
            &self.config.view_endpoint,
            &ticket.key,
            cache_bust_token(),
        );

        async move {
            let result = match fetcher.fetch(primary_url).await {
                Ok(image) => Ok(image),
                Err(e) => {
                    warn!("[ImagePreview] primary fetch failed: {}", e);

                    let current = match weak.upgrade() {
                        Some(handle) => {
                            let current = handle.borrow().is_current(&ticket);
                            current
                        }
                        None => false,
                    };
                    if !current {
                        debug!("[ImagePreview] {} superseded, skipping fallback", ticket.key);
                        return;
                    }

                    let fallback_url =
                        build_fallback_url(&server, &fallback_prefix, &ticket.key, cache_bust_token());
                    debug!("[ImagePreview] trying fallback {}", fallback_url);
                    fetcher.fetch(fallback_url).await
                }
            };

            let Some(handle) = weak.upgrade() else {
                debug!("[ImagePreview] node dropped before {} resolved", ticket.key);
                return;
            };

            let applied = match result {
                Ok(image) => {
                    debug!(
                        "[ImagePreview] loaded {} ({}x{})",
                        ticket.key,
                        image.width(),
                        image.height()
                    );
                    handle.borrow_mut().complete(&ticket, image)
                }
                Err(e) => {
                    error!("[ImagePreview] could not load {}: {}", ticket.key, e);
                    handle.borrow_mut().fail(&ticket)
                }
            };

            if applied {
                repaint.request_repaint();
            } else {
                debug!("[ImagePreview] discarded stale result for {}", ticket.key);
            }
        }
        .boxed_local()
    }
}

fn paint_image(ctx: &mut dyn PaintContext, rect: PreviewRect, image: &PreviewImage) -> Result<()> {
    let aspect = image.aspect_ratio().ok_or_else(|| {
        Error::RenderFailure(format!(
            "cannot scale a {}x{} image",
            image.width(),
            image.height()
        ))
    })?;

    // Too small for the padded image but not degenerate: background only
    let Some(target) = fit_image(rect, aspect) else {
        return Ok(());
    };

    ctx.draw_image(image, target.x, target.y, target.width, target.height)?;
    ctx.fill_text(
        &format!("{}x{}", image.width(), image.height()),
        rect.x + 5.0,
        rect.bottom() - 5.0,
        &DIMENSIONS_STYLE,
    );
    Ok(())
}

fn paint_centered(ctx: &mut dyn PaintContext, rect: PreviewRect, text: &str, style: &TextStyle) {
    let (cx, cy) = rect.center();
    ctx.fill_text(text, cx, cy, style);
}
