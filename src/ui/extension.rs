//! Editor extensions. An extension is offered every node class once, at
//! registration time, and may append handlers to that class's hook chains.

use log::info;
use std::rc::Rc;

use crate::node::{NodeType, NodeTypeDescriptor};
use crate::ui::node_render::image_preview::ImagePreviewWidget;

pub trait Extension {
    fn name(&self) -> &str;

    fn before_register_node_def(&self, node_type: &mut NodeType);
}

pub const IMAGE_PREVIEW_EXTENSION_NAME: &str = "zihuan.ImageDownloaderPreview";

/// Attaches [`ImagePreviewWidget`] to the downloader node class
pub struct ImagePreviewExtension {
    widget: Rc<ImagePreviewWidget>,
}

impl ImagePreviewExtension {
    pub fn new(widget: ImagePreviewWidget) -> Self {
        Self {
            widget: Rc::new(widget),
        }
    }

    pub fn matches(&self, descriptor: &NodeTypeDescriptor) -> bool {
        let config = self.widget.config();
        descriptor.type_id == config.target_class
            || (!config.target_display_name.is_empty()
                && descriptor.display_name.contains(&config.target_display_name))
    }
}

impl Extension for ImagePreviewExtension {
    fn name(&self) -> &str {
        IMAGE_PREVIEW_EXTENSION_NAME
    }

    fn before_register_node_def(&self, node_type: &mut NodeType) {
        if !self.matches(&node_type.descriptor) {
            return;
        }

        info!(
            "[ImagePreview] Attaching preview to node type {}",
            node_type.descriptor.type_id
        );

        let widget = Rc::clone(&self.widget);
        node_type
            .hooks
            .add_compute_size(move |_, size| Ok(widget.min_size(size)));

        let widget = Rc::clone(&self.widget);
        node_type.hooks.add_on_created(move |node| {
            widget.initialize(node);
            Ok(())
        });

        let widget = Rc::clone(&self.widget);
        node_type.hooks.add_on_executed(move |node, message| {
            widget.update(node, message);
            Ok(())
        });

        let widget = Rc::clone(&self.widget);
        node_type.hooks.add_on_draw_foreground(move |node, ctx| {
            widget.draw(node, ctx);
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::node::graph_io::{build_definition_from_nodes, restore_nodes};
    use crate::node::registry::{init_node_registry, API_KEY_TYPE, IMAGE_DOWNLOADER_TYPE};
    use crate::node::{ExecutionMessage, NodeInstance, NodeTypeRegistry, Size};
    use crate::ui::canvas::{CanvasDirtyFlag, DrawCommand, DrawList};
    use crate::ui::node_render::image_preview::{PreviewConfig, ERROR_TEXT, PLACEHOLDER_TEXT};
    use crate::ui::node_render::PreviewStatus;
    use crate::util::image_fetch::{HttpImageFetcher, ImageFetcher, PreviewImage};
    use crate::util::local_spawn::LocalSetSpawner;
    use futures_util::future::{FutureExt, LocalBoxFuture};
    use image::{DynamicImage, ImageFormat};
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::LocalSet;

    #[derive(Default)]
    struct RecordingFetcher {
        urls: RefCell<Vec<String>>,
    }

    impl ImageFetcher for RecordingFetcher {
        fn fetch(&self, url: String) -> LocalBoxFuture<'static, Result<PreviewImage>> {
            self.urls.borrow_mut().push(url.clone());
            async move {
                Err(Error::FetchFailure {
                    url,
                    reason: "offline".to_string(),
                })
            }
            .boxed_local()
        }
    }

    fn registry_with(
        config: PreviewConfig,
        fetcher: Rc<dyn ImageFetcher>,
        local: &Rc<LocalSet>,
    ) -> (NodeTypeRegistry, CanvasDirtyFlag) {
        let dirty = CanvasDirtyFlag::new();
        let widget = ImagePreviewWidget::new(
            config,
            fetcher,
            Rc::new(dirty.clone()),
            Rc::new(LocalSetSpawner::new(local)),
        );
        let mut registry = NodeTypeRegistry::new();
        registry.add_extension(ImagePreviewExtension::new(widget));
        init_node_registry(&mut registry).unwrap();
        (registry, dirty)
    }

    fn extension(config: PreviewConfig) -> ImagePreviewExtension {
        ImagePreviewExtension::new(ImagePreviewWidget::new(
            config,
            Rc::new(RecordingFetcher::default()),
            Rc::new(CanvasDirtyFlag::new()),
            Rc::new(LocalSetSpawner::new(&Rc::new(LocalSet::new()))),
        ))
    }

    fn image_path(path: &str) -> ExecutionMessage {
        ExecutionMessage::default().with_output("image_path", path)
    }

    fn paint(registry: &NodeTypeRegistry, node: &NodeInstance) -> DrawList {
        let mut list = DrawList::new();
        registry.draw_node_foreground(node, &mut list).unwrap();
        list
    }

    #[test]
    fn test_matches_class_or_display_name() {
        let ext = extension(PreviewConfig::default());
        assert!(ext.matches(&NodeTypeDescriptor::new(IMAGE_DOWNLOADER_TYPE, "x", "c", "")));
        assert!(ext.matches(&NodeTypeDescriptor::new(
            "Other",
            "My KLingAI Image Downloader (v2)",
            "c",
            ""
        )));
        assert!(!ext.matches(&NodeTypeDescriptor::new(API_KEY_TYPE, "KLingAI API Key", "c", "")));
    }

    #[test]
    fn test_empty_display_name_only_matches_class() {
        let ext = extension(PreviewConfig {
            target_display_name: String::new(),
            ..PreviewConfig::default()
        });
        assert!(!ext.matches(&NodeTypeDescriptor::new("Other", "anything", "c", "")));
    }

    #[test]
    fn test_only_target_class_gets_hooks() {
        let mut registry = NodeTypeRegistry::new();
        registry.add_extension(extension(PreviewConfig::default()));
        init_node_registry(&mut registry).unwrap();

        assert!(!registry.node_type(IMAGE_DOWNLOADER_TYPE).unwrap().hooks.is_empty());
        assert!(registry.node_type(API_KEY_TYPE).unwrap().hooks.is_empty());

        let other = registry.create_node(API_KEY_TYPE, "1").unwrap();
        assert_eq!(other.size, Size::new(300.0, 110.0));
        assert!(ImagePreviewWidget::state(&other).is_none());
        assert!(paint(&registry, &other).commands.is_empty());
    }

    #[test]
    fn test_created_node_is_initialized_and_paints_placeholder() {
        let mut registry = NodeTypeRegistry::new();
        registry.add_extension(extension(PreviewConfig::default()));
        init_node_registry(&mut registry).unwrap();

        let node = registry.create_node(IMAGE_DOWNLOADER_TYPE, "4").unwrap();
        assert_eq!(node.size, Size::new(350.0, 450.0));
        assert!(node.serialize_widgets);
        assert!(ImagePreviewWidget::state(&node).is_some());
        assert_eq!(node.widget("node_id").unwrap().value, "4");
        assert_eq!(paint(&registry, &node).texts(), vec![PLACEHOLDER_TEXT]);
    }

    #[tokio::test]
    async fn test_executed_hook_triggers_fetch() {
        let local = Rc::new(LocalSet::new());
        local
            .run_until(async {
                let fetcher = Rc::new(RecordingFetcher::default());
                let (registry, _) = registry_with(PreviewConfig::default(), fetcher.clone(), &local);

                let mut node = registry.create_node(IMAGE_DOWNLOADER_TYPE, "4").unwrap();
                registry.node_executed(&mut node, &image_path("out/x.png")).unwrap();

                for _ in 0..8 {
                    tokio::task::yield_now().await;
                }
                let urls = fetcher.urls.borrow();
                assert_eq!(urls.len(), 2);
                assert!(urls[0].starts_with("http://127.0.0.1:8188/view?filename=out%2Fx.png"));
                assert!(urls[1].starts_with("http://127.0.0.1:8188/output/out%2Fx.png?ts="));
            })
            .await;
    }

    #[tokio::test]
    async fn test_executed_hook_without_executor_does_not_stick() {
        // Plain runtime, no LocalSet being driven, and the spawner's set is gone
        let fetcher = Rc::new(RecordingFetcher::default());
        let local = Rc::new(LocalSet::new());
        let (registry, _) = registry_with(PreviewConfig::default(), fetcher.clone(), &local);
        drop(local);

        let mut node = registry.create_node(IMAGE_DOWNLOADER_TYPE, "4").unwrap();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            registry.node_executed(&mut node, &image_path("out/foo.png"))
        }));

        assert!(matches!(outcome, Ok(Ok(()))));
        assert_eq!(ImagePreviewWidget::status(&node), PreviewStatus::Empty);
        assert!(fetcher.urls.borrow().is_empty());
        assert_eq!(paint(&registry, &node).texts(), vec![PLACEHOLDER_TEXT]);
    }

    /// Which routes of the local backend answer with an image
    #[derive(Clone, Copy)]
    struct Routes {
        view: bool,
        output: bool,
    }

    struct Backend {
        origin: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl Backend {
        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::new_rgba8(width, height)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    async fn start_backend(routes: Routes) -> Backend {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let png = png_bytes(100, 50);

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };

                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }

                let head = String::from_utf8_lossy(&buf).to_string();
                let target = head.split_whitespace().nth(1).unwrap_or("").to_string();
                seen.lock().unwrap().push(target.clone());

                let serve = (routes.view && target.starts_with("/view?"))
                    || (routes.output && target.starts_with("/output/"));
                let response = if serve {
                    let mut response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        png.len()
                    )
                    .into_bytes();
                    response.extend_from_slice(&png);
                    response
                } else {
                    b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec()
                };
                let _ = stream.write_all(&response).await;
                let _ = stream.shutdown().await;
            }
        });

        Backend { origin, requests }
    }

    fn http_registry(origin: &str, local: &Rc<LocalSet>) -> (NodeTypeRegistry, CanvasDirtyFlag) {
        registry_with(
            PreviewConfig {
                server_url: origin.to_string(),
                ..PreviewConfig::default()
            },
            Rc::new(HttpImageFetcher::new(Duration::from_secs(5)).unwrap()),
            local,
        )
    }

    async fn wait_until_settled(node: &NodeInstance) {
        for _ in 0..200 {
            if ImagePreviewWidget::status(node) != PreviewStatus::Loading {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("preview still loading");
    }

    #[tokio::test]
    async fn test_http_primary_fetch_paints_image() {
        let local = Rc::new(LocalSet::new());
        local
            .run_until(async {
                let backend = start_backend(Routes { view: true, output: true }).await;
                let (registry, dirty) = http_registry(&backend.origin, &local);
                let mut node = registry.create_node(IMAGE_DOWNLOADER_TYPE, "12").unwrap();

                registry
                    .node_executed(&mut node, &image_path("kling/foo 1.png"))
                    .unwrap();
                wait_until_settled(&node).await;

                assert_eq!(ImagePreviewWidget::status(&node), PreviewStatus::Ready);
                assert!(dirty.is_dirty());

                let requests = backend.requests();
                assert_eq!(requests.len(), 1);
                assert!(requests[0].starts_with("/view?filename=kling%2Ffoo%201.png&ts="));

                let list = paint(&registry, &node);
                let images = list.images();
                assert_eq!(images.len(), 1);
                if let DrawCommand::Image {
                    width,
                    height,
                    native_width,
                    native_height,
                    ..
                } = images[0]
                {
                    assert_eq!((*native_width, *native_height), (100, 50));
                    assert!((width / height - 2.0).abs() < 1e-3);
                }
                assert_eq!(list.texts(), vec!["100x50"]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_http_fallback_after_primary_404() {
        let local = Rc::new(LocalSet::new());
        local
            .run_until(async {
                let backend = start_backend(Routes { view: false, output: true }).await;
                let (registry, _) = http_registry(&backend.origin, &local);
                let mut node = registry.create_node(IMAGE_DOWNLOADER_TYPE, "3").unwrap();

                registry.node_executed(&mut node, &image_path("out/a.png")).unwrap();
                wait_until_settled(&node).await;

                assert_eq!(ImagePreviewWidget::status(&node), PreviewStatus::Ready);
                let requests = backend.requests();
                assert_eq!(requests.len(), 2);
                assert!(requests[0].starts_with("/view?"));
                assert!(requests[1].starts_with("/output/out%2Fa.png?ts="));
            })
            .await;
    }

    #[tokio::test]
    async fn test_http_both_routes_fail_shows_error_text() {
        let local = Rc::new(LocalSet::new());
        local
            .run_until(async {
                let backend = start_backend(Routes { view: false, output: false }).await;
                let (registry, _) = http_registry(&backend.origin, &local);
                let mut node = registry.create_node(IMAGE_DOWNLOADER_TYPE, "3").unwrap();

                registry.node_executed(&mut node, &image_path("missing.png")).unwrap();
                wait_until_settled(&node).await;

                assert_eq!(ImagePreviewWidget::status(&node), PreviewStatus::Failed);
                assert_eq!(backend.requests().len(), 2);

                let list = paint(&registry, &node);
                assert!(list.images().is_empty());
                assert_eq!(list.texts(), vec![ERROR_TEXT]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_http_error_sentinel_issues_no_request() {
        let local = Rc::new(LocalSet::new());
        local
            .run_until(async {
                let backend = start_backend(Routes { view: true, output: true }).await;
                let (registry, _) = http_registry(&backend.origin, &local);
                let mut node = registry.create_node(IMAGE_DOWNLOADER_TYPE, "3").unwrap();

                registry
                    .node_executed(&mut node, &image_path("错误: download failed"))
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(50)).await;

                assert!(backend.requests().is_empty());
                assert_eq!(ImagePreviewWidget::status(&node), PreviewStatus::Empty);
                assert_eq!(paint(&registry, &node).texts(), vec![PLACEHOLDER_TEXT]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_http_restored_node_starts_with_fresh_preview() {
        let local = Rc::new(LocalSet::new());
        local
            .run_until(async {
                let backend = start_backend(Routes { view: true, output: true }).await;
                let (registry, _) = http_registry(&backend.origin, &local);
                let mut node = registry.create_node(IMAGE_DOWNLOADER_TYPE, "8").unwrap();
                registry.node_executed(&mut node, &image_path("a.png")).unwrap();
                wait_until_settled(&node).await;

                let graph = build_definition_from_nodes([&node]);
                assert!(!graph.nodes[0].widgets_values.is_empty());

                let restored = restore_nodes(&registry, &graph).unwrap();
                assert_eq!(restored[0].size, node.size);
                assert_eq!(ImagePreviewWidget::status(&restored[0]), PreviewStatus::Empty);
                assert_eq!(restored[0].widget("node_id").unwrap().value, "8");
            })
            .await;
    }
}
