use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use lazy_static::lazy_static;
use log::{error, info, warn};
use log_util::log_util::LogUtil;
use serde::Serialize;
use tokio::task::LocalSet;

use zihuan_node_preview::config::load_config_from;
use zihuan_node_preview::error::Result;
use zihuan_node_preview::node::graph_io::{
    build_definition_from_nodes, load_graph_definition_from_json, restore_nodes,
    save_graph_definition_to_json,
};
use zihuan_node_preview::node::registry::{init_node_registry, IMAGE_DOWNLOADER_TYPE};
use zihuan_node_preview::node::{ExecutionMessage, NodeInstance, NodeTypeRegistry};
use zihuan_node_preview::ui::canvas::{CanvasDirtyFlag, DrawList};
use zihuan_node_preview::ui::extension::ImagePreviewExtension;
use zihuan_node_preview::ui::node_render::{
    ImagePreviewWidget, PreviewStatus, SourceConvention,
};
use zihuan_node_preview::util::image_fetch::HttpImageFetcher;
use zihuan_node_preview::util::local_spawn::LocalSetSpawner;

lazy_static! {
    static ref BASE_LOG: LogUtil = LogUtil::new_with_path("zihuan_node_preview", "logs");
}

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run one execution result through the preview of every downloader node and
/// print the resulting draw commands as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short = 'c', long = "config", default_value = "config.yaml")]
    config: PathBuf,
    /// Backend origin, overrides PREVIEW_SERVER_URL
    #[arg(short = 's', long = "server")]
    server: Option<String>,
    /// Server-side image path as reported in `image_path`
    #[arg(short = 'p', long = "path", conflicts_with = "data_uri")]
    path: Option<String>,
    /// Inline `data:image/...;base64,` payload
    #[arg(long = "data-uri")]
    data_uri: Option<String>,
    /// Graph to restore instead of a single fresh node
    #[arg(short = 'g', long = "graph")]
    graph: Option<PathBuf>,
    /// Where to write the graph afterwards
    #[arg(long = "save")]
    save: Option<PathBuf>,
    #[arg(short = 't', long = "timeout")]
    timeout_secs: Option<u64>,
}

#[derive(Serialize)]
struct NodeReport<'a> {
    node_id: &'a str,
    status: PreviewStatus,
    draw: DrawList,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    LogUtil::init_with_logger(&BASE_LOG).expect("Failed to initialize logger");

    let args = Args::parse();
    info!("node_preview starting...");

    // Preview fetches are queued on this set and run while it is driven
    let local = Rc::new(LocalSet::new());
    if let Err(e) = local.run_until(run(args, LocalSetSpawner::new(&local))).await {
        error!("node_preview failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args, spawner: LocalSetSpawner) -> Result<()> {
    let mut config = load_config_from(&args.config);
    if args.server.is_some() {
        config.server_url = args.server.clone();
    }
    if args.timeout_secs.is_some() {
        config.fetch_timeout_secs = args.timeout_secs;
    }

    let mut preview_config = config.preview_config();
    if args.data_uri.is_some() {
        preview_config.source = SourceConvention::inline_payload();
    }
    info!(
        "Preview server {} ({})",
        preview_config.server_url,
        preview_config.source.field()
    );

    let timeout = config.fetch_timeout();
    let dirty = CanvasDirtyFlag::new();
    let source_field = preview_config.source.field().to_string();
    let widget = ImagePreviewWidget::new(
        preview_config,
        Rc::new(HttpImageFetcher::new(timeout)?),
        Rc::new(dirty.clone()),
        Rc::new(spawner),
    );

    let mut registry = NodeTypeRegistry::new();
    registry.add_extension(ImagePreviewExtension::new(widget));
    init_node_registry(&mut registry)?;

    let mut nodes = match &args.graph {
        Some(path) => {
            let graph = load_graph_definition_from_json(path)?;
            info!("Restored {} node(s) from {}", graph.nodes.len(), path.display());
            restore_nodes(&registry, &graph)?
        }
        None => vec![registry.create_node(IMAGE_DOWNLOADER_TYPE, "1")?],
    };

    match args.path.as_deref().or(args.data_uri.as_deref()) {
        Some(key) => {
            let message = ExecutionMessage::default().with_output(source_field, key);
            for node in nodes.iter_mut() {
                registry.node_executed(node, &message)?;
            }
        }
        None => warn!("No --path or --data-uri given, painting placeholders only"),
    }

    // Allow the primary and the fallback request their full timeout each
    let deadline = tokio::time::Instant::now() + timeout * 2 + POLL_INTERVAL;
    while nodes.iter().any(is_loading) {
        if tokio::time::Instant::now() >= deadline {
            warn!("Gave up waiting for previews after {:?}", timeout * 2);
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    info!("Repaint requested {} time(s)", dirty.request_count());

    let mut reports = Vec::with_capacity(nodes.len());
    for node in &nodes {
        let mut draw = DrawList::new();
        registry.draw_node_foreground(node, &mut draw)?;
        reports.push(NodeReport {
            node_id: &node.id,
            status: ImagePreviewWidget::status(node),
            draw,
        });
    }
    println!("{}", serde_json::to_string_pretty(&reports)?);

    if let Some(path) = &args.save {
        save_graph_definition_to_json(path, &build_definition_from_nodes(&nodes))?;
        info!("Saved graph to {}", path.display());
    }
    Ok(())
}

fn is_loading(node: &NodeInstance) -> bool {
    ImagePreviewWidget::status(node) == PreviewStatus::Loading
}
