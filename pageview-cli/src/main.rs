use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use pageview_core::{
    relayout, Command, Completion, PageLookup, Rect, ScrollAxis, Size, Viewer, ViewerConfig,
};
use pageview_render::{SyntheticDocument, ThreadedRenderer};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

const RENDER_THREADS: usize = 4;
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(
    name = "pageview",
    version,
    about = "Lays out, renders and searches paginated documents"
)]
struct Args {
    /// Configuration file (defaults to pageview.toml in the user config dir)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Action,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Print the document layout as JSON
    Layout {
        document: PathBuf,
        #[command(flatten)]
        viewport: Viewport,
        /// Page shown in single-page mode (0-based)
        #[arg(short = 'p', long = "page", default_value_t = 0)]
        page: usize,
    },
    /// Render the pages visible at a scroll offset
    Render {
        document: PathBuf,
        #[command(flatten)]
        viewport: Viewport,
        /// Scroll offset along the scroll axis, in layout pixels
        #[arg(short = 'o', long = "offset", default_value_t = 0)]
        offset: i32,
    },
    /// Search every page and step through the results
    Search {
        document: PathBuf,
        query: String,
        #[command(flatten)]
        viewport: Viewport,
        /// Number of times to advance the result cursor
        #[arg(short = 's', long = "steps", default_value_t = 1)]
        steps: usize,
    },
}

#[derive(Debug, Clone, Copy, clap::Args)]
struct Viewport {
    #[arg(long = "width", default_value_t = 800)]
    width: i32,
    #[arg(long = "height", default_value_t = 600)]
    height: i32,
}

impl Viewport {
    fn size(self) -> Size {
        Size::new(self.width, self.height)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging()?;
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Action::Layout {
            document,
            viewport,
            page,
        } => print_layout(&config, &document, viewport, page),
        Action::Render {
            document,
            viewport,
            offset,
        } => render_visible(&config, &document, viewport, offset).await,
        Action::Search {
            document,
            query,
            viewport,
            steps,
        } => search(&config, &document, &query, viewport, steps).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<ViewerConfig> {
    match path {
        Some(path) => ViewerConfig::load(path),
        None => match ViewerConfig::default_path() {
            Some(path) => ViewerConfig::load_or_default(&path),
            None => Ok(ViewerConfig::default()),
        },
    }
}

fn print_layout(config: &ViewerConfig, path: &Path, viewport: Viewport, page: usize) -> Result<()> {
    let document = SyntheticDocument::load(path)?;
    let pages = document.page_sizes();
    if !pages.is_empty() && page >= pages.len() {
        bail!("page {page} out of range (document has {})", pages.len());
    }
    let layout = relayout(&pages, &config.view, viewport.size(), page);
    println!("{}", serde_json::to_string_pretty(&layout)?);
    Ok(())
}

fn open_viewer(
    config: &ViewerConfig,
    path: &Path,
) -> Result<(Viewer, UnboundedReceiver<Completion>)> {
    let document = SyntheticDocument::load(path)?;
    let pages = document.page_sizes();
    let (renderer, receiver) = ThreadedRenderer::new(document, RENDER_THREADS)?;
    let renderer = Arc::new(renderer);
    let viewer = Viewer::new(config, pages, renderer.clone(), renderer);
    Ok((viewer, receiver))
}

async fn next_completion(receiver: &mut UnboundedReceiver<Completion>) -> Result<Completion> {
    timeout(COMPLETION_TIMEOUT, receiver.recv())
        .await
        .context("timed out waiting for the render workers")?
        .ok_or_else(|| anyhow!("render workers stopped"))
}

async fn render_visible(
    config: &ViewerConfig,
    path: &Path,
    viewport: Viewport,
    offset: i32,
) -> Result<()> {
    let (mut viewer, mut receiver) = open_viewer(config, path)?;
    viewer.apply(Command::Resize {
        size: viewport.size(),
    });
    viewer.apply(Command::ScrollTo { offset });

    let visible = match viewer.settings().scroll_axis {
        ScrollAxis::Vertical => Rect::new(0, offset, viewport.width, viewport.height),
        ScrollAxis::Horizontal => Rect::new(offset, 0, viewport.width, viewport.height),
    };
    let requested = viewer.request_visible(visible);
    debug!(pages = requested.len(), "requested visible pages");
    while viewer.cache().pending_count() > 0 {
        let completion = next_completion(&mut receiver).await?;
        viewer.deliver(completion);
    }

    for (page, lookup) in viewer.request_visible(visible) {
        match lookup {
            PageLookup::Ready(bitmap) => {
                println!("page {page}: {}x{}", bitmap.width, bitmap.height)
            }
            PageLookup::Pending => {
                warn!(page, "page did not render");
                println!("page {page}: failed");
            }
        }
    }
    let cache = viewer.cache();
    println!(
        "cache: {}/{} pages, generation {}",
        cache.len(),
        cache.capacity(),
        cache.generation()
    );
    Ok(())
}

async fn search(
    config: &ViewerConfig,
    path: &Path,
    query: &str,
    viewport: Viewport,
    steps: usize,
) -> Result<()> {
    if query.is_empty() {
        bail!("search query must not be empty");
    }
    let (mut viewer, mut receiver) = open_viewer(config, path)?;
    if viewer.page_count() == 0 {
        bail!("document {:?} has no pages", path);
    }
    viewer.apply(Command::Resize {
        size: viewport.size(),
    });
    viewer.apply(Command::Search {
        query: query.to_owned(),
    });
    while !viewer.search().is_scan_complete() {
        let completion = next_completion(&mut receiver).await?;
        viewer.deliver(completion);
    }

    let results = viewer.search().result_count();
    info!(query, results, "search finished");
    println!("{results} results");
    if results == 0 {
        return Ok(());
    }

    for step in 1..=steps {
        viewer.apply(Command::NextResult);
        let search = viewer.search();
        let (Some(result), Some(rect)) =
            (search.current_result(), search.current_result_bounding_rect())
        else {
            continue;
        };
        println!(
            "step {step}: page {} result {result} at ({:.1}, {:.1}) {:.1}x{:.1}",
            search.current_page(),
            rect.x,
            rect.y,
            rect.width,
            rect.height
        );
    }
    Ok(())
}

/// Installs the console layer, plus a file layer when the data directory is
/// usable. The returned guard flushes the file writer on drop.
fn init_logging() -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let log_dir = ProjectDirs::from("net", "pageview", "pageview")
        .map(|dirs| dirs.data_local_dir().join("logs"))
        .filter(|dir| fs::create_dir_all(dir).is_ok());
    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .try_init()
            .map_err(|err| anyhow!(err))?;
        return Ok(None);
    };

    let file_appender = tracing_appender::rolling::never(log_dir, "pageview.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    let console_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;
    Ok(Some(guard))
}
