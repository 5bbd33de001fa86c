use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use pageview_core::{
    Completion, MatchScanner, PageRenderer, RenderFailure, RenderImage, RenderRequest,
    ScanRequest, SearchMatch, Size,
};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, instrument, trace, warn};

mod synthetic;

pub use synthetic::{SyntheticDocument, SyntheticPage};

/// Synchronous access to a document's pages. Implementations are called from
/// worker threads.
pub trait PageBackend: Send + Sync + 'static {
    fn render(&self, page: usize, target_size: Size) -> Result<RenderImage>;
    fn find(&self, page: usize, query: &str) -> Result<Vec<SearchMatch>>;
}

/// Runs a [`PageBackend`] on a worker pool and reports every outcome as a
/// [`Completion`] on a channel drained by the controller thread.
pub struct ThreadedRenderer<B> {
    backend: Arc<B>,
    pool: ThreadPool,
    completions: UnboundedSender<Completion>,
    scan_generation: Arc<AtomicU64>,
}

impl<B: PageBackend> ThreadedRenderer<B> {
    pub fn new(backend: B, threads: usize) -> Result<(Self, UnboundedReceiver<Completion>)> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("pageview-render-{index}"))
            .build()
            .context("failed to start render workers")?;
        let (completions, receiver) = mpsc::unbounded_channel();
        let renderer = Self {
            backend: Arc::new(backend),
            pool,
            completions,
            scan_generation: Arc::new(AtomicU64::new(0)),
        };
        Ok((renderer, receiver))
    }
}

impl<B: PageBackend> PageRenderer for ThreadedRenderer<B> {
    #[instrument(skip(self))]
    fn render_page(&self, request: RenderRequest) {
        let backend = Arc::clone(&self.backend);
        let completions = self.completions.clone();
        self.pool.spawn(move || {
            let result = backend
                .render(request.page_index, request.target_size)
                .map_err(|err| {
                    warn!(page = request.page_index, "render failed: {err:#}");
                    RenderFailure::new(request.page_index, format!("{err:#}"))
                });
            if completions
                .send(Completion::Rendered { request, result })
                .is_err()
            {
                debug!(page = request.page_index, "controller gone, dropping render");
            }
        });
    }
}

impl<B: PageBackend> MatchScanner for ThreadedRenderer<B> {
    fn scan_page(&self, request: ScanRequest) {
        let backend = Arc::clone(&self.backend);
        let completions = self.completions.clone();
        let latest = Arc::clone(&self.scan_generation);
        self.pool.spawn(move || {
            if latest.load(Ordering::Acquire) > request.scan_generation {
                trace!(page = request.page_index, "skipping cancelled scan");
                return;
            }
            let matches = backend
                .find(request.page_index, &request.query)
                .unwrap_or_else(|err| {
                    warn!(page = request.page_index, "scan failed: {err:#}");
                    Vec::new()
                });
            let completion = Completion::Scanned {
                page_index: request.page_index,
                scan_generation: request.scan_generation,
                matches,
            };
            if completions.send(completion).is_err() {
                debug!(page = request.page_index, "controller gone, dropping scan");
            }
        });
    }

    fn cancel_scans(&self, current_generation: u64) {
        self.scan_generation
            .fetch_max(current_generation, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use pageview_core::{Command, PageLookup, Rect, ViewerConfig, ViewerEvent, Viewer};
    use tokio::time::timeout;

    fn document() -> SyntheticDocument {
        SyntheticDocument::from_toml_str(
            r#"
            [[pages]]
            width = 200
            height = 300
            text = ["the quick brown fox"]

            [[pages]]
            width = 200
            height = 300
            text = ["jumps over the", "lazy dog"]

            [[pages]]
            width = 200
            height = 300
            "#,
        )
        .unwrap()
    }

    async fn next(receiver: &mut UnboundedReceiver<Completion>) -> Completion {
        timeout(Duration::from_secs(5), receiver.recv())
            .await
            .expect("completion within timeout")
            .expect("channel open")
    }

    #[tokio::test]
    async fn render_reports_bitmap_on_channel() {
        let (renderer, mut receiver) = ThreadedRenderer::new(document(), 2).unwrap();
        let request = RenderRequest {
            page_index: 1,
            target_size: Size::new(100, 150),
            generation: 7,
        };
        renderer.render_page(request);

        match next(&mut receiver).await {
            Completion::Rendered { request: echoed, result } => {
                assert_eq!(echoed, request);
                let image = result.unwrap();
                assert_eq!((image.width, image.height), (100, 150));
                assert_eq!(image.pixels.len(), 100 * 150 * 4);
            }
            other => panic!("unexpected completion {other:?}"),
        }
    }

    #[tokio::test]
    async fn render_errors_become_failures() {
        let (renderer, mut receiver) = ThreadedRenderer::new(document(), 1).unwrap();
        renderer.render_page(RenderRequest {
            page_index: 42,
            target_size: Size::new(10, 10),
            generation: 0,
        });
        match next(&mut receiver).await {
            Completion::Rendered { result, .. } => {
                let failure = result.unwrap_err();
                assert_eq!(failure.page, 42);
            }
            other => panic!("unexpected completion {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_scans_are_skipped() {
        let (renderer, mut receiver) = ThreadedRenderer::new(document(), 1).unwrap();
        renderer.cancel_scans(3);
        renderer.scan_page(ScanRequest {
            page_index: 0,
            query: Arc::from("fox"),
            scan_generation: 2,
        });
        assert!(timeout(Duration::from_millis(200), receiver.recv())
            .await
            .is_err());

        renderer.scan_page(ScanRequest {
            page_index: 0,
            query: Arc::from("fox"),
            scan_generation: 3,
        });
        match next(&mut receiver).await {
            Completion::Scanned {
                scan_generation,
                matches,
                ..
            } => {
                assert_eq!(scan_generation, 3);
                assert_eq!(matches.len(), 1);
            }
            other => panic!("unexpected completion {other:?}"),
        }
    }

    #[tokio::test]
    async fn viewer_round_trip_through_worker_pool() {
        let document = document();
        let pages = document.page_sizes();
        let (renderer, mut receiver) = ThreadedRenderer::new(document, 2).unwrap();
        let renderer = Arc::new(renderer);

        let mut config = ViewerConfig::default();
        config.view.screen_resolution = 1.0;
        let mut viewer = Viewer::new(&config, pages, renderer.clone(), renderer.clone());
        let events = viewer.events();
        viewer.apply(Command::Resize {
            size: Size::new(400, 700),
        });
        let visible = Rect::new(0, 0, 400, 700);

        let pending = viewer.request_visible(visible).len();
        assert_eq!(pending, 3);
        for _ in 0..pending {
            let completion = next(&mut receiver).await;
            viewer.deliver(completion);
        }
        assert!(viewer
            .request_visible(visible)
            .iter()
            .all(|(_, lookup)| matches!(lookup, PageLookup::Ready(_))));

        viewer.apply(Command::Search {
            query: "the".into(),
        });
        for _ in 0..viewer.page_count() {
            let completion = next(&mut receiver).await;
            viewer.deliver(completion);
        }
        assert!(viewer.search().is_scan_complete());
        assert_eq!(viewer.search().result_count(), 2);

        events.drain();
        viewer.apply(Command::NextResult);
        viewer.apply(Command::NextResult);
        assert_eq!(viewer.search().current_page(), 1);
        assert!(events
            .drain()
            .iter()
            .any(|event| matches!(event, ViewerEvent::Jumped(location) if location.page == 1)));
    }
}
