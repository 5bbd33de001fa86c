//! Page-indexed search results with a circular cursor.
//!
//! Matches arrive one page at a time from a [`MatchScanner`], in any order.
//! Each search string gets a fresh scan generation; deliveries tagged with an
//! older generation are dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::events::{EventQueue, ViewerEvent};
use crate::geometry::RectF;
use crate::{MatchScanner, ScanRequest};

/// One logical hit. A hit that wraps across lines has several rectangles.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchMatch {
    pub page: usize,
    pub rectangles: Vec<RectF>,
    pub context_before: String,
    pub context_after: String,
}

impl SearchMatch {
    pub fn new(page: usize, rectangles: Vec<RectF>) -> Self {
        Self {
            page,
            rectangles,
            ..Self::default()
        }
    }

    pub fn bounding_rect(&self) -> Option<RectF> {
        let (first, rest) = self.rectangles.split_first()?;
        Some(rest.iter().fold(*first, |acc, rect| acc.united(rect)))
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

pub struct SearchModel {
    scanner: Arc<dyn MatchScanner>,
    events: EventQueue,
    page_count: usize,
    search_string: String,
    scan_generation: u64,
    matches_by_page: BTreeMap<usize, Vec<SearchMatch>>,
    scanned: BTreeSet<usize>,
    current_page: usize,
    current_result: Option<usize>,
}

impl SearchModel {
    pub fn new(page_count: usize, scanner: Arc<dyn MatchScanner>, events: EventQueue) -> Self {
        Self {
            scanner,
            events,
            page_count,
            search_string: String::new(),
            scan_generation: 0,
            matches_by_page: BTreeMap::new(),
            scanned: BTreeSet::new(),
            current_page: 0,
            current_result: None,
        }
    }

    pub fn search_string(&self) -> &str {
        &self.search_string
    }

    pub fn scan_generation(&self) -> u64 {
        self.scan_generation
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn current_result(&self) -> Option<usize> {
        self.current_result
    }

    pub fn results_on_page(&self, page: usize) -> &[SearchMatch] {
        self.matches_by_page
            .get(&page)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn result_count(&self) -> usize {
        self.matches_by_page.values().map(Vec::len).sum()
    }

    pub fn scanned_pages(&self) -> usize {
        self.scanned.len()
    }

    pub fn is_scan_complete(&self) -> bool {
        !self.search_string.is_empty() && self.scanned.len() == self.page_count
    }

    /// Replaces the search string, dropping every known match. An empty
    /// string disables searching.
    pub fn set_search_string(&mut self, search_string: impl Into<String>) {
        let search_string = search_string.into();
        if search_string == self.search_string {
            return;
        }
        debug!(query = %search_string, "search string changed");
        self.search_string = search_string;
        self.events.push(ViewerEvent::SearchStringChanged);
        self.restart();
    }

    /// Resets the model for a document with `page_count` pages, rescanning
    /// with the current search string.
    pub fn set_page_count(&mut self, page_count: usize) {
        self.page_count = page_count;
        if self.current_page >= page_count {
            self.current_page = 0;
        }
        self.restart();
    }

    fn restart(&mut self) {
        self.scan_generation += 1;
        self.scanner.cancel_scans(self.scan_generation);
        self.matches_by_page.clear();
        self.scanned.clear();
        if self.current_page >= self.page_count {
            self.current_page = 0;
        }
        let had_result = self.current_result.take().is_some();
        self.events.push(ViewerEvent::ResultsReset);
        if had_result {
            self.events.push(ViewerEvent::CurrentResultChanged {
                page: self.current_page,
                result: None,
            });
        }

        if self.search_string.is_empty() || self.page_count == 0 {
            return;
        }
        let query: Arc<str> = Arc::from(self.search_string.as_str());
        let start = self.current_page;
        for page in (start..self.page_count).chain(0..start) {
            self.scanner.scan_page(ScanRequest {
                page_index: page,
                query: Arc::clone(&query),
                scan_generation: self.scan_generation,
            });
        }
    }

    /// Accepts the matches found on `page`. Returns `false` when the delivery
    /// belongs to an earlier scan and was dropped.
    pub fn on_page_scanned(
        &mut self,
        page: usize,
        scan_generation: u64,
        matches: Vec<SearchMatch>,
    ) -> bool {
        if scan_generation != self.scan_generation
            || self.search_string.is_empty()
            || page >= self.page_count
        {
            trace!(page, scan_generation, current = self.scan_generation, "discarding stale scan");
            return false;
        }

        self.scanned.insert(page);
        let count = matches.len();
        if matches.is_empty() {
            self.matches_by_page.remove(&page);
        } else {
            self.matches_by_page.insert(page, matches);
        }
        trace!(page, count, "page scanned");

        self.events.push(ViewerEvent::ResultsChanged { page });
        if page == self.current_page {
            if matches!(self.current_result, Some(result) if result >= count) {
                self.current_result = None;
                self.events.push(ViewerEvent::CurrentResultChanged { page, result: None });
            }
            self.events.push(ViewerEvent::CurrentResultGeometryChanged);
        }
        true
    }

    /// Moves the cursor to result `result` on the current page.
    ///
    /// A negative index steps to the last match of the closest preceding page
    /// that has matches; an index past the end steps to the first match of the
    /// closest following one. Both wrap around the document. When no page has
    /// matches the cursor stays put.
    pub fn set_current_result(&mut self, result: isize) {
        if self.page_count == 0 {
            return;
        }
        if usize::try_from(result).ok() == self.current_result && self.current_result.is_some() {
            return;
        }

        let on_page = self.results_on_page(self.current_page).len();
        let target = match usize::try_from(result) {
            Err(_) => self
                .find_page_with_matches(Direction::Backward)
                .map(|page| (page, self.results_on_page(page).len() - 1)),
            Ok(index) if index >= on_page => self
                .find_page_with_matches(Direction::Forward)
                .map(|page| (page, 0)),
            Ok(index) => Some((self.current_page, index)),
        };

        let Some((page, index)) = target else {
            debug!(requested = result, "no search results to move to");
            return;
        };
        debug!(
            from_page = self.current_page,
            from = ?self.current_result,
            requested = result,
            page,
            index,
            "moving search cursor"
        );
        self.move_cursor(page, Some(index));
    }

    pub fn next_result(&mut self) {
        let next = self.current_result.map_or(0, |result| result as isize + 1);
        self.set_current_result(next);
    }

    pub fn previous_result(&mut self) {
        let previous = self.current_result.map_or(-1, |result| result as isize - 1);
        self.set_current_result(previous);
    }

    /// Selects `page`, wrapping negative values to the last page and values
    /// past the end to the first. Clears the current result.
    pub fn set_current_page(&mut self, page: isize) {
        if self.page_count == 0 {
            return;
        }
        let page = match usize::try_from(page) {
            Err(_) => self.page_count - 1,
            Ok(page) if page >= self.page_count => 0,
            Ok(page) => page,
        };
        if page == self.current_page {
            return;
        }
        self.current_page = page;
        self.events.push(ViewerEvent::CurrentPageChanged { page });
        if self.current_result.take().is_some() {
            self.events
                .push(ViewerEvent::CurrentResultChanged { page, result: None });
        }
    }

    pub fn current_match(&self) -> Option<&SearchMatch> {
        self.results_on_page(self.current_page)
            .get(self.current_result?)
    }

    pub fn current_result_rects(&self) -> &[RectF] {
        self.current_match()
            .map(|found| found.rectangles.as_slice())
            .unwrap_or(&[])
    }

    pub fn current_result_bounding_rect(&self) -> Option<RectF> {
        self.current_match()?.bounding_rect()
    }

    pub fn bounding_rects_on_page(&self, page: usize) -> Vec<RectF> {
        self.results_on_page(page)
            .iter()
            .flat_map(|found| found.rectangles.iter().copied())
            .collect()
    }

    pub fn current_page_bounding_rects(&self) -> Vec<RectF> {
        self.bounding_rects_on_page(self.current_page)
    }

    fn find_page_with_matches(&self, direction: Direction) -> Option<usize> {
        let count = self.page_count;
        (1..=count)
            .map(|step| match direction {
                Direction::Forward => (self.current_page + step) % count,
                Direction::Backward => (self.current_page + count - step % count) % count,
            })
            .find(|page| !self.results_on_page(*page).is_empty())
    }

    fn move_cursor(&mut self, page: usize, result: Option<usize>) {
        let page_changed = page != self.current_page;
        if page_changed {
            self.current_page = page;
            self.events.push(ViewerEvent::CurrentPageChanged { page });
        }
        if page_changed || result != self.current_result {
            self.current_result = result;
            self.events
                .push(ViewerEvent::CurrentResultChanged { page, result });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingScanner {
        requests: Mutex<Vec<ScanRequest>>,
        cancelled: Mutex<Vec<u64>>,
    }

    impl MatchScanner for RecordingScanner {
        fn scan_page(&self, request: ScanRequest) {
            self.requests.lock().push(request);
        }

        fn cancel_scans(&self, current_generation: u64) {
            self.cancelled.lock().push(current_generation);
        }
    }

    fn hit(page: usize, x: f64) -> SearchMatch {
        SearchMatch::new(page, vec![RectF::new(x, 10.0, 20.0, 8.0)])
    }

    fn model(page_count: usize) -> (SearchModel, Arc<RecordingScanner>, EventQueue) {
        let scanner = Arc::new(RecordingScanner::default());
        let events = EventQueue::new();
        let model = SearchModel::new(page_count, scanner.clone(), events.clone());
        (model, scanner, events)
    }

    /// Pages `{0: [], 1: [m1], 2: [], 3: [m2, m3]}` with the cursor on page 1,
    /// result 0.
    fn sparse_model() -> (SearchModel, EventQueue) {
        let (mut model, _, events) = model(4);
        model.set_search_string("needle");
        let generation = model.scan_generation();
        model.on_page_scanned(0, generation, vec![]);
        model.on_page_scanned(1, generation, vec![hit(1, 1.0)]);
        model.on_page_scanned(2, generation, vec![]);
        model.on_page_scanned(3, generation, vec![hit(3, 2.0), hit(3, 3.0)]);
        model.set_current_page(1);
        model.set_current_result(0);
        events.drain();
        (model, events)
    }

    #[test]
    fn past_the_end_skips_empty_pages_forward() {
        let (mut model, events) = sparse_model();
        model.set_current_result(1);

        assert_eq!(model.current_page(), 3);
        assert_eq!(model.current_result(), Some(0));
        assert_eq!(model.current_match(), Some(&hit(3, 2.0)));
        assert_eq!(
            events.drain(),
            vec![
                ViewerEvent::CurrentPageChanged { page: 3 },
                ViewerEvent::CurrentResultChanged {
                    page: 3,
                    result: Some(0)
                },
            ]
        );
    }

    #[test]
    fn negative_wraps_backward_to_last_match() {
        let (mut model, _) = sparse_model();
        model.set_current_result(-1);

        assert_eq!(model.current_page(), 3);
        assert_eq!(model.current_result(), Some(1));
        assert_eq!(model.current_match(), Some(&hit(3, 3.0)));
    }

    #[test]
    fn forward_from_last_match_wraps_to_first_page_with_matches() {
        let (mut model, _) = sparse_model();
        model.set_current_result(1);
        model.next_result();
        assert_eq!((model.current_page(), model.current_result()), (3, Some(1)));
        model.next_result();
        assert_eq!((model.current_page(), model.current_result()), (1, Some(0)));
        model.previous_result();
        assert_eq!((model.current_page(), model.current_result()), (3, Some(1)));
    }

    #[test]
    fn only_page_with_matches_wraps_onto_itself() {
        let (mut model, _, _) = model(3);
        model.set_search_string("x");
        let generation = model.scan_generation();
        model.on_page_scanned(1, generation, vec![hit(1, 0.0), hit(1, 5.0)]);
        model.set_current_page(1);
        model.set_current_result(1);
        model.set_current_result(2);
        assert_eq!((model.current_page(), model.current_result()), (1, Some(0)));
    }

    #[test]
    fn no_matches_anywhere_leaves_cursor_and_stays_silent() {
        let (mut model, _, events) = model(5);
        model.set_search_string("absent");
        let generation = model.scan_generation();
        for page in 0..5 {
            model.on_page_scanned(page, generation, vec![]);
        }
        events.drain();

        for request in [0, 1, 7, -1, -3] {
            model.set_current_result(request);
            assert_eq!(model.current_page(), 0);
            assert_eq!(model.current_result(), None);
        }
        model.next_result();
        model.previous_result();
        assert!(events.is_empty());
    }

    #[test]
    fn scan_starts_at_current_page_and_wraps() {
        let (mut model, scanner, _) = model(4);
        model.set_current_page(2);
        model.set_search_string("abc");

        let pages: Vec<usize> = scanner
            .requests
            .lock()
            .iter()
            .map(|request| request.page_index)
            .collect();
        assert_eq!(pages, vec![2, 3, 0, 1]);
        assert!(scanner
            .requests
            .lock()
            .iter()
            .all(|request| &*request.query == "abc" && request.scan_generation == 1));
    }

    #[test]
    fn stale_scan_deliveries_are_dropped() {
        let (mut model, scanner, _) = model(2);
        model.set_search_string("first");
        model.set_search_string("second");
        assert_eq!(*scanner.cancelled.lock(), vec![1, 2]);

        assert!(!model.on_page_scanned(0, 1, vec![hit(0, 0.0)]));
        assert_eq!(model.result_count(), 0);
        assert!(model.on_page_scanned(0, 2, vec![hit(0, 0.0)]));
        assert_eq!(model.result_count(), 1);
    }

    #[test]
    fn empty_search_string_clears_and_disables_scanning() {
        let (mut model, scanner, _) = model(3);
        model.set_search_string("word");
        model.on_page_scanned(0, model.scan_generation(), vec![hit(0, 0.0)]);
        model.set_current_result(0);
        scanner.requests.lock().clear();

        model.set_search_string("");
        assert!(scanner.requests.lock().is_empty());
        assert_eq!(model.result_count(), 0);
        assert_eq!(model.current_result(), None);
        assert!(!model.on_page_scanned(1, model.scan_generation(), vec![hit(1, 0.0)]));
    }

    #[test]
    fn results_arrive_in_any_order() {
        let (mut model, _, events) = model(6);
        model.set_search_string("q");
        events.drain();
        let generation = model.scan_generation();
        for page in [4, 0, 5, 2] {
            model.on_page_scanned(page, generation, vec![hit(page, 0.0)]);
        }
        assert_eq!(model.result_count(), 4);
        assert_eq!(model.scanned_pages(), 4);
        assert!(!model.is_scan_complete());
        assert_eq!(
            events.drain(),
            vec![
                ViewerEvent::ResultsChanged { page: 4 },
                ViewerEvent::ResultsChanged { page: 0 },
                ViewerEvent::CurrentResultGeometryChanged,
                ViewerEvent::ResultsChanged { page: 5 },
                ViewerEvent::ResultsChanged { page: 2 },
            ]
        );
        model.on_page_scanned(1, generation, vec![]);
        model.on_page_scanned(3, generation, vec![]);
        assert!(model.is_scan_complete());
    }

    #[test]
    fn set_current_page_wraps_at_both_ends() {
        let (mut model, _, events) = model(4);
        model.set_current_page(-1);
        assert_eq!(model.current_page(), 3);
        model.set_current_page(4);
        assert_eq!(model.current_page(), 0);
        assert_eq!(
            events.drain(),
            vec![
                ViewerEvent::CurrentPageChanged { page: 3 },
                ViewerEvent::CurrentPageChanged { page: 0 },
            ]
        );
    }

    #[test]
    fn bounding_geometry_tracks_cursor() {
        let (mut model, _, _) = model(2);
        model.set_search_string("wrap");
        let wrapped = SearchMatch::new(
            0,
            vec![
                RectF::new(400.0, 100.0, 50.0, 10.0),
                RectF::new(20.0, 112.0, 30.0, 10.0),
            ],
        );
        model.on_page_scanned(0, model.scan_generation(), vec![wrapped, hit(0, 200.0)]);

        assert_eq!(model.current_result_bounding_rect(), None);
        assert!(model.current_result_rects().is_empty());
        assert_eq!(model.current_page_bounding_rects().len(), 3);

        model.set_current_result(0);
        assert_eq!(
            model.current_result_bounding_rect(),
            Some(RectF::new(20.0, 100.0, 430.0, 22.0))
        );
        assert_eq!(model.current_result_rects().len(), 2);
    }
}
