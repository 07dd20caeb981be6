use std::collections::{HashSet, VecDeque};
use std::ops::Range;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use tracing::{debug, info, warn};

use crate::config::TimelineConfig;
use crate::counters::{self, ToggleRequest};
use crate::data::{ActionService, FeedService, MediaService, Thumbnail};
use crate::fold::{self, Phase};
use crate::navigate::{self, Navigable};
use crate::record::{CounterKind, Record};
use crate::render::Renderer;
use crate::span::{AttrKey, Field, SpanId};
use crate::surface::{Fragment, Surface};

#[derive(Clone)]
pub struct Services {
    pub feed: Arc<dyn FeedService>,
    pub actions: Arc<dyn ActionService>,
    pub media: Option<Arc<dyn MediaService>>,
}

enum AsyncResponse {
    ActionResult {
        request: ToggleRequest,
        error: Option<String>,
    },
}

struct PendingMedia {
    span: SpanId,
    ticket: u64,
    rx: Receiver<anyhow::Result<Thumbnail>>,
}

pub struct Timeline {
    surface: Surface,
    renderer: Renderer,
    point: usize,
    services: Services,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
    pending_actions: usize,
    pending_media: Vec<PendingMedia>,
    notices: VecDeque<String>,
    banner: Option<SpanId>,
}

impl Timeline {
    pub fn new(config: TimelineConfig, services: Services, width: usize) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            surface: Surface::new(width),
            renderer: Renderer::new(config),
            point: 0,
            services,
            response_tx,
            response_rx,
            pending_actions: 0,
            pending_media: Vec::new(),
            notices: VecDeque::new(),
            banner: None,
        }
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn config(&self) -> &TimelineConfig {
        self.renderer.config()
    }

    pub fn point(&self) -> usize {
        self.point
    }

    pub fn set_point(&mut self, pos: usize) {
        self.point = pos.min(self.surface.len());
    }

    // Only records rendered from now on pick up the new width.
    pub fn set_width(&mut self, width: usize) {
        self.surface.set_width(width);
    }

    pub fn visible_text(&self) -> String {
        self.surface.visible_text()
    }

    pub fn current_record(&self) -> Option<Arc<Record>> {
        self.surface
            .record_at(self.point)
            .and_then(|span| span.attrs.record.clone())
    }

    pub fn render_record(&mut self, record: &Record) -> SpanId {
        let fragment = self.renderer.render(record, self.surface.width());
        let existing = self
            .surface
            .record_span(&record.id)
            .and_then(|id| self.surface.span(id))
            .map(|span| span.range.clone());
        let root = match existing {
            Some(range) => {
                debug!(id = %record.id, "re-rendering record in place");
                let inside = range.contains(&self.point).then(|| self.point - range.start);
                let len = fragment.len();
                self.remove_at(range.clone());
                let root = self.insert_at(range.start, fragment);
                if let Some(offset) = inside {
                    self.point = range.start + offset.min(len);
                }
                root
            }
            None => {
                let end = self.surface.len();
                self.insert_at(end, fragment)
            }
        };
        self.request_media(root);
        root
    }

    pub fn load_more(&mut self) -> usize {
        match self.services.feed.fetch_more() {
            Ok(records) => {
                info!(count = records.len(), "fetched older records");
                for record in &records {
                    self.render_record(record);
                }
                records.len()
            }
            Err(err) => {
                warn!(error = %err, "fetching older records failed");
                self.notify(format!("Failed to load more posts: {err:#}"));
                0
            }
        }
    }

    pub fn refresh(&mut self) -> usize {
        let count = self.refresh_records();
        self.point = 0;
        count
    }

    fn refresh_records(&mut self) -> usize {
        let records = match self.services.feed.fetch_refresh() {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "refreshing failed");
                self.notify(format!("Failed to refresh: {err:#}"));
                return 0;
            }
        };
        let mut seen = HashSet::new();
        let (known, fresh): (Vec<&Record>, Vec<&Record>) = records
            .iter()
            .filter(|record| seen.insert(record.id.as_str()))
            .partition(|record| self.surface.record_span(&record.id).is_some());
        for record in known {
            self.render_record(record);
        }
        if fresh.is_empty() {
            debug!("nothing newer to show");
            return 0;
        }
        self.mark_update_banner();
        let mut offset = 0;
        for record in &fresh {
            let fragment = self.renderer.render(record, self.surface.width());
            let len = fragment.len();
            let root = self.insert_at(offset, fragment);
            self.request_media(root);
            offset += len;
        }
        info!(count = fresh.len(), "prepended newer records");
        fresh.len()
    }

    pub fn mark_update_banner(&mut self) {
        if let Some(old) = self.banner.take() {
            if let Some(range) = self.surface.span(old).map(|span| span.range.clone()) {
                self.remove_at(range);
            }
        }
        let banner = self.renderer.banner(self.surface.width());
        self.banner = Some(self.insert_at(0, banner));
    }

    pub fn goto_next(&mut self) {
        let pos = self.point;
        self.point = navigate::next_record(self, pos);
    }

    pub fn goto_prev(&mut self) {
        let pos = self.point;
        self.point = navigate::prev_record(self, pos);
    }

    pub fn toggle_fold(&mut self) -> Option<Phase> {
        let phase = fold::toggle(&mut self.surface, self.point);
        debug!(point = self.point, ?phase, "fold toggled");
        phase
    }

    pub fn toggle_favourite(&mut self) -> bool {
        self.toggle_counter(CounterKind::Favourite, self.point)
    }

    pub fn toggle_boost(&mut self) -> bool {
        self.toggle_counter(CounterKind::Boost, self.point)
    }

    pub fn toggle_bookmark(&mut self) -> bool {
        self.toggle_counter(CounterKind::Bookmark, self.point)
    }

    pub fn click(&mut self, pos: usize) -> bool {
        self.set_point(pos);
        let pos = self.point;
        if self.surface.provider(pos, AttrKey::FoldToggle).is_some() {
            return fold::toggle_direct(&mut self.surface, pos).is_some();
        }
        match self.surface.attributes_at(pos).field {
            Some(Field::Action(kind)) => self.toggle_counter(kind, pos),
            _ => false,
        }
    }

    fn toggle_counter(&mut self, kind: CounterKind, pos: usize) -> bool {
        let faces = self.renderer.config().status_faces.clone();
        let Some(request) = counters::toggle(&mut self.surface, &faces, kind, pos) else {
            debug!(?kind, pos, "nothing to toggle");
            return false;
        };
        self.submit(request);
        true
    }

    fn submit(&mut self, request: ToggleRequest) {
        info!(action = %request.action, target = %request.target_id, "submitting action");
        let service = Arc::clone(&self.services.actions);
        let tx = self.response_tx.clone();
        self.pending_actions += 1;
        thread::spawn(move || {
            let error = service
                .submit(request.action, &request.target_id)
                .err()
                .map(|err| format!("{err:#}"));
            let _ = tx.send(AsyncResponse::ActionResult { request, error });
        });
    }

    pub fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            changed = true;
        }
        changed |= self.poll_media();
        changed
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::ActionResult { request, error } => {
                self.pending_actions = self.pending_actions.saturating_sub(1);
                let Some(error) = error else {
                    debug!(action = %request.action, target = %request.target_id, "action confirmed");
                    return;
                };
                warn!(action = %request.action, target = %request.target_id, %error, "action failed");
                let faces = self.renderer.config().status_faces.clone();
                if !counters::revert(&mut self.surface, &faces, &request) {
                    debug!(action = %request.action, "failure superseded; keeping current state");
                }
                self.notify(format!("Failed to {}: {error}", request.action));
            }
        }
    }

    fn poll_media(&mut self) -> bool {
        let mut changed = false;
        let mut still_pending = Vec::with_capacity(self.pending_media.len());
        for pending in std::mem::take(&mut self.pending_media) {
            match pending.rx.try_recv() {
                Ok(Ok(thumbnail)) => {
                    changed |= self.deliver_media(pending.span, pending.ticket, thumbnail);
                }
                Ok(Err(err)) => {
                    debug!(ticket = pending.ticket, error = %err, "media fetch failed");
                }
                Err(TryRecvError::Empty) => still_pending.push(pending),
                Err(TryRecvError::Disconnected) => {
                    debug!(ticket = pending.ticket, "media worker went away");
                }
            }
        }
        self.pending_media = still_pending;
        changed
    }

    fn deliver_media(&mut self, span: SpanId, ticket: u64, thumbnail: Thumbnail) -> bool {
        let slot = self
            .surface
            .attrs_mut(span)
            .and_then(|attrs| attrs.media.as_mut())
            .filter(|slot| slot.ticket == ticket);
        match slot {
            Some(slot) => {
                slot.payload = Some(Arc::new(thumbnail));
                true
            }
            None => {
                debug!(ticket, "dropping media for a span that is gone");
                false
            }
        }
    }

    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.poll_async();
            if !self.is_busy() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    pub fn is_busy(&self) -> bool {
        self.pending_actions > 0 || !self.pending_media.is_empty()
    }

    pub fn take_notice(&mut self) -> Option<String> {
        self.notices.pop_front()
    }

    fn notify(&mut self, notice: String) {
        self.notices.push_back(notice);
    }

    fn request_media(&mut self, root: SpanId) {
        let Some(service) = self.services.media.as_ref().map(Arc::clone) else {
            return;
        };
        let Some(range) = self.surface.span(root).map(|span| span.range.clone()) else {
            return;
        };
        let wanted: Vec<(SpanId, u64, String)> = self
            .surface
            .spans()
            .within(range)
            .filter_map(|span| {
                let slot = span.attrs.media.as_ref()?;
                slot.payload
                    .is_none()
                    .then(|| (span.id, slot.ticket, slot.url.clone()))
            })
            .collect();
        for (span, ticket, url) in wanted {
            debug!(ticket, %url, "requesting media");
            let rx = service.fetch_media(&url);
            self.pending_media.push(PendingMedia { span, ticket, rx });
        }
    }

    fn insert_at(&mut self, pos: usize, fragment: Fragment) -> SpanId {
        let len = fragment.len();
        let old_len = self.surface.len();
        let root = self.surface.insert_fragment(pos, fragment);
        // Content at or after the cursor moves down; appending leaves it alone.
        if self.point > pos || (self.point == pos && pos < old_len) {
            self.point += len;
        }
        self.point = self.point.min(self.surface.len());
        root
    }

    fn remove_at(&mut self, range: Range<usize>) {
        let count = range.end.saturating_sub(range.start);
        self.surface.remove(range.clone());
        if self.point >= range.end {
            self.point -= count;
        } else if self.point > range.start {
            self.point = range.start;
        }
    }
}

impl Navigable for Timeline {
    fn surface(&self) -> &Surface {
        &self.surface
    }

    fn fetch_more(&mut self) {
        self.load_more();
    }

    fn fetch_refresh(&mut self) {
        self.refresh_records();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Action, MockActionService, PagedFeed};
    use crate::render::MARKER_LEN;
    use crate::span::StatusClass;
    use anyhow::anyhow;
    use crossbeam_channel::bounded;
    use image::RgbaImage;
    use parking_lot::Mutex;

    struct RejectingActions;

    impl ActionService for RejectingActions {
        fn submit(&self, action: Action, _target_id: &str) -> anyhow::Result<()> {
            Err(anyhow!("server refused {action}"))
        }
    }

    struct InstantMedia;

    impl MediaService for InstantMedia {
        fn fetch_media(&self, _url: &str) -> Receiver<anyhow::Result<Thumbnail>> {
            let (tx, rx) = bounded(1);
            let _ = tx.send(Ok(Thumbnail {
                image: RgbaImage::new(2, 2),
            }));
            rx
        }
    }

    struct QueuedFeed {
        older: Mutex<Vec<Record>>,
        newer: Mutex<Vec<Record>>,
    }

    impl FeedService for QueuedFeed {
        fn fetch_more(&self) -> anyhow::Result<Vec<Record>> {
            Ok(std::mem::take(&mut *self.older.lock()))
        }

        fn fetch_refresh(&self) -> anyhow::Result<Vec<Record>> {
            Ok(std::mem::take(&mut *self.newer.lock()))
        }
    }

    fn services(actions: Arc<dyn ActionService>) -> Services {
        Services {
            feed: Arc::new(PagedFeed::new(Vec::new(), 10)),
            actions,
            media: None,
        }
    }

    fn timeline_with(records: &[Record], actions: Arc<dyn ActionService>) -> Timeline {
        let mut timeline = Timeline::new(TimelineConfig::default(), services(actions), 60);
        for record in records {
            timeline.render_record(record);
        }
        timeline
    }

    fn start_of(timeline: &Timeline, id: &str) -> usize {
        let span = timeline.surface().record_span(id).unwrap();
        timeline.surface().span(span).unwrap().range.start
    }

    fn favourite_class(timeline: &Timeline) -> Option<StatusClass> {
        let record = timeline.surface().record_at(timeline.point())?.range.start;
        let span = counters::locate_counter(timeline.surface(), record, CounterKind::Favourite)?;
        counters::class_at(timeline.surface(), span)
    }

    #[test]
    fn failed_favourite_reverts_and_leaves_a_notice() {
        let mut record = Record::new("1", "ada", "like me");
        record.favourites_count = 3;
        let mut timeline = timeline_with(&[record], Arc::new(RejectingActions));
        timeline.set_point(MARKER_LEN + 1);

        assert!(timeline.toggle_favourite());
        assert_eq!(favourite_class(&timeline), Some(StatusClass::User));

        assert!(timeline.wait_idle(Duration::from_secs(5)));
        assert_eq!(favourite_class(&timeline), Some(StatusClass::Active));
        let notice = timeline.take_notice().unwrap();
        assert!(notice.contains("favourite"), "{notice}");
        assert!(timeline.take_notice().is_none());
    }

    #[test]
    fn confirmed_actions_keep_the_optimistic_state() {
        let mut timeline = timeline_with(
            &[Record::new("1", "ada", "keep me")],
            Arc::new(MockActionService),
        );
        timeline.set_point(MARKER_LEN + 1);
        assert!(timeline.toggle_bookmark());
        assert!(timeline.wait_idle(Duration::from_secs(5)));
        assert!(timeline.take_notice().is_none());
        let start = start_of(&timeline, "1");
        let span =
            counters::locate_counter(timeline.surface(), start, CounterKind::Bookmark).unwrap();
        assert_eq!(
            counters::class_at(timeline.surface(), span),
            Some(StatusClass::User)
        );
    }

    #[test]
    fn navigation_survives_toggles() {
        let records = [
            Record::new("a", "ada", "first"),
            Record::new("b", "bob", "second"),
        ];
        let mut timeline = timeline_with(&records, Arc::new(MockActionService));
        timeline.set_point(MARKER_LEN);
        timeline.toggle_favourite();
        timeline.goto_next();
        assert_eq!(timeline.point(), start_of(&timeline, "b") + MARKER_LEN);
        timeline.goto_prev();
        assert_eq!(timeline.point(), start_of(&timeline, "a") + MARKER_LEN);
        timeline.wait_idle(Duration::from_secs(5));
    }

    #[test]
    fn goto_next_at_the_end_loads_more() {
        let feed = Arc::new(PagedFeed::new(
            vec![Record::new("a", "ada", "one"), Record::new("b", "bob", "two")],
            1,
        ));
        let mut timeline = Timeline::new(
            TimelineConfig::default(),
            Services {
                feed,
                actions: Arc::new(MockActionService),
                media: None,
            },
            60,
        );
        assert_eq!(timeline.load_more(), 1);
        timeline.set_point(MARKER_LEN);
        timeline.goto_next();
        assert!(timeline.surface().record_span("b").is_some());
        assert_eq!(timeline.point(), timeline.surface().len());
    }

    #[test]
    fn refresh_prepends_newer_records_above_a_banner() {
        let feed = Arc::new(QueuedFeed {
            older: Mutex::new(vec![Record::new("old", "ada", "older post")]),
            newer: Mutex::new(Vec::new()),
        });
        let mut timeline = Timeline::new(
            TimelineConfig::default(),
            Services {
                feed: feed.clone(),
                actions: Arc::new(MockActionService),
                media: None,
            },
            60,
        );
        timeline.load_more();
        let mut edited = Record::new("old", "ada", "edited post");
        edited.favourites_count = 1;
        *feed.newer.lock() = vec![Record::new("new", "bob", "newer post"), edited];

        assert_eq!(timeline.refresh(), 1);
        assert_eq!(timeline.point(), 0);
        let text = timeline.visible_text();
        let new_at = text.find("newer post").unwrap();
        let banner_at = text.find("new posts above").unwrap();
        let old_at = text.find("edited post").unwrap();
        assert!(new_at < banner_at && banner_at < old_at);
        assert!(!text.contains("older post"));

        // A second banner replaces the first.
        timeline.mark_update_banner();
        assert_eq!(timeline.visible_text().matches("new posts above").count(), 1);
    }

    #[test]
    fn refresh_keeps_the_first_copy_of_a_repeated_record() {
        let feed = Arc::new(QueuedFeed {
            older: Mutex::new(vec![Record::new("old", "ada", "older post")]),
            newer: Mutex::new(Vec::new()),
        });
        let mut timeline = Timeline::new(
            TimelineConfig::default(),
            Services {
                feed: feed.clone(),
                actions: Arc::new(MockActionService),
                media: None,
            },
            60,
        );
        timeline.load_more();
        *feed.newer.lock() = vec![
            Record::new("x", "bob", "first copy"),
            Record::new("x", "bob", "second copy"),
        ];

        assert_eq!(timeline.refresh(), 1);
        let copies = timeline
            .surface()
            .spans()
            .iter()
            .filter(|span| span.attrs.item_id.as_deref() == Some("x"))
            .count();
        assert_eq!(copies, 1);
        let text = timeline.visible_text();
        assert!(text.contains("first copy"));
        assert!(!text.contains("second copy"));
    }

    #[test]
    fn clicking_titles_and_buttons() {
        let mut record = Record::new("cw", "ada", "hidden words");
        record.spoiler_text = "spoiler".into();
        let mut timeline = timeline_with(&[record], Arc::new(MockActionService));
        assert!(!timeline.visible_text().contains("hidden words"));

        let title = timeline.visible_text().find("CW: spoiler").unwrap();
        let title_pos = timeline.visible_text()[..title].chars().count();
        assert!(timeline.click(title_pos));
        assert!(timeline.visible_text().contains("hidden words"));

        let text = timeline.surface().text(0..timeline.surface().len());
        let button = text.find("[♥ favourite]").unwrap();
        let button_pos = text[..button].chars().count() + 1;
        assert!(timeline.click(button_pos));
        assert_eq!(favourite_class(&timeline), Some(StatusClass::User));
        assert!(!timeline.click(0));
        timeline.wait_idle(Duration::from_secs(5));
    }

    #[test]
    fn media_reaches_live_placeholders_only() {
        let mut record = Record::new("m", "photos", "pics");
        record.media_attachments.push(crate::record::Attachment {
            media_type: "image".into(),
            url: "https://example.com/a.png".into(),
            ..Default::default()
        });
        let mut timeline = Timeline::new(
            TimelineConfig::default(),
            Services {
                media: Some(Arc::new(InstantMedia)),
                ..services(Arc::new(MockActionService))
            },
            60,
        );
        let first = timeline.render_record(&record);
        let stale: Vec<SpanId> = timeline
            .surface()
            .spans()
            .iter()
            .filter(|span| span.attrs.media.is_some())
            .map(|span| span.id)
            .collect();
        // Re-rendering destroys the first placeholder before it is filled.
        let second = timeline.render_record(&record);
        assert_ne!(first, second);
        assert!(timeline.wait_idle(Duration::from_secs(5)));

        assert!(stale.iter().all(|id| timeline.surface().span(*id).is_none()));
        let filled = timeline
            .surface()
            .spans()
            .iter()
            .filter_map(|span| span.attrs.media.as_ref())
            .filter(|slot| slot.payload.is_some())
            .count();
        assert_eq!(filled, 1);
    }
}
