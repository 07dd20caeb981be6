use std::collections::HashMap;

use tracing::debug;

use crate::timeline::Timeline;

pub type Handler = fn(&mut Timeline);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookSlot {
    NavigateNext,
    NavigatePrev,
    ToggleFold,
    ToggleFavourite,
    ToggleBoost,
    ToggleBookmark,
    Refresh,
    MarkUpdate,
}

impl HookSlot {
    pub const ALL: [HookSlot; 8] = [
        HookSlot::NavigateNext,
        HookSlot::NavigatePrev,
        HookSlot::ToggleFold,
        HookSlot::ToggleFavourite,
        HookSlot::ToggleBoost,
        HookSlot::ToggleBookmark,
        HookSlot::Refresh,
        HookSlot::MarkUpdate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HookSlot::NavigateNext => "next",
            HookSlot::NavigatePrev => "previous",
            HookSlot::ToggleFold => "fold",
            HookSlot::ToggleFavourite => "favourite",
            HookSlot::ToggleBoost => "boost",
            HookSlot::ToggleBookmark => "bookmark",
            HookSlot::Refresh => "refresh",
            HookSlot::MarkUpdate => "mark update",
        }
    }
}

#[derive(Default)]
pub struct Hooks {
    handlers: HashMap<HookSlot, Vec<Handler>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_core() -> Self {
        let mut hooks = Self::new();
        hooks.register(HookSlot::NavigateNext, Timeline::goto_next);
        hooks.register(HookSlot::NavigatePrev, Timeline::goto_prev);
        hooks.register(HookSlot::ToggleFold, |timeline| {
            timeline.toggle_fold();
        });
        hooks.register(HookSlot::ToggleFavourite, |timeline| {
            timeline.toggle_favourite();
        });
        hooks.register(HookSlot::ToggleBoost, |timeline| {
            timeline.toggle_boost();
        });
        hooks.register(HookSlot::ToggleBookmark, |timeline| {
            timeline.toggle_bookmark();
        });
        hooks.register(HookSlot::Refresh, |timeline| {
            timeline.refresh();
        });
        hooks.register(HookSlot::MarkUpdate, Timeline::mark_update_banner);
        hooks
    }

    pub fn register(&mut self, slot: HookSlot, handler: Handler) {
        self.handlers.entry(slot).or_default().push(handler);
    }

    pub fn clear(&mut self, slot: HookSlot) {
        self.handlers.remove(&slot);
    }

    pub fn is_bound(&self, slot: HookSlot) -> bool {
        self.handlers.get(&slot).is_some_and(|list| !list.is_empty())
    }

    pub fn dispatch(&self, slot: HookSlot, timeline: &mut Timeline) -> bool {
        let Some(handlers) = self.handlers.get(&slot).filter(|list| !list.is_empty()) else {
            debug!(slot = slot.name(), "no handler bound");
            return false;
        };
        for handler in handlers {
            handler(timeline);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimelineConfig;
    use crate::data::{MockActionService, PagedFeed};
    use crate::record::Record;
    use crate::render::MARKER_LEN;
    use crate::timeline::Services;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn timeline() -> Timeline {
        let feed = PagedFeed::new(
            vec![Record::new("a", "ada", "one"), Record::new("b", "bob", "two")],
            10,
        );
        let mut timeline = Timeline::new(
            TimelineConfig::default(),
            Services {
                feed: Arc::new(feed),
                actions: Arc::new(MockActionService),
                media: None,
            },
            60,
        );
        timeline.load_more();
        timeline.set_point(MARKER_LEN);
        timeline
    }

    #[test]
    fn core_handlers_cover_every_slot() {
        let hooks = Hooks::with_core();
        assert!(HookSlot::ALL.iter().all(|slot| hooks.is_bound(*slot)));

        let mut timeline = timeline();
        let start = timeline.point();
        assert!(hooks.dispatch(HookSlot::NavigateNext, &mut timeline));
        assert!(timeline.point() > start);
        assert!(hooks.dispatch(HookSlot::NavigatePrev, &mut timeline));
        assert_eq!(timeline.point(), start);
    }

    #[test]
    fn unbound_slots_do_nothing() {
        let mut hooks = Hooks::with_core();
        hooks.clear(HookSlot::NavigateNext);
        let mut timeline = timeline();
        let start = timeline.point();
        assert!(!hooks.dispatch(HookSlot::NavigateNext, &mut timeline));
        assert_eq!(timeline.point(), start);
    }

    static EXTRA_CALLS: AtomicUsize = AtomicUsize::new(0);

    #[test]
    fn extra_handlers_run_after_the_core() {
        let mut hooks = Hooks::with_core();
        hooks.register(HookSlot::MarkUpdate, |_| {
            EXTRA_CALLS.fetch_add(1, Ordering::SeqCst);
        });
        let mut timeline = timeline();
        assert!(hooks.dispatch(HookSlot::MarkUpdate, &mut timeline));
        assert_eq!(EXTRA_CALLS.load(Ordering::SeqCst), 1);
        assert!(timeline.visible_text().contains("new posts above"));
    }
}
