use crate::render::MARKER_LEN;
use crate::span::{AttrKey, Direction};
use crate::surface::Surface;

pub trait Navigable {
    fn surface(&self) -> &Surface;
    fn fetch_more(&mut self);
    fn fetch_refresh(&mut self);
}

pub fn next_record<N: Navigable + ?Sized>(host: &mut N, pos: usize) -> usize {
    let surface = host.surface();
    let mut cursor = pos.min(surface.len());
    loop {
        match surface.find_boundary(cursor, AttrKey::ItemId, Direction::Forward) {
            Some(boundary) if surface.record_at(boundary).is_some() => {
                return land(surface, boundary);
            }
            Some(boundary) => cursor = boundary,
            None => break,
        }
    }
    host.fetch_more();
    host.surface().len()
}

pub fn prev_record<N: Navigable + ?Sized>(host: &mut N, pos: usize) -> usize {
    let surface = host.surface();
    let pos = pos.min(surface.len());
    let Some(current_start) = surface.find_boundary(pos, AttrKey::ItemId, Direction::Backward)
    else {
        host.fetch_refresh();
        return 0;
    };

    let mut target = current_start;
    loop {
        match surface.find_boundary(target, AttrKey::ItemId, Direction::Backward) {
            Some(previous) => {
                target = previous;
                if surface.record_at(previous).is_some() {
                    break;
                }
            }
            None if surface.record_at(0).is_some() => {
                target = 0;
                break;
            }
            None => {
                host.fetch_refresh();
                return 0;
            }
        }
    }
    land(surface, target)
}

fn land(surface: &Surface, start: usize) -> usize {
    let pos = if surface.record_at(start).is_some() {
        start + MARKER_LEN
    } else {
        start
    };
    pos.min(surface.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimelineConfig;
    use crate::record::Record;
    use crate::render::Renderer;

    struct Harness {
        surface: Surface,
        renderer: Renderer,
        more: Vec<Record>,
        fetch_more_calls: usize,
        fetch_refresh_calls: usize,
    }

    impl Harness {
        fn new(ids: &[&str]) -> Self {
            let mut harness = Self {
                surface: Surface::new(50),
                renderer: Renderer::new(TimelineConfig::default()),
                more: Vec::new(),
                fetch_more_calls: 0,
                fetch_refresh_calls: 0,
            };
            for id in ids {
                harness.append(Record::new(id, "ada", &format!("post {id}")));
            }
            harness
        }

        fn append(&mut self, record: Record) {
            let fragment = self.renderer.render(&record, self.surface.width());
            self.surface.append(fragment);
        }

        fn start_of(&self, id: &str) -> usize {
            let span = self.surface.record_span(id).unwrap();
            self.surface.span(span).unwrap().range.start
        }
    }

    impl Navigable for Harness {
        fn surface(&self) -> &Surface {
            &self.surface
        }

        fn fetch_more(&mut self) {
            self.fetch_more_calls += 1;
            for record in std::mem::take(&mut self.more) {
                self.append(record);
            }
        }

        fn fetch_refresh(&mut self) {
            self.fetch_refresh_calls += 1;
        }
    }

    #[test]
    fn next_walks_one_record_at_a_time() {
        let mut harness = Harness::new(&["a", "b", "c"]);
        let mut pos = 0;
        pos = next_record(&mut harness, pos);
        assert_eq!(pos, harness.start_of("b") + MARKER_LEN);
        pos = next_record(&mut harness, pos);
        assert_eq!(pos, harness.start_of("c") + MARKER_LEN);
        assert_eq!(harness.fetch_more_calls, 0);
    }

    #[test]
    fn prev_walks_one_record_at_a_time() {
        let mut harness = Harness::new(&["a", "b", "c"]);
        let mut pos = harness.start_of("c") + MARKER_LEN;
        pos = prev_record(&mut harness, pos);
        assert_eq!(pos, harness.start_of("b") + MARKER_LEN);
        pos = prev_record(&mut harness, pos);
        assert_eq!(pos, harness.start_of("a") + MARKER_LEN);
        assert_eq!(harness.fetch_refresh_calls, 0);
        // Repeating from the middle of a record lands on the previous one too.
        let middle = harness.start_of("b") + 6;
        assert_eq!(
            prev_record(&mut harness, middle),
            harness.start_of("a") + MARKER_LEN
        );
    }

    #[test]
    fn last_record_fetches_more_exactly_once() {
        let mut harness = Harness::new(&["a", "b"]);
        harness.more.push(Record::new("c", "bob", "fresh"));
        let pos = harness.start_of("b") + MARKER_LEN;
        let landed = next_record(&mut harness, pos);
        assert_eq!(harness.fetch_more_calls, 1);
        assert_eq!(landed, harness.surface.len());
        assert!(harness.surface.record_span("c").is_some());
    }

    #[test]
    fn first_record_refreshes_exactly_once() {
        let mut harness = Harness::new(&["a", "b"]);
        let landed = prev_record(&mut harness, MARKER_LEN + 1);
        assert_eq!(harness.fetch_refresh_calls, 1);
        assert_eq!(landed, 0);
    }

    #[test]
    fn positions_stay_in_bounds() {
        let mut harness = Harness::new(&[]);
        assert_eq!(next_record(&mut harness, 40), 0);
        assert_eq!(prev_record(&mut harness, 40), 0);
        let mut harness = Harness::new(&["a"]);
        let len = harness.surface.len();
        assert!(next_record(&mut harness, len + 10) <= len);
        assert_eq!(harness.fetch_more_calls, 1);
    }

    #[test]
    fn banners_between_records_are_skipped() {
        let mut harness = Harness::new(&["b"]);
        let banner = harness.renderer.banner(harness.surface.width());
        harness.surface.insert_fragment(0, banner);
        let fragment = harness
            .renderer
            .render(&Record::new("a", "ada", "newer"), 50);
        harness.surface.insert_fragment(0, fragment);

        let from_a = harness.start_of("a") + MARKER_LEN;
        assert_eq!(
            next_record(&mut harness, from_a),
            harness.start_of("b") + MARKER_LEN
        );
        let from_b = harness.start_of("b") + MARKER_LEN;
        assert_eq!(
            prev_record(&mut harness, from_b),
            harness.start_of("a") + MARKER_LEN
        );
    }

    #[test]
    fn first_record_below_a_banner_still_refreshes() {
        let mut harness = Harness::new(&["a", "b"]);
        let banner = harness.renderer.banner(harness.surface.width());
        harness.surface.insert_fragment(0, banner);

        let inside_a = harness.start_of("a") + 4;
        assert_eq!(prev_record(&mut harness, inside_a), 0);
        assert_eq!(harness.fetch_refresh_calls, 1);

        let from_b = harness.start_of("b") + MARKER_LEN;
        assert_eq!(
            prev_record(&mut harness, from_b),
            harness.start_of("a") + MARKER_LEN
        );
        assert_eq!(harness.fetch_refresh_calls, 1);
    }
}
