use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use crate::span::{merge, AttrKey, Attrs, Direction, Span, SpanArena, SpanId};

#[derive(Debug, Clone, Default)]
// Children are attached after the root, so they win where they overlap it.
pub struct Fragment {
    text: String,
    len: usize,
    root: Attrs,
    children: Vec<(Range<usize>, Attrs)>,
}

impl Fragment {
    pub fn new(root: Attrs) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn children(&self) -> &[(Range<usize>, Attrs)] {
        &self.children
    }

    pub fn push_str(&mut self, text: &str) -> Range<usize> {
        let start = self.len;
        self.text.push_str(text);
        self.len += text.chars().count();
        start..self.len
    }

    pub fn push_span(&mut self, text: &str, attrs: Attrs) -> Range<usize> {
        let range = self.push_str(text);
        self.children.push((range.clone(), attrs));
        range
    }

    pub fn push_fragment(&mut self, other: Fragment) -> Range<usize> {
        let offset = self.len;
        let range = self.push_str(&other.text);
        self.children.push((range.clone(), other.root));
        for (child, attrs) in other.children {
            self.children
                .push((child.start + offset..child.end + offset, attrs));
        }
        range
    }

    pub fn tag(&mut self, range: Range<usize>, attrs: Attrs) {
        let range = range.start.min(self.len)..range.end.min(self.len);
        self.children.push((range, attrs));
    }
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub range: Range<usize>,
    pub text: String,
    pub attrs: Attrs,
    pub visible: bool,
}

#[derive(Debug)]
pub struct Surface {
    text: Vec<char>,
    spans: SpanArena,
    width: usize,
}

impl Surface {
    pub fn new(width: usize) -> Self {
        Self {
            text: Vec::new(),
            spans: SpanArena::new(),
            width: width.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn set_width(&mut self, width: usize) {
        self.width = width.max(1);
    }

    pub fn spans(&self) -> &SpanArena {
        &self.spans
    }

    pub fn span(&self, id: SpanId) -> Option<&Span> {
        self.spans.get(id)
    }

    pub fn attrs_mut(&mut self, id: SpanId) -> Option<&mut Attrs> {
        self.spans.attrs_mut(id)
    }

    pub fn text(&self, range: Range<usize>) -> String {
        let end = range.end.min(self.text.len());
        let start = range.start.min(end);
        self.text[start..end].iter().collect()
    }

    pub fn char_at(&self, pos: usize) -> Option<char> {
        self.text.get(pos).copied()
    }

    pub fn attach(&mut self, range: Range<usize>, attrs: Attrs) -> SpanId {
        let end = range.end.min(self.text.len());
        let start = range.start.min(end);
        self.spans.attach(start..end, attrs)
    }

    pub fn attributes_at(&self, pos: usize) -> Attrs {
        self.spans.attributes_at(pos)
    }

    pub fn find_boundary(&self, pos: usize, key: AttrKey, direction: Direction) -> Option<usize> {
        self.spans.find_boundary(pos, key, direction, self.text.len())
    }

    pub fn provider(&self, pos: usize, key: AttrKey) -> Option<SpanId> {
        self.spans.provider(pos, key)
    }

    pub fn record_span(&self, item_id: &str) -> Option<SpanId> {
        self.spans.record_span(item_id)
    }

    pub fn record_at(&self, pos: usize) -> Option<&Span> {
        self.spans
            .provider(pos, AttrKey::ItemId)
            .and_then(|id| self.spans.get(id))
    }

    pub fn insert_fragment(&mut self, pos: usize, fragment: Fragment) -> SpanId {
        let pos = pos.min(self.text.len());
        let Fragment {
            text,
            len,
            root,
            children,
        } = fragment;
        self.text.splice(pos..pos, text.chars());
        self.spans.shift_for_insert(pos, len);
        let root_id = self.spans.attach(pos..pos + len, root);
        for (range, attrs) in children {
            self.spans
                .attach(range.start + pos..range.end + pos, attrs);
        }
        root_id
    }

    pub fn append(&mut self, fragment: Fragment) -> SpanId {
        self.insert_fragment(self.text.len(), fragment)
    }

    pub fn remove(&mut self, range: Range<usize>) -> Vec<SpanId> {
        let end = range.end.min(self.text.len());
        let start = range.start.min(end);
        self.text.drain(start..end);
        self.spans.remove_range(start..end)
    }

    pub fn is_visible(&self, pos: usize) -> bool {
        !self
            .spans
            .covering(pos)
            .any(|span| span.attrs.fold.is_some_and(|fold| fold.folded))
    }

    pub fn segments(&self) -> Vec<Segment> {
        let len = self.text.len();
        let mut cuts = vec![0];
        cuts.extend(self.spans.edges().filter(|edge| *edge > 0 && *edge < len));
        cuts.push(len);

        let mut pending = self.spans.iter().peekable();
        let mut active: BTreeMap<SpanId, &Span> = BTreeMap::new();
        let mut ending: BTreeSet<(usize, SpanId)> = BTreeSet::new();
        let mut segments = Vec::with_capacity(cuts.len());
        for pair in cuts.windows(2) {
            let (start, end) = (pair[0], pair[1]);
            while let Some(&(span_end, id)) = ending.first() {
                if span_end > start {
                    break;
                }
                ending.pop_first();
                active.remove(&id);
            }
            while let Some(span) = pending.next_if(|span| span.range.start <= start) {
                if span.range.end > start {
                    active.insert(span.id, span);
                    ending.insert((span.range.end, span.id));
                }
            }
            if start >= end {
                continue;
            }
            let visible = !active
                .values()
                .any(|span| span.attrs.fold.is_some_and(|fold| fold.folded));
            segments.push(Segment {
                range: start..end,
                text: self.text(start..end),
                attrs: merge(active.values().copied()),
                visible,
            });
        }
        segments
    }

    pub fn visible_text(&self) -> String {
        self.segments()
            .into_iter()
            .filter(|segment| segment.visible)
            .map(|segment| segment.text)
            .collect()
    }
}
