use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;
use std::sync::Arc;

use ratatui::style::Style;

use crate::data::Thumbnail;
use crate::record::{CounterKind, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKey {
    ItemId,
    Record,
    Field,
    Counter,
    Face,
    Fold,
    FoldToggle,
    Filler,
    Media,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Author,
    Body,
    Box,
    Timestamp,
    StatusLine,
    Counter(CounterKind),
    Action(CounterKind),
    Media,
    Banner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Default,
    Active,
    User,
}

impl StatusClass {
    pub fn classify(count: u64, flag: bool) -> Self {
        if flag {
            StatusClass::User
        } else if count > 0 {
            StatusClass::Active
        } else {
            StatusClass::Default
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
    pub kind: CounterKind,
    pub flag: bool,
    pub count: u64,
    pub class: StatusClass,
}

impl CounterState {
    pub fn new(kind: CounterKind, flag: bool, count: u64) -> Self {
        Self {
            kind,
            flag,
            count,
            class: StatusClass::classify(count, flag),
        }
    }

    pub fn set_flag(&mut self, flag: bool) {
        self.flag = flag;
        self.class = StatusClass::classify(self.count, flag);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldState {
    pub folded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldToggle {
    pub body_len: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaSlot {
    pub url: String,
    pub label: String,
    pub ticket: u64,
    pub payload: Option<Arc<Thumbnail>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attrs {
    pub item_id: Option<String>,
    pub record: Option<Arc<Record>>,
    pub field: Option<Field>,
    pub counter: Option<CounterState>,
    pub face: Option<Style>,
    pub fold: Option<FoldState>,
    pub fold_toggle: Option<FoldToggle>,
    pub filler: Option<usize>,
    pub media: Option<MediaSlot>,
}

impl Attrs {
    pub fn field(field: Field) -> Self {
        Self {
            field: Some(field),
            ..Self::default()
        }
    }

    pub fn face(style: Style) -> Self {
        Self {
            face: Some(style),
            ..Self::default()
        }
    }

    pub fn with_face(mut self, style: Style) -> Self {
        self.face = Some(style);
        self
    }

    pub fn has(&self, key: AttrKey) -> bool {
        match key {
            AttrKey::ItemId => self.item_id.is_some(),
            AttrKey::Record => self.record.is_some(),
            AttrKey::Field => self.field.is_some(),
            AttrKey::Counter => self.counter.is_some(),
            AttrKey::Face => self.face.is_some(),
            AttrKey::Fold => self.fold.is_some(),
            AttrKey::FoldToggle => self.fold_toggle.is_some(),
            AttrKey::Filler => self.filler.is_some(),
            AttrKey::Media => self.media.is_some(),
        }
    }

    fn overlay(&mut self, other: &Attrs) {
        if other.item_id.is_some() {
            self.item_id = other.item_id.clone();
        }
        if other.record.is_some() {
            self.record = other.record.clone();
        }
        if other.field.is_some() {
            self.field = other.field;
        }
        if other.counter.is_some() {
            self.counter = other.counter;
        }
        if let Some(face) = other.face {
            self.face = Some(self.face.unwrap_or_default().patch(face));
        }
        if other.fold.is_some() {
            self.fold = other.fold;
        }
        if other.fold_toggle.is_some() {
            self.fold_toggle = other.fold_toggle;
        }
        if other.filler.is_some() {
            self.filler = other.filler;
        }
        if other.media.is_some() {
            self.media = other.media.clone();
        }
    }
}

#[derive(Debug, Clone)]
pub struct Span {
    pub id: SpanId,
    pub range: Range<usize>,
    pub attrs: Attrs,
}

// Record spans (those carrying an item id) never nest and never overlap
// each other; every other span lies inside one record or in the gap
// between two. Covering scans start at the enclosing record.
#[derive(Debug, Default)]
pub struct SpanArena {
    spans: HashMap<SpanId, Span>,
    by_start: BTreeSet<(usize, SpanId)>,
    roots: BTreeSet<(usize, SpanId)>,
    edges: BTreeMap<usize, usize>,
    records: HashMap<String, SpanId>,
    next_id: u64,
}

impl SpanArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn attach(&mut self, range: Range<usize>, attrs: Attrs) -> SpanId {
        self.next_id += 1;
        let id = SpanId(self.next_id);
        let root = attrs.item_id.is_some();
        if let Some(item_id) = attrs.item_id.as_ref() {
            self.records.insert(item_id.clone(), id);
        }
        self.index(id, &range, root);
        self.spans.insert(id, Span { id, range, attrs });
        id
    }

    pub fn get(&self, id: SpanId) -> Option<&Span> {
        self.spans.get(&id)
    }

    pub fn attrs_mut(&mut self, id: SpanId) -> Option<&mut Attrs> {
        self.spans.get_mut(&id).map(|span| &mut span.attrs)
    }

    pub fn contains(&self, id: SpanId) -> bool {
        self.spans.contains_key(&id)
    }

    pub fn record_span(&self, item_id: &str) -> Option<SpanId> {
        self.records.get(item_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Span> {
        self.by_start.iter().filter_map(|(_, id)| self.spans.get(id))
    }

    pub fn starting_at(&self, pos: usize) -> impl Iterator<Item = &Span> {
        self.by_start
            .range((pos, SpanId(0))..=(pos, SpanId(u64::MAX)))
            .filter_map(|(_, id)| self.spans.get(id))
    }

    pub fn within(&self, range: Range<usize>) -> impl Iterator<Item = &Span> {
        let end = range.end;
        self.by_start
            .range((range.start, SpanId(0))..(end, SpanId(0)))
            .filter_map(|(_, id)| self.spans.get(id))
            .filter(move |span| span.range.end <= end)
    }

    pub fn covering(&self, pos: usize) -> impl Iterator<Item = &Span> {
        let floor = match self.root_before(pos) {
            Some(root) if root.range.end > pos => root.range.start,
            Some(root) => root.range.end,
            None => 0,
        };
        self.by_start
            .range((floor, SpanId(0))..=(pos, SpanId(u64::MAX)))
            .filter_map(|(_, id)| self.spans.get(id))
            .filter(move |span| span.range.end > pos)
    }

    fn root_before(&self, pos: usize) -> Option<&Span> {
        self.roots
            .range(..=(pos, SpanId(u64::MAX)))
            .next_back()
            .and_then(|(_, id)| self.spans.get(id))
    }

    pub fn provider(&self, pos: usize, key: AttrKey) -> Option<SpanId> {
        self.covering(pos)
            .filter(|span| span.attrs.has(key))
            .map(|span| span.id)
            .max()
    }

    pub fn attributes_at(&self, pos: usize) -> Attrs {
        let mut covering: Vec<&Span> = self.covering(pos).collect();
        covering.sort_by_key(|span| span.id);
        merge(covering)
    }

    // Scoped to the record run around `pos`. The surface end is never a
    // boundary.
    pub fn find_boundary(
        &self,
        pos: usize,
        key: AttrKey,
        direction: Direction,
        len: usize,
    ) -> Option<usize> {
        match direction {
            Direction::Forward => {
                if pos >= len {
                    return None;
                }
                let value = self.provider(pos, key);
                let limit = self.run_end(pos, len);
                self.edges
                    .range(pos + 1..=limit)
                    .map(|(edge, _)| *edge)
                    .take_while(|edge| *edge < len)
                    .find(|edge| self.provider(*edge, key) != value)
            }
            Direction::Backward => {
                let pos = pos.min(len);
                if pos == 0 {
                    return None;
                }
                let value = self.provider(pos - 1, key);
                let floor = self.run_start(pos - 1);
                self.edges
                    .range(floor..pos)
                    .rev()
                    .map(|(edge, _)| *edge)
                    .take_while(|edge| *edge > 0)
                    .find(|edge| self.provider(*edge - 1, key) != value)
            }
        }
    }

    fn run_end(&self, pos: usize, len: usize) -> usize {
        match self.root_before(pos) {
            Some(root) if root.range.end > pos => root.range.end.min(len),
            _ => self
                .roots
                .range((pos + 1, SpanId(0))..)
                .next()
                .map(|(start, _)| (*start).min(len))
                .unwrap_or(len),
        }
    }

    fn run_start(&self, pos: usize) -> usize {
        match self.root_before(pos) {
            Some(root) if root.range.end > pos => root.range.start,
            Some(root) => root.range.end,
            None => 0,
        }
    }

    // Spans starting at or after `pos` move; spans strictly containing it grow.
    pub fn shift_for_insert(&mut self, pos: usize, count: usize) {
        if count == 0 {
            return;
        }
        let growing: Vec<SpanId> = self
            .covering(pos)
            .filter(|span| span.range.start < pos)
            .map(|span| span.id)
            .collect();
        let moving: Vec<SpanId> = self
            .by_start
            .range((pos, SpanId(0))..)
            .map(|(_, id)| *id)
            .collect();
        for id in growing {
            self.reshape(id, |range| range.start..range.end + count);
        }
        for id in moving {
            self.reshape(id, |range| range.start + count..range.end + count);
        }
    }

    pub fn remove_range(&mut self, range: Range<usize>) -> Vec<SpanId> {
        let count = range.end.saturating_sub(range.start);
        if count == 0 {
            return Vec::new();
        }
        let clipped: Vec<SpanId> = self
            .covering(range.start)
            .filter(|span| span.range.start < range.start)
            .map(|span| span.id)
            .collect();
        let later: Vec<(SpanId, usize)> = self
            .by_start
            .range((range.start, SpanId(0))..)
            .filter_map(|(_, id)| self.spans.get(id))
            .map(|span| (span.id, span.range.end))
            .collect();

        let clip = |offset: usize| -> usize {
            if offset <= range.start {
                offset
            } else if offset >= range.end {
                offset - count
            } else {
                range.start
            }
        };
        let mut doomed = Vec::new();
        for (id, end) in later {
            if end <= range.end {
                self.destroy(id);
                doomed.push(id);
            } else {
                self.reshape(id, |span| clip(span.start)..clip(span.end));
            }
        }
        for id in clipped {
            self.reshape(id, |span| clip(span.start)..clip(span.end));
        }
        doomed
    }

    fn destroy(&mut self, id: SpanId) {
        let Some(span) = self.spans.remove(&id) else {
            return;
        };
        let root = span.attrs.item_id.is_some();
        if let Some(item_id) = span.attrs.item_id.as_ref() {
            if self.records.get(item_id) == Some(&id) {
                self.records.remove(item_id);
            }
        }
        self.unindex(id, &span.range, root);
    }

    fn reshape(&mut self, id: SpanId, f: impl FnOnce(Range<usize>) -> Range<usize>) {
        let Some(span) = self.spans.get(&id) else {
            return;
        };
        let old = span.range.clone();
        let root = span.attrs.item_id.is_some();
        let new = f(old.clone());
        if new == old {
            return;
        }
        self.unindex(id, &old, root);
        self.index(id, &new, root);
        if let Some(span) = self.spans.get_mut(&id) {
            span.range = new;
        }
    }

    fn index(&mut self, id: SpanId, range: &Range<usize>, root: bool) {
        self.by_start.insert((range.start, id));
        if root {
            self.roots.insert((range.start, id));
        }
        *self.edges.entry(range.start).or_default() += 1;
        *self.edges.entry(range.end).or_default() += 1;
    }

    fn unindex(&mut self, id: SpanId, range: &Range<usize>, root: bool) {
        self.by_start.remove(&(range.start, id));
        if root {
            self.roots.remove(&(range.start, id));
        }
        self.drop_edge(range.start);
        self.drop_edge(range.end);
    }

    fn drop_edge(&mut self, edge: usize) {
        if let Some(count) = self.edges.get_mut(&edge) {
            *count -= 1;
            if *count == 0 {
                self.edges.remove(&edge);
            }
        }
    }

    pub(crate) fn edges(&self) -> impl Iterator<Item = usize> + '_ {
        self.edges.keys().copied()
    }
}

pub(crate) fn merge<'a>(spans: impl IntoIterator<Item = &'a Span>) -> Attrs {
    let mut merged = Attrs::default();
    for span in spans {
        merged.overlay(&span.attrs);
    }
    merged
}
