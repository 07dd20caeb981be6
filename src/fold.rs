use crate::span::{AttrKey, Direction, FoldState, SpanId};
use crate::surface::Surface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Expanded,
    Collapsed,
}

impl From<FoldState> for Phase {
    fn from(state: FoldState) -> Self {
        if state.folded {
            Phase::Collapsed
        } else {
            Phase::Expanded
        }
    }
}

// Falls back to the record's first foldable box when `pos` is not on a title.
pub fn toggle(surface: &mut Surface, pos: usize) -> Option<Phase> {
    let title = surface
        .provider(pos, AttrKey::FoldToggle)
        .or_else(|| first_title_in_record(surface, pos))?;
    toggle_title(surface, title)
}

pub fn toggle_direct(surface: &mut Surface, pos: usize) -> Option<Phase> {
    let title = surface.provider(pos, AttrKey::FoldToggle)?;
    toggle_title(surface, title)
}

pub fn toggle_title(surface: &mut Surface, title: SpanId) -> Option<Phase> {
    let body = body_span(surface, title)?;
    let fold = surface.attrs_mut(body)?.fold.as_mut()?;
    fold.folded = !fold.folded;
    Some(Phase::from(*fold))
}

pub fn phase(surface: &Surface, title: SpanId) -> Option<Phase> {
    let body = body_span(surface, title)?;
    surface
        .span(body)
        .and_then(|span| span.attrs.fold)
        .map(Phase::from)
}

fn body_span(surface: &Surface, title: SpanId) -> Option<SpanId> {
    let span = surface.span(title)?;
    let toggle = span.attrs.fold_toggle?;
    let body = span.range.end..span.range.end + toggle.body_len;
    surface
        .spans()
        .starting_at(body.start)
        .find(|candidate| candidate.range == body && candidate.attrs.fold.is_some())
        .map(|candidate| candidate.id)
}

fn first_title_in_record(surface: &Surface, pos: usize) -> Option<SpanId> {
    let start = surface.record_at(pos)?.range.start;
    if let Some(title) = surface.provider(start, AttrKey::FoldToggle) {
        return Some(title);
    }
    let mut cursor = start;
    while let Some(next) = surface.find_boundary(cursor, AttrKey::FoldToggle, Direction::Forward) {
        if let Some(title) = surface.provider(next, AttrKey::FoldToggle) {
            return Some(title);
        }
        cursor = next;
    }
    None
}
