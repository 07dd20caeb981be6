use crate::config::StatusFaces;
use crate::data::Action;
use crate::record::{CounterKind, Record};
use crate::span::{AttrKey, Direction, SpanId, StatusClass};
use crate::surface::Surface;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleRequest {
    pub span: SpanId,
    pub kind: CounterKind,
    pub action: Action,
    pub target_id: String,
    pub previous: bool,
    pub requested: bool,
}

pub fn resolve_target(record: &Record) -> Option<&Record> {
    let target = record.shown();
    if target.is_notification() {
        None
    } else {
        Some(target)
    }
}

pub fn locate_counter(surface: &Surface, record_start: usize, kind: CounterKind) -> Option<SpanId> {
    let mut cursor = record_start;
    loop {
        if let Some(id) = surface.provider(cursor, AttrKey::Counter) {
            let matches = surface
                .span(id)
                .and_then(|span| span.attrs.counter)
                .is_some_and(|counter| counter.kind == kind);
            if matches {
                return Some(id);
            }
        }
        cursor = surface.find_boundary(cursor, AttrKey::Counter, Direction::Forward)?;
    }
}

pub fn toggle(
    surface: &mut Surface,
    faces: &StatusFaces,
    kind: CounterKind,
    pos: usize,
) -> Option<ToggleRequest> {
    if !kind.is_toggleable() {
        return None;
    }
    let owner = surface.record_at(pos)?;
    let record = owner.attrs.record.clone()?;
    let record_start = owner.range.start;
    let target = resolve_target(&record)?;
    let span = locate_counter(surface, record_start, kind)?;

    let attrs = surface.attrs_mut(span)?;
    let counter = attrs.counter.as_mut()?;
    let previous = counter.flag;
    let action = Action::for_flag(kind, !previous)?;
    counter.set_flag(!previous);
    attrs.face = Some(faces.style_for(counter.class));

    Some(ToggleRequest {
        span,
        kind,
        action,
        target_id: target.id.clone(),
        previous,
        requested: !previous,
    })
}

// No-op when the span is gone or a later toggle already changed the flag.
pub fn revert(surface: &mut Surface, faces: &StatusFaces, request: &ToggleRequest) -> bool {
    let Some(attrs) = surface.attrs_mut(request.span) else {
        return false;
    };
    let Some(counter) = attrs.counter.as_mut() else {
        return false;
    };
    if counter.flag != request.requested {
        return false;
    }
    counter.set_flag(request.previous);
    attrs.face = Some(faces.style_for(counter.class));
    true
}

pub fn class_at(surface: &Surface, span: SpanId) -> Option<StatusClass> {
    surface
        .span(span)
        .and_then(|span| span.attrs.counter)
        .map(|counter| counter.class)
}
