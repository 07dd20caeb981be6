use std::sync::Arc;

use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use ratatui::style::{Color, Modifier, Style};
use regex::{Captures, Regex};
use url::Url;

use crate::config::TimelineConfig;
use crate::layout::{self, BoxFaces, BoxSpec};
use crate::record::{CounterKind, Record};
use crate::span::{Attrs, CounterState, Field, MediaSlot, StatusClass};
use crate::surface::Fragment;

// Ends the previous record's last line and leaves a blank line.
pub const RECORD_MARKER: &str = "\n\n";
pub const MARKER_LEN: usize = 2;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";
const BANNER_LABEL: &str = " new posts above ";

pub struct Renderer {
    config: TimelineConfig,
    box_faces: BoxFaces,
    next_ticket: u64,
}

impl Renderer {
    pub fn new(config: TimelineConfig) -> Self {
        Self {
            config,
            box_faces: BoxFaces::default(),
            next_ticket: 0,
        }
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn counter_face(&self, class: StatusClass) -> Style {
        self.config.status_faces.style_for(class)
    }

    pub fn render(&mut self, record: &Record, surface_width: usize) -> Fragment {
        let shown = record.shown();
        let mut fragment = Fragment::new(Attrs {
            item_id: Some(record.id.clone()),
            record: Some(Arc::new(record.clone())),
            ..Attrs::default()
        });
        fragment.push_str(RECORD_MARKER);

        if record.is_notification() && record.status.is_none() {
            // Notifications without a post are just the context line.
            let line = context_line(record).unwrap_or_default();
            fragment.push_span(&line, Attrs::field(Field::Author).with_face(author_face()));
            return fragment;
        }
        if let Some(header) = context_line(record) {
            fragment.push_span(&header, Attrs::face(dim_face()));
            fragment.push_str("\n");
        }

        fragment.push_span(
            &shown.account.display(),
            Attrs::field(Field::Author).with_face(author_face()),
        );
        fragment.push_str("\n");

        self.push_body(&mut fragment, record, shown, surface_width);
        self.push_media(&mut fragment, shown);

        if self.config.show_timestamp {
            if let Some(timestamp) = shown.timestamp() {
                end_line(&mut fragment);
                fragment.push_span(
                    &timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    Attrs::field(Field::Timestamp).with_face(dim_face()),
                );
            }
        }
        if self.config.show_status_line {
            end_line(&mut fragment);
            self.push_status_line(&mut fragment, shown);
        }
        if self.config.show_action_line {
            end_line(&mut fragment);
            push_action_line(&mut fragment);
        }
        fragment
    }

    fn push_body(
        &self,
        fragment: &mut Fragment,
        record: &Record,
        shown: &Record,
        surface_width: usize,
    ) {
        let mut body = shown.body_text();
        if self.config.shorten_urls {
            body = shorten_urls(&body);
        }

        let spoiler = shown.spoiler_text.trim();
        let boosted = record.reblog.is_some() && self.config.box_boosted_content;
        let title = if !spoiler.is_empty() {
            Some((format!("CW: {spoiler}"), true))
        } else if boosted {
            Some((format!("⟳ {}", shown.account.display()), false))
        } else {
            None
        };

        match title {
            Some((title, folded)) => {
                let spec = BoxSpec {
                    content: &body,
                    width: self.config.box_width,
                    title: Some(&title),
                    folded,
                    prefix: &self.config.box_prefix,
                    style: self.config.box_style,
                };
                let boxed = layout::layout(&spec, surface_width)
                    .into_fragment(Attrs::field(Field::Box), &self.box_faces);
                fragment.push_fragment(boxed);
            }
            None => {
                let columns = layout::resolve_width(surface_width, None);
                let wrapped = layout::wrap_lines(&body, columns).join("\n");
                fragment.push_span(&wrapped, Attrs::field(Field::Body));
            }
        }
    }

    fn push_media(&mut self, fragment: &mut Fragment, shown: &Record) {
        for attachment in &shown.media_attachments {
            let url = attachment
                .preview_url
                .clone()
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| attachment.url.clone());
            if url.is_empty() {
                continue;
            }
            let label = attachment
                .description
                .clone()
                .filter(|text| !text.trim().is_empty())
                .unwrap_or_else(|| media_label(&attachment.url));
            let kind = if attachment.media_type.is_empty() {
                "media"
            } else {
                attachment.media_type.as_str()
            };
            self.next_ticket += 1;
            end_line(fragment);
            fragment.push_span(
                &format!("[{kind}: {label}]"),
                Attrs {
                    field: Some(Field::Media),
                    face: Some(Style::default().fg(Color::Cyan)),
                    media: Some(MediaSlot {
                        url,
                        label,
                        ticket: self.next_ticket,
                        payload: None,
                    }),
                    ..Attrs::default()
                },
            );
        }
    }

    fn push_status_line(&self, fragment: &mut Fragment, shown: &Record) {
        let mut line = Fragment::new(Attrs::field(Field::StatusLine));
        for (index, kind) in CounterKind::DISPLAY_ORDER.iter().enumerate() {
            if index > 0 {
                line.push_str("  ");
            }
            let value = shown.counter(*kind);
            let state = CounterState::new(*kind, value.flag, value.count);
            line.push_span(
                &format!("{} {}", kind.icon(), value.count),
                Attrs {
                    field: Some(Field::Counter(*kind)),
                    counter: Some(state),
                    face: Some(self.counter_face(state.class)),
                    ..Attrs::default()
                },
            );
        }
        fragment.push_fragment(line);
    }

    pub fn banner(&self, surface_width: usize) -> Fragment {
        let width = layout::resolve_width(surface_width, None);
        let label_width = BANNER_LABEL.chars().count();
        let left = width.saturating_sub(label_width) / 2;
        let right = width.saturating_sub(label_width + left);
        let mut fragment = Fragment::new(Attrs::field(Field::Banner).with_face(
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ));
        fragment.push_str(&format!(
            "\n{}{}{}",
            "─".repeat(left),
            BANNER_LABEL,
            "─".repeat(right)
        ));
        fragment
    }
}

fn push_action_line(fragment: &mut Fragment) {
    let mut first = true;
    for kind in CounterKind::DISPLAY_ORDER {
        if !kind.is_toggleable() {
            continue;
        }
        if !first {
            fragment.push_str(" ");
        }
        first = false;
        fragment.push_span(
            &format!("[{} {}]", kind.icon(), kind.label()),
            Attrs::field(Field::Action(kind)).with_face(
                Style::default()
                    .fg(Color::Gray)
                    .add_modifier(Modifier::UNDERLINED),
            ),
        );
    }
}

fn end_line(fragment: &mut Fragment) {
    if !fragment.text().ends_with('\n') {
        fragment.push_str("\n");
    }
}

fn context_line(record: &Record) -> Option<String> {
    if let Some(kind) = record.kind.as_deref() {
        let who = record.account.display();
        let what = match kind {
            "follow" => "followed you".to_string(),
            "follow_request" => "requested to follow you".to_string(),
            "favourite" => "favourited your post".to_string(),
            "reblog" => "boosted your post".to_string(),
            "mention" => "mentioned you".to_string(),
            "poll" => "poll has ended".to_string(),
            "update" => "edited a post".to_string(),
            other => other.replace('_', " "),
        };
        return Some(format!("{who} {what}"));
    }
    record
        .reblog
        .as_ref()
        .map(|_| format!("⟳ {} boosted", record.account.display()))
}

fn author_face() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim_face() -> Style {
    Style::default().fg(Color::DarkGray)
}

pub fn shorten_urls(text: &str) -> String {
    static URL_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?i)https?://[^\s<>"]+"#).expect("valid url regex"));

    URL_RE
        .replace_all(text, |caps: &Captures| {
            let raw = &caps[0];
            let trimmed = raw.trim_end_matches(['.', ',', ';', ':', '!', '?', ')']);
            let tail = &raw[trimmed.len()..];
            match short_url(trimmed) {
                Some(short) => format!("{short}{tail}"),
                None => raw.to_string(),
            }
        })
        .into_owned()
}

fn short_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str()?.to_string();
    let extension = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().to_string())
        .and_then(|segment| {
            let (stem, ext) = segment.rsplit_once('.')?;
            let valid = !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|ch| ch.is_ascii_alphanumeric());
            valid.then(|| ext.to_ascii_lowercase())
        });
    Some(match extension {
        Some(ext) => format!("[{host} ({ext})]"),
        None => format!("[{host}]"),
    })
}

fn media_label(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .map(|segment| percent_decode_str(segment).decode_utf8_lossy().to_string())
        })
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| "media".to_string())
}
