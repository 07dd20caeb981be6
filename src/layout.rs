use std::fmt;

use ratatui::style::{Color, Modifier, Style};
use serde::{Deserialize, Serialize};
use textwrap::{wrap, Options as WrapOptions};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::span::{Attrs, FoldState, FoldToggle};
use crate::surface::Fragment;

const FRAME_COLUMNS: usize = 4;
const TRAILING_COLUMNS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glyphs {
    pub left: char,
    pub top_left: char,
    pub top: char,
    pub top_right: char,
    pub bottom_left: char,
    pub bottom: char,
    pub bottom_right: char,
    pub right: char,
}

impl Glyphs {
    const fn new(glyphs: [char; 8]) -> Self {
        let [left, top_left, top, top_right, bottom_left, bottom, bottom_right, right] = glyphs;
        Self {
            left,
            top_left,
            top,
            top_right,
            bottom_left,
            bottom,
            bottom_right,
            right,
        }
    }
}

const HEAVY: Glyphs = Glyphs::new(['┃', '┏', '━', '┓', '┗', '━', '┛', '┃']);
const DOUBLE: Glyphs = Glyphs::new(['║', '╔', '═', '╗', '╚', '═', '╝', '║']);
const LIGHT: Glyphs = Glyphs::new(['│', '┌', '─', '┐', '└', '─', '┘', '│']);
const ROUNDED: Glyphs = Glyphs::new(['│', '╭', '─', '╮', '╰', '─', '╯', '│']);
const ASCII: Glyphs = Glyphs::new(['|', '+', '-', '+', '+', '-', '+', '|']);
const TIGHT: Glyphs = Glyphs::new([' '; 8]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BoxStyle {
    Heavy,
    Double,
    #[default]
    Light,
    Rounded,
    Ascii,
    Tight,
}

impl BoxStyle {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "heavy" => BoxStyle::Heavy,
            "double" => BoxStyle::Double,
            "light" => BoxStyle::Light,
            "rounded" => BoxStyle::Rounded,
            "tight" => BoxStyle::Tight,
            _ => BoxStyle::Ascii,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BoxStyle::Heavy => "heavy",
            BoxStyle::Double => "double",
            BoxStyle::Light => "light",
            BoxStyle::Rounded => "rounded",
            BoxStyle::Ascii => "ascii",
            BoxStyle::Tight => "tight",
        }
    }

    pub fn glyphs(self) -> Glyphs {
        match self {
            BoxStyle::Heavy => HEAVY,
            BoxStyle::Double => DOUBLE,
            BoxStyle::Light => LIGHT,
            BoxStyle::Rounded => ROUNDED,
            BoxStyle::Ascii => ASCII,
            BoxStyle::Tight => TIGHT,
        }
    }

    pub fn is_tight(self) -> bool {
        matches!(self, BoxStyle::Tight)
    }
}

impl From<String> for BoxStyle {
    fn from(value: String) -> Self {
        BoxStyle::from_name(&value)
    }
}

impl From<BoxStyle> for String {
    fn from(value: BoxStyle) -> Self {
        value.name().to_string()
    }
}

impl fmt::Display for BoxStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn resolve_width(surface_width: usize, requested: Option<i32>) -> usize {
    let resolved = match requested {
        Some(width) if width > 0 => width as i64,
        Some(width) => surface_width as i64 + width as i64,
        None => surface_width as i64 - 1,
    };
    resolved.max(1) as usize
}

pub fn content_columns(width: usize, prefix: &str) -> usize {
    width
        .saturating_sub(prefix.width())
        .saturating_sub(FRAME_COLUMNS + TRAILING_COLUMNS)
        .max(1)
}

pub fn wrap_lines(text: &str, columns: usize) -> Vec<String> {
    let options = WrapOptions::new(columns.max(1)).break_words(true);
    wrap(text, options)
        .into_iter()
        .map(|line| line.into_owned())
        .collect()
}

pub fn truncate_with_ellipsis(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    if max_width <= 1 {
        return "…".to_string();
    }
    let mut truncated = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let next = used + ch.width().unwrap_or(0);
        if next + 1 > max_width {
            break;
        }
        truncated.push(ch);
        used = next;
    }
    truncated.push('…');
    truncated
}

#[derive(Debug, Clone)]
pub struct BoxSpec<'a> {
    pub content: &'a str,
    pub width: Option<i32>,
    pub title: Option<&'a str>,
    pub folded: bool,
    pub prefix: &'a str,
    pub style: BoxStyle,
}

impl<'a> BoxSpec<'a> {
    pub fn new(content: &'a str) -> Self {
        Self {
            content,
            width: None,
            title: None,
            folded: false,
            prefix: "",
            style: BoxStyle::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxFaces {
    pub border: Style,
    pub title: Style,
    pub top_rule: Style,
    pub bottom_rule: Style,
}

impl Default for BoxFaces {
    fn default() -> Self {
        Self {
            border: Style::default().fg(Color::DarkGray),
            title: Style::default().add_modifier(Modifier::BOLD),
            top_rule: Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::UNDERLINED),
            bottom_rule: Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::UNDERLINED | Modifier::DIM),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TitleBar {
    pub text: String,
    pub fill: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxRender {
    pub prefix: String,
    pub style: BoxStyle,
    pub columns: usize,
    pub header: String,
    pub title: Option<TitleBar>,
    pub rows: Vec<String>,
    pub footer: String,
    pub folded: bool,
}

pub fn layout(spec: &BoxSpec<'_>, surface_width: usize) -> BoxRender {
    let width = resolve_width(surface_width, spec.width);
    let columns = content_columns(width, spec.prefix);
    let glyphs = spec.style.glyphs();
    let rule = |left: char, fill: char, right: char| {
        let mut row = String::from(spec.prefix);
        row.push(left);
        row.extend(std::iter::repeat(fill).take(columns + 2));
        row.push(right);
        row
    };

    let title = spec.title.map(|title| {
        let text = truncate_with_ellipsis(title.trim(), columns);
        let fill = columns.saturating_sub(text.width());
        TitleBar { text, fill }
    });

    let rows = wrap_lines(spec.content, columns)
        .into_iter()
        .map(|line| {
            let pad = columns.saturating_sub(line.width());
            format!("{line}{}", " ".repeat(pad))
        })
        .collect();

    BoxRender {
        prefix: spec.prefix.to_string(),
        style: spec.style,
        columns,
        header: rule(glyphs.top_left, glyphs.top, glyphs.top_right),
        title,
        rows,
        footer: rule(glyphs.bottom_left, glyphs.bottom, glyphs.bottom_right),
        folded: spec.folded,
    }
}

impl BoxRender {
    pub fn is_foldable(&self) -> bool {
        self.title.is_some()
    }

    pub fn body_len(&self) -> usize {
        self.rows
            .iter()
            .map(|row| self.row_len(row))
            .sum()
    }

    fn row_len(&self, row: &str) -> usize {
        self.prefix.chars().count() + 2 + row.chars().count() + 2 + 1
    }

    fn text_end_column(&self) -> usize {
        self.prefix.width() + 2 + self.columns
    }

    pub fn into_fragment(self, root: Attrs, faces: &BoxFaces) -> Fragment {
        let glyphs = self.style.glyphs();
        let (top_face, bottom_face) = if self.style.is_tight() {
            (faces.top_rule, faces.bottom_rule)
        } else {
            (faces.border, faces.border)
        };
        let left = format!("{}{} ", self.prefix, glyphs.left);
        let right = format!(" {}\n", glyphs.right);

        let mut fragment = Fragment::new(root);
        fragment.push_span(&format!("{}\n", self.header), Attrs::face(top_face));

        if let Some(title) = self.title.as_ref() {
            let start = fragment.len();
            fragment.push_span(&left, Attrs::face(faces.border));
            fragment.push_span(&title.text, Attrs::face(faces.title));
            fragment.push_span(
                &" ".repeat(title.fill),
                Attrs {
                    filler: Some(self.text_end_column()),
                    ..Attrs::default()
                },
            );
            fragment.push_span(&right, Attrs::face(faces.border));
            let end = fragment.len();
            fragment.tag(
                start..end,
                Attrs {
                    fold_toggle: Some(FoldToggle {
                        body_len: self.body_len(),
                    }),
                    ..Attrs::default()
                },
            );
        }

        let body_start = fragment.len();
        for row in &self.rows {
            fragment.push_span(&left, Attrs::face(faces.border));
            fragment.push_str(row);
            fragment.push_span(&right, Attrs::face(faces.border));
        }
        let body_end = fragment.len();
        if self.is_foldable() {
            fragment.tag(
                body_start..body_end,
                Attrs {
                    fold: Some(FoldState {
                        folded: self.folded,
                    }),
                    ..Attrs::default()
                },
            );
        }

        fragment.push_span(&format!("{}\n", self.footer), Attrs::face(bottom_face));
        fragment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_resolution() {
        assert_eq!(resolve_width(80, Some(-2)), 78);
        assert_eq!(resolve_width(80, Some(20)), 20);
        assert_eq!(resolve_width(80, None), 79);
        assert_eq!(resolve_width(80, Some(-200)), 1);
        assert_eq!(resolve_width(0, None), 1);
    }

    #[test]
    fn unknown_style_falls_back_to_ascii() {
        assert_eq!(BoxStyle::from_name("sparkly"), BoxStyle::Ascii);
        assert_eq!(BoxStyle::from_name(" Double "), BoxStyle::Double);
        let parsed: BoxStyle = serde_yaml::from_str("nope").unwrap();
        assert_eq!(parsed, BoxStyle::Ascii);
    }

    #[test]
    fn wrapping_keeps_words_whole() {
        let lines = wrap_lines("the quick brown fox", 10);
        assert_eq!(lines, vec!["the quick", "brown fox"]);
        let lines = wrap_lines("supercalifragilistic", 8);
        assert_eq!(lines[0], "supercal");
        assert!(lines.iter().all(|line| line.width() <= 8));
    }

    #[test]
    fn rows_line_up_with_borders() {
        let spec = BoxSpec {
            content: "hello there, general kenobi",
            width: Some(20),
            prefix: "  ",
            style: BoxStyle::Heavy,
            ..BoxSpec::new("")
        };
        let render = layout(&spec, 80);
        // 20 - 2 (prefix) - 6
        assert_eq!(render.columns, 12);
        assert_eq!(render.header, "  ┏━━━━━━━━━━━━━━┓");
        assert_eq!(render.footer, "  ┗━━━━━━━━━━━━━━┛");
        assert!(render.rows.iter().all(|row| row.width() == 12));
        let fragment = render.into_fragment(Attrs::default(), &BoxFaces::default());
        for line in fragment.text().lines() {
            assert_eq!(line.width(), 18);
        }
    }

    #[test]
    fn long_titles_are_truncated() {
        let spec = BoxSpec {
            title: Some("a very long content warning indeed"),
            width: Some(16),
            ..BoxSpec::new("x")
        };
        let render = layout(&spec, 80);
        let title = render.title.unwrap();
        assert_eq!(title.text.width(), 10);
        assert!(title.text.ends_with('…'));
        assert_eq!(title.fill, 0);
    }

    #[test]
    fn titled_box_is_foldable() {
        let spec = BoxSpec {
            title: Some("CW"),
            folded: true,
            width: Some(20),
            ..BoxSpec::new("secret")
        };
        let render = layout(&spec, 80);
        let body_len = render.body_len();
        let fragment = render.into_fragment(Attrs::default(), &BoxFaces::default());
        let toggle = fragment
            .children()
            .iter()
            .find_map(|(range, attrs)| attrs.fold_toggle.map(|toggle| (range.clone(), toggle)))
            .unwrap();
        assert_eq!(toggle.1.body_len, body_len);
        let fold = fragment
            .children()
            .iter()
            .find(|(_, attrs)| attrs.fold.is_some())
            .unwrap();
        assert_eq!(fold.0.start, toggle.0.end);
        assert_eq!(fold.0.len(), body_len);
        assert_eq!(fold.1.fold, Some(FoldState { folded: true }));
    }

    #[test]
    fn tight_style_draws_rules_without_glyphs() {
        let spec = BoxSpec {
            style: BoxStyle::Tight,
            width: Some(12),
            ..BoxSpec::new("hi")
        };
        let faces = BoxFaces::default();
        let fragment = layout(&spec, 80).into_fragment(Attrs::default(), &faces);
        let lines: Vec<&str> = fragment.text().lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].chars().all(|ch| ch == ' '));
        assert_eq!(lines[1].trim(), "hi");
        let (first, attrs) = &fragment.children()[0];
        assert_eq!(first.start, 0);
        assert_eq!(attrs.face, Some(faces.top_rule));
        let (_, last) = fragment.children().last().unwrap();
        assert_eq!(last.face, Some(faces.bottom_rule));
        assert_ne!(faces.top_rule, faces.bottom_rule);
    }
}
