use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, deserialize_with = "nullable")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub account: Account,
    #[serde(default, deserialize_with = "nullable")]
    pub created_at: String,
    #[serde(default, deserialize_with = "nullable")]
    pub content: String,
    #[serde(default, deserialize_with = "nullable")]
    pub spoiler_text: String,
    #[serde(default)]
    pub reblog: Option<Box<Record>>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub status: Option<Box<Record>>,
    #[serde(default, deserialize_with = "nullable")]
    pub favourited: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub favourites_count: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub reblogged: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub reblogs_count: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub bookmarked: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub bookmarks_count: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub replies_count: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub media_attachments: Vec<Attachment>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default, deserialize_with = "nullable")]
    pub display_name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub acct: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, rename = "type", deserialize_with = "nullable")]
    pub media_type: String,
    #[serde(default, deserialize_with = "nullable")]
    pub url: String,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterKind {
    Favourite,
    Boost,
    Bookmark,
    Replies,
}

impl CounterKind {
    pub const DISPLAY_ORDER: [CounterKind; 4] = [
        CounterKind::Favourite,
        CounterKind::Boost,
        CounterKind::Replies,
        CounterKind::Bookmark,
    ];

    pub fn is_toggleable(self) -> bool {
        !matches!(self, CounterKind::Replies)
    }

    pub fn icon(self) -> &'static str {
        match self {
            CounterKind::Favourite => "♥",
            CounterKind::Boost => "⟳",
            CounterKind::Bookmark => "🔖",
            CounterKind::Replies => "↩",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CounterKind::Favourite => "favourite",
            CounterKind::Boost => "boost",
            CounterKind::Bookmark => "bookmark",
            CounterKind::Replies => "reply",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterValue {
    pub flag: bool,
    pub count: u64,
}

impl Record {
    pub fn new(id: &str, acct: &str, content: &str) -> Self {
        Self {
            id: id.to_string(),
            account: Account {
                display_name: String::new(),
                acct: acct.to_string(),
            },
            content: content.to_string(),
            ..Self::default()
        }
    }

    pub fn counter(&self, kind: CounterKind) -> CounterValue {
        match kind {
            CounterKind::Favourite => CounterValue {
                flag: self.favourited,
                count: self.favourites_count,
            },
            CounterKind::Boost => CounterValue {
                flag: self.reblogged,
                count: self.reblogs_count,
            },
            CounterKind::Bookmark => CounterValue {
                flag: self.bookmarked,
                count: self.bookmarks_count,
            },
            CounterKind::Replies => CounterValue {
                flag: false,
                count: self.replies_count,
            },
        }
    }

    pub fn is_notification(&self) -> bool {
        self.kind.is_some()
    }

    pub fn shown(&self) -> &Record {
        if let Some(status) = self.status.as_deref() {
            return status;
        }
        if self.kind.is_some() {
            return self;
        }
        self.reblog.as_deref().unwrap_or(self)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(self.created_at.trim())
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc))
    }

    pub fn body_text(&self) -> String {
        html_to_text(&self.content)
    }
}

impl Account {
    pub fn handle(&self) -> String {
        if self.acct.is_empty() {
            String::new()
        } else {
            format!("@{}", self.acct)
        }
    }

    pub fn display(&self) -> String {
        let name = self.display_name.trim();
        match (name.is_empty(), self.acct.is_empty()) {
            (true, true) => "(unknown)".to_string(),
            (true, false) => self.handle(),
            (false, true) => name.to_string(),
            (false, false) => format!("{} ({})", name, self.handle()),
        }
    }
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn html_to_text(html: &str) -> String {
    static BREAK_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid break regex"));
    static PARAGRAPH_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)</p>\s*<p[^>]*>").expect("valid paragraph regex"));
    static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

    if !html.contains('<') && !html.contains('&') {
        return html.trim().to_string();
    }

    let text = BREAK_RE.replace_all(html, "\n");
    let text = PARAGRAPH_RE.replace_all(&text, "\n\n");
    let text = TAG_RE.replace_all(&text, "");
    decode_entities(&text).trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_null_counters_default_to_zero() {
        let json = r#"{
            "id": "7",
            "account": {"acct": "ada", "display_name": null},
            "content": "<p>hi</p>",
            "favourites_count": null,
            "favourited": true
        }"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(
            record.counter(CounterKind::Favourite),
            CounterValue {
                flag: true,
                count: 0
            }
        );
        assert_eq!(record.counter(CounterKind::Replies).count, 0);
        assert_eq!(record.account.display(), "@ada");
    }

    #[test]
    fn html_is_flattened() {
        let html = "<p>one &amp; two<br>three</p><p>four &lt;5&gt;</p>";
        assert_eq!(html_to_text(html), "one & two\nthree\n\nfour <5>");
    }

    #[test]
    fn bad_timestamp_is_none() {
        let mut record = Record::new("1", "ada", "x");
        record.created_at = "yesterday-ish".into();
        assert!(record.timestamp().is_none());
        record.created_at = "2024-03-01T12:30:00.000Z".into();
        assert!(record.timestamp().is_some());
    }

    #[test]
    fn shown_record_prefers_status_then_reblog() {
        let inner = Record::new("inner", "bob", "boosted");
        let mut boost = Record::new("outer", "ada", "");
        boost.reblog = Some(Box::new(inner.clone()));
        assert_eq!(boost.shown().id, "inner");

        let mut note = Record::new("n1", "carol", "");
        note.kind = Some("favourite".into());
        note.status = Some(Box::new(inner));
        assert_eq!(note.shown().id, "inner");

        let mut follow = Record::new("n2", "dave", "");
        follow.kind = Some("follow".into());
        assert_eq!(follow.shown().id, "n2");
    }
}
