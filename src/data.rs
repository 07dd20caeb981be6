use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use image::RgbaImage;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::record::{CounterKind, Record};

pub trait FeedService: Send + Sync {
    fn fetch_more(&self) -> Result<Vec<Record>>;
    fn fetch_refresh(&self) -> Result<Vec<Record>>;
}

pub trait ActionService: Send + Sync {
    fn submit(&self, action: Action, target_id: &str) -> Result<()>;
}

pub trait MediaService: Send + Sync {
    fn fetch_media(&self, url: &str) -> Receiver<Result<Thumbnail>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Favourite,
    Unfavourite,
    Boost,
    Unboost,
    Bookmark,
    Unbookmark,
}

impl Action {
    pub fn for_flag(kind: CounterKind, flag: bool) -> Option<Action> {
        match (kind, flag) {
            (CounterKind::Favourite, true) => Some(Action::Favourite),
            (CounterKind::Favourite, false) => Some(Action::Unfavourite),
            (CounterKind::Boost, true) => Some(Action::Boost),
            (CounterKind::Boost, false) => Some(Action::Unboost),
            (CounterKind::Bookmark, true) => Some(Action::Bookmark),
            (CounterKind::Bookmark, false) => Some(Action::Unbookmark),
            (CounterKind::Replies, _) => None,
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            Action::Favourite => "favourite",
            Action::Unfavourite => "unfavourite",
            Action::Boost => "reblog",
            Action::Unboost => "unreblog",
            Action::Bookmark => "bookmark",
            Action::Unbookmark => "unbookmark",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    pub image: RgbaImage,
}

impl Thumbnail {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

pub struct PagedFeed {
    records: Vec<Record>,
    cursor: Mutex<usize>,
    page_size: usize,
}

impl PagedFeed {
    pub fn new(records: Vec<Record>, page_size: usize) -> Self {
        Self {
            records,
            cursor: Mutex::new(0),
            page_size: page_size.max(1),
        }
    }

    pub fn from_file(path: &Path, page_size: usize) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("feed: failed to read {}", path.display()))?;
        let records = parse_records(&data)
            .with_context(|| format!("feed: failed to parse {}", path.display()))?;
        info!(count = records.len(), path = %path.display(), "loaded feed file");
        Ok(Self::new(records, page_size))
    }

    pub fn sample(page_size: usize) -> Result<Self> {
        let records = parse_records(SAMPLE_TIMELINE).context("feed: parse sample timeline")?;
        Ok(Self::new(records, page_size))
    }
}

impl FeedService for PagedFeed {
    fn fetch_more(&self) -> Result<Vec<Record>> {
        let mut cursor = self.cursor.lock();
        let start = (*cursor).min(self.records.len());
        let end = (start + self.page_size).min(self.records.len());
        *cursor = end;
        debug!(start, end, "paging feed");
        Ok(self.records[start..end].to_vec())
    }

    fn fetch_refresh(&self) -> Result<Vec<Record>> {
        // A static file never has anything newer than its first page.
        Ok(Vec::new())
    }
}

pub fn parse_records(json: &str) -> Result<Vec<Record>> {
    let records: Vec<Record> = serde_json::from_str(json).context("decode records")?;
    Ok(records)
}

#[derive(Default)]
pub struct MockActionService;

impl ActionService for MockActionService {
    fn submit(&self, action: Action, target_id: &str) -> Result<()> {
        info!(%action, target_id, "accepted action locally");
        Ok(())
    }
}

const SAMPLE_TIMELINE: &str = r#"[
  {
    "id": "110000000000000005",
    "created_at": "2024-05-02T09:15:00.000Z",
    "account": {"acct": "ferris@rustacean.social", "display_name": "Ferris"},
    "content": "<p>Just shipped a new release of my terminal timeline! Boxes, folds and counters, all in one surface. Details at https://example.com/blog/release-notes.html</p>",
    "favourites_count": 12,
    "reblogs_count": 3,
    "replies_count": 2,
    "url": "https://rustacean.social/@ferris/110000000000000005"
  },
  {
    "id": "110000000000000004",
    "created_at": "2024-05-02T08:40:00.000Z",
    "account": {"acct": "ada", "display_name": "Ada"},
    "content": "",
    "reblog": {
      "id": "109999999999999990",
      "created_at": "2024-05-01T21:02:00.000Z",
      "account": {"acct": "grace@cobol.example", "display_name": "Grace"},
      "content": "<p>It is easier to ask forgiveness than it is to get permission.</p>",
      "favourites_count": 140,
      "favourited": true,
      "reblogs_count": 58,
      "replies_count": 9
    }
  },
  {
    "id": "110000000000000003",
    "created_at": "2024-05-01T19:30:00.000Z",
    "account": {"acct": "linus", "display_name": ""},
    "spoiler_text": "spoilers for the season finale",
    "content": "<p>The butler did it.<br>Obviously.</p>",
    "favourites_count": 0,
    "replies_count": 1
  },
  {
    "id": "110000000000000002",
    "created_at": "2024-05-01T12:00:00.000Z",
    "account": {"acct": "photos", "display_name": "Photo Bot"},
    "content": "<p>Sunrise over the harbour</p>",
    "media_attachments": [
      {
        "type": "image",
        "url": "https://example.com/media/harbour.jpg",
        "preview_url": "https://example.com/media/harbour_small.jpg",
        "description": "A harbour at sunrise"
      }
    ],
    "favourites_count": 4,
    "bookmarked": true
  },
  {
    "id": "110000000000000001",
    "type": "follow",
    "created_at": "not a timestamp",
    "account": {"acct": "newfriend", "display_name": "New Friend"}
  }
]"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_timeline_parses() {
        let feed = PagedFeed::sample(2).unwrap();
        let first = feed.fetch_more().unwrap();
        assert_eq!(first.len(), 2);
        assert!(first[1].reblog.is_some());
        assert_eq!(feed.fetch_more().unwrap().len(), 2);
        assert_eq!(feed.fetch_more().unwrap().len(), 1);
        assert!(feed.fetch_more().unwrap().is_empty());
        assert!(feed.fetch_refresh().unwrap().is_empty());
    }

    #[test]
    fn actions_follow_the_new_flag() {
        assert_eq!(
            Action::for_flag(CounterKind::Favourite, true),
            Some(Action::Favourite)
        );
        assert_eq!(
            Action::for_flag(CounterKind::Boost, false),
            Some(Action::Unboost)
        );
        assert_eq!(Action::for_flag(CounterKind::Replies, true), None);
    }
}
