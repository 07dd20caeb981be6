use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config;
use crate::data::{FeedService, MediaService, MockActionService, PagedFeed};
use crate::hooks::Hooks;
use crate::logging;
use crate::media;
use crate::render::MARKER_LEN;
use crate::timeline::{Services, Timeline};
use crate::ui;

const DUMP_WIDTH: usize = 80;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dump: bool,
    pub width: Option<usize>,
    pub feed_file: Option<PathBuf>,
}

pub fn run(options: RunOptions) -> Result<()> {
    let mut cfg = config::load(config::LoadOptions::default()).context("load config")?;
    if let Some(file) = options.feed_file.clone() {
        cfg.feed.file = Some(file);
    }

    let _log_guard = match logging::init(&cfg.log) {
        Ok((guard, path)) => {
            info!(version = crate::VERSION, log = %path.display(), "starting");
            Some(guard)
        }
        Err(err) => {
            eprintln!("warning: logging disabled: {err:#}");
            None
        }
    };

    let page_size = cfg.feed.page_size;
    let feed: Arc<dyn FeedService> = match cfg.feed.file.as_ref() {
        Some(path) => Arc::new(PagedFeed::from_file(path, page_size)?),
        None => Arc::new(PagedFeed::sample(page_size)?),
    };

    let media: Option<Arc<dyn MediaService>> = if cfg.media.enabled && !options.dump {
        match media::Manager::new(&cfg.media) {
            Ok(manager) => Some(Arc::new(manager)),
            Err(err) => {
                warn!(error = %err, "media previews disabled");
                None
            }
        }
    } else {
        None
    };

    let width = options.width.unwrap_or_else(|| {
        if options.dump {
            DUMP_WIDTH
        } else {
            crossterm::terminal::size()
                .map(|(cols, _)| cols as usize)
                .unwrap_or(DUMP_WIDTH)
        }
    });

    let services = Services {
        feed,
        actions: Arc::new(MockActionService),
        media,
    };
    let mut timeline = Timeline::new(cfg.timeline.clone(), services, width);
    let loaded = timeline.load_more();
    timeline.set_point(MARKER_LEN);
    info!(loaded, width, "initial page rendered");

    if options.dump {
        return dump(&mut timeline);
    }

    let status_message = match timeline.take_notice() {
        Some(notice) => notice,
        None => format!("Loaded {loaded} posts."),
    };
    let mut model = ui::Model::new(ui::Options {
        timeline,
        hooks: Hooks::with_core(),
        status_message,
    });
    model.run()
}

fn dump(timeline: &mut Timeline) -> Result<()> {
    while let Some(notice) = timeline.take_notice() {
        eprintln!("{notice}");
    }
    let text = timeline.visible_text();
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", text.trim_start_matches('\n')).context("write timeline")?;
    Ok(())
}
