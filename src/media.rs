use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use image::imageops::FilterType;
use image::ImageFormat;
use reqwest::blocking::Client;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::MediaConfig;
use crate::data::{MediaService, Thumbnail};

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media: url required")]
    EmptyUrl,
    #[error("media: request failed: {status} ({url})")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("media: unsupported format {0}")]
    Unsupported(String),
    #[error("media: decode failed")]
    Decode(#[from] image::ImageError),
    #[error("media: worker pool is shut down")]
    Closed,
}

struct Job {
    url: String,
    tx: Sender<Result<Thumbnail>>,
}

struct Inner {
    client: Client,
    thumbnail_px: u32,
}

pub struct Manager {
    jobs: Option<Sender<Job>>,
    stop: Sender<()>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl Manager {
    pub fn new(cfg: &MediaConfig) -> Result<Self> {
        let workers = if cfg.workers == 0 { 2 } else { cfg.workers };
        let timeout = if cfg.timeout.is_zero() {
            Duration::from_secs(15)
        } else {
            cfg.timeout
        };
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("alt-timeline/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("media: build http client")?;

        let inner = Arc::new(Inner {
            client,
            thumbnail_px: cfg.thumbnail_px.max(1),
        });
        let (job_tx, job_rx) = unbounded();
        let (stop_tx, stop_rx) = unbounded();

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let rx_jobs = job_rx.clone();
            let rx_stop = stop_rx.clone();
            let worker_inner = inner.clone();
            handles.push(thread::spawn(move || worker_inner.worker(rx_jobs, rx_stop)));
        }
        debug!(workers, ?timeout, "media workers started");

        Ok(Self {
            jobs: Some(job_tx),
            stop: stop_tx,
            handles,
        })
    }

    pub fn enqueue(&self, url: &str) -> Receiver<Result<Thumbnail>> {
        let (tx, rx) = unbounded();
        let job = Job {
            url: url.to_string(),
            tx,
        };
        match self.jobs.as_ref() {
            Some(jobs) => {
                if let Err(err) = jobs.send(job) {
                    let _ = err.into_inner().tx.send(Err(MediaError::Closed.into()));
                }
            }
            None => {
                let _ = job.tx.send(Err(MediaError::Closed.into()));
            }
        }
        rx
    }

    fn shutdown(&mut self) {
        self.jobs = None;
        for _ in &self.handles {
            let _ = self.stop.send(());
        }
        while let Some(handle) = self.handles.pop() {
            let _ = handle.join();
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl MediaService for Manager {
    fn fetch_media(&self, url: &str) -> Receiver<Result<Thumbnail>> {
        self.enqueue(url)
    }
}

impl Inner {
    fn worker(&self, jobs: Receiver<Job>, stop: Receiver<()>) {
        loop {
            crossbeam_channel::select! {
                recv(stop) -> _ => break,
                recv(jobs) -> msg => {
                    match msg {
                        Ok(job) => self.process(job),
                        Err(_) => break,
                    }
                }
            }
        }
    }

    fn process(&self, job: Job) {
        let result = self.fetch(&job.url);
        if let Err(err) = &result {
            warn!(url = %job.url, error = %err, "media fetch failed");
        }
        let _ = job.tx.send(result);
    }

    fn fetch(&self, url: &str) -> Result<Thumbnail> {
        let bytes = self.download(url)?;
        thumbnail(&bytes, self.thumbnail_px)
    }

    fn download(&self, raw: &str) -> Result<Vec<u8>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(MediaError::EmptyUrl.into());
        }
        let local = match Url::parse(raw) {
            Ok(parsed) if parsed.scheme() == "file" => parsed.to_file_path().ok(),
            Ok(_) => None,
            Err(_) => Some(PathBuf::from(raw)),
        };
        if let Some(path) = local {
            return fs::read(&path)
                .with_context(|| format!("media: read {}", path.display()));
        }

        let response = self.client.get(raw).send().context("media: download")?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::Status {
                status,
                url: raw.to_string(),
            }
            .into());
        }
        let bytes = response.bytes().context("media: body")?;
        debug!(url = raw, bytes = bytes.len(), "media downloaded");
        Ok(bytes.to_vec())
    }
}

pub fn thumbnail(bytes: &[u8], px: u32) -> Result<Thumbnail> {
    let format = image::guess_format(bytes).map_err(MediaError::from)?;
    if !matches!(
        format,
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif | ImageFormat::WebP
    ) {
        return Err(MediaError::Unsupported(format!("{format:?}")).into());
    }
    let decoded = image::load_from_memory_with_format(bytes, format).map_err(MediaError::from)?;
    let px = px.max(1);
    let scaled = if decoded.width() > px || decoded.height() > px {
        decoded.resize(px, px, FilterType::Triangle)
    } else {
        decoded
    };
    Ok(Thumbnail {
        image: scaled.to_rgba8(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(width, height, Rgba([200, 40, 40, 255]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn thumbnails_fit_the_requested_square() {
        let thumb = thumbnail(&png_bytes(200, 100), 50).unwrap();
        assert_eq!(thumb.dimensions(), (50, 25));
        let small = thumbnail(&png_bytes(10, 10), 50).unwrap();
        assert_eq!(small.dimensions(), (10, 10));
    }

    #[test]
    fn garbage_is_not_an_image() {
        let err = thumbnail(b"definitely not an image", 32).unwrap_err();
        assert!(err.downcast_ref::<MediaError>().is_some());
    }

    #[test]
    fn workers_read_local_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pic.png");
        fs::write(&path, png_bytes(64, 64)).unwrap();

        let manager = Manager::new(&MediaConfig {
            thumbnail_px: 16,
            ..MediaConfig::default()
        })
        .unwrap();
        let thumb = manager
            .fetch_media(path.to_str().unwrap())
            .recv_timeout(Duration::from_secs(5))
            .unwrap()
            .unwrap();
        assert_eq!(thumb.dimensions(), (16, 16));

        let err = manager
            .fetch_media("")
            .recv_timeout(Duration::from_secs(5))
            .unwrap()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MediaError>(),
            Some(MediaError::EmptyUrl)
        ));
    }
}
