//! Remote fallback frames shown before any capture exists.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use image::RgbImage;
use log::{debug, info, warn};

use crate::Result;

/// Decoded remote frames, keyed by sequence index
#[derive(Debug, Default)]
pub struct RemoteFrames {
    images: HashMap<usize, RgbImage>,
}

impl RemoteFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch and decode every requested frame, `concurrency` at a time.
    ///
    /// Best effort: frames that fail to download or decode are logged and
    /// left out.
    pub async fn preload(requests: Vec<(usize, String)>, concurrency: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        let start = Instant::now();
        let total = requests.len();

        let results: Vec<(usize, Result<RgbImage>)> = stream::iter(requests)
            .map(|(index, url)| {
                let client = client.clone();
                async move { (index, fetch(&client, &url).await) }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut frames = Self::new();
        for (index, result) in results {
            match result {
                Ok(image) => frames.insert(index, image),
                Err(e) => warn!("Fallback frame {:04} unavailable: {}", index, e),
            }
        }

        info!(
            "Preloaded {}/{} fallback frames in {:.2?}",
            frames.len(),
            total,
            start.elapsed()
        );
        frames
    }

    pub fn insert(&mut self, index: usize, image: RgbImage) {
        self.images.insert(index, image);
    }

    pub fn get(&self, index: usize) -> Option<&RgbImage> {
        self.images.get(&index)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<RgbImage> {
    let bytes = client.get(url).send().await?.error_for_status()?.bytes().await?;
    debug!("Downloaded {} ({} bytes)", url, bytes.len());
    Ok(image::load_from_memory(&bytes)?.to_rgb8())
}
