//! Image loading collaborator: URL to decoded bitmap, with a per-instance cache.
//!
//! Decoding runs on worker threads so a slow or hung source cannot stall the
//! render thread past its timeout; results are handed back to the caller's
//! thread in completion order.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use image::RgbaImage;

use crate::types::LoadedImage;

pub const DEFAULT_DECODE_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_PRELOAD_WORKERS: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },
    #[error("failed to decode {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: image::ImageError,
    },
    #[error("loading {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("no image registered for {url}")]
    Missing { url: String },
}

/// One step of a preload batch.
pub struct LoadProgress<'a> {
    pub index: usize,
    pub loaded: usize,
    pub total: usize,
    pub image: &'a Arc<LoadedImage>,
    pub error: Option<&'a LoadError>,
}

pub trait ImageLoader: Send + Sync {
    fn load(&self, url: &str) -> Result<Arc<LoadedImage>, LoadError>;

    fn get_from_cache(&self, url: &str) -> Option<Arc<LoadedImage>>;

    fn clear_cache(&self);

    /// Loads every URL, reporting each completion on the calling thread.
    ///
    /// Never fails as a whole: a URL that cannot be loaded is replaced by a
    /// placeholder, reported with its error, and still occupies its index.
    fn preload_with_progress(
        &self,
        urls: &[String],
        on_progress: &mut dyn FnMut(LoadProgress<'_>),
    ) -> Vec<Arc<LoadedImage>> {
        let total = urls.len();
        let mut results: Vec<Option<Arc<LoadedImage>>> = vec![None; total];
        if total == 0 {
            return Vec::new();
        }

        let workers = thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(2)
            .clamp(1, MAX_PRELOAD_WORKERS)
            .min(total);
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, &str)>();
        for (index, url) in urls.iter().enumerate() {
            let _ = job_tx.send((index, url.as_str()));
        }
        drop(job_tx);

        thread::scope(|scope| {
            let (done_tx, done_rx) = crossbeam_channel::unbounded();
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    for (index, url) in job_rx.iter() {
                        let outcome = self.load(url);
                        if done_tx.send((index, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(done_tx);

            let mut loaded = 0;
            for (index, outcome) in done_rx.iter() {
                loaded += 1;
                let (image, error) = match outcome {
                    Ok(image) => (image, None),
                    Err(error) => (Arc::new(LoadedImage::placeholder(&urls[index])), Some(error)),
                };
                on_progress(LoadProgress {
                    index,
                    loaded,
                    total,
                    image: &image,
                    error: error.as_ref(),
                });
                results[index] = Some(image);
            }
        });

        results
            .into_iter()
            .zip(urls)
            .map(|(image, url)| image.unwrap_or_else(|| Arc::new(LoadedImage::placeholder(url))))
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Loads local paths, `file://` URLs and `http(s)://` URLs, decoding with
/// the `image` crate. Failures are not cached so callers may retry.
pub struct DecodingLoader {
    timeout: Duration,
    cache: Mutex<HashMap<String, Arc<LoadedImage>>>,
}

impl DecodingLoader {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for DecodingLoader {
    fn default() -> Self {
        Self::new(DEFAULT_DECODE_TIMEOUT)
    }
}

impl ImageLoader for DecodingLoader {
    fn load(&self, url: &str) -> Result<Arc<LoadedImage>, LoadError> {
        if let Some(cached) = self.get_from_cache(url) {
            return Ok(cached);
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        let owned = url.to_string();
        let timeout = self.timeout;
        thread::Builder::new()
            .name("image-decode".into())
            .spawn(move || {
                let _ = tx.send(fetch_and_decode(&owned, timeout));
            })
            .map_err(|source| LoadError::Io {
                path: PathBuf::from(url),
                source,
            })?;

        let bitmap = match rx.recv_timeout(timeout) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                return Err(LoadError::Timeout {
                    url: url.to_string(),
                    timeout,
                })
            }
        };

        let image = Arc::new(LoadedImage::new(url, bitmap));
        tracing::debug!(url, width = image.width, height = image.height, "decoded image");
        lock(&self.cache).insert(url.to_string(), Arc::clone(&image));
        Ok(image)
    }

    fn get_from_cache(&self, url: &str) -> Option<Arc<LoadedImage>> {
        lock(&self.cache).get(url).cloned()
    }

    fn clear_cache(&self) {
        lock(&self.cache).clear();
    }
}

fn fetch_and_decode(url: &str, timeout: Duration) -> Result<RgbaImage, LoadError> {
    let bytes = if url.starts_with("http://") || url.starts_with("https://") {
        fetch_remote(url, timeout)?
    } else {
        let path = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
        std::fs::read(&path).map_err(|source| LoadError::Io { path, source })?
    };
    image::load_from_memory(&bytes)
        .map(|decoded| decoded.to_rgba8())
        .map_err(|source| LoadError::Decode {
            url: url.to_string(),
            source,
        })
}

fn fetch_remote(url: &str, timeout: Duration) -> Result<Vec<u8>, LoadError> {
    let fetch_error = |err: reqwest::Error| LoadError::Fetch {
        url: url.to_string(),
        message: err.to_string(),
    };
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(fetch_error)?;
    let response = client
        .get(url)
        .send()
        .and_then(|response| response.error_for_status())
        .map_err(fetch_error)?;
    response
        .bytes()
        .map(|bytes| bytes.to_vec())
        .map_err(fetch_error)
}

/// Serves pre-decoded bitmaps registered up front. Useful when the host has
/// already decoded its images, and in tests.
#[derive(Default)]
pub struct MemoryLoader {
    sources: Mutex<HashMap<String, RgbaImage>>,
    cache: Mutex<HashMap<String, Arc<LoadedImage>>>,
    loads: Mutex<HashMap<String, usize>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, url: impl Into<String>, bitmap: RgbaImage) -> Self {
        self.insert(url, bitmap);
        self
    }

    pub fn insert(&self, url: impl Into<String>, bitmap: RgbaImage) {
        lock(&self.sources).insert(url.into(), bitmap);
    }

    /// Number of `load` calls that reached the source (cache misses).
    pub fn load_count(&self, url: &str) -> usize {
        lock(&self.loads).get(url).copied().unwrap_or(0)
    }
}

impl ImageLoader for MemoryLoader {
    fn load(&self, url: &str) -> Result<Arc<LoadedImage>, LoadError> {
        if let Some(cached) = self.get_from_cache(url) {
            return Ok(cached);
        }
        *lock(&self.loads).entry(url.to_string()).or_default() += 1;
        let bitmap = lock(&self.sources)
            .get(url)
            .cloned()
            .ok_or_else(|| LoadError::Missing {
                url: url.to_string(),
            })?;
        let image = Arc::new(LoadedImage::new(url, bitmap));
        lock(&self.cache).insert(url.to_string(), Arc::clone(&image));
        Ok(image)
    }

    fn get_from_cache(&self, url: &str) -> Option<Arc<LoadedImage>> {
        lock(&self.cache).get(url).cloned()
    }

    fn clear_cache(&self) {
        lock(&self.cache).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(width: u32, height: u32, value: u8) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([value, value, value, 255]))
    }

    #[test]
    fn preload_keeps_slots_for_failures() {
        let loader = MemoryLoader::new()
            .with_image("a.jpg", solid(4, 2, 10))
            .with_image("c.jpg", solid(2, 2, 30));
        let urls: Vec<String> = ["a.jpg", "b.jpg", "c.jpg"].map(String::from).to_vec();

        let mut reports = Vec::new();
        let images = loader.preload_with_progress(&urls, &mut |progress| {
            reports.push((progress.index, progress.error.is_some(), progress.total));
        });

        assert_eq!(images.len(), 3);
        assert!(images[1].placeholder);
        assert_eq!((images[1].width, images[1].height), (1, 1));
        assert_eq!(images[0].width, 4);
        reports.sort();
        assert_eq!(reports, vec![(0, false, 3), (1, true, 3), (2, false, 3)]);
    }

    #[test]
    fn cache_avoids_second_load() {
        let loader = MemoryLoader::new().with_image("a.jpg", solid(1, 1, 0));
        let first = loader.load("a.jpg").unwrap();
        let second = loader.load("a.jpg").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.load_count("a.jpg"), 1);
        loader.clear_cache();
        assert!(loader.get_from_cache("a.jpg").is_none());
    }

    #[test]
    fn decoding_loader_reads_files_and_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        solid(3, 2, 200).save(&path).unwrap();

        let loader = DecodingLoader::default();
        let image = loader.load(path.to_str().unwrap()).unwrap();
        assert_eq!((image.width, image.height), (3, 2));
        assert!(!image.placeholder);

        let url = format!("file://{}", path.display());
        let via_url = loader.load(&url).unwrap();
        assert_eq!(via_url.bitmap.get_pixel(0, 0).0, [200, 200, 200, 255]);
    }

    #[test]
    fn decoding_loader_reports_missing_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let loader = DecodingLoader::default();
        let missing = dir.path().join("missing.png");
        assert!(matches!(
            loader.load(missing.to_str().unwrap()),
            Err(LoadError::Io { .. })
        ));

        let corrupt = dir.path().join("corrupt.png");
        std::fs::write(&corrupt, b"not an image").unwrap();
        assert!(matches!(
            loader.load(corrupt.to_str().unwrap()),
            Err(LoadError::Decode { .. })
        ));
        assert!(loader.get_from_cache(corrupt.to_str().unwrap()).is_none());
    }
}
