//! Packages stored recordings into compressed archives for pickup.
//!
//! Archives are capped at [`MAX_ARCHIVE_BYTES`] of payload each so a long
//! event splits into parts a USB stick or mail provider will accept. The
//! split is greedy over the stored order; a single oversized recording
//! still gets its own part rather than being dropped.

use crate::error::{ExportError, Result};
use crate::events::{BoothEvent, EventBus};
use crate::store::{BlobStore, VideoRecord};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Payload ceiling per archive part (300 MiB).
pub const MAX_ARCHIVE_BYTES: u64 = 300 * 1024 * 1024;

/// Delay between consecutive parts so downstream consumers (file
/// managers, browsers) keep up with one file at a time.
const INTER_PART_PAUSE: Duration = Duration::from_secs(1);

/// Greedy size-bounded partition: indices packed in order, starting a new
/// group whenever adding the next item would exceed `ceiling`.
pub fn partition_by_size(sizes: &[u64], ceiling: u64) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_bytes: u64 = 0;

    for (index, &size) in sizes.iter().enumerate() {
        if !current.is_empty() && current_bytes + size > ceiling {
            groups.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current.push(index);
        current_bytes += size;
    }
    if !current.is_empty() {
        groups.push(current);
    }

    groups
}

pub struct ExportEngine {
    store: BlobStore,
    export_dir: PathBuf,
    base_name: String,
    part_ceiling: u64,
    event_bus: Arc<EventBus>,
}

impl ExportEngine {
    pub fn new<P: AsRef<Path>>(
        store: BlobStore,
        export_dir: P,
        base_name: &str,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            export_dir: export_dir.as_ref().to_path_buf(),
            base_name: base_name.to_string(),
            part_ceiling: MAX_ARCHIVE_BYTES,
            event_bus,
        }
    }

    #[cfg(test)]
    pub fn with_part_ceiling(mut self, ceiling: u64) -> Self {
        self.part_ceiling = ceiling;
        self
    }

    /// Part file name: the base name alone for a single archive, a
    /// 1-based `-part<N>` suffix once the export splits.
    fn part_name(&self, part: usize, total_parts: usize) -> String {
        if total_parts > 1 {
            format!("{}-part{}.tar.gz", self.base_name, part)
        } else {
            format!("{}.tar.gz", self.base_name)
        }
    }

    /// Export every stored recording into archive parts under the export
    /// directory. Returns the paths of the finished parts.
    ///
    /// A failing part aborts the run; parts already written stay on disk.
    pub async fn export_all(&self) -> Result<Vec<PathBuf>> {
        let videos = self.store.list_videos().await?;
        if videos.is_empty() {
            info!("Nothing to export, the store holds no recordings");
            return Ok(Vec::new());
        }

        let total_bytes: u64 = videos.iter().map(|v| v.size()).sum();
        info!(
            "Exporting {} recordings ({} bytes) to {}",
            videos.len(),
            total_bytes,
            self.export_dir.display()
        );
        self.event_bus.publish_lossy(BoothEvent::ExportStarted {
            video_count: videos.len(),
            total_bytes,
        });

        tokio::fs::create_dir_all(&self.export_dir).await?;

        let sizes: Vec<u64> = videos.iter().map(|v| v.size()).collect();
        let groups = partition_by_size(&sizes, self.part_ceiling);
        let total_parts = groups.len();

        let mut written: Vec<PathBuf> = Vec::new();
        for (group_index, group) in groups.into_iter().enumerate() {
            let part = group_index + 1;
            let name = self.part_name(part, total_parts);
            let path = self.export_dir.join(&name);

            let members: Vec<VideoRecord> =
                group.into_iter().map(|i| videos[i].clone()).collect();

            match write_archive_part(path.clone(), members).await {
                Ok(bytes) => {
                    debug!("Part {}/{} written: {} ({} bytes)", part, total_parts, name, bytes);
                    self.event_bus.publish_lossy(BoothEvent::ExportPartReady {
                        part,
                        total_parts,
                        path: path.clone(),
                    });
                    written.push(path);
                }
                Err(e) => {
                    warn!("Export aborted at part {}/{}: {}", part, total_parts, e);
                    self.event_bus.publish_lossy(BoothEvent::ExportFailed {
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            }

            if part < total_parts {
                tokio::time::sleep(INTER_PART_PAUSE).await;
            }
        }

        info!("Export completed: {} part(s)", written.len());
        self.event_bus.publish_lossy(BoothEvent::ExportCompleted {
            parts: written.len(),
        });
        Ok(written)
    }
}

/// Write one gzipped tar holding each recording under its stored
/// filename. Runs on the blocking pool; archive building is CPU and disk
/// bound.
async fn write_archive_part(path: PathBuf, members: Vec<VideoRecord>) -> Result<u64> {
    let part_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let task_name = part_name.clone();

    let bytes = tokio::task::spawn_blocking(move || -> std::result::Result<u64, ExportError> {
        let archive_error = |details: String| ExportError::Archive {
            part_name: part_name.clone(),
            details,
        };

        let file = File::create(&path).map_err(|e| archive_error(e.to_string()))?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for video in &members {
            let mut header = tar::Header::new_gnu();
            header.set_size(video.size());
            header.set_mode(0o644);
            header.set_mtime(0);
            header.set_cksum();
            builder
                .append_data(&mut header, &video.filename, video.blob.as_slice())
                .map_err(|e| archive_error(e.to_string()))?;
        }

        let encoder = builder
            .into_inner()
            .map_err(|e| archive_error(e.to_string()))?;
        let file = encoder
            .finish()
            .map_err(|e| archive_error(e.to_string()))?;
        let bytes = file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| archive_error(e.to_string()))?;
        Ok(bytes)
    })
    .await
    .map_err(|e| ExportError::Archive {
        part_name: task_name,
        details: format!("archive task failed: {}", e),
    })??;

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_partition_fills_greedily() {
        let sizes = [100, 100, 100, 100];
        let groups = partition_by_size(&sizes, 250);
        assert_eq!(groups, vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn test_partition_single_group_under_ceiling() {
        let groups = partition_by_size(&[10, 20, 30], 1000);
        assert_eq!(groups, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_partition_oversized_item_gets_own_group() {
        let groups = partition_by_size(&[500, 50, 50], 100);
        assert_eq!(groups, vec![vec![0], vec![1, 2]]);
    }

    #[test]
    fn test_partition_empty_input() {
        assert!(partition_by_size(&[], 100).is_empty());
    }

    #[test]
    fn test_partition_exact_fit_stays_in_group() {
        let groups = partition_by_size(&[60, 40, 1], 100);
        assert_eq!(groups, vec![vec![0, 1], vec![2]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_splits_into_named_parts() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();
        store.save_video(vec![1u8; 600]).await.unwrap();
        store.save_video(vec![2u8; 600]).await.unwrap();
        store.save_video(vec![3u8; 600]).await.unwrap();

        let bus = Arc::new(EventBus::new(64));
        let mut rx = bus.subscribe();
        let export_dir = dir.path().join("out");
        let engine = ExportEngine::new(store, &export_dir, "booth-videos", bus)
            .with_part_ceiling(1000);

        let parts = engine.export_all().await.unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(
            parts[0].file_name().unwrap().to_str().unwrap(),
            "booth-videos-part1.tar.gz"
        );
        assert_eq!(
            parts[2].file_name().unwrap().to_str().unwrap(),
            "booth-videos-part3.tar.gz"
        );
        for path in &parts {
            assert!(path.exists());
        }

        let mut saw_started = false;
        let mut ready = 0;
        let mut completed = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                BoothEvent::ExportStarted {
                    video_count,
                    total_bytes,
                } => {
                    saw_started = true;
                    assert_eq!(video_count, 3);
                    assert_eq!(total_bytes, 1800);
                }
                BoothEvent::ExportPartReady { total_parts, .. } => {
                    ready += 1;
                    assert_eq!(total_parts, 3);
                }
                BoothEvent::ExportCompleted { parts } => {
                    completed = true;
                    assert_eq!(parts, 3);
                }
                _ => {}
            }
        }
        assert!(saw_started);
        assert_eq!(ready, 3);
        assert!(completed);
    }

    #[tokio::test]
    async fn test_single_part_has_no_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();
        store.save_video(b"tiny".to_vec()).await.unwrap();

        let bus = Arc::new(EventBus::new(16));
        let export_dir = dir.path().join("out");
        let engine = ExportEngine::new(store, &export_dir, "booth-videos", bus);

        let parts = engine.export_all().await.unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(
            parts[0].file_name().unwrap().to_str().unwrap(),
            "booth-videos.tar.gz"
        );
    }

    #[tokio::test]
    async fn test_archive_members_carry_stored_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();
        store.save_video(b"first recording".to_vec()).await.unwrap();
        let expected = store.list_videos().await.unwrap()[0].filename.clone();

        let bus = Arc::new(EventBus::new(16));
        let export_dir = dir.path().join("out");
        let engine = ExportEngine::new(store, &export_dir, "booth-videos", bus);
        let parts = engine.export_all().await.unwrap();

        let file = File::open(&parts[0]).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        assert_eq!(entry.path().unwrap().to_str().unwrap(), expected);
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"first recording");
    }

    #[tokio::test]
    async fn test_empty_store_is_a_silent_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();

        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let engine = ExportEngine::new(store, dir.path().join("out"), "booth-videos", bus);

        let parts = engine.export_all().await.unwrap();
        assert!(parts.is_empty());
        assert!(!dir.path().join("out").exists());
        // no start, failure or completion event either
        assert!(rx.try_recv().is_err());
    }
}
