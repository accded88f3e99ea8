use crate::error::{Result, StorageError};
use chrono::{DateTime, Local, TimeZone};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// File name of the blob database inside the data directory.
pub const STORE_FILE: &str = "booth.db";

/// Container extension for recorded videos.
const VIDEO_EXTENSION: &str = "mp4";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS videos (
     id        INTEGER PRIMARY KEY AUTOINCREMENT,
     blob      BLOB NOT NULL,
     filename  TEXT NOT NULL,
     timestamp TEXT NOT NULL
 );
 CREATE TABLE IF NOT EXISTS images (
     key  TEXT PRIMARY KEY,
     blob BLOB NOT NULL
 );";

/// A stored video recording. Immutable once created; exclusively owned by
/// the store.
#[derive(Debug, Clone)]
pub struct VideoRecord {
    pub id: i64,
    pub blob: Vec<u8>,
    pub filename: String,
    /// ISO-8601 capture timestamp
    pub timestamp: String,
}

impl VideoRecord {
    pub fn size(&self) -> u64 {
        self.blob.len() as u64
    }
}

/// Durable local store for video recordings and slot-keyed images.
///
/// Two collections: `videos` (auto-keyed, append-oriented) and `images`
/// (keyed by logical slot, upsert-oriented). Every operation runs in its
/// own transaction; the SQL runs on the blocking pool so callers stay
/// non-blocking.
#[derive(Clone)]
pub struct BlobStore {
    conn: Arc<Mutex<Connection>>,
}

impl BlobStore {
    /// Open (or create) the store at `<data_dir>/booth.db` and define both
    /// collections. Idempotent; call once at process start.
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let dir = data_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(STORE_FILE);

        Self::open_at(path).await
    }

    /// Fully in-memory store, for tests that need no directory.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio::task::spawn_blocking(
            || -> std::result::Result<Connection, rusqlite::Error> {
                let conn = Connection::open_in_memory()?;
                conn.execute_batch(SCHEMA)?;
                Ok(conn)
            },
        )
        .await
        .map_err(|_| StorageError::TaskCancelled { operation: "open" })?
        .map_err(|source| StorageError::Open {
            path: ":memory:".to_string(),
            source,
        })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn open_at(path: PathBuf) -> Result<Self> {
        let shown = path.display().to_string();
        let conn = tokio::task::spawn_blocking(move || -> std::result::Result<Connection, rusqlite::Error> {
            let conn = Connection::open(&path)?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|_| StorageError::TaskCancelled { operation: "open" })?
        .map_err(|source| StorageError::Open {
            path: shown.clone(),
            source,
        })?;

        info!("Blob store opened at {}", shown);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run one operation inside its own transaction on the blocking pool.
    async fn transact<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let out = tokio::task::spawn_blocking(move || -> rusqlite::Result<T> {
            let mut guard = conn.lock();
            let tx = guard.transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
        .await
        .map_err(|_| StorageError::TaskCancelled { operation })?
        .map_err(|source| StorageError::Transaction { operation, source })?;

        Ok(out)
    }

    /// Store a finished recording. Assigns a fresh id and derives the
    /// filename from the current local wall-clock time at minute
    /// granularity. Returns the assigned id.
    pub async fn save_video(&self, blob: Vec<u8>) -> Result<i64> {
        let now = Local::now();
        let filename = video_filename(&now);
        let timestamp = now.to_rfc3339();

        let id = self
            .transact("save_video", move |tx| {
                tx.execute(
                    "INSERT INTO videos (blob, filename, timestamp) VALUES (?1, ?2, ?3)",
                    params![blob, filename, timestamp],
                )?;
                Ok(tx.last_insert_rowid())
            })
            .await?;

        debug!("Saved video id {}", id);
        Ok(id)
    }

    /// All stored video records, in store-native enumeration order.
    pub async fn list_videos(&self) -> Result<Vec<VideoRecord>> {
        self.transact("list_videos", |tx| {
            let mut stmt =
                tx.prepare("SELECT id, blob, filename, timestamp FROM videos")?;
            let rows = stmt.query_map([], |row| {
                Ok(VideoRecord {
                    id: row.get(0)?,
                    blob: row.get(1)?,
                    filename: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            })?;
            rows.collect()
        })
        .await
    }

    /// Fetch one video by id; `None` when it does not exist.
    pub async fn video(&self, id: i64) -> Result<Option<VideoRecord>> {
        self.transact("video", move |tx| {
            tx.query_row(
                "SELECT id, blob, filename, timestamp FROM videos WHERE id = ?1",
                [id],
                |row| {
                    Ok(VideoRecord {
                        id: row.get(0)?,
                        blob: row.get(1)?,
                        filename: row.get(2)?,
                        timestamp: row.get(3)?,
                    })
                },
            )
            .optional()
        })
        .await
    }

    /// Delete one video. Deleting a non-existent id is not an error.
    pub async fn delete_video(&self, id: i64) -> Result<()> {
        self.transact("delete_video", move |tx| {
            tx.execute("DELETE FROM videos WHERE id = ?1", [id])?;
            Ok(())
        })
        .await
    }

    pub async fn clear_all_videos(&self) -> Result<()> {
        self.transact("clear_all_videos", |tx| {
            tx.execute("DELETE FROM videos", [])?;
            Ok(())
        })
        .await
    }

    pub async fn count_videos(&self) -> Result<u64> {
        self.transact("count_videos", |tx| {
            tx.query_row("SELECT COUNT(*) FROM videos", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
        })
        .await
    }

    /// Sum of all stored video blob sizes, reported before export packaging.
    pub async fn total_video_bytes(&self) -> Result<u64> {
        self.transact("total_video_bytes", |tx| {
            tx.query_row(
                "SELECT COALESCE(SUM(LENGTH(blob)), 0) FROM videos",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
        })
        .await
    }

    /// Upsert the image for a slot; saving overwrites silently.
    pub async fn save_image(&self, key: &str, blob: Vec<u8>) -> Result<()> {
        let key = key.to_string();
        self.transact("save_image", move |tx| {
            tx.execute(
                "INSERT INTO images (key, blob) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET blob = excluded.blob",
                params![key, blob],
            )?;
            Ok(())
        })
        .await
    }

    /// Image for a slot; `None` means nothing is configured for it and is
    /// a normal, non-error outcome.
    pub async fn get_image(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();
        self.transact("get_image", move |tx| {
            tx.query_row("SELECT blob FROM images WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
        })
        .await
    }

    pub async fn delete_image(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.transact("delete_image", move |tx| {
            tx.execute("DELETE FROM images WHERE key = ?1", [key])?;
            Ok(())
        })
        .await
    }
}

/// Derive the stored filename from a capture timestamp:
/// `YYYY-MM-DD_HHhMM.mp4`, minute granularity, local wall-clock.
pub fn video_filename<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    format!("{}.{}", at.format("%Y-%m-%d_%Hh%M"), VIDEO_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_test_store() -> (TempDir, BlobStore) {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[test]
    fn test_video_filename_format() {
        let at = Local.with_ymd_and_hms(2026, 3, 7, 9, 5, 42).unwrap();
        assert_eq!(video_filename(&at), "2026-03-07_09h05.mp4");
    }

    #[tokio::test]
    async fn test_in_memory_store_round_trips() {
        let store = BlobStore::open_in_memory().await.unwrap();
        let id = store.save_video(vec![9, 9, 9]).await.unwrap();
        let video = store.video(id).await.unwrap().unwrap();
        assert_eq!(video.blob, vec![9, 9, 9]);
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();
        store.save_video(vec![1, 2, 3]).await.unwrap();
        drop(store);

        // reopening must not clobber existing data
        let store = BlobStore::open(dir.path()).await.unwrap();
        assert_eq!(store.count_videos().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_save_video_assigns_unique_ids_and_lists() {
        let (_dir, store) = open_test_store().await;

        let a = store.save_video(vec![0xAA; 8]).await.unwrap();
        let b = store.save_video(vec![0xBB; 16]).await.unwrap();
        assert_ne!(a, b);

        let videos = store.list_videos().await.unwrap();
        assert_eq!(videos.len(), 2);

        let saved_a = videos.iter().find(|v| v.id == a).unwrap();
        assert_eq!(saved_a.blob, vec![0xAA; 8]);
        assert!(saved_a.filename.ends_with(".mp4"));
        // timestamp parses as ISO-8601
        assert!(DateTime::parse_from_rfc3339(&saved_a.timestamp).is_ok());
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let (_dir, store) = open_test_store().await;

        let id = store.save_video(vec![1]).await.unwrap();
        store.save_video(vec![2]).await.unwrap();

        store.delete_video(id).await.unwrap();
        assert!(store
            .list_videos()
            .await
            .unwrap()
            .iter()
            .all(|v| v.id != id));

        // deleting a missing id is not an error
        store.delete_video(424242).await.unwrap();

        store.clear_all_videos().await.unwrap();
        assert_eq!(store.count_videos().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_video_by_id() {
        let (_dir, store) = open_test_store().await;
        let id = store.save_video(vec![7; 4]).await.unwrap();

        let rec = store.video(id).await.unwrap().unwrap();
        assert_eq!(rec.blob, vec![7; 4]);
        assert!(store.video(id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_image_upsert_overwrites() {
        let (_dir, store) = open_test_store().await;

        store.save_image("event-photo", vec![1, 1]).await.unwrap();
        store.save_image("event-photo", vec![2, 2]).await.unwrap();

        assert_eq!(
            store.get_image("event-photo").await.unwrap(),
            Some(vec![2, 2])
        );
    }

    #[tokio::test]
    async fn test_image_miss_is_none_and_delete() {
        let (_dir, store) = open_test_store().await;

        assert_eq!(store.get_image("unset-slot").await.unwrap(), None);

        store.save_image("event-photo", vec![9]).await.unwrap();
        store.delete_image("event-photo").await.unwrap();
        assert_eq!(store.get_image("event-photo").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_total_video_bytes() {
        let (_dir, store) = open_test_store().await;
        assert_eq!(store.total_video_bytes().await.unwrap(), 0);

        store.save_video(vec![0; 100]).await.unwrap();
        store.save_video(vec![0; 50]).await.unwrap();
        assert_eq!(store.total_video_bytes().await.unwrap(), 150);
    }
}
