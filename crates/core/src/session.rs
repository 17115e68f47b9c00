//! Session table and per-session image collections.
//!
//! Each session owns a private directory under the scratch root holding
//! its image files. The directory is a [`TempDir`], so it disappears when
//! the last `Arc<Session>` is dropped, whichever path removed the session
//! from the table (explicit end, expiry sweep, or process shutdown).
//!
//! Locking: the table sits behind one async `RwLock`; every session's image
//! list has its own `Mutex`. Mutations of one session's images are
//! serialized against each other, while different sessions never contend
//! beyond the brief table lookup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::ImageFormat;
use tempfile::{NamedTempFile, TempDir};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::error::CoreError;
use crate::metadata::MetadataCodec;
use crate::shapes::Shape;
use crate::types::{new_id, ImageId, SessionId};

/// Number of images per page for paged downloads.
pub const PAGE_SIZE: usize = 10;

/// Default session time-to-live (15 minutes).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_millis(900_000);

/// Default period of the expiry sweep (3 minutes).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(180_000);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
    /// Parent directory of session directories and extraction scratch.
    pub scratch_root: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_SESSION_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            scratch_root: std::env::temp_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// One image held by a session.
#[derive(Debug, Clone)]
pub struct AnnotatedImage {
    pub id: ImageId,
    /// File inside the owning session's directory.
    pub path: PathBuf,
    pub format: ImageFormat,
    /// Upload file name, or the generated frame name for video frames.
    pub source_name: String,
    /// `None` when nothing could be read from the image, `Some(vec![])`
    /// when it carries an empty annotation list.
    pub metadata: Option<Vec<Shape>>,
}

impl AnnotatedImage {
    pub fn extension(&self) -> &'static str {
        format_extension(self.format)
    }

    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

fn format_extension(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("bin")
}

fn image_path(dir: &Path, id: ImageId, format: ImageFormat) -> PathBuf {
    dir.join(format!("{id}.{}", format_extension(format)))
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    dir: TempDir,
    images: Mutex<Vec<AnnotatedImage>>,
}

impl Session {
    fn create(scratch_root: &Path) -> Result<Self, CoreError> {
        let id = new_id();
        let dir = tempfile::Builder::new()
            .prefix(&format!("session-{id}-"))
            .tempdir_in(scratch_root)
            .map_err(|e| CoreError::Internal(format!("failed to create session directory: {e}")))?;
        Ok(Self {
            id,
            dir,
            images: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Private directory holding this session's files.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Write image bytes into the session directory.
    ///
    /// The returned record is not yet part of the collection; pass it to
    /// [`Session::push_images`] once the whole batch is ready.
    pub async fn write_image(
        &self,
        data: &[u8],
        format: ImageFormat,
        source_name: String,
        metadata: Option<Vec<Shape>>,
    ) -> Result<AnnotatedImage, CoreError> {
        let id = new_id();
        let path = image_path(self.dir(), id, format);
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| CoreError::Internal(format!("failed to store image: {e}")))?;
        Ok(AnnotatedImage {
            id,
            path,
            format,
            source_name,
            metadata,
        })
    }

    /// Append images to the collection, keeping their order.
    pub async fn push_images(&self, batch: Vec<AnnotatedImage>) {
        self.images.lock().await.extend(batch);
    }

    /// Snapshot of all images in insertion order.
    pub async fn images(&self) -> Vec<AnnotatedImage> {
        self.images.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.images.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.images.lock().await.is_empty()
    }

    pub async fn image(&self, id: ImageId) -> Result<AnnotatedImage, CoreError> {
        self.images
            .lock()
            .await
            .iter()
            .find(|img| img.id == id)
            .cloned()
            .ok_or_else(|| image_not_found(id))
    }

    /// Images of a 1-based page, each paired with its position in the
    /// whole collection. A page past the end is empty.
    pub async fn page(&self, page_number: usize) -> Result<Vec<(usize, AnnotatedImage)>, CoreError> {
        if page_number == 0 {
            return Err(CoreError::Validation(
                "pageNumber must be 1 or greater".into(),
            ));
        }
        let start = (page_number - 1).saturating_mul(PAGE_SIZE);
        let images = self.images.lock().await;
        Ok(images
            .iter()
            .enumerate()
            .skip(start)
            .take(PAGE_SIZE)
            .map(|(i, img)| (i, img.clone()))
            .collect())
    }

    /// Remove an image and its file. Returns whether it was present.
    pub async fn remove_image(&self, id: ImageId) -> bool {
        let removed = {
            let mut images = self.images.lock().await;
            let Some(pos) = images.iter().position(|img| img.id == id) else {
                return false;
            };
            images.remove(pos)
        };

        if let Err(e) = tokio::fs::remove_file(&removed.path).await {
            tracing::warn!(
                session_id = %self.id,
                image_id = %id,
                error = %e,
                "Failed to remove image file",
            );
        }
        true
    }

    /// Embed `shapes` into an image and update its record.
    ///
    /// The rewritten file is staged next to the original and renamed over it,
    /// so a failure leaves both the file and the record untouched. When the
    /// codec changes the container format the file moves to the matching
    /// extension.
    pub async fn attach_metadata(
        &self,
        id: ImageId,
        shapes: Vec<Shape>,
        codec: Arc<dyn MetadataCodec>,
    ) -> Result<AnnotatedImage, CoreError> {
        let mut images = self.images.lock().await;
        let image = images
            .iter_mut()
            .find(|img| img.id == id)
            .ok_or_else(|| image_not_found(id))?;

        let dir = self.dir().to_path_buf();
        let old_path = image.path.clone();
        let payload = shapes.clone();
        let (new_path, new_format) = tokio::task::spawn_blocking(move || {
            rewrite_with_metadata(&dir, id, &old_path, &payload, codec.as_ref())
        })
        .await
        .map_err(|e| CoreError::Internal(format!("metadata task failed: {e}")))??;

        image.path = new_path;
        image.format = new_format;
        image.metadata = Some(shapes);

        tracing::debug!(
            session_id = %self.id,
            image_id = %id,
            format = ?new_format,
            "Metadata attached",
        );
        Ok(image.clone())
    }
}

fn rewrite_with_metadata(
    dir: &Path,
    id: ImageId,
    old_path: &Path,
    shapes: &[Shape],
    codec: &dyn MetadataCodec,
) -> Result<(PathBuf, ImageFormat), CoreError> {
    let internal = |what: &str, e: std::io::Error| CoreError::Internal(format!("{what}: {e}"));

    let original = std::fs::read(old_path).map_err(|e| internal("failed to read image", e))?;
    let embedded = codec.embed(&original, shapes)?;
    let format = image::guess_format(&embedded)
        .map_err(|e| CoreError::Internal(format!("codec produced an unknown format: {e}")))?;
    let new_path = image_path(dir, id, format);

    let mut staged =
        NamedTempFile::new_in(dir).map_err(|e| internal("failed to stage image", e))?;
    std::io::Write::write_all(&mut staged, &embedded)
        .map_err(|e| internal("failed to stage image", e))?;
    staged
        .persist(&new_path)
        .map_err(|e| internal("failed to replace image", e.error))?;

    if new_path != old_path {
        if let Err(e) = std::fs::remove_file(old_path) {
            tracing::warn!(path = %old_path.display(), error = %e, "Failed to remove replaced image");
        }
    }
    Ok((new_path, format))
}

fn image_not_found(id: ImageId) -> CoreError {
    CoreError::NotFound {
        entity: "image",
        id: id.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Process-wide table of live sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Allocate a session expiring one TTL from now.
    async fn create(&self) -> Result<SessionId, CoreError>;

    /// Reset a live session's expiry to one TTL from now.
    ///
    /// Fails with `InvalidSession` for unknown or expired ids, leaving the
    /// table untouched.
    async fn touch(&self, id: SessionId) -> Result<Instant, CoreError>;

    async fn get(&self, id: SessionId) -> Result<Arc<Session>, CoreError>;

    /// Current expiry of a live session, without extending it.
    async fn expires_at(&self, id: SessionId) -> Result<Instant, CoreError>;

    /// Drop a session. Unknown ids are ignored.
    async fn delete(&self, id: SessionId);

    /// Remove every expired session, returning how many were removed.
    async fn sweep_expired(&self) -> usize;

    async fn len(&self) -> usize;
}

#[derive(Debug)]
struct Entry {
    expires_at: Instant,
    session: Arc<Session>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
pub struct InMemorySessionStore {
    config: SessionConfig,
    sessions: RwLock<HashMap<SessionId, Entry>>,
}

impl InMemorySessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

fn invalid_session(id: SessionId) -> CoreError {
    CoreError::InvalidSession(id.to_string())
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self) -> Result<SessionId, CoreError> {
        let session = Session::create(&self.config.scratch_root)?;
        let id = session.id();
        let entry = Entry {
            expires_at: Instant::now() + self.config.ttl,
            session: Arc::new(session),
        };
        self.sessions.write().await.insert(id, entry);
        tracing::info!(session_id = %id, "Session created");
        Ok(id)
    }

    async fn touch(&self, id: SessionId) -> Result<Instant, CoreError> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        match sessions.get_mut(&id) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = now + self.config.ttl;
                Ok(entry.expires_at)
            }
            _ => Err(invalid_session(id)),
        }
    }

    async fn get(&self, id: SessionId) -> Result<Arc<Session>, CoreError> {
        let sessions = self.sessions.read().await;
        match sessions.get(&id) {
            Some(entry) if entry.is_live(Instant::now()) => Ok(Arc::clone(&entry.session)),
            _ => Err(invalid_session(id)),
        }
    }

    async fn expires_at(&self, id: SessionId) -> Result<Instant, CoreError> {
        let sessions = self.sessions.read().await;
        match sessions.get(&id) {
            Some(entry) if entry.is_live(Instant::now()) => Ok(entry.expires_at),
            _ => Err(invalid_session(id)),
        }
    }

    async fn delete(&self, id: SessionId) {
        let removed = self.sessions.write().await.remove(&id);
        if removed.is_some() {
            tracing::info!(session_id = %id, "Session ended");
        }
    }

    async fn sweep_expired(&self) -> usize {
        let expired: Vec<Entry> = {
            let mut sessions = self.sessions.write().await;
            let now = Instant::now();
            let ids: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, entry)| !entry.is_live(now))
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for entry in &expired {
            tracing::info!(session_id = %entry.session.id(), "Session expired");
        }
        expired.len()
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
