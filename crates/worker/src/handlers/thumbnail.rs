//! THUMBNAIL: thumbnail generation is delegated to the storage
//! collaborator; only the resulting URL is stored.

use async_trait::async_trait;
use roadwatch_core::error::CoreError;
use roadwatch_db::models::job::ProcessingJob;
use roadwatch_db::models::video::Video;
use roadwatch_db::repositories::{JobRepo, VideoRepo};
use roadwatch_db::DbPool;

use crate::error::JobError;
use crate::handlers::HandlerOutcome;

#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Produce (or locate) the thumbnail for `video` and return its URL.
    async fn thumbnail_url(&self, video: &Video) -> Result<String, JobError>;
}

/// Storage whose thumbnails live at `{base_url}/{external_id}.jpg`.
pub struct UrlTemplateStorage {
    base_url: String,
}

impl UrlTemplateStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorageClient for UrlTemplateStorage {
    async fn thumbnail_url(&self, video: &Video) -> Result<String, JobError> {
        if video.external_id.trim().is_empty() {
            return Err(JobError::Storage(format!(
                "video {} has no external id",
                video.id
            )));
        }
        Ok(format!("{}/{}.jpg", self.base_url, video.external_id))
    }
}

pub async fn run(
    pool: &DbPool,
    storage: &dyn StorageClient,
    job: &ProcessingJob,
) -> Result<HandlerOutcome, JobError> {
    let video = VideoRepo::find_by_id(pool, job.video_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "Video",
            id: job.video_id,
        })?;

    let url = storage.thumbnail_url(&video).await?;
    let result = serde_json::json!({ "thumbnail_url": url });

    if !JobRepo::complete(pool, job.id, job.attempt, &result).await? {
        return Ok(HandlerOutcome::Superseded);
    }
    VideoRepo::set_thumbnail_url(pool, video.id, &url).await?;

    tracing::info!(job_id = job.id, video_id = video.id, thumbnail_url = %url, "Thumbnail stored");
    Ok(HandlerOutcome::Completed(result))
}
