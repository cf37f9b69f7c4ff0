//! Offline reference embedding build.
//!
//! Runs extraction, normalization and embedding once over every decodable
//! frame of each lesson's reference video and stores the result as the
//! lesson's artifact. Existing artifacts are never recomputed.
//!
//! Videos are processed concurrently up to `max_concurrent_videos`; the
//! engine and model handles are shared and serialize their own calls.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use hearme_media::{GesturePipeline, MediaResult};
use hearme_models::{Catalog, CollectionId, LandmarkFrame, LessonId};
use hearme_storage::{artifact_exists, store_embedding, StoreOutcome};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::SessionLogger;
use crate::metrics;

/// Source of per-frame landmarks for a whole reference video.
#[async_trait]
pub trait VideoLandmarkSource: Send + Sync {
    async fn extract_video(&self, path: &Path) -> MediaResult<Vec<LandmarkFrame>>;
}

#[async_trait]
impl VideoLandmarkSource for GesturePipeline {
    async fn extract_video(&self, path: &Path) -> MediaResult<Vec<LandmarkFrame>> {
        GesturePipeline::extract_video(self, path).await
    }
}

/// One reference video to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheJob {
    pub lesson_id: LessonId,
    pub collection_id: CollectionId,
    pub video_path: PathBuf,
    pub artifact_path: PathBuf,
}

/// How one video ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CacheOutcome {
    Cached,
    AlreadyCached,
    /// Zero decodable frames. No artifact is written.
    NoFrames,
    Failed {
        reason: String,
        /// The engine or collection model could not be loaded.
        resource_load: bool,
    },
}

impl CacheOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::Cached => "cached",
            CacheOutcome::AlreadyCached => "already_cached",
            CacheOutcome::NoFrames => "no_frames",
            CacheOutcome::Failed { .. } => "failed",
        }
    }

    fn failed(err: &WorkerError) -> Self {
        CacheOutcome::Failed {
            reason: err.to_string(),
            resource_load: err.is_resource_load_failure(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub video: String,
    pub lesson_id: Option<LessonId>,
    #[serde(flatten)]
    pub outcome: CacheOutcome,
}

/// Result of a cache run, one report per requested video.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheSummary {
    pub reports: Vec<CacheReport>,
}

impl CacheSummary {
    pub fn count(&self, kind: &str) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome.as_str() == kind)
            .count()
    }

    pub fn resource_failures(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    CacheOutcome::Failed {
                        resource_load: true,
                        ..
                    }
                )
            })
            .count()
    }

    /// A resource load failure left nothing processable.
    pub fn blocked(&self) -> bool {
        self.resource_failures() > 0
            && self
                .reports
                .iter()
                .all(|r| matches!(r.outcome, CacheOutcome::Failed { .. }))
    }
}

/// Read a newline-separated list of video filenames. Blank lines are skipped.
pub async fn read_video_list(path: &Path) -> WorkerResult<Vec<String>> {
    let contents = tokio::fs::read_to_string(path).await?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Build jobs for every catalog lesson, or only for the listed videos.
///
/// Listed names are matched against lesson video filenames (directories are
/// ignored). Names without a lesson come back as the second element.
pub fn plan_jobs(
    catalog: &Catalog,
    video_list: Option<&[String]>,
) -> WorkerResult<(Vec<CacheJob>, Vec<String>)> {
    let wanted: Option<HashSet<&str>> = video_list.map(|names| {
        names
            .iter()
            .map(|name| {
                Path::new(name)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(name.as_str())
            })
            .collect()
    });

    let mut jobs = Vec::new();
    let mut seen = HashSet::new();
    for lesson in &catalog.lessons {
        if let Some(wanted) = &wanted {
            if !wanted.contains(lesson.video_filename.as_str()) {
                continue;
            }
        }
        seen.insert(lesson.video_filename.as_str());
        jobs.push(CacheJob {
            lesson_id: lesson.id.clone(),
            collection_id: lesson.collection_id.clone(),
            video_path: catalog.video_path(lesson)?,
            artifact_path: catalog.embedding_path(lesson)?,
        });
    }

    let unknown = wanted
        .map(|wanted| {
            let mut unknown: Vec<String> = wanted
                .into_iter()
                .filter(|name| !seen.contains(name))
                .map(str::to_string)
                .collect();
            unknown.sort();
            unknown
        })
        .unwrap_or_default();

    Ok((jobs, unknown))
}

/// Builds reference artifacts.
pub struct ReferenceCacheBuilder {
    pipeline: GesturePipeline,
    source: Arc<dyn VideoLandmarkSource>,
    max_concurrent: usize,
}

impl ReferenceCacheBuilder {
    pub fn new(pipeline: GesturePipeline, max_concurrent: usize) -> Self {
        let source = Arc::new(pipeline.clone());
        Self::with_source(pipeline, source, max_concurrent)
    }

    pub fn with_source(
        pipeline: GesturePipeline,
        source: Arc<dyn VideoLandmarkSource>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            pipeline,
            source,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Process every job. Per-video failures never stop the run.
    pub async fn run(&self, jobs: Vec<CacheJob>) -> CacheSummary {
        let logger = SessionLogger::from_string("cache-run", "reference_cache");
        logger.log_start(&format!("{} reference videos", jobs.len()));

        let unavailable = self.preload_models(&jobs, &logger).await;
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        let futures: Vec<_> = jobs
            .iter()
            .map(|job| {
                let semaphore = semaphore.clone();
                let unavailable = &unavailable;
                async move {
                    let outcome = match unavailable.get(&job.collection_id) {
                        Some(reason) => CacheOutcome::Failed {
                            reason: reason.clone(),
                            resource_load: true,
                        },
                        None => match semaphore.acquire().await {
                            Ok(_permit) => self
                                .process(job)
                                .await
                                .unwrap_or_else(|e| CacheOutcome::failed(&e)),
                            Err(e) => CacheOutcome::Failed {
                                reason: format!("Worker pool closed: {e}"),
                                resource_load: false,
                            },
                        },
                    };
                    report_outcome(job, &outcome);
                    CacheReport {
                        video: job.video_path.display().to_string(),
                        lesson_id: Some(job.lesson_id.clone()),
                        outcome,
                    }
                }
            })
            .collect();

        let summary = CacheSummary {
            reports: join_all(futures).await,
        };

        logger.log_completion(&format!(
            "cached={} already_cached={} no_frames={} failed={}",
            summary.count("cached"),
            summary.count("already_cached"),
            summary.count("no_frames"),
            summary.count("failed"),
        ));
        summary
    }

    /// Load each collection model the jobs need. Returns the ones that failed.
    async fn preload_models(
        &self,
        jobs: &[CacheJob],
        logger: &SessionLogger,
    ) -> HashMap<CollectionId, String> {
        let collections: HashSet<&CollectionId> = jobs.iter().map(|j| &j.collection_id).collect();

        let mut unavailable = HashMap::new();
        for collection in collections {
            if let Err(e) = self.pipeline.models().get(collection).await {
                logger.log_error(&format!("model for collection {} unavailable: {}", collection, e));
                unavailable.insert(collection.clone(), e.to_string());
            }
        }
        unavailable
    }

    async fn process(&self, job: &CacheJob) -> WorkerResult<CacheOutcome> {
        if artifact_exists(&job.artifact_path).await {
            return Ok(CacheOutcome::AlreadyCached);
        }

        let frames = self.source.extract_video(&job.video_path).await?;
        if frames.is_empty() {
            return Ok(CacheOutcome::NoFrames);
        }

        let frame_count = frames.len();
        let embedding = self.pipeline.embed(&job.collection_id, frames).await?;
        debug!(
            lesson = %job.lesson_id,
            frames = frame_count,
            len = embedding.len(),
            "Embedded reference video"
        );

        match store_embedding(&job.artifact_path, &embedding).await? {
            StoreOutcome::Written => Ok(CacheOutcome::Cached),
            StoreOutcome::AlreadyExists => Ok(CacheOutcome::AlreadyCached),
        }
    }
}

fn report_outcome(job: &CacheJob, outcome: &CacheOutcome) {
    metrics::record_cache_outcome(outcome.as_str());
    match outcome {
        CacheOutcome::Cached => info!(
            lesson = %job.lesson_id,
            artifact = %job.artifact_path.display(),
            "Reference embedding cached"
        ),
        CacheOutcome::AlreadyCached => debug!(
            lesson = %job.lesson_id,
            "Reference embedding already cached, skipping"
        ),
        CacheOutcome::NoFrames => warn!(
            lesson = %job.lesson_id,
            video = %job.video_path.display(),
            "No frames decoded from reference video, no artifact written"
        ),
        CacheOutcome::Failed { reason, .. } => warn!(
            lesson = %job.lesson_id,
            video = %job.video_path.display(),
            error = %reason,
            "Reference embedding failed"
        ),
    }
}

/// Reports for listed videos that match no lesson.
pub fn unknown_video_reports(names: &[String]) -> Vec<CacheReport> {
    names
        .iter()
        .map(|name| {
            metrics::record_cache_outcome("failed");
            warn!(video = %name, "Listed video matches no catalog lesson");
            CacheReport {
                video: name.clone(),
                lesson_id: None,
                outcome: CacheOutcome::Failed {
                    reason: "no catalog lesson for video".to_string(),
                    resource_load: false,
                },
            }
        })
        .collect()
}
