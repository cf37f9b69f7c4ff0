//! Offline reference embedding build.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use hearme_media::{GesturePipeline, ModelRegistry, OrtPoseEngine};
use hearme_models::Catalog;
use hearme_worker::{
    init_tracing, plan_jobs, read_video_list, unknown_video_reports, ReferenceCacheBuilder,
    WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting hearme-cache");

    let config = WorkerConfig::from_env();
    config.validate()?;
    info!("Worker config: {:?}", config);

    let catalog = Catalog::load(&config.catalog_path)
        .with_context(|| format!("loading catalog {}", config.catalog_path.display()))?;

    let video_list = match &config.video_list {
        Some(path) => Some(
            read_video_list(path)
                .await
                .with_context(|| format!("reading video list {}", path.display()))?,
        ),
        None => None,
    };
    let (jobs, unknown) = plan_jobs(&catalog, video_list.as_deref())?;
    if jobs.is_empty() && unknown.is_empty() {
        warn!("No reference videos to process");
        return Ok(());
    }

    let engine = match OrtPoseEngine::load(&config.pose_model) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to load pose engine: {}", e);
            std::process::exit(1);
        }
    };
    let models = ModelRegistry::with_ort(catalog.collections.clone())?;
    let pipeline = GesturePipeline::new(Arc::new(engine), Arc::new(models));

    let builder = ReferenceCacheBuilder::new(pipeline, config.max_concurrent_videos);
    let mut summary = builder.run(jobs).await;
    summary.reports.extend(unknown_video_reports(&unknown));

    info!(
        cached = summary.count("cached"),
        already_cached = summary.count("already_cached"),
        no_frames = summary.count("no_frames"),
        failed = summary.count("failed"),
        "Reference cache run finished"
    );

    if summary.blocked() {
        error!(
            resource_failures = summary.resource_failures(),
            "Embedding models unavailable, nothing was processed"
        );
        std::process::exit(1);
    }

    Ok(())
}
