use std::path::Path;
use std::process::Command;

use hearme_models::Catalog;
use hearme_worker::WorkerConfig;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();
    config.validate()?;

    println!(
        "hearme-selfcheck: starting with catalog={}",
        config.catalog_path.display()
    );
    ensure_tool("ffmpeg")?;
    ensure_tool("ffprobe")?;

    let catalog = Catalog::load(&config.catalog_path)
        .map_err(|e| anyhow::anyhow!("catalog {} invalid: {}", config.catalog_path.display(), e))?;
    println!(
        "hearme-selfcheck: catalog ok ({} collections, {} lessons)",
        catalog.collections.len(),
        catalog.lessons.len()
    );

    ensure_file("pose model", &config.pose_model)?;
    for collection in &catalog.collections {
        ensure_file(
            &format!("model for collection {}", collection.id),
            &collection.model_file,
        )?;
    }

    println!("hearme-selfcheck: ok");
    Ok(())
}

fn ensure_tool(name: &str) -> anyhow::Result<()> {
    let path = which::which(name).map_err(|e| anyhow::anyhow!("{} not found in PATH: {}", name, e))?;

    let output = Command::new(&path)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("{} not available: {}", name, e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "{} -version failed: {:?}",
            name,
            output.status
        ));
    }
    Ok(())
}

fn ensure_file(what: &str, path: &Path) -> anyhow::Result<()> {
    if !path.is_file() {
        return Err(anyhow::anyhow!("{} missing at {}", what, path.display()));
    }
    Ok(())
}
