//! Environment/runtime helpers
//!
//! Sanity checks to ensure expected directories exist at startup.

use std::path::Path;

use tracing::warn;

/// Ensure the data directory exists; warn when the static asset directory is missing.
pub async fn ensure_env(static_dir: &str, data_dir: &str) -> anyhow::Result<()> {
    if tokio::fs::metadata(static_dir).await.is_err() {
        warn!(%static_dir, "static assets directory not found; non-API requests will 404");
    }
    tokio::fs::create_dir_all(data_dir)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {data_dir}: {e}"))?;
    Ok(())
}

/// Refuse to serve `static_dir` when any existing `protected` path lies inside it.
pub async fn ensure_not_served<P: AsRef<Path>>(static_dir: &str, protected: &[P]) -> anyhow::Result<()> {
    let Ok(root) = tokio::fs::canonicalize(static_dir).await else {
        return Ok(());
    };
    for path in protected {
        let path = path.as_ref();
        // Missing paths cannot leak.
        let Ok(resolved) = tokio::fs::canonicalize(path).await else {
            continue;
        };
        if resolved.starts_with(&root) {
            anyhow::bail!(
                "static directory {} would expose {}; point STATIC_DIR at a dedicated directory",
                root.display(),
                path.display()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("hexmap_env_{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn ensure_env_creates_data_dir() -> anyhow::Result<()> {
        let root = temp_root();
        let data = root.join("data");
        ensure_env("/nonexistent-static-dir", data.to_str().unwrap()).await?;
        assert!(tokio::fs::metadata(&data).await?.is_dir());
        let _ = tokio::fs::remove_dir_all(&root).await;
        Ok(())
    }

    #[tokio::test]
    async fn serving_the_data_dir_is_refused() -> anyhow::Result<()> {
        let root = temp_root();
        let data = root.join("data");
        tokio::fs::create_dir_all(&data).await?;
        tokio::fs::write(root.join("config.toml"), "[server]\n").await?;

        let static_dir = root.to_str().unwrap();
        assert!(ensure_not_served(static_dir, &[&data]).await.is_err());
        assert!(ensure_not_served(static_dir, &[root.join("config.toml")]).await.is_err());
        let _ = tokio::fs::remove_dir_all(&root).await;
        Ok(())
    }

    #[tokio::test]
    async fn dedicated_static_dir_is_accepted() -> anyhow::Result<()> {
        let root = temp_root();
        let static_dir = root.join("static");
        let data = root.join("data");
        tokio::fs::create_dir_all(&static_dir).await?;
        tokio::fs::create_dir_all(&data).await?;

        ensure_not_served(static_dir.to_str().unwrap(), &[data, root.join("config.toml")]).await?;
        ensure_not_served("/nonexistent-static-dir", &[root.clone()]).await?;
        let _ = tokio::fs::remove_dir_all(&root).await;
        Ok(())
    }
}
