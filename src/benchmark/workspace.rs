//! Working copy management for template projects
//!
//! A case's template project is copied to a disposable working copy before
//! every input. The previous copy is removed first so no source file or
//! build artifact from an earlier input survives into the next build.

use std::path::{Path, PathBuf};

use tokio::fs;
use walkdir::WalkDir;

use crate::error::{AppError, AppResult};

/// Replace `working_dir` with a fresh copy of `template_dir`
pub async fn prepare_working_copy(template_dir: &Path, working_dir: &Path) -> AppResult<()> {
    if !template_dir.is_dir() {
        return Err(AppError::Template(format!(
            "template project not found: {}",
            template_dir.display()
        )));
    }

    if fs::try_exists(working_dir).await? {
        tracing::debug!(dir = %working_dir.display(), "Removing stale working copy");
        fs::remove_dir_all(working_dir).await?;
    }

    copy_dir_recursive(template_dir, working_dir).await
}

/// Recursively copy a directory
pub async fn copy_dir_recursive(src: &Path, dst: &Path) -> AppResult<()> {
    let src = src.to_path_buf();
    let dst = dst.to_path_buf();

    // walkdir is synchronous
    tokio::task::spawn_blocking(move || {
        for entry in WalkDir::new(&src) {
            let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
            let relative = entry
                .path()
                .strip_prefix(&src)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            let target = dst.join(relative);

            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target)?;
            } else {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(entry.path(), &target)?;
            }
        }
        Ok::<(), AppError>(())
    })
    .await
    .map_err(|e| AppError::Io(std::io::Error::other(e)))??;

    Ok(())
}

/// Write generated source into the working copy, returning its path
pub async fn write_source(working_dir: &Path, relative: &str, contents: &str) -> AppResult<PathBuf> {
    let path = working_dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(&path, contents).await?;
    Ok(path)
}

/// Copy `artifact` into `dest_dir` as `file_name`, creating the directory
pub async fn publish_artifact(artifact: &Path, dest_dir: &Path, file_name: &str) -> AppResult<PathBuf> {
    fs::create_dir_all(dest_dir).await?;
    let dest = dest_dir.join(file_name);
    fs::copy(artifact, &dest).await.map_err(|e| {
        AppError::Io(std::io::Error::new(
            e.kind(),
            format!(
                "failed to copy {} to {}: {}",
                artifact.display(),
                dest.display(),
                e
            ),
        ))
    })?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn template_project(root: &Path) -> PathBuf {
        let template = root.join("rust-code");
        fs::create_dir_all(template.join("src")).await.unwrap();
        fs::write(template.join("Cargo.toml"), "[package]\nname = \"sha1\"\n")
            .await
            .unwrap();
        fs::write(template.join("src/bench.rs"), "{{input}}").await.unwrap();
        template
    }

    #[tokio::test]
    async fn test_prepare_copies_template() {
        let tmp = tempfile::tempdir().unwrap();
        let template = template_project(tmp.path()).await;
        let working = tmp.path().join("rust-code-filled");

        prepare_working_copy(&template, &working).await.unwrap();

        assert!(working.join("Cargo.toml").is_file());
        assert_eq!(
            fs::read_to_string(working.join("src/bench.rs")).await.unwrap(),
            "{{input}}"
        );
    }

    #[tokio::test]
    async fn test_regeneration_leaves_nothing_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let template = template_project(tmp.path()).await;
        let working = tmp.path().join("rust-code-filled");

        prepare_working_copy(&template, &working).await.unwrap();
        write_source(&working, "src/bench.rs", "first input").await.unwrap();
        fs::create_dir_all(working.join("target/release")).await.unwrap();
        fs::write(working.join("target/release/sha1_native"), b"old binary")
            .await
            .unwrap();

        prepare_working_copy(&template, &working).await.unwrap();
        write_source(&working, "src/bench.rs", "second input").await.unwrap();

        assert!(!working.join("target").exists());
        assert_eq!(
            fs::read_to_string(working.join("src/bench.rs")).await.unwrap(),
            "second input"
        );
    }

    #[tokio::test]
    async fn test_missing_template_project() {
        let tmp = tempfile::tempdir().unwrap();
        let result = prepare_working_copy(&tmp.path().join("nope"), &tmp.path().join("out")).await;
        assert!(matches!(result, Err(AppError::Template(_))));
    }

    #[tokio::test]
    async fn test_publish_artifact_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let artifact = tmp.path().join("sha1_wasm.wasm");
        fs::write(&artifact, b"\0asm").await.unwrap();

        let dest = publish_artifact(&artifact, &tmp.path().join("wasm/out"), "sha1-8bit.wasm")
            .await
            .unwrap();
        assert_eq!(dest, tmp.path().join("wasm/out/sha1-8bit.wasm"));
        assert_eq!(fs::read(dest).await.unwrap(), b"\0asm");
    }
}
