//! Source image downloads.
//!
//! Every request downloads into its own scratch directory under the
//! configured download root. The directory is removed when the
//! [`tempfile::TempDir`] drops, including when the request future is
//! cancelled by a timeout or a disconnecting client.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::{Error, Result};

use super::ImageSource;

/// Create a fresh scratch directory for one request under `root`.
///
/// # Errors
///
/// Returns an error if `root` or the scratch directory cannot be created.
pub fn request_dir(root: &Path) -> Result<TempDir> {
    std::fs::create_dir_all(root).map_err(|source| Error::CacheDir {
        path: root.to_path_buf(),
        source,
    })?;

    tempfile::Builder::new()
        .prefix("request-")
        .tempdir_in(root)
        .map_err(|source| Error::CacheDir {
            path: root.to_path_buf(),
            source,
        })
}

/// Delete a request's scratch directory, or keep it on disk when `keep` is
/// set.
pub(super) fn release_request_dir(dir: TempDir, keep: bool) {
    if keep {
        let path = dir.keep();
        tracing::debug!("Keeping downloads in {}", path.display());
    } else if let Err(e) = dir.close() {
        tracing::warn!("Failed to remove downloads: {e}");
    }
}

/// Pick the local file name for a download.
///
/// An explicit `file_name` is used as is; otherwise the URL's last path
/// segment.
///
/// # Errors
///
/// Returns an error if the URL does not parse or the name could escape the
/// download directory.
pub fn file_name_for(source: &ImageSource) -> Result<String> {
    let name = match &source.file_name {
        Some(name) => name.clone(),
        None => {
            let url = Url::parse(&source.url)
                .map_err(|e| Error::invalid_parameter("url", format!("{}: {e}", source.url)))?;
            url.path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|s| !s.is_empty())
                .unwrap_or("image")
                .to_string()
        }
    };

    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0')
    {
        return Err(Error::invalid_parameter(
            "file_name",
            format!("{name:?} is not a plain file name"),
        ));
    }

    Ok(name)
}

/// Download `source` to `dir/<role>/<file name>`.
///
/// Each role gets its own subdirectory, so a content and a style image with
/// the same name never share a path. The body is streamed to a `.part` file
/// and renamed into place once complete; more than `max_bytes` aborts the
/// download.
///
/// # Errors
///
/// Returns an error if the request fails, the server answers with a
/// non-success status, the body is too large, or the file cannot be written.
pub async fn fetch_image(
    client: &reqwest::Client,
    source: &ImageSource,
    role: &str,
    dir: &Path,
    max_bytes: u64,
) -> Result<PathBuf> {
    let role_dir = dir.join(role);
    let path = role_dir.join(file_name_for(source)?);

    tracing::info!("Fetching {role} image from {}", source.url);

    let fetch_err = |reason: String| Error::Fetch {
        url: source.url.clone(),
        reason,
    };
    let too_large = || {
        Error::invalid_parameter(
            "url",
            format!("{} is larger than {max_bytes} bytes", source.url),
        )
    };

    let mut response = client
        .get(&source.url)
        .send()
        .await
        .map_err(|e| fetch_err(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(fetch_err(format!("HTTP {status}")));
    }
    if response.content_length().is_some_and(|len| len > max_bytes) {
        return Err(too_large());
    }

    tokio::fs::create_dir_all(&role_dir)
        .await
        .map_err(|source| Error::CacheDir {
            path: role_dir.clone(),
            source,
        })?;

    let part_path = path.with_extension("part");
    let mut file = tokio::fs::File::create(&part_path).await?;
    let mut written = 0u64;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| fetch_err(e.to_string()))?
    {
        written += chunk.len() as u64;
        if written > max_bytes {
            drop(file);
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(too_large());
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&part_path, &path).await?;

    tracing::debug!("Saved {written} bytes to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(url: &str, file_name: Option<&str>) -> ImageSource {
        ImageSource {
            url: url.to_string(),
            file_name: file_name.map(str::to_string),
        }
    }

    #[test]
    fn test_explicit_file_name_wins() {
        let src = source("https://example.com/a/b.jpg", Some("mine.png"));
        assert_eq!(file_name_for(&src).unwrap(), "mine.png");
    }

    #[test]
    fn test_derives_name_from_url() {
        let src = source("https://example.com/a/b.jpg?size=large", None);
        assert_eq!(file_name_for(&src).unwrap(), "b.jpg");
    }

    #[test]
    fn test_falls_back_when_url_has_no_segment() {
        let src = source("https://example.com/", None);
        assert_eq!(file_name_for(&src).unwrap(), "image");
    }

    #[test]
    fn test_rejects_path_traversal() {
        for bad in ["../etc/passwd", "a/b.jpg", "..", "a\\b", ""] {
            let src = source("https://example.com/x.jpg", Some(bad));
            let err = file_name_for(&src).unwrap_err();
            assert!(matches!(err, Error::InvalidParameter { .. }), "{bad:?}");
        }
    }

    #[test]
    fn test_rejects_unparseable_url() {
        let src = source("not a url", None);
        assert!(file_name_for(&src).is_err());
    }

    #[test]
    fn test_request_dirs_are_distinct_and_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();

        let first = request_dir(root.path()).unwrap();
        let second = request_dir(root.path()).unwrap();
        assert_ne!(first.path(), second.path());

        let first_path = first.path().to_path_buf();
        std::fs::write(first_path.join("content.png"), b"x").unwrap();
        drop(first);

        assert!(!first_path.exists());
        assert!(second.path().exists());
    }

    #[test]
    fn test_release_keeps_or_removes() {
        let root = tempfile::tempdir().unwrap();

        let kept = request_dir(root.path()).unwrap();
        let kept_path = kept.path().to_path_buf();
        release_request_dir(kept, true);
        assert!(kept_path.exists());

        let removed = request_dir(root.path()).unwrap();
        let removed_path = removed.path().to_path_buf();
        release_request_dir(removed, false);
        assert!(!removed_path.exists());
    }
}
