//! Bounded archive download, extraction, and module packing.

use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

use elysium_core::{ElysiumError, Result};

/// Bytes checked against the size limit per write.
const COPY_CHUNK_SIZE: usize = 1024;

/// An extracted repository archive.
///
/// Holds its temp directory; dropping the value removes everything on any
/// exit path, including errors and panics.
#[derive(Debug)]
pub struct FetchedRepository {
    _temp: TempDir,
    root: PathBuf,
}

impl FetchedRepository {
    /// The repository root inside the extraction directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// The directory to package as the configuration: the repository root
    /// or the link's module directory beneath it.
    pub fn module_path(&self, module_directory: Option<&str>) -> Result<PathBuf> {
        let path = match module_directory {
            Some(dir) if !dir.is_empty() => self.root.join(dir),
            _ => self.root.clone(),
        };
        if !path.is_dir() {
            return Err(ElysiumError::Internal(format!(
                "module directory {} does not exist in the repository",
                module_directory.unwrap_or("")
            )));
        }
        Ok(path)
    }
}

/// Streams a tar.gz archive response into a temp file, enforcing the byte
/// limit mid-stream, then extracts it.
///
/// Hosts prefix the archive with a single `{owner}-{repo}-{sha}/` directory;
/// that directory becomes the repository root.
pub async fn fetch_repository(
    mut response: reqwest::Response,
    size_limit: u64,
) -> Result<FetchedRepository> {
    let temp = TempDir::new()?;
    let archive_path = temp.path().join("archive.tar.gz");

    let mut file = tokio::fs::File::create(&archive_path).await?;
    let mut total: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| ElysiumError::ProviderRequest(format!("Archive download failed: {}", e)))?
    {
        for part in chunk.chunks(COPY_CHUNK_SIZE) {
            total += part.len() as u64;
            if total > size_limit {
                return Err(ElysiumError::Internal(format!(
                    "download size {} exceeds limit {}",
                    total, size_limit
                )));
            }
            file.write_all(part).await?;
        }
    }
    file.flush().await?;

    let extract_dir = temp.path().join("repo");
    tokio::fs::create_dir(&extract_dir).await?;

    let unpack_archive = archive_path.clone();
    let unpack_dir = extract_dir.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = std::fs::File::open(&unpack_archive)?;
        let gz = GzDecoder::new(file);
        let mut archive = tar::Archive::new(gz);
        archive.unpack(&unpack_dir)?;
        Ok(())
    })
    .await
    .map_err(|e| ElysiumError::Internal(format!("Archive extraction task failed: {}", e)))??;

    let root = find_repository_root(&extract_dir).await?;

    Ok(FetchedRepository { _temp: temp, root })
}

/// Locates the single top-level directory of the extraction.
async fn find_repository_root(extract_dir: &Path) -> Result<PathBuf> {
    let mut entries = tokio::fs::read_dir(extract_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            return Ok(entry.path());
        }
    }
    Err(ElysiumError::Internal(
        "decompressed archive is empty".to_string(),
    ))
}

/// Packages a module directory as a tar.gz for configuration upload.
pub async fn pack_module(module_dir: &Path) -> Result<Vec<u8>> {
    let dir = module_dir.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all(".", &dir)?;
        let encoder = builder
            .into_inner()
            .map_err(|e| ElysiumError::Internal(format!("Failed to finish module tar: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| ElysiumError::Internal(format!("Failed to finish module gzip: {}", e)))
    })
    .await
    .map_err(|e| ElysiumError::Internal(format!("Module packing task failed: {}", e)))?
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Builds an in-memory tar.gz shaped like a host archive: one top-level
    /// `{owner}-{repo}-{sha}` directory containing the given files.
    pub(crate) fn build_archive(top_level: &str, files: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, contents) in files {
            let path = format!("{}/{}", top_level, name);
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    async fn serve_archive(body: Vec<u8>) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/archive"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_fetch_repository_finds_root() {
        let body = build_archive("owner-repo-deadbeef", &[("main.tf", "resource {}\n")]);
        let server = serve_archive(body).await;

        let response = reqwest::get(format!("{}/archive", server.uri())).await.unwrap();
        let repo = fetch_repository(response, 1024 * 1024).await.unwrap();

        assert!(repo.path().ends_with("owner-repo-deadbeef"));
        assert!(repo.path().join("main.tf").is_file());
    }

    #[tokio::test]
    async fn test_fetch_repository_enforces_size_limit() {
        let body = vec![0u8; 2048];
        let server = serve_archive(body).await;

        let response = reqwest::get(format!("{}/archive", server.uri())).await.unwrap();
        let err = fetch_repository(response, 1024).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("exceeds"), "unexpected error: {}", message);
    }

    #[tokio::test]
    async fn test_temp_directory_removed_after_drop() {
        let body = build_archive("repo-root-abc", &[("main.tf", "")]);
        let server = serve_archive(body).await;

        let response = reqwest::get(format!("{}/archive", server.uri())).await.unwrap();
        let repo = fetch_repository(response, 1024 * 1024).await.unwrap();
        let root = repo.path().to_path_buf();
        assert!(root.exists());

        drop(repo);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_module_path_validates_subdirectory() {
        let body = build_archive(
            "repo-root-abc",
            &[("modules/network/main.tf", "resource {}\n")],
        );
        let server = serve_archive(body).await;

        let response = reqwest::get(format!("{}/archive", server.uri())).await.unwrap();
        let repo = fetch_repository(response, 1024 * 1024).await.unwrap();

        assert!(repo.module_path(Some("modules/network")).is_ok());
        assert!(repo.module_path(Some("missing")).is_err());
        assert_eq!(repo.module_path(None).unwrap(), repo.path());
    }

    #[tokio::test]
    async fn test_pack_module_round_trips() {
        let body = build_archive("repo-root-abc", &[("main.tf", "resource {}\n")]);
        let server = serve_archive(body).await;
        let response = reqwest::get(format!("{}/archive", server.uri())).await.unwrap();
        let repo = fetch_repository(response, 1024 * 1024).await.unwrap();

        let data = pack_module(repo.path()).await.unwrap();
        assert!(!data.is_empty());

        let gz = GzDecoder::new(std::io::Cursor::new(data));
        let mut archive = tar::Archive::new(gz);
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.ends_with("main.tf")));
    }
}
