//! Concurrent download of manifest files into a file store.
//!
//! The engine fails fast: the first failure in any worker cancels the rest
//! and aborts the download phase. No cleanup is performed on failure;
//! partial results may be left behind for some of the URLs.

use std::collections::HashMap;
use std::sync::Arc;

use futures::TryStreamExt as _;
use octofhir_filestore::FileHandle;
use reqwest::header::AUTHORIZATION;
use tokio::task::JoinSet;
use tokio_util::io::StreamReader;
use url::Url;

use crate::auth::TokenProvider;
use crate::error::BulkExportError;
use crate::protocol::BulkExportManifest;
use crate::timeout::Deadline;

/// A single entry in the list of URLs to download.
pub struct DownloadEntry {
    /// The source URL to download from.
    pub source: Url,
    /// The destination file to write the downloaded content to.
    pub destination: Box<dyn FileHandle>,
}

impl std::fmt::Debug for DownloadEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEntry")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Expands a completion manifest into download entries under the
/// destination directory.
///
/// Destinations are named `<Type>.<NNNN>.<extension>` with a zero-padded
/// four-digit counter per resource type, numbered in manifest order.
///
/// # Errors
///
/// Returns a protocol error if a manifest URL cannot be parsed.
pub fn output_entries(
    manifest: &BulkExportManifest,
    destination_dir: &dyn FileHandle,
    extension: &str,
) -> Result<Vec<DownloadEntry>, BulkExportError> {
    let mut counters: HashMap<&str, usize> = HashMap::new();
    manifest
        .output
        .iter()
        .map(|item| {
            let source = Url::parse(&item.url).map_err(|e| {
                BulkExportError::protocol(format!("invalid download URL '{}': {e}", item.url))
            })?;
            let index = counters.entry(item.resource_type.as_str()).or_insert(0);
            let name = file_name(&item.resource_type, *index, extension);
            *index += 1;
            Ok(DownloadEntry {
                source,
                destination: destination_dir.child(&name),
            })
        })
        .collect()
}

fn file_name(resource_type: &str, chunk: usize, extension: &str) -> String {
    format!("{resource_type}.{chunk:04}.{extension}")
}

/// Downloads a set of URLs concurrently into their destinations.
pub struct UrlDownloader {
    http: reqwest::Client,
    token_provider: Option<Arc<TokenProvider>>,
    max_concurrent_downloads: usize,
}

impl UrlDownloader {
    /// Creates a downloader with the given worker-pool width.
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        token_provider: Option<Arc<TokenProvider>>,
        max_concurrent_downloads: usize,
    ) -> Self {
        Self {
            http,
            token_provider,
            max_concurrent_downloads: max_concurrent_downloads.max(1),
        }
    }

    /// Downloads all entries, honoring the remaining deadline.
    ///
    /// Returns the byte count written for each entry, in input order
    /// irrespective of completion order.
    ///
    /// # Errors
    ///
    /// Returns a `Download` error wrapping the first worker failure, or
    /// `Timeout` when the deadline expires; remaining workers are cancelled
    /// in both cases.
    pub async fn download(
        &self,
        entries: Vec<DownloadEntry>,
        deadline: Deadline,
    ) -> Result<Vec<u64>, BulkExportError> {
        let total = entries.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.max_concurrent_downloads));
        let mut workers: JoinSet<(usize, Result<u64, BulkExportError>)> = JoinSet::new();
        for (index, entry) in entries.into_iter().enumerate() {
            let http = self.http.clone();
            let provider = self.token_provider.clone();
            let semaphore = Arc::clone(&semaphore);
            workers.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return (
                            index,
                            Err(BulkExportError::system("download pool closed", e)),
                        );
                    }
                };
                (index, download_one(&http, provider.as_deref(), &entry).await)
            });
        }

        let expiry = async {
            match deadline.at() {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expiry);

        let mut sizes: Vec<Option<u64>> = vec![None; total];
        loop {
            tokio::select! {
                joined = workers.join_next() => match joined {
                    None => break,
                    Some(Ok((index, Ok(size)))) => sizes[index] = Some(size),
                    Some(Ok((_, Err(err)))) => {
                        tracing::error!("Cancelling downloads because of: {}", err);
                        workers.abort_all();
                        return Err(BulkExportError::download(err));
                    }
                    Some(Err(join_err)) if join_err.is_cancelled() => {}
                    Some(Err(join_err)) => {
                        workers.abort_all();
                        return Err(BulkExportError::system("download worker failed", join_err));
                    }
                },
                () = &mut expiry => {
                    tracing::error!(
                        "Cancelling downloads: time limit {:?} exceeded",
                        deadline.limit()
                    );
                    workers.abort_all();
                    return Err(BulkExportError::timeout(deadline.limit()));
                }
            }
        }

        sizes
            .into_iter()
            .map(|size| {
                size.ok_or_else(|| {
                    BulkExportError::system_message("download finished without a recorded size")
                })
            })
            .collect()
    }
}

/// Downloads one URL into its destination, streaming the body.
async fn download_one(
    http: &reqwest::Client,
    token_provider: Option<&TokenProvider>,
    entry: &DownloadEntry,
) -> Result<u64, BulkExportError> {
    tracing::debug!(
        "Starting download from: {} to: {}",
        entry.source,
        entry.destination.location()
    );

    let mut request = http.get(entry.source.clone());
    if let Some(provider) = token_provider
        && provider.applies_to(&entry.source)
    {
        let token = provider.bearer_token().await?;
        request = request.header(AUTHORIZATION, format!("Bearer {token}"));
    }

    let response = request.send().await.map_err(|e| {
        BulkExportError::system(format!("failed to download {}", entry.source), e)
    })?;
    let status = response.status();
    if status.as_u16() != 200 {
        tracing::error!("Failed to download: {}. Status: {}", entry.source, status);
        return Err(BulkExportError::http(
            format!("failed to download {}", entry.source),
            status.as_u16(),
        ));
    }

    let stream = response.bytes_stream().map_err(std::io::Error::other);
    let mut reader = StreamReader::new(Box::pin(stream));
    let written = entry.destination.write_all(&mut reader).await?;
    tracing::debug!(
        "Downloaded {} bytes from: {} to: {}",
        written,
        entry.source,
        entry.destination.location()
    );
    Ok(written)
}
