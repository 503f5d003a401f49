//! Batch processing: run many documents through one client.
//!
//! A thin consumer of [`OcrClient`]: documents fan out with bounded
//! concurrency, each gets a small number of whole-document retries, and
//! failures are isolated per document — one bad file must not sink a batch
//! of hundreds. Contrast with the page pipeline inside a single document,
//! where any page failure fails that document.

use crate::client::{OcrClient, ParseOptions};
use crate::error::OcrError;
use crate::prompts::OcrMode;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Delay between whole-document retry attempts.
const RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Result of processing a single document in a batch.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Path of the processed file.
    pub file_path: PathBuf,
    /// Extracted text, if processing succeeded.
    pub text: Option<String>,
    /// Error message, if processing failed after all retries.
    pub error: Option<String>,
    /// OCR mode the batch ran with.
    pub mode_used: OcrMode,
}

impl BatchResult {
    /// Whether this document was processed successfully.
    pub fn succeeded(&self) -> bool {
        self.text.is_some()
    }
}

/// Summary of a batch run.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<BatchResult>,
}

impl BatchSummary {
    /// Human-readable report, listing failed documents when any exist.
    pub fn report(&self) -> String {
        let mut out = format!(
            "Batch complete: {}/{} documents succeeded, {} failed\n",
            self.successful, self.total, self.failed
        );
        if self.failed > 0 {
            out.push_str("Failed documents:\n");
            for result in self.results.iter().filter(|r| !r.succeeded()) {
                out.push_str(&format!(
                    "  - {}: {}\n",
                    result.file_path.display(),
                    result.error.as_deref().unwrap_or("unknown error")
                ));
            }
        }
        out
    }
}

/// Processes multiple documents with bounded concurrency and per-document
/// retry.
///
/// # Example
/// ```rust,no_run
/// use pagelens::{BatchProcessor, OcrClient, OcrConfig, OcrMode};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Arc::new(OcrClient::from_env()?);
///     let processor = BatchProcessor::new(client, 3, 1);
///     let files = vec!["a.pdf".into(), "b.pdf".into()];
///     let summary = processor.process_batch(&files, OcrMode::FreeOcr).await;
///     print!("{}", summary.report());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct BatchProcessor {
    client: Arc<OcrClient>,
    max_concurrent: usize,
    retry_count: u32,
}

impl BatchProcessor {
    /// * `max_concurrent` — documents in flight at once (minimum 1).
    /// * `retry_count` — whole-document retries after the first attempt.
    pub fn new(client: Arc<OcrClient>, max_concurrent: usize, retry_count: u32) -> Self {
        Self {
            client,
            max_concurrent: max_concurrent.max(1),
            retry_count,
        }
    }

    /// Process every file, collecting per-document outcomes.
    ///
    /// Results are returned in input order. Failures are captured in the
    /// corresponding [`BatchResult`], never propagated.
    pub async fn process_batch(&self, file_paths: &[PathBuf], mode: OcrMode) -> BatchSummary {
        if file_paths.is_empty() {
            return BatchSummary {
                total: 0,
                successful: 0,
                failed: 0,
                results: Vec::new(),
            };
        }

        let results: Vec<BatchResult> =
            stream::iter(file_paths.iter().map(|path| self.process_single(path, mode)))
                .buffered(self.max_concurrent)
                .collect()
                .await;

        let successful = results.iter().filter(|r| r.succeeded()).count();
        BatchSummary {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }

    /// Synchronous wrapper around [`BatchProcessor::process_batch`].
    pub fn process_batch_sync(
        &self,
        file_paths: &[PathBuf],
        mode: OcrMode,
    ) -> Result<BatchSummary, OcrError> {
        Ok(tokio::runtime::Runtime::new()
            .map_err(|e| OcrError::Internal(format!("Failed to create tokio runtime: {e}")))?
            .block_on(self.process_batch(file_paths, mode)))
    }

    /// Process one document with retry; errors become part of the result.
    async fn process_single(&self, path: &Path, mode: OcrMode) -> BatchResult {
        let mut last_error = None;

        for attempt in 0..=self.retry_count {
            match self
                .client
                .parse(path, ParseOptions::with_mode(mode))
                .await
            {
                Ok(text) => {
                    return BatchResult {
                        file_path: path.to_path_buf(),
                        text: Some(text),
                        error: None,
                        mode_used: mode,
                    };
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                    if attempt < self.retry_count {
                        warn!(
                            "Attempt {} failed for {}, retrying: {}",
                            attempt + 1,
                            path.display(),
                            last_error.as_deref().unwrap_or_default()
                        );
                        tokio::time::sleep(RETRY_PAUSE).await;
                    } else {
                        error!(
                            "All attempts failed for {}: {}",
                            path.display(),
                            last_error.as_deref().unwrap_or_default()
                        );
                    }
                }
            }
        }

        BatchResult {
            file_path: path.to_path_buf(),
            text: None,
            error: last_error,
            mode_used: mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OcrConfig;

    fn test_processor(retry_count: u32) -> BatchProcessor {
        let client = Arc::new(
            OcrClient::new(
                OcrConfig::builder()
                    .api_key("test_key")
                    .base_url("http://test.invalid")
                    .build()
                    .unwrap(),
            )
            .unwrap(),
        );
        BatchProcessor::new(client, 2, retry_count)
    }

    #[tokio::test]
    async fn empty_batch_yields_empty_summary() {
        let summary = test_processor(0).process_batch(&[], OcrMode::FreeOcr).await;
        assert_eq!(summary.total, 0);
        assert_eq!(summary.successful, 0);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn missing_files_are_isolated_failures() {
        let files = vec![PathBuf::from("/nope/a.pdf"), PathBuf::from("/nope/b.pdf")];
        let summary = test_processor(0)
            .process_batch(&files, OcrMode::FreeOcr)
            .await;

        assert_eq!(summary.total, 2);
        assert_eq!(summary.failed, 2);
        // Results stay in input order with captured errors.
        assert_eq!(summary.results[0].file_path, files[0]);
        assert!(summary.results[0].error.as_deref().unwrap().contains("not found"));
        assert!(summary.report().contains("a.pdf"));
    }
}
