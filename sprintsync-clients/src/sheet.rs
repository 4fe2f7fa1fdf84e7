//! Spreadsheet CSV download.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("sheet CSV url is required")]
    MissingUrl,

    #[error("sheet download from {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("sheet download from {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Anything that can hand over the exported sheet as CSV text.
#[async_trait]
pub trait SheetSource: Send + Sync {
    async fn fetch_csv(&self) -> Result<String, SourceError>;
}

/// Downloads a published CSV export over HTTP GET.
#[derive(Clone)]
pub struct HttpSheetSource {
    url: String,
    client: Client,
}

impl HttpSheetSource {
    pub fn new(url: impl Into<String>) -> Result<Self, SourceError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(SourceError::MissingUrl);
        }
        let client = Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|source| SourceError::Transport {
                url: url.clone(),
                source,
            })?;
        Ok(Self { url, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SheetSource for HttpSheetSource {
    async fn fetch_csv(&self) -> Result<String, SourceError> {
        let transport = |source| SourceError::Transport {
            url: self.url.clone(),
            source,
        };
        let response = self.client.get(&self.url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(transport)
    }
}
