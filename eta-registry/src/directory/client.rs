//! Remote dataset source.

use futures::future::BoxFuture;

use super::error::DirectoryError;
use super::sheet::DataSheet;

/// Where the published dataset comes from.
///
/// The loader only needs a version string (cheap freshness probe) and the
/// full sheet. Implementations: [`HttpDirectorySource`] in production, the
/// scripted source in [`super::mock`] for tests.
pub trait DirectorySource: Send + Sync {
    /// Fetch the current remote dataset version (an opaque checksum/etag).
    fn fetch_version(&self) -> BoxFuture<'_, Result<String, DirectoryError>>;

    /// Fetch and deserialize the full dataset.
    fn fetch_sheet(&self) -> BoxFuture<'_, Result<DataSheet, DirectoryError>>;
}

/// Configuration for the HTTP dataset source.
#[derive(Debug, Clone)]
pub struct DirectorySourceConfig {
    /// Base URL serving `checksum.md5` and `data_sheet.json`.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl DirectorySourceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: 60,
        }
    }

    /// Set a custom timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP dataset source.
#[derive(Debug, Clone)]
pub struct HttpDirectorySource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDirectorySource {
    pub fn new(config: DirectorySourceConfig) -> Result<Self, DirectoryError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url,
        })
    }

    async fn get_text(&self, url: String) -> Result<String, DirectoryError> {
        let response = self.http.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Upstream {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(response.text().await?)
    }
}

impl DirectorySource for HttpDirectorySource {
    fn fetch_version(&self) -> BoxFuture<'_, Result<String, DirectoryError>> {
        Box::pin(async move {
            let url = format!("{}/checksum.md5", self.base_url);
            Ok(self.get_text(url).await?.trim().to_string())
        })
    }

    fn fetch_sheet(&self) -> BoxFuture<'_, Result<DataSheet, DirectoryError>> {
        Box::pin(async move {
            let url = format!("{}/data_sheet.json", self.base_url);
            let body = self.get_text(url).await?;

            let sheet: DataSheet = serde_json::from_str(&body)
                .map_err(|e| DirectoryError::Malformed(e.to_string()))?;

            Ok(sheet)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = DirectorySourceConfig::new("http://localhost:8080/data");
        assert_eq!(config.base_url, "http://localhost:8080/data");
        assert_eq!(config.timeout_secs, 60);
    }

    #[test]
    fn config_builder() {
        let config = DirectorySourceConfig::new("http://localhost:8080/data").with_timeout(5);
        assert_eq!(config.timeout_secs, 5);
    }

    #[test]
    fn client_creation() {
        let config = DirectorySourceConfig::new("http://localhost:8080/data");
        assert!(HttpDirectorySource::new(config).is_ok());
    }
}
