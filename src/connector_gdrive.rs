//! Google Drive source.
//!
//! Lists folder contents through the Drive v2 REST API:
//!
//! ```text
//! GET {api_base}/drive/v2/files?q='<parent id>' in parents and trashed=false
//! Authorization: Bearer $GOOGLE_DRIVE_TOKEN
//! ```
//!
//! Pages are followed via `nextPageToken`. Only items carrying a `fileSize`
//! are files; folders and native Google documents (which have no binary
//! content) are containers. A file's download reference is its
//! `webContentLink` with `&/<title>` appended, so the destination derives the
//! download file name from the last URL segment.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use synapse_sync_core::models::RemoteRecord;
use synapse_sync_core::traits::Lister;
use tracing::debug;

use crate::config::GDriveSourceConfig;

const ROOT_ID: &str = "root";
const PAGE_SIZE: &str = "1000";

pub struct DriveLister {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    items: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    title: String,
    /// Drive v2 reports sizes as decimal strings.
    file_size: Option<String>,
    web_content_link: Option<String>,
}

impl DriveFile {
    fn into_record(self) -> RemoteRecord {
        let Some(size) = self.file_size.as_deref() else {
            return RemoteRecord::container(self.id, self.title);
        };
        let size = size.parse().unwrap_or(0);
        let link = self
            .web_content_link
            .as_ref()
            .map(|link| format!("{}&/{}", link, self.title));
        let record = RemoteRecord::file(self.id, self.title, size);
        match link {
            Some(link) => record.with_download_url(link),
            None => record,
        }
    }
}

impl DriveLister {
    pub fn new(config: &GDriveSourceConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env)
            .map_err(|_| anyhow::anyhow!("{} not set", config.token_env))?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn list_children(&self, parent_id: &str) -> Result<Vec<RemoteRecord>> {
        let query = format!("'{}' in parents and trashed=false", parent_id);
        let url = format!("{}/drive/v2/files", self.api_base);
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![("q", query.as_str()), ("maxResults", PAGE_SIZE)];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .query(&params)
                .send()
                .await
                .with_context(|| format!("Drive request failed for folder {}", parent_id))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                bail!("Drive files.list failed (HTTP {}): {}", status, body);
            }

            let page: FileList = resp
                .json()
                .await
                .context("Invalid Drive response: expected a file list")?;
            records.extend(page.items.into_iter().map(DriveFile::into_record));

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(parent = %parent_id, count = records.len(), "listed drive folder");
        Ok(records)
    }
}

#[async_trait]
impl Lister for DriveLister {
    async fn list_roots(&self) -> Result<Vec<RemoteRecord>> {
        self.list_children(ROOT_ID).await
    }

    async fn list(&self, container: &RemoteRecord) -> Result<Vec<RemoteRecord>> {
        self.list_children(&container.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synapse_sync_core::models::RecordKind;

    #[test]
    fn parses_files_and_folders() {
        let page: FileList = serde_json::from_value(serde_json::json!({
            "kind": "drive#fileList",
            "nextPageToken": "abc",
            "items": [
                {
                    "id": "f1",
                    "title": "otus.biom",
                    "mimeType": "application/octet-stream",
                    "fileSize": "2048",
                    "webContentLink": "https://drive.google.com/uc?id=f1&export=download"
                },
                {
                    "id": "d1",
                    "title": "rawdata",
                    "mimeType": "application/vnd.google-apps.folder"
                },
                {
                    "id": "g1",
                    "title": "notes",
                    "mimeType": "application/vnd.google-apps.document"
                }
            ]
        }))
        .unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));

        let records: Vec<RemoteRecord> =
            page.items.into_iter().map(DriveFile::into_record).collect();
        assert_eq!(records[0].kind, RecordKind::File);
        assert_eq!(records[0].size, Some(2048));
        assert_eq!(
            records[0].download_url.as_deref(),
            Some("https://drive.google.com/uc?id=f1&export=download&/otus.biom")
        );
        assert_eq!(records[1].kind, RecordKind::Container);
        assert_eq!(records[1].title, "rawdata");
        // Native Docs have no fileSize and no binary content.
        assert_eq!(records[2].kind, RecordKind::Container);
        assert_eq!(records[2].size, None);
        assert_eq!(records[2].download_url, None);
    }

    #[test]
    fn empty_page_has_no_items() {
        let page: FileList = serde_json::from_str("{}").unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn missing_token_is_an_error() {
        let config = GDriveSourceConfig {
            api_base: "http://localhost".into(),
            token_env: "SSYNC_TEST_UNSET_DRIVE_TOKEN".into(),
        };
        let err = DriveLister::new(&config).err().unwrap();
        assert!(err.to_string().contains("SSYNC_TEST_UNSET_DRIVE_TOKEN"));
    }
}
