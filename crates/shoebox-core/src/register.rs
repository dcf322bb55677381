//! Media-item creation.
//!
//! An upload token is only useful once it is exchanged for a media item in
//! the library. [`MediaRegistrar`] performs that exchange, one item per call.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// A media item created from an upload token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    /// Library identifier of the item
    pub id: String,
    /// Link to the item in the library web UI
    #[serde(default)]
    pub product_url: Option<String>,
}

/// Creates media items from upload tokens.
pub struct MediaRegistrar {
    client: Client,
    endpoint: String,
    access_token: String,
}

impl MediaRegistrar {
    /// Create a registrar for the batch-create `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("shoebox/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            access_token: access_token.into(),
        })
    }

    /// Create one media item from `upload_token`.
    ///
    /// The token is consumed by the server; call this once per token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegistrationFailed`] if the request fails, the server
    /// rejects the item or the response names no item.
    pub async fn create_media_item(
        &self,
        upload_token: &str,
        file_name: &str,
        album_id: Option<&str>,
        description: Option<&str>,
    ) -> Result<MediaItem> {
        let request = BatchCreateRequest {
            album_id,
            new_media_items: vec![NewMediaItem {
                description,
                simple_media_item: SimpleMediaItem {
                    upload_token,
                    file_name,
                },
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::RegistrationFailed(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::RegistrationFailed(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Error::RegistrationFailed(format!(
                "server answered HTTP {}",
                status.as_u16()
            )));
        }

        let item = parse_batch_response(&body)?;
        tracing::info!(file = file_name, media_item = %item.id, "Created media item");
        Ok(item)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchCreateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    album_id: Option<&'a str>,
    new_media_items: Vec<NewMediaItem<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewMediaItem<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    simple_media_item: SimpleMediaItem<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SimpleMediaItem<'a> {
    upload_token: &'a str,
    file_name: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchCreateResponse {
    #[serde(default)]
    new_media_item_results: Vec<MediaItemResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaItemResult {
    #[serde(default)]
    status: Option<ItemStatus>,
    #[serde(default)]
    media_item: Option<MediaItem>,
}

#[derive(Debug, Deserialize)]
struct ItemStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

fn parse_batch_response(body: &str) -> Result<MediaItem> {
    let response: BatchCreateResponse = serde_json::from_str(body)
        .map_err(|e| Error::RegistrationFailed(format!("malformed response: {e}")))?;

    let result = response
        .new_media_item_results
        .into_iter()
        .next()
        .ok_or_else(|| Error::RegistrationFailed("response contained no results".to_string()))?;

    if let Some(status) = result.status.as_ref().filter(|s| s.code != 0) {
        return Err(Error::RegistrationFailed(format!(
            "item rejected ({}): {}",
            status.code, status.message
        )));
    }

    result
        .media_item
        .ok_or_else(|| Error::RegistrationFailed("response named no media item".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = BatchCreateRequest {
            album_id: Some("album-1"),
            new_media_items: vec![NewMediaItem {
                description: None,
                simple_media_item: SimpleMediaItem {
                    upload_token: "tok",
                    file_name: "IMG_0001.JPG",
                },
            }],
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["albumId"], "album-1");
        assert_eq!(json["newMediaItems"][0]["simpleMediaItem"]["uploadToken"], "tok");
        assert_eq!(
            json["newMediaItems"][0]["simpleMediaItem"]["fileName"],
            "IMG_0001.JPG"
        );
        assert!(json["newMediaItems"][0].get("description").is_none());
    }

    #[test]
    fn test_album_omitted_when_absent() {
        let request = BatchCreateRequest {
            album_id: None,
            new_media_items: Vec::new(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("albumId").is_none());
    }

    #[test]
    fn test_parse_created_item() {
        let body = r#"{
            "newMediaItemResults": [{
                "uploadToken": "tok",
                "status": { "message": "Success" },
                "mediaItem": { "id": "item-9", "productUrl": "https://photos/item-9" }
            }]
        }"#;

        let item = parse_batch_response(body).unwrap();
        assert_eq!(item.id, "item-9");
        assert_eq!(item.product_url.as_deref(), Some("https://photos/item-9"));
    }

    #[test]
    fn test_parse_rejected_item() {
        let body = r#"{
            "newMediaItemResults": [{
                "status": { "code": 3, "message": "Invalid upload token" }
            }]
        }"#;

        let err = parse_batch_response(body).unwrap_err();
        assert!(matches!(err, Error::RegistrationFailed(ref m) if m.contains("Invalid upload token")));
    }

    #[test]
    fn test_parse_empty_and_malformed() {
        assert!(matches!(
            parse_batch_response("{}"),
            Err(Error::RegistrationFailed(_))
        ));
        assert!(matches!(
            parse_batch_response("not json"),
            Err(Error::RegistrationFailed(_))
        ));
    }
}
