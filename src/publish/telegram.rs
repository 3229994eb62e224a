//! Telegram Bot API publisher (`sendVideo`)

use super::Publisher;
use crate::config::TelegramConfig;
use crate::error::{Error, Result};
use crate::types::{MessageId, VideoUpload};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// Posts videos to one chat via `sendVideo`
#[derive(Clone)]
pub struct TelegramPublisher {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

// Hand-written so the bot token (part of the endpoint) never ends up in logs.
impl std::fmt::Debug for TelegramPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramPublisher")
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    result: Option<SentMessage>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

impl TelegramPublisher {
    /// Create a publisher with its own HTTP client using the configured timeout
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Upload(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    /// Create a publisher around an existing HTTP client
    pub fn with_client(client: reqwest::Client, config: &TelegramConfig) -> Self {
        let endpoint = format!(
            "{}/bot{}/sendVideo",
            config.api_url.as_str().trim_end_matches('/'),
            config.bot_token
        );
        Self {
            client,
            endpoint,
            chat_id: config.destination_chat_id.clone(),
        }
    }

    async fn build_form(&self, upload: VideoUpload) -> Result<Form> {
        let info = upload.info;
        let file = tokio::fs::File::open(&info.path).await?;
        let length = file.metadata().await?.len();
        let file_name = info
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video.mp4".to_string());

        let video = Part::stream_with_length(file, length)
            .file_name(file_name)
            .mime_str("video/mp4")?;

        let mut form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .part("video", video)
            .text("width", info.width.to_string())
            .text("height", info.height.to_string())
            .text("duration", info.duration_secs.to_string())
            .text("supports_streaming", "true");

        if let Some(caption) = upload.caption {
            form = form.text("caption", caption);
        }
        if let Some(thumbnail) = upload.thumbnail {
            let thumbnail = Part::stream(thumbnail)
                .file_name("thumbnail.jpg")
                .mime_str("image/jpeg")?;
            form = form.part("thumbnail", thumbnail);
        }

        Ok(form)
    }

    async fn send(&self, form: Form) -> Result<MessageId> {
        let response = self.client.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        match serde_json::from_slice::<ApiResponse>(&body) {
            Ok(ApiResponse {
                ok: true,
                result: Some(message),
                ..
            }) => Ok(MessageId(message.message_id)),
            Ok(ApiResponse { description, .. }) => Err(Error::Upload(description.unwrap_or_else(
                || format!("sendVideo failed with HTTP {status}"),
            ))),
            Err(_) if !status.is_success() => {
                Err(Error::Upload(format!("sendVideo failed with HTTP {status}")))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Publisher for TelegramPublisher {
    async fn publish(&self, upload: VideoUpload, cancel: &CancellationToken) -> Result<MessageId> {
        tracing::debug!(
            chat_id = %self.chat_id,
            path = %upload.info.path.display(),
            "Uploading video"
        );

        let request = async {
            let form = self.build_form(upload).await?;
            self.send(form).await
        };

        let message_id = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            sent = request => sent?,
        };

        tracing::debug!(message_id = message_id.get(), "Video uploaded");
        Ok(message_id)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VideoInfo;
    use bytes::Bytes;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use url::Url;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> TelegramConfig {
        TelegramConfig {
            bot_token: "123:abc".to_string(),
            destination_chat_id: "-100200300".to_string(),
            api_url: Url::parse(&server.uri()).unwrap(),
            ..Default::default()
        }
    }

    fn upload(dir: &TempDir) -> VideoUpload {
        let path = dir.path().join("video-abc.mp4");
        std::fs::write(&path, b"not really an mp4").unwrap();
        VideoUpload {
            info: VideoInfo {
                path,
                width: 1280,
                height: 720,
                duration_secs: 95,
            },
            caption: Some("Episode 1".to_string()),
            thumbnail: Some(Bytes::from_static(b"jpeg bytes")),
        }
    }

    #[tokio::test]
    async fn publishes_video_and_returns_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendVideo"))
            .and(body_string_contains("-100200300"))
            .and(body_string_contains("name=\"supports_streaming\""))
            .and(body_string_contains("filename=\"video-abc.mp4\""))
            .and(body_string_contains("not really an mp4"))
            .and(body_string_contains("Episode 1"))
            .and(body_string_contains("name=\"thumbnail\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": { "message_id": 42, "chat": { "id": -100200300 } }
            })))
            .expect(1)
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let publisher = TelegramPublisher::new(&config(&server)).unwrap();

        let id = publisher
            .publish(upload(&dir), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(id, MessageId(42));
    }

    #[tokio::test]
    async fn api_rejection_is_upload_error_with_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let publisher = TelegramPublisher::new(&config(&server)).unwrap();

        let err = publisher
            .publish(upload(&dir), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::Upload(message) => assert_eq!(message, "Bad Request: chat not found"),
            other => panic!("expected upload error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_error_response_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let publisher = TelegramPublisher::new(&config(&server)).unwrap();

        let err = publisher
            .publish(upload(&dir), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Upload(ref m) if m.contains("502")));
    }

    #[tokio::test]
    async fn missing_video_file_is_io_error() {
        let server = MockServer::start().await;
        let publisher = TelegramPublisher::new(&config(&server)).unwrap();
        let upload = VideoUpload {
            info: VideoInfo {
                path: PathBuf::from("/nonexistent/video.mp4"),
                width: 1,
                height: 1,
                duration_secs: 1,
            },
            caption: None,
            thumbnail: None,
        };

        let err = publisher
            .publish(upload, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "io_error");
    }

    #[tokio::test]
    async fn cancelled_token_aborts_upload() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let publisher = TelegramPublisher::new(&config(&server)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = publisher.publish(upload(&dir), &cancel).await.unwrap_err();

        assert!(err.is_cancelled());
    }

    #[test]
    fn debug_output_hides_token() {
        let config = TelegramConfig {
            bot_token: "secret-token".to_string(),
            destination_chat_id: "1".to_string(),
            ..Default::default()
        };
        let publisher = TelegramPublisher::new(&config).unwrap();
        assert!(!format!("{publisher:?}").contains("secret-token"));
    }
}
