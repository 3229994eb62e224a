//! Core types for hls-uploader

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifier of a message returned by a [`Publisher`](crate::publish::Publisher)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl MessageId {
    /// Create a new MessageId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<MessageId> for i64 {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

impl PartialEq<i64> for MessageId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Finished video produced by a [`Transcoder`](crate::transcoder::Transcoder)
///
/// Only valid once the transcoder process has exited; the file is removed when
/// the transcoder is disposed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Temporary output file
    pub path: PathBuf,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Duration in whole seconds
    pub duration_secs: u64,
}

/// Everything a publisher needs to post one video
#[derive(Clone, Debug)]
pub struct VideoUpload {
    /// The video file and its metadata
    pub info: VideoInfo,
    /// Optional message caption
    pub caption: Option<String>,
    /// Optional JPEG thumbnail
    pub thumbnail: Option<Bytes>,
}
