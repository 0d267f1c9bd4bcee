//! Capability surfaces of the two platforms, as the bridge consumes them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::event::MediaRef;
use crate::jid::Jid;

/// Message on the source side that an outgoing source message quotes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotedRef {
    pub message_id: String,
    pub participant: Jid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingSourceMessage {
    pub text: String,
    #[serde(default)]
    pub mentions: Vec<Jid>,
    #[serde(default)]
    pub quoted: Option<QuotedRef>,
}

#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Account the bridge is logged in as.
    fn own_id(&self) -> Jid;

    async fn send_message(&self, chat: &Jid, message: OutgoingSourceMessage) -> Result<String, CoreError>;

    async fn download_media(&self, media: &MediaRef) -> Result<Vec<u8>, CoreError>;

    /// `None` when the subject has no picture.
    async fn get_profile_picture_url(&self, subject: &Jid) -> Result<Option<String>, CoreError>;

    async fn download_url(&self, url: &str) -> Result<Vec<u8>, CoreError>;

    /// Name from the source client's own contact store, if it has one.
    async fn get_contact_name(&self, user: &Jid) -> Result<Option<String>, CoreError>;

    async fn get_group_name(&self, group: &Jid) -> Result<String, CoreError>;

    async fn get_group_participants(&self, group: &Jid) -> Result<Vec<Jid>, CoreError>;
}

/// Where a destination message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTarget {
    pub chat_id: i64,
    /// `0` is the general thread.
    pub thread_id: i64,
    pub reply_to: Option<i64>,
    pub button: Option<UrlButton>,
}

impl SendTarget {
    pub fn new(chat_id: i64, thread_id: i64) -> Self {
        Self {
            chat_id,
            thread_id,
            reply_to: None,
            button: None,
        }
    }

    pub fn replying_to(mut self, reply_to: Option<i64>) -> Self {
        self.reply_to = reply_to.filter(|id| *id != 0);
        self
    }

    pub fn with_button(mut self, button: Option<UrlButton>) -> Self {
        self.button = button;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlButton {
    pub text: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct NamedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl NamedFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactPayload {
    pub phone_number: String,
    pub first_name: String,
    pub vcard: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationPayload {
    pub latitude: f64,
    pub longitude: f64,
    pub horizontal_accuracy: f64,
}

/// Destination message the platform accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: i64,
    pub thread_id: i64,
}

/// Captions and text are HTML-formatted.
#[async_trait]
pub trait DestinationClient: Send + Sync {
    async fn send_text(&self, target: &SendTarget, text: &str) -> Result<SentMessage, CoreError>;

    async fn send_photo(&self, target: &SendTarget, photo: NamedFile, caption: &str) -> Result<SentMessage, CoreError>;

    async fn send_video(&self, target: &SendTarget, video: NamedFile, caption: &str) -> Result<SentMessage, CoreError>;

    async fn send_animation(&self, target: &SendTarget, animation: NamedFile, caption: &str) -> Result<SentMessage, CoreError>;

    async fn send_audio(
        &self,
        target: &SendTarget,
        audio: NamedFile,
        caption: &str,
        duration_secs: u32,
    ) -> Result<SentMessage, CoreError>;

    async fn send_document(&self, target: &SendTarget, document: NamedFile, caption: &str) -> Result<SentMessage, CoreError>;

    async fn send_sticker(&self, target: &SendTarget, sticker: NamedFile) -> Result<SentMessage, CoreError>;

    async fn send_contact(&self, target: &SendTarget, contact: &ContactPayload) -> Result<SentMessage, CoreError>;

    async fn send_location(&self, target: &SendTarget, location: &LocationPayload) -> Result<SentMessage, CoreError>;

    async fn create_thread(&self, chat_id: i64, label: &str) -> Result<i64, CoreError>;

    async fn rename_thread(&self, chat_id: i64, thread_id: i64, label: &str) -> Result<(), CoreError>;
}
