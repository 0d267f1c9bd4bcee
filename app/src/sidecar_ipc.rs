use serde::{Deserialize, Serialize};

use thread_relay_core::clients::QuotedRef;
use thread_relay_core::event::{Event, MediaRef};
use thread_relay_core::Jid;

/// One line written to the sidecar's stdin.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub cmd: String,
    pub payload: serde_json::Value,
}

/// One line read from the sidecar's stdout.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    Event {
        event: Event,
    },
    Response {
        id: u64,
        ok: bool,
        #[serde(default)]
        payload: Option<serde_json::Value>,
        #[serde(default)]
        error: Option<String>,
    },
}

pub const CMD_OWN_ID: &str = "own_id";
pub const CMD_SEND_MESSAGE: &str = "send_message";
pub const CMD_DOWNLOAD_MEDIA: &str = "download_media";
pub const CMD_PROFILE_PICTURE: &str = "profile_picture_url";
pub const CMD_DOWNLOAD_URL: &str = "download_url";
pub const CMD_CONTACT_NAME: &str = "contact_name";
pub const CMD_GROUP_NAME: &str = "group_name";
pub const CMD_GROUP_PARTICIPANTS: &str = "group_participants";
pub const CMD_SHUTDOWN: &str = "shutdown";

#[derive(Debug, Serialize, Deserialize)]
pub struct OwnIdResponse {
    pub jid: Jid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub chat: Jid,
    pub text: String,
    #[serde(default)]
    pub mentions: Vec<Jid>,
    #[serde(default)]
    pub quoted: Option<QuotedRef>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub message_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadMediaRequest {
    pub media: MediaRef,
}

/// Binary content travels base64-encoded.
#[derive(Debug, Serialize, Deserialize)]
pub struct BytesResponse {
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JidRequest {
    pub jid: Jid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UrlRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfilePictureResponse {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContactNameResponse {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupNameResponse {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ParticipantsResponse {
    pub participants: Vec<Jid>,
}
