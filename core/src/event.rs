//! Inbound source events.
//!
//! Every kind of thing the source client can report is a variant here, so the
//! dispatcher matches exhaustively and a new source message kind is a compile
//! error until it is handled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::jid::Jid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Message(MessageEvent),
    Receipt(ReceiptEvent),
    Picture(PictureEvent),
    GroupInfo(GroupInfoEvent),
    PushName(PushNameEvent),
    CallOffer(CallOfferEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageInfo {
    pub id: String,
    pub chat: Jid,
    pub sender: Jid,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_from_me: bool,
    #[serde(default)]
    pub is_group: bool,
    /// Delivered through a broadcast list rather than a normal chat.
    #[serde(default)]
    pub is_incoming_broadcast: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextInfo {
    #[serde(default)]
    pub quoted_message_id: Option<String>,
    #[serde(default)]
    pub is_forwarded: bool,
    #[serde(default)]
    pub forwarding_score: u32,
    #[serde(default)]
    pub mentioned: Vec<Jid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub info: MessageInfo,
    #[serde(default)]
    pub context: Option<ContextInfo>,
    pub kind: MessageKind,
}

impl MessageEvent {
    /// The id correlation lookups use: edits and revokes point at the original message.
    pub fn correlation_id(&self) -> &str {
        match &self.kind {
            MessageKind::Edit { target_id, .. } | MessageKind::Revoke { target_id } => target_id,
            _ => &self.info.id,
        }
    }

    /// Plain text carried by text and edit messages.
    pub fn text(&self) -> &str {
        match &self.kind {
            MessageKind::Text { text } | MessageKind::Edit { text, .. } => text,
            _ => "",
        }
    }

    pub fn is_edit(&self) -> bool {
        matches!(self.kind, MessageKind::Edit { .. })
    }
}

/// Reference the source client needs to fetch an attachment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaRef {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub direct_path: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub file_length: u64,
    #[serde(default)]
    pub caption: Option<String>,
    /// Opaque key material, passed back to the source client untouched.
    #[serde(default)]
    pub media_key: Option<String>,
}

impl MediaRef {
    pub fn is_retrievable(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactCard {
    pub display_name: String,
    pub vcard: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageKind {
    Text {
        text: String,
    },
    Edit {
        target_id: String,
        text: String,
    },
    Revoke {
        target_id: String,
    },
    Image {
        media: MediaRef,
    },
    Video {
        media: MediaRef,
        #[serde(default)]
        gif_playback: bool,
    },
    Audio {
        media: MediaRef,
        #[serde(default)]
        ptt: bool,
        #[serde(default)]
        seconds: u32,
    },
    Document {
        media: MediaRef,
        #[serde(default)]
        file_name: Option<String>,
    },
    Sticker {
        media: MediaRef,
        #[serde(default)]
        is_animated: bool,
        /// Avatar stickers are animated WebP even when not flagged as such.
        #[serde(default)]
        is_avatar: bool,
    },
    Contact(ContactCard),
    ContactsArray {
        contacts: Vec<ContactCard>,
    },
    Location {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        accuracy_meters: u32,
    },
    LiveLocation,
    Poll {
        name: String,
        options: Vec<String>,
        #[serde(default)]
        selectable_count: u32,
    },
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptKind {
    Delivered,
    Read,
    /// Read by the operator on another of their own devices.
    ReadSelf,
    Played,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptEvent {
    pub chat: Jid,
    pub sender: Jid,
    pub message_ids: Vec<String>,
    pub kind: ReceiptKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PictureEvent {
    pub jid: Jid,
    #[serde(default)]
    pub author: Option<Jid>,
    #[serde(default)]
    pub remove: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupName {
    pub name: String,
    #[serde(default)]
    pub set_by: Option<Jid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupTopic {
    pub topic: String,
    #[serde(default)]
    pub set_by: Option<Jid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDelete {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupInfoEvent {
    pub jid: Jid,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub name: Option<GroupName>,
    #[serde(default)]
    pub topic: Option<GroupTopic>,
    /// `Some(true)` when only admins may post.
    #[serde(default)]
    pub announce: Option<bool>,
    /// Disappearing-message timer in seconds; `Some(0)` means it was turned off.
    #[serde(default)]
    pub ephemeral_timer: Option<u32>,
    #[serde(default)]
    pub delete: Option<GroupDelete>,
    #[serde(default)]
    pub join: Vec<Jid>,
    #[serde(default)]
    pub join_reason: Option<String>,
    #[serde(default)]
    pub leave: Vec<Jid>,
    #[serde(default)]
    pub promote: Vec<Jid>,
    #[serde(default)]
    pub demote: Vec<Jid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushNameEvent {
    pub jid: Jid,
    #[serde(default)]
    pub old_push_name: String,
    pub new_push_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallOfferEvent {
    pub call_creator: Jid,
    pub call_id: String,
    pub timestamp: DateTime<Utc>,
}
