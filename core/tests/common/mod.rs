#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use image::codecs::webp::WebPEncoder;
use image::ExtendedColorType;
use thread_relay_core::clients::{
    ContactPayload, DestinationClient, LocationPayload, NamedFile, OutgoingSourceMessage, SendTarget, SentMessage,
    SourceClient, UrlButton,
};
use thread_relay_core::event::{ContextInfo, MediaRef, MessageEvent, MessageInfo, MessageKind};
use thread_relay_core::models::{CorrelationRecord, NewRecord};
use thread_relay_core::{
    open_in_memory, BridgeConfig, BridgeContext, CoreError, CorrelationStore, Dispatcher, Jid, StoreDb,
};

pub const TARGET_CHAT: i64 = -1001;
pub const OWN_USER: &str = "19990000000";

#[derive(Debug, Clone)]
pub struct SentCall {
    pub method: &'static str,
    pub message_id: i64,
    pub thread_id: i64,
    pub reply_to: Option<i64>,
    pub text: String,
    pub file_name: Option<String>,
    pub button: Option<UrlButton>,
}

pub struct FakeDestination {
    pub calls: Mutex<Vec<SentCall>>,
    pub created_threads: Mutex<Vec<String>>,
    pub renamed_threads: Mutex<Vec<(i64, String)>>,
    pub fail_uploads: AtomicBool,
    /// Rejects contact cards and locations.
    pub fail_structured: AtomicBool,
    /// Texts longer than this many characters are rejected.
    pub max_text_chars: AtomicUsize,
    pub fail_create_thread: AtomicBool,
    pub fail_rename: AtomicBool,
    next_message: AtomicI64,
    next_thread: AtomicI64,
}

impl Default for FakeDestination {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            created_threads: Mutex::new(Vec::new()),
            renamed_threads: Mutex::new(Vec::new()),
            fail_uploads: AtomicBool::new(false),
            fail_structured: AtomicBool::new(false),
            max_text_chars: AtomicUsize::new(usize::MAX),
            fail_create_thread: AtomicBool::new(false),
            fail_rename: AtomicBool::new(false),
            next_message: AtomicI64::new(100),
            next_thread: AtomicI64::new(10),
        }
    }
}

impl FakeDestination {
    pub fn calls(&self) -> Vec<SentCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created_threads(&self) -> Vec<String> {
        self.created_threads.lock().unwrap().clone()
    }

    fn push(
        &self,
        method: &'static str,
        target: &SendTarget,
        text: &str,
        file_name: Option<String>,
    ) -> Result<SentMessage, CoreError> {
        let message_id = self.next_message.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(SentCall {
            method,
            message_id,
            thread_id: target.thread_id,
            reply_to: target.reply_to,
            text: text.to_string(),
            file_name,
            button: target.button.clone(),
        });
        Ok(SentMessage {
            message_id,
            thread_id: target.thread_id,
        })
    }

    fn upload(
        &self,
        method: &'static str,
        target: &SendTarget,
        file: NamedFile,
        caption: &str,
    ) -> Result<SentMessage, CoreError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(CoreError::network("upload rejected"));
        }
        self.push(method, target, caption, Some(file.file_name))
    }
}

#[async_trait]
impl DestinationClient for FakeDestination {
    async fn send_text(&self, target: &SendTarget, text: &str) -> Result<SentMessage, CoreError> {
        if text.chars().count() > self.max_text_chars.load(Ordering::SeqCst) {
            return Err(CoreError::network("Bad Request: message is too long"));
        }
        self.push("text", target, text, None)
    }

    async fn send_photo(&self, target: &SendTarget, photo: NamedFile, caption: &str) -> Result<SentMessage, CoreError> {
        self.upload("photo", target, photo, caption)
    }

    async fn send_video(&self, target: &SendTarget, video: NamedFile, caption: &str) -> Result<SentMessage, CoreError> {
        self.upload("video", target, video, caption)
    }

    async fn send_animation(
        &self,
        target: &SendTarget,
        animation: NamedFile,
        caption: &str,
    ) -> Result<SentMessage, CoreError> {
        self.upload("animation", target, animation, caption)
    }

    async fn send_audio(
        &self,
        target: &SendTarget,
        audio: NamedFile,
        caption: &str,
        _duration_secs: u32,
    ) -> Result<SentMessage, CoreError> {
        self.upload("audio", target, audio, caption)
    }

    async fn send_document(
        &self,
        target: &SendTarget,
        document: NamedFile,
        caption: &str,
    ) -> Result<SentMessage, CoreError> {
        self.upload("document", target, document, caption)
    }

    async fn send_sticker(&self, target: &SendTarget, sticker: NamedFile) -> Result<SentMessage, CoreError> {
        self.upload("sticker", target, sticker, "")
    }

    async fn send_contact(&self, target: &SendTarget, contact: &ContactPayload) -> Result<SentMessage, CoreError> {
        if self.fail_structured.load(Ordering::SeqCst) {
            return Err(CoreError::network("sendContact rejected"));
        }
        self.push("contact", target, &contact.phone_number, None)
    }

    async fn send_location(&self, target: &SendTarget, location: &LocationPayload) -> Result<SentMessage, CoreError> {
        if self.fail_structured.load(Ordering::SeqCst) {
            return Err(CoreError::network("sendLocation rejected"));
        }
        self.push(
            "location",
            target,
            &format!("{},{}", location.latitude, location.longitude),
            None,
        )
    }

    async fn create_thread(&self, _chat_id: i64, label: &str) -> Result<i64, CoreError> {
        if self.fail_create_thread.load(Ordering::SeqCst) {
            return Err(CoreError::network("createForumTopic failed"));
        }
        self.created_threads.lock().unwrap().push(label.to_string());
        Ok(self.next_thread.fetch_add(1, Ordering::SeqCst))
    }

    async fn rename_thread(&self, _chat_id: i64, thread_id: i64, label: &str) -> Result<(), CoreError> {
        if self.fail_rename.load(Ordering::SeqCst) {
            return Err(CoreError::network("editForumTopic failed"));
        }
        self.renamed_threads.lock().unwrap().push((thread_id, label.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSource {
    /// user -> display name
    pub contacts: HashMap<String, String>,
    /// group jid string -> subject
    pub groups: HashMap<String, String>,
    pub participants: Vec<Jid>,
    pub media_bytes: Vec<u8>,
    pub fail_downloads: bool,
    pub picture_url: Option<String>,
    pub downloads: AtomicUsize,
    pub sent: Mutex<Vec<(Jid, OutgoingSourceMessage)>>,
}

impl FakeSource {
    pub fn sent(&self) -> Vec<(Jid, OutgoingSourceMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    fn own_id(&self) -> Jid {
        Jid::user(OWN_USER)
    }

    async fn send_message(&self, chat: &Jid, message: OutgoingSourceMessage) -> Result<String, CoreError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((chat.clone(), message));
        Ok(format!("OUT{}", sent.len()))
    }

    async fn download_media(&self, _media: &MediaRef) -> Result<Vec<u8>, CoreError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.fail_downloads {
            return Err(CoreError::network("media download failed"));
        }
        Ok(self.media_bytes.clone())
    }

    async fn get_profile_picture_url(&self, _subject: &Jid) -> Result<Option<String>, CoreError> {
        Ok(self.picture_url.clone())
    }

    async fn download_url(&self, _url: &str) -> Result<Vec<u8>, CoreError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0xFF, 0xD8, 0xFF])
    }

    async fn get_contact_name(&self, user: &Jid) -> Result<Option<String>, CoreError> {
        Ok(self.contacts.get(&user.user).cloned())
    }

    async fn get_group_name(&self, group: &Jid) -> Result<String, CoreError> {
        self.groups
            .get(&group.to_string())
            .cloned()
            .ok_or_else(|| CoreError::NotFound(group.to_string()))
    }

    async fn get_group_participants(&self, _group: &Jid) -> Result<Vec<Jid>, CoreError> {
        Ok(self.participants.clone())
    }
}

/// Store that can be told to fail topic or record writes.
pub struct FlakyStore {
    pub inner: StoreDb,
    pub fail_topic_writes: AtomicBool,
    pub fail_record_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: open_in_memory().expect("memory store"),
            fail_topic_writes: AtomicBool::new(false),
            fail_record_writes: AtomicBool::new(false),
        }
    }
}

impl CorrelationStore for FlakyStore {
    fn put_record(&self, record: &NewRecord) -> Result<(), CoreError> {
        if self.fail_record_writes.load(Ordering::SeqCst) {
            return Err(CoreError::Storage("disk I/O error".to_string()));
        }
        self.inner.put_record(record)
    }

    fn get_record(&self, wa_msg_id: &str, wa_chat_id: &str) -> Result<CorrelationRecord, CoreError> {
        self.inner.get_record(wa_msg_id, wa_chat_id)
    }

    fn mark_read(&self, wa_chat_id: &str, wa_msg_id: &str) -> Result<bool, CoreError> {
        self.inner.mark_read(wa_chat_id, wa_msg_id)
    }

    fn get_topic(&self, wa_chat_key: &str, tg_chat_id: i64) -> Result<Option<i64>, CoreError> {
        self.inner.get_topic(wa_chat_key, tg_chat_id)
    }

    fn put_topic(&self, wa_chat_key: &str, tg_chat_id: i64, tg_thread_id: i64) -> Result<i64, CoreError> {
        if self.fail_topic_writes.load(Ordering::SeqCst) {
            return Err(CoreError::Storage("disk I/O error".to_string()));
        }
        self.inner.put_topic(wa_chat_key, tg_chat_id, tg_thread_id)
    }

    fn put_contact_name(&self, user_id: &str, push_name: &str) -> Result<(), CoreError> {
        self.inner.put_contact_name(user_id, push_name)
    }

    fn get_contact_name(&self, user_id: &str) -> Result<Option<String>, CoreError> {
        self.inner.get_contact_name(user_id)
    }
}

pub struct Harness {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<FlakyStore>,
    pub source: Arc<FakeSource>,
    pub dest: Arc<FakeDestination>,
}

pub fn test_config() -> BridgeConfig {
    BridgeConfig::new("123:abc", TARGET_CHAT)
}

/// Source with Bob (sender), Alice (mentioned) and the "Family" group.
pub fn test_source() -> FakeSource {
    let mut source = FakeSource::default();
    source.contacts.insert("15550001111".to_string(), "Bob".to_string());
    source.contacts.insert("12345".to_string(), "Alice".to_string());
    source.groups.insert("42@g.us".to_string(), "Family".to_string());
    source.participants = vec![Jid::user("15550001111"), Jid::user("12345")];
    source.media_bytes = b"media".to_vec();
    source
}

pub fn harness(config: BridgeConfig) -> Harness {
    harness_with(config, test_source())
}

pub fn harness_with(config: BridgeConfig, source: FakeSource) -> Harness {
    let store = Arc::new(FlakyStore::new());
    let source = Arc::new(source);
    let dest = Arc::new(FakeDestination::default());
    let dispatcher = Dispatcher::new(BridgeContext {
        config,
        store: store.clone(),
        source: source.clone(),
        dest: dest.clone(),
        start_time: Utc::now() - Duration::hours(1),
    })
    .expect("dispatcher");
    Harness {
        dispatcher: Arc::new(dispatcher),
        store,
        source,
        dest,
    }
}

pub fn bob() -> Jid {
    Jid::user("15550001111")
}

pub fn family() -> Jid {
    Jid::group("42")
}

pub fn message(id: &str, chat: Jid, sender: Jid, kind: MessageKind) -> MessageEvent {
    MessageEvent {
        info: MessageInfo {
            id: id.to_string(),
            is_group: chat.is_group(),
            chat,
            sender,
            timestamp: Utc::now(),
            is_from_me: false,
            is_incoming_broadcast: false,
        },
        context: None,
        kind,
    }
}

pub fn text(id: &str, chat: Jid, sender: Jid, body: &str) -> MessageEvent {
    message(
        id,
        chat,
        sender,
        MessageKind::Text {
            text: body.to_string(),
        },
    )
}

pub fn with_context(mut msg: MessageEvent, context: ContextInfo) -> MessageEvent {
    msg.context = Some(context);
    msg
}

pub fn media(file_length: u64) -> MediaRef {
    MediaRef {
        url: "https://mmg.example/file".to_string(),
        direct_path: Some("/v/t62/file".to_string()),
        mimetype: Some("application/pdf".to_string()),
        file_length,
        caption: None,
        media_key: Some("a2V5".to_string()),
    }
}

/// Two-frame 2x2 animated WebP. The frames are lossless stills from the `image`
/// encoder, wrapped in `ANMF` chunks behind a `VP8X` + `ANIM` header.
pub fn animated_webp() -> Vec<u8> {
    let mut body = b"WEBP".to_vec();
    let mut vp8x = vec![0x12, 0, 0, 0];
    vp8x.extend_from_slice(&u24(1));
    vp8x.extend_from_slice(&u24(1));
    push_chunk(&mut body, b"VP8X", &vp8x);
    push_chunk(&mut body, b"ANIM", &[0, 0, 0, 0, 0, 0]);

    for color in [[255u8, 0, 0, 255], [0, 0, 255, 255]] {
        let mut frame = vec![0, 0, 0, 0, 0, 0];
        frame.extend_from_slice(&u24(1));
        frame.extend_from_slice(&u24(1));
        frame.extend_from_slice(&u24(100));
        frame.push(0x02);
        frame.extend_from_slice(&lossless_chunk(&color.repeat(4)));
        push_chunk(&mut body, b"ANMF", &frame);
    }

    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

fn u24(value: u32) -> [u8; 3] {
    let bytes = value.to_le_bytes();
    [bytes[0], bytes[1], bytes[2]]
}

fn push_chunk(out: &mut Vec<u8>, fourcc: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(fourcc);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
}

/// The padded `VP8L` chunk of a 2x2 lossless still.
fn lossless_chunk(rgba: &[u8]) -> Vec<u8> {
    let mut still = Vec::new();
    WebPEncoder::new_lossless(&mut still)
        .encode(rgba, 2, 2, ExtendedColorType::Rgba8)
        .expect("encode frame");
    let mut pos = 12;
    while pos + 8 <= still.len() {
        let size = u32::from_le_bytes([still[pos + 4], still[pos + 5], still[pos + 6], still[pos + 7]]) as usize;
        let end = (pos + 8 + size + size % 2).min(still.len());
        if &still[pos..pos + 4] == b"VP8L" {
            return still[pos..end].to_vec();
        }
        pos = end;
    }
    panic!("encoder produced no VP8L chunk");
}
