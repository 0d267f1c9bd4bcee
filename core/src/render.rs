//! Turns classified source events into destination payload descriptions.
//!
//! Everything here is pure: names are resolved beforehand and handed in, and
//! nothing talks to a client or the store. Output text is Telegram-flavoured HTML.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::clients::{LocationPayload, UrlButton};
use crate::config::BridgeConfig;
use crate::error::CoreError;
use crate::event::{ContactCard, MediaRef, MessageEvent, MessageKind};
use crate::jid::Jid;

pub const MAX_TEXT_CHARS: usize = 4000;
pub const MAX_CAPTION_CHARS: usize = 1020;
pub const STALE_AFTER_SECS: i64 = 60;
const ELLIPSIS: &str = "...";

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub tz: Tz,
    pub time_format: String,
    pub skip_chat_details: bool,
}

impl RenderOptions {
    pub fn from_config(config: &BridgeConfig) -> Result<Self, CoreError> {
        Ok(Self {
            tz: config.tz()?,
            time_format: config.time_format.clone(),
            skip_chat_details: config.whatsapp.skip_chat_details,
        })
    }
}

/// Names looked up for one message before rendering.
#[derive(Debug, Clone, Default)]
pub struct ResolvedNames {
    pub sender: String,
    /// Group name; `None` outside groups.
    pub chat: Option<String>,
    /// `(user, display name)` for every mentioned JID.
    pub mentions: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Gif,
    Video,
    VoiceNote,
    Audio,
    Document,
    Sticker,
}

impl MediaKind {
    /// Noun used in operator notices.
    pub fn noun(self) -> &'static str {
        match self {
            MediaKind::Image => "photo",
            MediaKind::Gif => "GIF",
            MediaKind::Video => "video",
            MediaKind::VoiceNote | MediaKind::Audio => "audio",
            MediaKind::Document => "document",
            MediaKind::Sticker => "sticker",
        }
    }

    pub fn skip_flag(self) -> &'static str {
        match self {
            MediaKind::Image => "skip_images",
            MediaKind::Gif => "skip_gifs",
            MediaKind::Video => "skip_videos",
            MediaKind::VoiceNote => "skip_voice_notes",
            MediaKind::Audio => "skip_audios",
            MediaKind::Document => "skip_documents",
            MediaKind::Sticker => "skip_stickers",
        }
    }

    pub fn skip_label(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Gif => "GIF",
            MediaKind::Video => "video",
            MediaKind::VoiceNote => "voice note",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
            MediaKind::Sticker => "sticker",
        }
    }
}

/// Attachment to move from source to destination.
#[derive(Debug, Clone)]
pub struct MediaJob {
    pub kind: MediaKind,
    pub media: MediaRef,
    pub file_name: String,
    /// Escaped, truncated caption text appended after the header.
    pub caption: String,
    pub duration_secs: u32,
    /// Animated sticker container that should become an animated image.
    pub transcode: bool,
}

#[derive(Debug, Clone)]
pub enum Payload {
    /// Nothing worth sending (e.g. an empty text message).
    Empty,
    Text(String),
    Media(MediaJob),
    Contacts(Vec<ContactCard>),
    Location(LocationPayload),
    /// Fixed-format notice body for kinds the destination has no primitive for.
    Notice(String),
}

#[derive(Debug, Clone)]
pub struct RenderedMessage {
    pub header: String,
    pub payload: Payload,
    pub button: Option<UrlButton>,
}

impl RenderedMessage {
    /// Header plus body, for text-only sends.
    pub fn text_with(&self, body: &str) -> String {
        format!("{}{}", self.header, body)
    }
}

pub fn render_message(
    msg: &MessageEvent,
    names: &ResolvedNames,
    opts: &RenderOptions,
    now: DateTime<Utc>,
) -> RenderedMessage {
    let header = render_header(msg, names, opts, now);
    // Only stickers and contact cards carry the link back to the sender.
    let button = match &msg.kind {
        MessageKind::Sticker { .. } | MessageKind::Contact(_) | MessageKind::ContactsArray { .. } => {
            Some(sender_button(&msg.info.sender, &names.sender))
        }
        _ => None,
    };
    let payload = match &msg.kind {
        MessageKind::Text { text } | MessageKind::Edit { text, .. } => {
            if text.is_empty() {
                Payload::Empty
            } else {
                let budget = MAX_TEXT_CHARS.saturating_sub(header.chars().count());
                Payload::Text(render_text_body(text, &names.mentions, budget))
            }
        }
        // Revokes never reach the renderer; the dispatcher answers them with a notice.
        MessageKind::Revoke { .. } | MessageKind::Unsupported => Payload::Empty,
        MessageKind::Image { media } => media_payload(MediaKind::Image, media, "image.jpg".to_string(), 0, false),
        MessageKind::Video { media, gif_playback: true } => {
            media_payload(MediaKind::Gif, media, "animation.gif".to_string(), 0, false)
        }
        MessageKind::Video { media, .. } => {
            let file_name = format!("video.{}", mime_subtype(media.mimetype.as_deref()).unwrap_or("mp4"));
            media_payload(MediaKind::Video, media, file_name, 0, false)
        }
        MessageKind::Audio { media, ptt: true, seconds } => {
            media_payload(MediaKind::VoiceNote, media, "audio.ogg".to_string(), *seconds, false)
        }
        MessageKind::Audio { media, seconds, .. } => {
            media_payload(MediaKind::Audio, media, "audio.m4a".to_string(), *seconds, false)
        }
        MessageKind::Document { media, file_name } => {
            let file_name = file_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| "document".to_string());
            media_payload(MediaKind::Document, media, file_name, 0, false)
        }
        MessageKind::Sticker {
            media,
            is_animated,
            is_avatar,
        } => media_payload(
            MediaKind::Sticker,
            media,
            "sticker.webp".to_string(),
            0,
            *is_animated || *is_avatar,
        ),
        MessageKind::Contact(card) => Payload::Contacts(vec![card.clone()]),
        MessageKind::ContactsArray { contacts } => Payload::Contacts(contacts.clone()),
        MessageKind::Location {
            latitude,
            longitude,
            accuracy_meters,
        } => Payload::Location(LocationPayload {
            latitude: *latitude,
            longitude: *longitude,
            horizontal_accuracy: f64::from(*accuracy_meters),
        }),
        MessageKind::LiveLocation => Payload::Notice("\nShared their live location with you".to_string()),
        MessageKind::Poll {
            name,
            options,
            selectable_count,
        } => Payload::Notice(render_poll(&header, name, *selectable_count, options)),
    };
    RenderedMessage { header, payload, button }
}

fn media_payload(kind: MediaKind, media: &MediaRef, file_name: String, duration_secs: u32, transcode: bool) -> Payload {
    let caption = match (kind, media.caption.as_deref()) {
        (MediaKind::Sticker | MediaKind::VoiceNote | MediaKind::Audio, _) => String::new(),
        (_, Some(caption)) if !caption.is_empty() => render_caption(caption),
        _ => String::new(),
    };
    Payload::Media(MediaJob {
        kind,
        media: media.clone(),
        file_name,
        caption,
        duration_secs,
        transcode,
    })
}

pub fn render_header(msg: &MessageEvent, names: &ResolvedNames, opts: &RenderOptions, now: DateTime<Utc>) -> String {
    let info = &msg.info;
    let mut out = String::new();

    if opts.skip_chat_details {
        if info.is_incoming_broadcast {
            out.push_str("<b>#Broadcast</b>\n");
        } else if info.is_from_me {
            out.push_str("<b>You</b>\n");
        } else if info.is_group {
            out.push_str(&format!("<b>{}</b>\n", escape_html(&names.sender)));
        }
    } else {
        if info.is_from_me {
            out.push_str("<b>You</b>\n");
        } else {
            out.push_str(&format!("<b>{}</b>\n", escape_html(&names.sender)));
        }
        if info.is_incoming_broadcast {
            out.push_str("<b>#Broadcast</b>\n");
        } else if info.is_group {
            let chat = names.chat.clone().unwrap_or_else(|| info.chat.to_string());
            out.push_str(&format!("<b>{}</b>\n", escape_html(&chat)));
        } else {
            out.push_str("<b>#Private</b>\n");
        }
    }

    if msg.is_edit() {
        out.push_str("<b>Edited</b>\n");
    }

    if (now - info.timestamp).num_seconds() > STALE_AFTER_SECS {
        out.push_str(&format!(
            "<b>{}</b>\n",
            escape_html(&format_timestamp(info.timestamp, opts.tz, &opts.time_format))
        ));
    }

    if !msg.is_edit() {
        if let Some(ctx) = msg.context.as_ref().filter(|ctx| ctx.is_forwarded) {
            out.push_str(&format!("<b>Forwarded ({})</b>\n", ctx.forwarding_score));
        }
    }

    if !out.ends_with("\n\n") {
        out.push('\n');
    }
    out
}

pub fn format_timestamp(ts: DateTime<Utc>, tz: Tz, time_format: &str) -> String {
    ts.with_timezone(&tz).format(time_format).to_string()
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Cuts `text` to `max` characters, marking the cut with an ellipsis.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}{}", &text[..idx], ELLIPSIS),
        None => text.to_string(),
    }
}

pub fn render_caption(caption: &str) -> String {
    escape_within(caption, &HashMap::new(), MAX_CAPTION_CHARS)
}

/// Escapes the text and turns whole `@<user>` tokens into links to the mentioned user.
/// The result stays within `budget` characters.
pub fn render_text_body(text: &str, mentions: &[(String, String)], budget: usize) -> String {
    let by_user: HashMap<&str, &str> = mentions
        .iter()
        .filter(|(user, _)| !user.is_empty())
        .map(|(user, name)| (user.as_str(), name.as_str()))
        .collect();
    escape_within(text, &by_user, budget)
}

/// Escaped output cut at whole units, so an entity or a link is never split.
fn escape_within(text: &str, mentions: &HashMap<&str, &str>, budget: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut units: Vec<String> = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '@' {
            let end = chars[i + 1..]
                .iter()
                .position(|c| !c.is_ascii_digit())
                .map_or(chars.len(), |offset| i + 1 + offset);
            let user: String = chars[i + 1..end].iter().collect();
            if let Some(name) = mentions.get(user.as_str()) {
                units.push(format!("<a href=\"https://wa.me/{}\">@{}</a>", user, escape_html(name)));
                i = end;
                continue;
            }
        }
        units.push(escape_html(chars[i].encode_utf8(&mut [0; 4])));
        i += 1;
    }

    let total: usize = units.iter().map(|unit| unit.chars().count()).sum();
    if total <= budget {
        return units.concat();
    }
    let limit = budget.saturating_sub(ELLIPSIS.len());
    let mut out = String::new();
    let mut used = 0;
    for unit in &units {
        let len = unit.chars().count();
        if used + len > limit {
            break;
        }
        out.push_str(unit);
        used += len;
    }
    out.push_str(ELLIPSIS);
    out
}

pub fn render_poll(header: &str, name: &str, selectable_count: u32, options: &[String]) -> String {
    let mut out = format!("{}(<b>{}</b>)\n", escape_html(name), selectable_count);
    for (idx, option) in options.iter().enumerate() {
        if header.len() + out.len() > MAX_TEXT_CHARS {
            out.push_str("\n...");
            break;
        }
        out.push_str(&format!("{}. {}\n", idx + 1, escape_html(option)));
    }
    out
}

pub fn sender_button(sender: &Jid, name: &str) -> UrlButton {
    UrlButton {
        text: name.to_string(),
        url: format!("https://wa.me/{}", sender.to_non_ad().user),
    }
}

fn mime_subtype(mime: Option<&str>) -> Option<&str> {
    let subtype = mime?.split('/').nth(1)?;
    let subtype = subtype.split(';').next()?.trim();
    if subtype.is_empty() {
        None
    } else {
        Some(subtype)
    }
}

/// Phone number of a vCard: the `TEL` line marked preferred, else the first one.
pub fn parse_vcard_phone(vcard: &str) -> Result<String, CoreError> {
    let lines: Vec<&str> = vcard.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let begins = lines.first().map(|l| l.eq_ignore_ascii_case("BEGIN:VCARD")).unwrap_or(false);
    let ends = lines.last().map(|l| l.eq_ignore_ascii_case("END:VCARD")).unwrap_or(false);
    if !begins || !ends {
        return Err(CoreError::Render("vcard is not enclosed in BEGIN/END".to_string()));
    }

    let mut first = None;
    for line in &lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let mut params = name.split(';');
        let field = params.next().unwrap_or_default();
        // Grouped properties look like `item1.TEL`.
        let field = field.rsplit('.').next().unwrap_or(field);
        if !field.eq_ignore_ascii_case("TEL") {
            continue;
        }
        let value = value.trim().to_string();
        let preferred = params.any(|p| {
            let p = p.to_ascii_uppercase();
            p == "PREF" || p.starts_with("PREF=") || (p.starts_with("TYPE=") && p.contains("PREF"))
        });
        if preferred {
            return Ok(value);
        }
        if first.is_none() {
            first = Some(value);
        }
    }
    first.ok_or_else(|| CoreError::Render("vcard has no TEL field".to_string()))
}

/// `@all` / `@everyone` as a standalone word, any case.
pub fn has_tag_all_token(text: &str) -> bool {
    text.split_whitespace()
        .map(str::to_lowercase)
        .any(|word| word == "@all" || word == "@everyone")
}

pub fn tag_all_text(participants: &[Jid]) -> String {
    participants
        .iter()
        .map(|jid| format!("@{}", jid.user))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn id_command_reply(chat: &Jid) -> String {
    format!("The ID of the current chat is:\n```{}```", chat)
}

pub fn revoked_notice(deleter: &str) -> String {
    format!("Revoked by <b>{}</b>", escape_html(deleter))
}

pub fn mention_notice(group_name: &str) -> String {
    format!("<b>{}</b>", escape_html(group_name))
}

pub fn call_notice(caller: &str, at: &str) -> String {
    format!("<b>{}\n{}</b>", escape_html(caller), escape_html(at))
}

pub fn error_notice(message: &str, err: &CoreError) -> String {
    format!("{}\n\n<code>{}</code>", message, escape_html(&err.to_string()))
}

pub fn picture_removed_notice(changer: Option<&str>) -> String {
    match changer {
        Some(changer) => format!("The profile picture was removed by {}", escape_html(changer)),
        None => "The profile picture was removed".to_string(),
    }
}

pub fn picture_updated_caption(changer: Option<&str>) -> String {
    match changer {
        Some(changer) => format!("The profile picture was updated by {}", escape_html(changer)),
        None => "The profile picture was updated".to_string(),
    }
}

pub fn announce_notice(announce_only: bool) -> String {
    if announce_only {
        "Group settings have been changed, only admins can send messages now".to_string()
    } else {
        "Group settings have been changed, everybody can send messages now".to_string()
    }
}

pub fn ephemeral_notice(timer_secs: u32) -> String {
    if timer_secs == 0 {
        "Group's auto deletion timer has been disabled".to_string()
    } else {
        format!(
            "Group's auto deletion timer has been turned on:\nTimer: {}",
            format_timer(timer_secs)
        )
    }
}

/// `86400` -> `24h0m0s`.
pub fn format_timer(secs: u32) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

pub fn group_deleted_notice(reason: &str) -> String {
    let mut out = "The group has been deleted".to_string();
    if !reason.is_empty() {
        out.push_str(&format!("\nReason: <code>{}</code>", escape_html(reason)));
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Join,
    Leave,
    Promote,
    Demote,
}

pub fn membership_notice(change: MembershipChange, names: &[String], reason: Option<&str>) -> String {
    let (single, many) = match change {
        MembershipChange::Join => ("joined the group", "The following people joined the group:"),
        MembershipChange::Leave => ("left the group", "The following people left the group:"),
        MembershipChange::Promote => ("was promoted in the group", "The following people were promoted:"),
        MembershipChange::Demote => ("was demoted in the group", "The following people were demoted:"),
    };
    let mut out = match names {
        [one] => format!("{} {}\n", escape_html(one), single),
        _ => {
            let mut out = format!("{}\n", many);
            for name in names {
                out.push_str(&format!("- {}\n", escape_html(name)));
            }
            out
        }
    };
    if let Some(reason) = reason.filter(|r| !r.is_empty()) {
        out.push_str(&format!("\nReason: {}", escape_html(reason)));
    }
    out
}

pub fn description_notice(changer: &str, topic: &str) -> String {
    format!(
        "The group description was changed by <b>{}</b>:\n\n<code>{}</code>",
        escape_html(changer),
        escape_html(topic)
    )
}

pub fn group_name_notice(changer: &str, name: &str) -> String {
    format!(
        "The group name was changed by <b>{}</b>:\n\n<code>{}</code>",
        escape_html(changer),
        escape_html(name)
    )
}
