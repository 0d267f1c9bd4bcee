//! Top-level event handling: classify, filter, place, render, send, correlate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::clients::{
    ContactPayload, DestinationClient, OutgoingSourceMessage, QuotedRef, SendTarget, SentMessage, SourceClient,
};
use crate::config::BridgeConfig;
use crate::error::CoreError;
use crate::event::{ContactCard, ContextInfo, Event, MessageEvent, MessageKind};
use crate::identity::IdentityResolver;
use crate::media::{skipped_note, MediaPipeline, MediaPolicy};
use crate::models::NewRecord;
use crate::render::{self, Payload, RenderOptions, RenderedMessage, ResolvedNames};
use crate::store::CorrelationStore;
use crate::topic::{TopicResolver, MENTIONS_KEY, STATUS_KEY, STATUS_LABEL};

const VCARD_PARSE_FAILED: &str = "Couldn't send the vCard as failed to parse it";

fn send_failed_note(what: &str) -> String {
    format!("\nCouldn't send the {} due to some errors", what)
}

/// Everything the dispatcher needs from the outside world.
pub struct BridgeContext {
    pub config: BridgeConfig,
    pub store: Arc<dyn CorrelationStore>,
    pub source: Arc<dyn SourceClient>,
    pub dest: Arc<dyn DestinationClient>,
    /// Events stamped before this instant are history and get dropped.
    pub start_time: DateTime<Utc>,
}

pub struct Dispatcher {
    pub(crate) config: BridgeConfig,
    pub(crate) render_opts: RenderOptions,
    pub(crate) store: Arc<dyn CorrelationStore>,
    pub(crate) source: Arc<dyn SourceClient>,
    pub(crate) dest: Arc<dyn DestinationClient>,
    pub(crate) start_time: DateTime<Utc>,
    pub(crate) identity: IdentityResolver,
    pub(crate) topics: TopicResolver,
    media: MediaPipeline,
}

/// Where a message lands: its thread and, for replies and edits, the message it answers.
#[derive(Debug, Clone, Copy)]
struct Placement {
    thread_id: i64,
    reply_to: Option<i64>,
}

impl Dispatcher {
    pub fn new(ctx: BridgeContext) -> Result<Self, CoreError> {
        let render_opts = RenderOptions::from_config(&ctx.config)?;
        let chat_id = ctx.config.telegram.target_chat_id;
        let identity = IdentityResolver::new(ctx.store.clone(), ctx.source.clone());
        let topics = TopicResolver::new(ctx.store.clone(), ctx.dest.clone(), chat_id);
        let media = MediaPipeline::new(ctx.source.clone(), ctx.dest.clone(), MediaPolicy::from_config(&ctx.config));
        Ok(Self {
            config: ctx.config,
            render_opts,
            store: ctx.store,
            source: ctx.source,
            dest: ctx.dest,
            start_time: ctx.start_time,
            identity,
            topics,
            media,
        })
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    pub fn topics(&self) -> &TopicResolver {
        &self.topics
    }

    pub(crate) fn target_chat(&self) -> i64 {
        self.topics.chat_id()
    }

    /// Runs the event on its own task so a slow conversation never holds up the others.
    pub fn spawn(self: &Arc<Self>, event: Event) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.handle(event).await })
    }

    pub async fn handle(&self, event: Event) {
        match event {
            Event::Message(msg) => {
                if msg.info.timestamp < self.start_time {
                    debug!(event_id = %msg.info.id, "dropping message from before startup");
                    return;
                }
                self.handle_message(msg).await;
            }
            Event::Receipt(receipt) => self.handle_receipt(&receipt),
            Event::PushName(push) => self.handle_push_name(&push),
            Event::Picture(picture) => {
                if self.config.whatsapp.skip_profile_picture_updates || picture.timestamp < self.start_time {
                    return;
                }
                self.handle_picture(&picture).await;
            }
            Event::GroupInfo(group) => {
                if self.config.whatsapp.skip_group_settings_updates || group.timestamp < self.start_time {
                    return;
                }
                self.handle_group_info(&group).await;
            }
            Event::CallOffer(call) => {
                if call.timestamp < self.start_time {
                    return;
                }
                self.handle_call_offer(&call).await;
            }
        }
    }

    async fn handle_message(&self, msg: MessageEvent) {
        if let MessageKind::Revoke { target_id } = &msg.kind {
            self.handle_revoke(&msg, target_id).await;
            return;
        }

        if msg.info.is_from_me {
            self.handle_own_message(&msg).await;
            if !self.config.whatsapp.send_my_messages_from_other_devices {
                return;
            }
        }

        self.forward_message(&msg).await;
    }

    /// Commands the operator types on their own devices.
    async fn handle_own_message(&self, msg: &MessageEvent) {
        let text = msg.text();
        if text == self.config.whatsapp.id_command {
            let reply = OutgoingSourceMessage {
                text: render::id_command_reply(&msg.info.chat),
                mentions: Vec::new(),
                quoted: Some(QuotedRef {
                    message_id: msg.correlation_id().to_string(),
                    participant: msg.info.sender.clone(),
                }),
            };
            if let Err(err) = self.source.send_message(&msg.info.chat, reply).await {
                error!(event_id = %msg.info.id, error = %err, "failed to reply to id command");
            }
        }

        if !msg.is_edit() && msg.info.is_group && render::has_tag_all_token(text) {
            self.tag_all(msg).await;
        }
    }

    /// Replies in the source group mentioning every participant.
    async fn tag_all(&self, msg: &MessageEvent) {
        let participants = match self.source.get_group_participants(&msg.info.chat).await {
            Ok(participants) => participants,
            Err(err) => {
                warn!(chat = %msg.info.chat, error = %err, "failed to list group participants");
                return;
            }
        };
        if participants.is_empty() {
            return;
        }
        let reply = OutgoingSourceMessage {
            text: render::tag_all_text(&participants),
            mentions: participants,
            quoted: Some(QuotedRef {
                message_id: msg.correlation_id().to_string(),
                participant: msg.info.sender.clone(),
            }),
        };
        if let Err(err) = self.source.send_message(&msg.info.chat, reply).await {
            warn!(chat = %msg.info.chat, error = %err, "failed to tag everyone");
        }
    }

    async fn forward_message(&self, msg: &MessageEvent) {
        let info = &msg.info;
        let wa = &self.config.whatsapp;
        let chat_key = info.chat.to_string();

        if !msg.is_edit() && self.already_bridged(msg.correlation_id(), &chat_key) {
            debug!(event_id = %info.id, chat = %chat_key, "dropping redelivered message");
            return;
        }

        if !info.is_from_me {
            if info.chat.is_status_broadcast()
                && (wa.skip_status || wa.status_ignored_chats.contains(&info.sender.user))
            {
                debug!(event_id = %info.id, chat = %chat_key, "dropping status from ignored chat");
                return;
            }
            if wa.ignore_chats.contains(&info.chat.user) {
                debug!(event_id = %info.id, chat = %chat_key, "dropping message from ignored chat");
                return;
            }
        }

        if !msg.is_edit()
            && !info.is_from_me
            && info.is_group
            && wa.tag_all_allowed_groups.contains(&info.chat.user)
            && render::has_tag_all_token(msg.text())
        {
            debug!(event_id = %info.id, chat = %chat_key, "tag-all triggered by group member");
            self.tag_all(msg).await;
        }

        let names = self.resolve_names(msg).await;
        let rendered = render::render_message(msg, &names, &self.render_opts, Utc::now());

        let placement = if msg.is_edit() {
            self.placement_of(msg.correlation_id(), &chat_key)
        } else if let Some(ctx) = &msg.context {
            if info.is_group {
                self.notify_self_mention(msg, ctx, &names).await;
            }
            ctx.quoted_message_id
                .as_deref()
                .and_then(|quoted| self.placement_of(quoted, &chat_key))
        } else {
            None
        };

        let placement = match placement {
            Some(placement) => placement,
            None => match self.conversation_thread(msg, &names).await {
                Some(thread_id) => Placement {
                    thread_id,
                    reply_to: None,
                },
                None => return,
            },
        };

        let target = SendTarget::new(self.target_chat(), placement.thread_id).replying_to(placement.reply_to);
        for sent in self.deliver(msg, &rendered, &target).await {
            self.record(msg, &target, sent);
        }
    }

    fn already_bridged(&self, msg_id: &str, chat_key: &str) -> bool {
        match self.store.get_record(msg_id, chat_key) {
            Ok(record) => record.tg_chat_id == self.target_chat(),
            Err(err) if err.is_not_found() => false,
            Err(err) => {
                warn!(event_id = msg_id, error = %err, "duplicate check failed");
                false
            }
        }
    }

    /// Thread and message of an earlier bridged message in the target chat.
    fn placement_of(&self, msg_id: &str, chat_key: &str) -> Option<Placement> {
        match self.store.get_record(msg_id, chat_key) {
            Ok(record) if record.tg_chat_id == self.target_chat() => Some(Placement {
                thread_id: record.tg_thread_id,
                reply_to: Some(record.tg_msg_id),
            }),
            Ok(_) => None,
            Err(err) => {
                if !err.is_not_found() {
                    warn!(event_id = msg_id, error = %err, "correlation lookup failed");
                }
                None
            }
        }
    }

    async fn resolve_names(&self, msg: &MessageEvent) -> ResolvedNames {
        let info = &msg.info;
        let sender = self.identity.contact_name(&info.sender).await;
        let chat = if info.is_group {
            Some(self.identity.group_name(&info.chat).await)
        } else {
            None
        };
        let mut mentions = Vec::new();
        if let Some(ctx) = &msg.context {
            for jid in &ctx.mentioned {
                mentions.push((jid.user.clone(), self.identity.contact_name(jid).await));
            }
        }
        ResolvedNames { sender, chat, mentions }
    }

    async fn notify_self_mention(&self, msg: &MessageEvent, ctx: &ContextInfo, names: &ResolvedNames) {
        let own = self.source.own_id();
        if !ctx.mentioned.iter().any(|jid| jid.user == own.user) {
            return;
        }

        let thread_id = match self.topics.resolve(MENTIONS_KEY, MENTIONS_KEY).await {
            Ok(thread_id) => thread_id,
            Err(err) => {
                self.report_error("Failed to create/find thread id for 'mentions'", &err)
                    .await;
                return;
            }
        };
        let group = names.chat.clone().unwrap_or_else(|| msg.info.chat.to_string());
        let target = SendTarget::new(self.target_chat(), thread_id)
            .with_button(Some(render::sender_button(&msg.info.sender, &names.sender)));
        if let Err(err) = self.dest.send_text(&target, &render::mention_notice(&group)).await {
            warn!(event_id = %msg.info.id, error = %err, "failed to post mention notice");
        }
    }

    /// Thread the conversation lives in, created on first use.
    async fn conversation_thread(&self, msg: &MessageEvent, names: &ResolvedNames) -> Option<i64> {
        let info = &msg.info;
        let (key, label) = if info.chat.is_status_broadcast() {
            (STATUS_KEY.to_string(), STATUS_LABEL.to_string())
        } else if info.is_incoming_broadcast {
            (info.sender.to_non_ad().to_string(), names.sender.clone())
        } else if info.is_group {
            let label = names.chat.clone().unwrap_or_else(|| info.chat.to_string());
            (info.chat.to_non_ad().to_string(), label)
        } else {
            let chat = info.chat.to_non_ad();
            let label = self.identity.contact_name(&chat).await;
            (chat.to_string(), label)
        };

        match self.topics.resolve(&key, &label).await {
            Ok(thread_id) => Some(thread_id),
            Err(err) => {
                let what = if key == STATUS_KEY {
                    format!("'{}'", STATUS_KEY)
                } else {
                    format!("<b>{}</b>", render::escape_html(&key))
                };
                self.report_error(&format!("Failed to create/find thread id for {}", what), &err)
                    .await;
                None
            }
        }
    }

    async fn deliver(&self, msg: &MessageEvent, rendered: &RenderedMessage, target: &SendTarget) -> Vec<SentMessage> {
        let wa = &self.config.whatsapp;
        let header = rendered.header.as_str();
        let with_button = target.clone().with_button(rendered.button.clone());

        match &rendered.payload {
            Payload::Empty => Vec::new(),
            Payload::Text(body) => match self.dest.send_text(target, &rendered.text_with(body)).await {
                Ok(sent) => vec![sent],
                Err(err) => {
                    error!(event_id = %msg.info.id, error = %err, "failed to send text message");
                    let text = rendered.text_with(&send_failed_note("message"));
                    self.send_notice(msg, target, &text).await.into_iter().collect()
                }
            },
            Payload::Notice(body) => {
                let mut text = rendered.text_with(body);
                if matches!(msg.kind, MessageKind::LiveLocation) && wa.skip_locations {
                    text.push_str(&skipped_note("live location", "skip_locations"));
                }
                self.send_notice(msg, target, &text).await.into_iter().collect()
            }
            Payload::Media(job) => match self.media.transfer(job, header, &with_button).await {
                Ok(sent) => sent.into_iter().collect(),
                Err(err) => {
                    warn!(event_id = %msg.info.id, kind = ?job.kind, error = %err, "attachment notice failed");
                    Vec::new()
                }
            },
            Payload::Location(location) => {
                if wa.skip_locations {
                    let text = rendered.text_with(&skipped_note("location", "skip_locations"));
                    return self.send_notice(msg, target, &text).await.into_iter().collect();
                }
                match self.dest.send_location(target, location).await {
                    Ok(sent) => vec![sent],
                    Err(err) => {
                        warn!(event_id = %msg.info.id, error = %err, "failed to send location");
                        let text = rendered.text_with(&send_failed_note("location"));
                        self.send_notice(msg, target, &text).await.into_iter().collect()
                    }
                }
            }
            Payload::Contacts(cards) => self.deliver_contacts(msg, rendered, target, &with_button, cards).await,
        }
    }

    async fn deliver_contacts(
        &self,
        msg: &MessageEvent,
        rendered: &RenderedMessage,
        target: &SendTarget,
        with_button: &SendTarget,
        cards: &[ContactCard],
    ) -> Vec<SentMessage> {
        let single = matches!(msg.kind, MessageKind::Contact(_));
        if self.config.whatsapp.skip_contacts {
            let label = if single { "contact" } else { "contact array" };
            let text = rendered.text_with(&skipped_note(label, "skip_contacts"));
            return self.send_notice(msg, target, &text).await.into_iter().collect();
        }

        let mut sent = Vec::new();
        for card in cards {
            let phone_number = match render::parse_vcard_phone(&card.vcard) {
                Ok(phone_number) => phone_number,
                Err(err) => {
                    debug!(event_id = %msg.info.id, error = %err, "unparsable vcard");
                    if single {
                        let text = rendered.text_with(&format!("\n{}", VCARD_PARSE_FAILED));
                        sent.extend(self.send_notice(msg, target, &text).await);
                    } else if let Err(err) = self.dest.send_text(target, VCARD_PARSE_FAILED).await {
                        warn!(event_id = %msg.info.id, error = %err, "failed to send vcard notice");
                    }
                    continue;
                }
            };
            let contact = ContactPayload {
                phone_number,
                first_name: card.display_name.clone(),
                vcard: card.vcard.clone(),
            };
            match self.dest.send_contact(with_button, &contact).await {
                Ok(message) => sent.push(message),
                Err(err) => {
                    warn!(event_id = %msg.info.id, error = %err, "failed to send contact");
                    let text = rendered.text_with(&send_failed_note("contact"));
                    sent.extend(self.send_notice(msg, target, &text).await);
                }
            }
        }
        sent
    }

    async fn send_notice(&self, msg: &MessageEvent, target: &SendTarget, text: &str) -> Option<SentMessage> {
        match self.dest.send_text(target, text).await {
            Ok(sent) => Some(sent),
            Err(err) => {
                warn!(event_id = %msg.info.id, error = %err, "failed to send notice");
                None
            }
        }
    }

    /// Best effort: the destination message exists whether or not this succeeds.
    fn record(&self, msg: &MessageEvent, target: &SendTarget, sent: SentMessage) {
        if sent.message_id == 0 {
            return;
        }
        let record = NewRecord {
            wa_msg_id: msg.correlation_id().to_string(),
            wa_chat_id: msg.info.chat.to_string(),
            wa_sender_id: msg.info.sender.to_string(),
            tg_chat_id: target.chat_id,
            tg_msg_id: sent.message_id,
            tg_thread_id: if sent.thread_id != 0 { sent.thread_id } else { target.thread_id },
        };
        if let Err(err) = self.store.put_record(&record) {
            warn!(
                event_id = %msg.info.id,
                tg_msg_id = sent.message_id,
                error = %err,
                "failed to store correlation record"
            );
        }
    }

    async fn handle_revoke(&self, msg: &MessageEvent, target_id: &str) {
        if !self.config.whatsapp.send_revoked_message_updates {
            return;
        }

        let record = match self.store.get_record(target_id, &msg.info.chat.to_string()) {
            Ok(record) => record,
            Err(err) if err.is_not_found() => {
                debug!(event_id = target_id, "revoked message was never bridged");
                return;
            }
            Err(err) => {
                warn!(event_id = target_id, error = %err, "revoke lookup failed");
                return;
            }
        };
        if record.tg_chat_id != self.target_chat() || record.tg_msg_id == 0 {
            return;
        }

        let deleter = if msg.info.is_from_me {
            "you".to_string()
        } else {
            self.identity.contact_name(&msg.info.sender).await
        };
        let target = SendTarget::new(record.tg_chat_id, record.tg_thread_id).replying_to(Some(record.tg_msg_id));
        if let Err(err) = self.dest.send_text(&target, &render::revoked_notice(&deleter)).await {
            warn!(event_id = target_id, error = %err, "failed to post revoke notice");
        }
    }

    /// Operator-visible failure in the target chat's general thread.
    pub(crate) async fn report_error(&self, message: &str, err: &CoreError) {
        error!(error = %err, "{}", message);
        let target = SendTarget::new(self.target_chat(), 0);
        if let Err(send_err) = self.dest.send_text(&target, &render::error_notice(message, err)).await {
            error!(error = %send_err, "failed to report error to target chat");
        }
    }
}
