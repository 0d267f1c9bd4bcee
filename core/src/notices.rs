//! Handlers for non-message events: receipts, names, pictures, group changes, calls.
//!
//! None of these create a conversation thread. Notices go into the thread the
//! conversation already has, or nowhere.

use tracing::{debug, error, warn};

use crate::clients::{NamedFile, SendTarget};
use crate::dispatcher::Dispatcher;
use crate::event::{CallOfferEvent, GroupInfoEvent, PictureEvent, PushNameEvent, ReceiptEvent, ReceiptKind};
use crate::jid::Jid;
use crate::render::{self, MembershipChange};
use crate::topic::CALLS_KEY;

impl Dispatcher {
    /// Only reads on the operator's other devices are tracked.
    pub(crate) fn handle_receipt(&self, receipt: &ReceiptEvent) {
        if receipt.kind != ReceiptKind::ReadSelf {
            return;
        }
        let chat = receipt.chat.to_string();
        for msg_id in &receipt.message_ids {
            match self.store.mark_read(&chat, msg_id) {
                Ok(true) => {}
                Ok(false) => debug!(chat = %chat, event_id = %msg_id, "read receipt for untracked message"),
                Err(err) => warn!(chat = %chat, event_id = %msg_id, error = %err, "failed to mark message read"),
            }
        }
    }

    pub(crate) fn handle_push_name(&self, push: &PushNameEvent) {
        debug!(
            jid = %push.jid,
            old_push_name = %push.old_push_name,
            new_push_name = %push.new_push_name,
            "push name update"
        );
        self.identity.update_push_name(&push.jid, &push.new_push_name);
    }

    /// Existing thread of a conversation, logging why there is none.
    fn existing_thread(&self, jid: &Jid, what: &str) -> Option<i64> {
        match self.topics.lookup(&jid.to_non_ad().to_string()) {
            Ok(Some(thread_id)) => Some(thread_id),
            Ok(None) => {
                warn!(chat = %jid, "no thread found for chat (handling {} event)", what);
                None
            }
            Err(err) => {
                warn!(chat = %jid, error = %err, "failed to find thread for chat (handling {} event)", what);
                None
            }
        }
    }

    async fn send_to_thread(&self, thread_id: i64, text: &str) {
        let target = SendTarget::new(self.target_chat(), thread_id);
        if let Err(err) = self.dest.send_text(&target, text).await {
            error!(thread_id, error = %err, "failed to send notice to target chat");
        }
    }

    pub(crate) async fn handle_picture(&self, picture: &PictureEvent) {
        let is_group = picture.jid.is_group();
        if !is_group && !picture.jid.is_user() {
            warn!(jid = %picture.jid, "picture event for unknown jid type");
            return;
        }
        let Some(thread_id) = self.existing_thread(&picture.jid, "picture") else {
            return;
        };

        let changer = if is_group {
            match &picture.author {
                Some(author) => Some(self.identity.contact_name(author).await),
                None => Some(picture.jid.to_string()),
            }
        } else {
            None
        };

        if picture.remove {
            self.send_to_thread(thread_id, &render::picture_removed_notice(changer.as_deref()))
                .await;
            return;
        }

        let url = match self.source.get_profile_picture_url(&picture.jid).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                error!(jid = %picture.jid, "profile picture info came back empty");
                return;
            }
            Err(err) => {
                error!(jid = %picture.jid, error = %err, "failed to get profile picture info");
                return;
            }
        };
        let bytes = match self.source.download_url(&url).await {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(jid = %picture.jid, error = %err, "failed to download profile picture");
                return;
            }
        };

        let target = SendTarget::new(self.target_chat(), thread_id);
        let caption = render::picture_updated_caption(changer.as_deref());
        if let Err(err) = self
            .dest
            .send_photo(&target, NamedFile::new("picture.jpg", bytes), &caption)
            .await
        {
            error!(jid = %picture.jid, error = %err, "failed to send profile picture");
        }
    }

    /// One notice per changed attribute; a name change also renames the thread.
    pub(crate) async fn handle_group_info(&self, group: &GroupInfoEvent) {
        let Some(thread_id) = self.existing_thread(&group.jid, "group info") else {
            return;
        };

        if let Some(announce) = group.announce {
            self.send_to_thread(thread_id, &render::announce_notice(announce)).await;
        }

        if let Some(timer) = group.ephemeral_timer {
            self.send_to_thread(thread_id, &render::ephemeral_notice(timer)).await;
        }

        if let Some(delete) = &group.delete {
            self.send_to_thread(thread_id, &render::group_deleted_notice(&delete.reason))
                .await;
        }

        let changes = [
            (MembershipChange::Join, &group.join, group.join_reason.as_deref()),
            (MembershipChange::Leave, &group.leave, None),
            (MembershipChange::Demote, &group.demote, None),
            (MembershipChange::Promote, &group.promote, None),
        ];
        for (change, members, reason) in changes {
            if members.is_empty() {
                continue;
            }
            let names = self.contact_names(members).await;
            self.send_to_thread(thread_id, &render::membership_notice(change, &names, reason))
                .await;
        }

        if let Some(topic) = &group.topic {
            let changer = self.changer_name(topic.set_by.as_ref()).await;
            self.send_to_thread(thread_id, &render::description_notice(&changer, &topic.topic))
                .await;
        }

        if let Some(name) = &group.name {
            if let Err(err) = self.topics.rename(thread_id, &name.name).await {
                error!(
                    chat = %group.jid,
                    new_name = %name.name,
                    error = %err,
                    "failed to change thread name"
                );
                return;
            }
            self.identity.update_group_name(&group.jid, &name.name);
            let changer = self.changer_name(name.set_by.as_ref()).await;
            self.send_to_thread(thread_id, &render::group_name_notice(&changer, &name.name))
                .await;
        }
    }

    async fn contact_names(&self, members: &[Jid]) -> Vec<String> {
        let mut names = Vec::with_capacity(members.len());
        for member in members {
            names.push(self.identity.contact_name(member).await);
        }
        names
    }

    async fn changer_name(&self, set_by: Option<&Jid>) -> String {
        match set_by {
            Some(jid) => self.identity.contact_name(jid).await,
            None => "someone".to_string(),
        }
    }

    /// Calls go to a shared thread which, unlike conversation threads, is created on demand.
    pub(crate) async fn handle_call_offer(&self, call: &CallOfferEvent) {
        let caller = self.identity.contact_name(&call.call_creator).await;
        let thread_id = match self.topics.resolve(CALLS_KEY, CALLS_KEY).await {
            Ok(thread_id) => thread_id,
            Err(err) => {
                self.report_error("Failed to create/retrieve corresponding thread id for calls", &err)
                    .await;
                return;
            }
        };
        let at = render::format_timestamp(call.timestamp, self.render_opts.tz, &self.render_opts.time_format);
        debug!(call_id = %call.call_id, caller = %caller, "incoming call");
        self.send_to_thread(thread_id, &render::call_notice(&caller, &at)).await;
    }
}
