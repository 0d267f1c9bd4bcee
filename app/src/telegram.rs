//! Destination client over the Telegram Bot API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use thread_relay_core::clients::{
    ContactPayload, DestinationClient, LocationPayload, NamedFile, SendTarget, SentMessage, UrlButton,
};
use thread_relay_core::config::TelegramConfig;
use thread_relay_core::CoreError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const PARSE_MODE: &str = "HTML";

pub struct TelegramClient {
    client: Client,
    api_url: String,
    bot_token: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, CoreError> {
        if config.bot_token.trim().is_empty() {
            return Err(CoreError::Config("telegram bot token cannot be empty".into()));
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CoreError::network(format!("http client setup failed: {}", e)))?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.bot_token, method)
    }

    async fn post_json<T: DeserializeOwned>(&self, method: &str, payload: &Value) -> Result<T, CoreError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(payload)
            .send()
            .await
            .map_err(|e| request_failed(method, e))?;
        let resp: TelegramResponse<T> = response.json().await.map_err(|e| request_failed(method, e))?;
        into_result(method, resp)
    }

    async fn post_form<T: DeserializeOwned>(&self, method: &str, form: Form) -> Result<T, CoreError> {
        let response = self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|e| request_failed(method, e))?;
        let resp: TelegramResponse<T> = response.json().await.map_err(|e| request_failed(method, e))?;
        into_result(method, resp)
    }

    async fn send_json(&self, method: &str, target: &SendTarget, fields: Value) -> Result<SentMessage, CoreError> {
        let mut payload = target_json(target);
        merge(&mut payload, fields);
        let msg: TelegramMessage = self.post_json(method, &payload).await?;
        Ok(msg.sent(target))
    }

    /// Uploads one file under `field`, alongside the usual target and caption fields.
    async fn upload(
        &self,
        method: &str,
        field: &'static str,
        target: &SendTarget,
        file: NamedFile,
        caption: Option<&str>,
        extra: &[(&'static str, String)],
    ) -> Result<SentMessage, CoreError> {
        let size = file.bytes.len();
        let mut form = target_form(target)?;
        if let Some(caption) = caption.filter(|c| !c.is_empty()) {
            form = form.text("caption", caption.to_string()).text("parse_mode", PARSE_MODE);
        }
        for (key, value) in extra {
            form = form.text(*key, value.clone());
        }
        let part = Part::bytes(file.bytes).file_name(file.file_name.clone());
        form = form.part(field, part);
        debug!(method, file_name = %file.file_name, size, "uploading file");
        let msg: TelegramMessage = self.post_form(method, form).await?;
        Ok(msg.sent(target))
    }
}

fn request_failed(method: &str, err: reqwest::Error) -> CoreError {
    CoreError::network(format!("telegram {} request failed: {}", method, err))
}

fn into_result<T>(method: &str, resp: TelegramResponse<T>) -> Result<T, CoreError> {
    if !resp.ok {
        return Err(CoreError::network(format!(
            "telegram {} failed: {}",
            method,
            resp.description.unwrap_or_else(|| "unknown error".into())
        )));
    }
    resp.result
        .ok_or_else(|| CoreError::network(format!("telegram {} response missing result", method)))
}

fn button_markup(button: &UrlButton) -> Value {
    json!({
        "inline_keyboard": [[{ "text": button.text, "url": button.url }]]
    })
}

/// Fields every send carries. Thread `0` is the general thread and is left out.
fn target_json(target: &SendTarget) -> Value {
    let mut payload = json!({ "chat_id": target.chat_id });
    if target.thread_id != 0 {
        payload["message_thread_id"] = Value::from(target.thread_id);
    }
    if let Some(reply_to) = target.reply_to {
        payload["reply_to_message_id"] = Value::from(reply_to);
    }
    if let Some(button) = &target.button {
        payload["reply_markup"] = button_markup(button);
    }
    payload
}

fn target_form(target: &SendTarget) -> Result<Form, CoreError> {
    let mut form = Form::new().text("chat_id", target.chat_id.to_string());
    if target.thread_id != 0 {
        form = form.text("message_thread_id", target.thread_id.to_string());
    }
    if let Some(reply_to) = target.reply_to {
        form = form.text("reply_to_message_id", reply_to.to_string());
    }
    if let Some(button) = &target.button {
        let markup =
            serde_json::to_string(&button_markup(button)).map_err(|e| CoreError::network(e.to_string()))?;
        form = form.text("reply_markup", markup);
    }
    Ok(form)
}

fn merge(payload: &mut Value, fields: Value) {
    if let (Some(base), Value::Object(fields)) = (payload.as_object_mut(), fields) {
        base.extend(fields);
    }
}

#[async_trait]
impl DestinationClient for TelegramClient {
    async fn send_text(&self, target: &SendTarget, text: &str) -> Result<SentMessage, CoreError> {
        self.send_json(
            "sendMessage",
            target,
            json!({
                "text": text,
                "parse_mode": PARSE_MODE,
                "disable_web_page_preview": true,
            }),
        )
        .await
    }

    async fn send_photo(&self, target: &SendTarget, photo: NamedFile, caption: &str) -> Result<SentMessage, CoreError> {
        self.upload("sendPhoto", "photo", target, photo, Some(caption), &[])
            .await
    }

    async fn send_video(&self, target: &SendTarget, video: NamedFile, caption: &str) -> Result<SentMessage, CoreError> {
        self.upload("sendVideo", "video", target, video, Some(caption), &[])
            .await
    }

    async fn send_animation(&self, target: &SendTarget, animation: NamedFile, caption: &str) -> Result<SentMessage, CoreError> {
        self.upload("sendAnimation", "animation", target, animation, Some(caption), &[])
            .await
    }

    async fn send_audio(
        &self,
        target: &SendTarget,
        audio: NamedFile,
        caption: &str,
        duration_secs: u32,
    ) -> Result<SentMessage, CoreError> {
        let extra = if duration_secs > 0 {
            vec![("duration", duration_secs.to_string())]
        } else {
            Vec::new()
        };
        self.upload("sendAudio", "audio", target, audio, Some(caption), &extra)
            .await
    }

    async fn send_document(&self, target: &SendTarget, document: NamedFile, caption: &str) -> Result<SentMessage, CoreError> {
        self.upload("sendDocument", "document", target, document, Some(caption), &[])
            .await
    }

    async fn send_sticker(&self, target: &SendTarget, sticker: NamedFile) -> Result<SentMessage, CoreError> {
        self.upload("sendSticker", "sticker", target, sticker, None, &[])
            .await
    }

    async fn send_contact(&self, target: &SendTarget, contact: &ContactPayload) -> Result<SentMessage, CoreError> {
        self.send_json(
            "sendContact",
            target,
            json!({
                "phone_number": contact.phone_number,
                "first_name": contact.first_name,
                "vcard": contact.vcard,
            }),
        )
        .await
    }

    async fn send_location(&self, target: &SendTarget, location: &LocationPayload) -> Result<SentMessage, CoreError> {
        let mut fields = json!({
            "latitude": location.latitude,
            "longitude": location.longitude,
        });
        if location.horizontal_accuracy > 0.0 {
            fields["horizontal_accuracy"] = Value::from(location.horizontal_accuracy);
        }
        self.send_json("sendLocation", target, fields).await
    }

    async fn create_thread(&self, chat_id: i64, label: &str) -> Result<i64, CoreError> {
        let topic: ForumTopic = self
            .post_json("createForumTopic", &json!({ "chat_id": chat_id, "name": label }))
            .await?;
        debug!(chat_id, thread_id = topic.message_thread_id, name = %topic.name, "created forum topic");
        Ok(topic.message_thread_id)
    }

    async fn rename_thread(&self, chat_id: i64, thread_id: i64, label: &str) -> Result<(), CoreError> {
        let _: bool = self
            .post_json(
                "editForumTopic",
                &json!({ "chat_id": chat_id, "message_thread_id": thread_id, "name": label }),
            )
            .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
    #[serde(default)]
    message_thread_id: Option<i64>,
}

impl TelegramMessage {
    fn sent(&self, target: &SendTarget) -> SentMessage {
        SentMessage {
            message_id: self.message_id,
            thread_id: self.message_thread_id.unwrap_or(target.thread_id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ForumTopic {
    message_thread_id: i64,
    #[serde(default)]
    name: String,
}
