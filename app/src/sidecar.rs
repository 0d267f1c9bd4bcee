//! Source client backed by a sidecar process speaking newline-delimited JSON.
//!
//! The sidecar owns the actual WhatsApp session. It pushes `event` frames on its
//! own and answers each request with a `response` frame carrying the same id.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use thread_relay_core::clients::{OutgoingSourceMessage, SourceClient};
use thread_relay_core::event::{Event, MediaRef};
use thread_relay_core::{CoreError, Jid};

use crate::sidecar_ipc::{
    BytesResponse, ContactNameResponse, DownloadMediaRequest, Frame, GroupNameResponse, JidRequest, OwnIdResponse,
    ParticipantsResponse, ProfilePictureResponse, Request, SendMessageRequest, SendMessageResponse, UrlRequest,
    CMD_CONTACT_NAME, CMD_DOWNLOAD_MEDIA, CMD_DOWNLOAD_URL, CMD_GROUP_NAME, CMD_GROUP_PARTICIPANTS, CMD_OWN_ID,
    CMD_PROFILE_PICTURE, CMD_SEND_MESSAGE, CMD_SHUTDOWN,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const EVENT_BUFFER: usize = 256;

#[derive(Debug)]
struct Reply {
    ok: bool,
    payload: Option<serde_json::Value>,
    error: Option<String>,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

pub struct SidecarSource {
    child: tokio::sync::Mutex<Child>,
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: Pending,
    next_id: AtomicU64,
    own: Jid,
}

impl SidecarSource {
    /// Starts the sidecar and asks it who the bridge is logged in as.
    pub async fn spawn(command: &[String]) -> Result<(Self, mpsc::Receiver<Event>), CoreError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| CoreError::Config("sidecar command is empty".to_string()))?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CoreError::network(format!("spawn {} failed: {}", program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CoreError::network("sidecar stdin missing"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CoreError::network("sidecar stdout missing"))?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        start_reader_task(stdout, Arc::clone(&pending), events_tx);

        let mut source = Self {
            child: tokio::sync::Mutex::new(child),
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            own: Jid::user(""),
        };
        let own: OwnIdResponse = source.call(CMD_OWN_ID, &serde_json::json!({})).await?;
        debug!(own_id = %own.jid, "sidecar ready");
        source.own = own.jid;
        Ok((source, events_rx))
    }

    async fn request(&self, cmd: &str, payload: serde_json::Value, wait: Duration) -> Result<Reply, CoreError> {
        let start = Instant::now();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let inflight = {
            let mut guard = self
                .pending
                .lock()
                .map_err(|_| CoreError::network("pending lock poisoned"))?;
            guard.insert(id, tx);
            guard.len()
        };
        let request = Request {
            id,
            cmd: cmd.to_string(),
            payload,
        };
        let mut line = serde_json::to_string(&request).map_err(|e| CoreError::network(e.to_string()))?;
        line.push('\n');
        {
            let mut stdin = self.stdin.lock().await;
            let written = match stdin.write_all(line.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(err) => Err(err),
            };
            if let Err(err) = written {
                self.forget(id);
                return Err(CoreError::network(format!("write to sidecar failed: {}", err)));
            }
        }

        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(reply)) => {
                debug!(cmd, ok = reply.ok, ms = start.elapsed().as_millis() as u64, inflight, "sidecar request");
                Ok(reply)
            }
            Ok(Err(_)) => {
                warn!(cmd, inflight, "sidecar exited before answering");
                Err(CoreError::network(format!("sidecar closed while waiting for {}", cmd)))
            }
            Err(_) => {
                self.forget(id);
                warn!(cmd, ms = start.elapsed().as_millis() as u64, inflight, "sidecar request timed out");
                Err(CoreError::network(format!("sidecar timeout on {}", cmd)))
            }
        }
    }

    fn forget(&self, id: u64) {
        if let Ok(mut guard) = self.pending.lock() {
            guard.remove(&id);
        }
    }

    async fn call<P, R>(&self, cmd: &str, payload: &P) -> Result<R, CoreError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_value(payload).map_err(|e| CoreError::network(e.to_string()))?;
        let reply = self.request(cmd, payload, REQUEST_TIMEOUT).await?;
        if !reply.ok {
            let reason = reply.error.unwrap_or_else(|| "unknown error".to_string());
            return Err(CoreError::network(format!("sidecar {} failed: {}", cmd, reason)));
        }
        let payload = reply
            .payload
            .ok_or_else(|| CoreError::network(format!("sidecar {} returned no payload", cmd)))?;
        serde_json::from_value(payload).map_err(|e| CoreError::network(format!("bad {} payload: {}", cmd, e)))
    }

    async fn call_bytes<P: Serialize>(&self, cmd: &str, payload: &P) -> Result<Vec<u8>, CoreError> {
        let response: BytesResponse = self.call(cmd, payload).await?;
        BASE64_STANDARD
            .decode(response.data.as_bytes())
            .map_err(|e| CoreError::network(format!("bad {} data: {}", cmd, e)))
    }

    /// Asks the sidecar to log out cleanly, then makes sure it is gone.
    pub async fn shutdown(&self) {
        if let Err(err) = self.request(CMD_SHUTDOWN, serde_json::json!({}), SHUTDOWN_TIMEOUT).await {
            debug!(error = %err, "sidecar did not acknowledge shutdown");
        }
        let mut child = self.child.lock().await;
        if let Err(err) = child.kill().await {
            debug!(error = %err, "sidecar already exited");
        }
    }
}

fn start_reader_task(stdout: ChildStdout, pending: Pending, events: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    error!(error = %err, "failed to read from sidecar");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Frame>(&line) {
                Ok(Frame::Event { event }) => {
                    if events.send(event).await.is_err() {
                        debug!("event receiver dropped, stopping sidecar reader");
                        break;
                    }
                }
                Ok(Frame::Response {
                    id,
                    ok,
                    payload,
                    error,
                }) => {
                    let waiter = pending.lock().ok().and_then(|mut guard| guard.remove(&id));
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(Reply { ok, payload, error });
                        }
                        None => debug!(id, "response for unknown or expired request"),
                    }
                }
                Err(err) => warn!(error = %err, "unparsable sidecar frame"),
            }
        }
        warn!("sidecar output closed");
        if let Ok(mut guard) = pending.lock() {
            guard.clear();
        }
    });
}

#[async_trait]
impl SourceClient for SidecarSource {
    fn own_id(&self) -> Jid {
        self.own.clone()
    }

    async fn send_message(&self, chat: &Jid, message: OutgoingSourceMessage) -> Result<String, CoreError> {
        let request = SendMessageRequest {
            chat: chat.clone(),
            text: message.text,
            mentions: message.mentions,
            quoted: message.quoted,
        };
        let response: SendMessageResponse = self.call(CMD_SEND_MESSAGE, &request).await?;
        Ok(response.message_id)
    }

    async fn download_media(&self, media: &MediaRef) -> Result<Vec<u8>, CoreError> {
        self.call_bytes(CMD_DOWNLOAD_MEDIA, &DownloadMediaRequest { media: media.clone() })
            .await
    }

    async fn get_profile_picture_url(&self, subject: &Jid) -> Result<Option<String>, CoreError> {
        let response: ProfilePictureResponse = self
            .call(CMD_PROFILE_PICTURE, &JidRequest { jid: subject.clone() })
            .await?;
        Ok(response.url.filter(|url| !url.is_empty()))
    }

    async fn download_url(&self, url: &str) -> Result<Vec<u8>, CoreError> {
        self.call_bytes(CMD_DOWNLOAD_URL, &UrlRequest { url: url.to_string() })
            .await
    }

    async fn get_contact_name(&self, user: &Jid) -> Result<Option<String>, CoreError> {
        let response: ContactNameResponse = self.call(CMD_CONTACT_NAME, &JidRequest { jid: user.clone() }).await?;
        Ok(response.name.filter(|name| !name.trim().is_empty()))
    }

    async fn get_group_name(&self, group: &Jid) -> Result<String, CoreError> {
        let response: GroupNameResponse = self.call(CMD_GROUP_NAME, &JidRequest { jid: group.clone() }).await?;
        Ok(response.name)
    }

    async fn get_group_participants(&self, group: &Jid) -> Result<Vec<Jid>, CoreError> {
        let response: ParticipantsResponse = self
            .call(CMD_GROUP_PARTICIPANTS, &JidRequest { jid: group.clone() })
            .await?;
        Ok(response.participants)
    }
}
