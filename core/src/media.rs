//! Media transfer: download from the source, upload to the destination.
//!
//! Every failure short of the final notice send degrades to a text notice in
//! the conversation's thread, so the operator always sees that something arrived.

use std::io::Cursor;
use std::sync::Arc;

use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::webp::WebPDecoder;
use image::AnimationDecoder;
use tracing::{debug, warn};

use crate::clients::{DestinationClient, NamedFile, SendTarget, SentMessage, SourceClient};
use crate::config::BridgeConfig;
use crate::error::CoreError;
use crate::render::{MediaJob, MediaKind};

/// Hosted Bot API upload ceiling.
pub const UPLOAD_SIZE_LIMIT: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct MediaPolicy {
    pub skip_images: bool,
    pub skip_gifs: bool,
    pub skip_videos: bool,
    pub skip_voice_notes: bool,
    pub skip_audios: bool,
    pub skip_documents: bool,
    pub skip_stickers: bool,
    pub self_hosted_api: bool,
}

impl MediaPolicy {
    pub fn from_config(config: &BridgeConfig) -> Self {
        let wa = &config.whatsapp;
        Self {
            skip_images: wa.skip_images,
            skip_gifs: wa.skip_gifs,
            skip_videos: wa.skip_videos,
            skip_voice_notes: wa.skip_voice_notes,
            skip_audios: wa.skip_audios,
            skip_documents: wa.skip_documents,
            skip_stickers: wa.skip_stickers,
            self_hosted_api: config.telegram.self_hosted_api,
        }
    }

    pub fn is_skipped(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Image => self.skip_images,
            MediaKind::Gif => self.skip_gifs,
            MediaKind::Video => self.skip_videos,
            MediaKind::VoiceNote => self.skip_voice_notes,
            MediaKind::Audio => self.skip_audios,
            MediaKind::Document => self.skip_documents,
            MediaKind::Sticker => self.skip_stickers,
        }
    }

    /// `None` when uploads are not size-limited.
    pub fn size_limit(&self) -> Option<u64> {
        if self.self_hosted_api {
            None
        } else {
            Some(UPLOAD_SIZE_LIMIT)
        }
    }
}

pub fn skipped_note(label: &str, flag: &str) -> String {
    format!("\nSkipping {} because '{}' set in config file", label, flag)
}

pub fn too_large_note(kind: MediaKind) -> String {
    format!(
        "\nCouldn't send the {} as it exceeds Telegram size restrictions.",
        kind.noun()
    )
}

pub fn download_failed_note(kind: MediaKind) -> String {
    format!("\nCouldn't download the {} due to some errors", kind.noun())
}

pub fn upload_failed_note(kind: MediaKind) -> String {
    format!("\nCouldn't upload the {} due to some errors", kind.noun())
}

pub struct MediaPipeline {
    source: Arc<dyn SourceClient>,
    dest: Arc<dyn DestinationClient>,
    policy: MediaPolicy,
}

impl MediaPipeline {
    pub fn new(source: Arc<dyn SourceClient>, dest: Arc<dyn DestinationClient>, policy: MediaPolicy) -> Self {
        Self { source, dest, policy }
    }

    pub fn policy(&self) -> &MediaPolicy {
        &self.policy
    }

    /// Moves one attachment. `Ok(None)` means nothing was posted at all, which
    /// only happens for attachments without a retrievable reference.
    pub async fn transfer(
        &self,
        job: &MediaJob,
        header: &str,
        target: &SendTarget,
    ) -> Result<Option<SentMessage>, CoreError> {
        if !job.media.is_retrievable() {
            debug!(kind = ?job.kind, "attachment has no retrievable reference, skipping");
            return Ok(None);
        }

        if self.policy.is_skipped(job.kind) {
            let note = skipped_note(job.kind.skip_label(), job.kind.skip_flag());
            return self.notice(target, header, &note).await.map(Some);
        }

        if let Some(limit) = self.policy.size_limit() {
            if job.media.file_length > limit {
                debug!(kind = ?job.kind, size = job.media.file_length, limit, "attachment exceeds upload limit");
                return self.notice(target, header, &too_large_note(job.kind)).await.map(Some);
            }
        }

        let bytes = match self.source.download_media(&job.media).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(kind = ?job.kind, error = %err, "attachment download failed");
                return self
                    .notice(target, header, &download_failed_note(job.kind))
                    .await
                    .map(Some);
            }
        };

        match self.upload(job, header, target, bytes).await {
            Ok(sent) => Ok(Some(sent)),
            Err(err) => {
                warn!(kind = ?job.kind, error = %err, "attachment upload failed");
                self.notice(target, header, &upload_failed_note(job.kind))
                    .await
                    .map(Some)
            }
        }
    }

    async fn upload(
        &self,
        job: &MediaJob,
        header: &str,
        target: &SendTarget,
        bytes: Vec<u8>,
    ) -> Result<SentMessage, CoreError> {
        let caption = format!("{}{}", header, job.caption);
        let file = NamedFile::new(job.file_name.clone(), bytes);
        match job.kind {
            MediaKind::Image => self.dest.send_photo(target, file, &caption).await,
            MediaKind::Gif => {
                self.dest
                    .send_animation(target, NamedFile::new("animation.gif", file.bytes), &caption)
                    .await
            }
            MediaKind::Video => self.dest.send_video(target, file, &caption).await,
            MediaKind::VoiceNote | MediaKind::Audio => {
                self.dest
                    .send_audio(target, file, &caption, job.duration_secs)
                    .await
            }
            MediaKind::Document => self.dest.send_document(target, file, &caption).await,
            MediaKind::Sticker if job.transcode => self.send_animated_sticker(target, file, &caption).await,
            MediaKind::Sticker => self.dest.send_sticker(target, file).await,
        }
    }

    async fn send_animated_sticker(
        &self,
        target: &SendTarget,
        file: NamedFile,
        caption: &str,
    ) -> Result<SentMessage, CoreError> {
        let source = file.bytes.clone();
        let converted = tokio::task::spawn_blocking(move || {
            std::panic::catch_unwind(|| transcode_animated_webp_to_gif(&source))
                .map_err(|_| CoreError::Transcode("sticker conversion panicked".to_string()))?
        })
        .await
        .map_err(|e| CoreError::Transcode(e.to_string()))
        .and_then(|result| result);

        match converted {
            Ok(gif) => {
                self.dest
                    .send_animation(target, NamedFile::new("animation.gif", gif), caption)
                    .await
            }
            Err(err) => {
                warn!(error = %err, "animated sticker conversion failed, sending as sticker");
                self.dest.send_sticker(target, file).await
            }
        }
    }

    async fn notice(&self, target: &SendTarget, header: &str, note: &str) -> Result<SentMessage, CoreError> {
        let target = target.clone().with_button(None);
        self.dest.send_text(&target, &format!("{}{}", header, note)).await
    }
}

/// Re-encodes every frame of an animated WebP as a looping GIF.
pub fn transcode_animated_webp_to_gif(bytes: &[u8]) -> Result<Vec<u8>, CoreError> {
    let decoder = WebPDecoder::new(Cursor::new(bytes)).map_err(|e| CoreError::Transcode(e.to_string()))?;
    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| CoreError::Transcode(e.to_string()))?;
    if frames.is_empty() {
        return Err(CoreError::Transcode("sticker has no frames".to_string()));
    }

    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut out);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| CoreError::Transcode(e.to_string()))?;
        encoder
            .encode_frames(frames)
            .map_err(|e| CoreError::Transcode(e.to_string()))?;
    }
    Ok(out)
}
