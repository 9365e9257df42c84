//! Outbound message pipeline.
//!
//! Validates, encrypts and submits a message, then brings the active chat
//! and the directory up to date, in that order. The compose draft survives
//! any failure.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use parley_shared::constants::MAX_FILE_SIZE;
use parley_shared::types::{Attachment, ChatId, Message};
use parley_shared::MessageCipher;

use crate::api::OutgoingMessage;
use crate::directory::ChatDirectory;
use crate::error::{ClientError, Result};
use crate::messages::MessageStream;
use crate::transport::Transport;

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// What the user is composing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub text: String,
    pub attachment: Option<Attachment>,
}

impl Draft {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachment.is_none()
    }
}

pub struct OutboundPipeline {
    transport: Transport,
    messages: Arc<MessageStream>,
    directory: Arc<ChatDirectory>,
    cipher: MessageCipher,
    draft: Mutex<Draft>,
}

impl OutboundPipeline {
    pub fn new(
        transport: Transport,
        messages: Arc<MessageStream>,
        directory: Arc<ChatDirectory>,
        cipher: MessageCipher,
    ) -> Self {
        Self {
            transport,
            messages,
            directory,
            cipher,
            draft: Mutex::new(Draft::default()),
        }
    }

    fn draft_guard(&self) -> MutexGuard<'_, Draft> {
        self.draft.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn send(
        &self,
        chat_id: ChatId,
        text: Option<&str>,
        attachment: Option<Attachment>,
    ) -> Result<Message> {
        let result = self.submit(chat_id, text, attachment).await;
        self.transport.context().events().reported(result)
    }

    async fn submit(
        &self,
        chat_id: ChatId,
        text: Option<&str>,
        attachment: Option<Attachment>,
    ) -> Result<Message> {
        let text = text.map(str::trim).filter(|t| !t.is_empty());
        let attachment = attachment.filter(|a| !a.is_empty());

        if text.is_none() && attachment.is_none() {
            return Err(ClientError::validation("Message is empty"));
        }
        if !self.transport.context().is_active(chat_id) {
            return Err(ClientError::validation("Open the chat before sending"));
        }
        if let Some(file) = &attachment {
            check_size(file.len())?;
        }

        // Attachments go out as-is; only the text body is encrypted.
        let content = text.map(|t| self.cipher.encrypt(t)).transpose()?;
        let outgoing = OutgoingMessage {
            chat_id,
            content,
            attachment,
        };
        let sent = self.transport.send_message(&outgoing).await?.value;
        tracing::info!(chat_id = %chat_id, message_id = %sent.id, "Message sent");

        self.clear_draft();

        if let Err(e) = self.messages.load(chat_id, self.messages.limit()).await {
            tracing::debug!(error = %e, "Reload after send failed");
        }
        if let Err(e) = self.directory.refresh().await {
            tracing::debug!(error = %e, "Directory refresh after send failed");
        }

        Ok(sent)
    }

    pub fn draft(&self) -> Draft {
        self.draft_guard().clone()
    }

    pub fn set_draft_text(&self, text: impl Into<String>) {
        self.draft_guard().text = text.into();
    }

    pub fn attach(&self, file: Attachment) -> Result<()> {
        check_size(file.len())?;
        self.draft_guard().attachment = Some(file);
        Ok(())
    }

    pub fn clear_draft(&self) {
        *self.draft_guard() = Draft::default();
    }

    /// Send whatever is composed to `chat_id`.
    pub async fn send_draft(&self, chat_id: ChatId) -> Result<Message> {
        let draft = self.draft();
        self.send(chat_id, Some(&draft.text), draft.attachment)
            .await
    }
}

fn check_size(len: usize) -> Result<()> {
    if len > MAX_FILE_SIZE {
        return Err(ClientError::validation(format!(
            "File exceeds the {} MiB limit",
            MAX_FILE_SIZE / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Read a file for upload. The MIME type is sniffed from the content.
pub async fn load_attachment(path: &Path) -> Result<Attachment> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(ClientError::validation(format!(
            "{} is not a file",
            path.display()
        )));
    }
    check_size(usize::try_from(metadata.len()).unwrap_or(usize::MAX))?;

    let bytes = tokio::fs::read(path).await?;
    let mime_type = infer::get(&bytes)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string());
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("file")
        .to_string();

    tracing::debug!(file = %file_name, mime = %mime_type, len = bytes.len(), "Attachment loaded");

    Ok(Attachment {
        file_name,
        mime_type,
        bytes,
    })
}
