//! Per-session conversation history.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use ihos_core::error::IhosError;

use crate::documents::{Document, DocumentStore, Update};

pub const CONVERSATION_COLLECTION: &str = "conversations";

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            ts: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            ts: None,
        }
    }
}

/// Conversation log stored as one document per session with a `messages` array.
#[derive(Clone)]
pub struct ConversationLog {
    store: Arc<dyn DocumentStore>,
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn session_filter(session_id: &str) -> Document {
    let mut filter = Document::new();
    filter.insert("session_id".to_string(), json!(session_id));
    filter
}

impl ConversationLog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// The last `limit` messages of a session, oldest first. `limit == 0` returns all.
    pub fn get_history(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>, IhosError> {
        let Some(doc) = self
            .store
            .find_one(CONVERSATION_COLLECTION, &session_filter(session_id))?
        else {
            return Ok(Vec::new());
        };

        let messages: Vec<ChatMessage> = match doc.get("messages") {
            Some(value @ Value::Array(_)) => serde_json::from_value(value.clone())?,
            _ => Vec::new(),
        };

        if limit == 0 || messages.len() <= limit {
            return Ok(messages);
        }
        Ok(messages[messages.len() - limit..].to_vec())
    }

    /// Append messages, stamping `ts` where missing. Creates the session on first use.
    pub fn append_messages(
        &self,
        session_id: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<(), IhosError> {
        let now = now_iso();
        let stamped = messages
            .into_iter()
            .map(|mut m| {
                if m.ts.is_none() {
                    m.ts = Some(now.clone());
                }
                serde_json::to_value(m)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let count = stamped.len();

        let update = Update::default()
            .set("updated_at", json!(now))
            .push_each("messages", stamped);
        self.store.update_one(
            CONVERSATION_COLLECTION,
            &session_filter(session_id),
            &update,
            true,
        )?;
        debug!(session_id, count, "appended conversation messages");
        Ok(())
    }

    /// Empty a session's message list.
    pub fn clear_history(&self, session_id: &str) -> Result<(), IhosError> {
        let update = Update::default()
            .set("messages", json!([]))
            .set("updated_at", json!(now_iso()));
        self.store.update_one(
            CONVERSATION_COLLECTION,
            &session_filter(session_id),
            &update,
            true,
        )?;
        Ok(())
    }
}
