//! Build status report payloads.
//!
//! One reporter type holding an optional relation to a previous message,
//! plus a pure mapping from (relation, message) to the outgoing payload
//! shape. The transport that delivers payloads is out of scope here; they
//! are logged and handed back to the caller.

use serde::Serialize;
use tracing::info;

/// How a report relates to a previously posted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// Start a thread under the given root key
    ThreadRoot { thread_key: String },
    /// Replace the body of an earlier message
    EditTarget { message_id: String },
    /// Attach a reaction to an earlier message
    ReactionTarget { message_id: String, emoji: String },
}

/// Outgoing payload shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportPayload {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_of: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub react_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

/// Pure mapping from relation and message to the payload shape
pub fn payload(relation: Option<&Relation>, message: &str) -> ReportPayload {
    let mut out = ReportPayload {
        text: message.to_string(),
        thread_key: None,
        edit_of: None,
        react_to: None,
        emoji: None,
    };
    match relation {
        None => {}
        Some(Relation::ThreadRoot { thread_key }) => out.thread_key = Some(thread_key.clone()),
        Some(Relation::EditTarget { message_id }) => out.edit_of = Some(message_id.clone()),
        Some(Relation::ReactionTarget { message_id, emoji }) => {
            out.react_to = Some(message_id.clone());
            out.emoji = Some(emoji.clone());
        }
    }
    out
}

/// Emits build reports, optionally related to a previous message
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    relation: Option<Relation>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relation(relation: Relation) -> Self {
        Self {
            relation: Some(relation),
        }
    }

    /// All reports of one build cycle thread under a shared key
    pub fn thread(thread_key: impl Into<String>) -> Self {
        Self::with_relation(Relation::ThreadRoot {
            thread_key: thread_key.into(),
        })
    }

    pub fn post(&self, message: &str) -> ReportPayload {
        let out = payload(self.relation.as_ref(), message);
        info!(target: "report", relation = ?self.relation, "{}", message);
        out
    }
}
