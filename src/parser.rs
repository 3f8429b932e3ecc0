//! Raw message parsing into normalized records
//!
//! A pure transform: one [`RawMessage`] in, one [`NewRecord`] out, or a
//! [`ParseError`] for shapes the store cannot represent. Absent optional
//! fields are never an error.

use crate::db::NewRecord;
use crate::error::ParseError;
use crate::types::{RawMessage, RawSender};

/// Stateless parser for raw source messages
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageParser;

impl MessageParser {
    /// Format used for the stored `date` column
    pub const DATE_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";

    /// Parse one raw message into a normalized record
    pub fn parse(message: &RawMessage) -> Result<NewRecord, ParseError> {
        if message.id <= 0 {
            return Err(ParseError::InvalidId(message.id));
        }

        let (sender_id, sender_name, sender_handle) = Self::parse_sender(message.sender.as_ref());

        Ok(NewRecord {
            message_id: message.id,
            date: message.date.format(Self::DATE_FORMAT).to_string(),
            sender_id,
            sender_name,
            sender_handle,
            body: message.text.clone(),
            attachment_kind: message.attachment.as_ref().map(|a| a.kind),
            attachment_path: None,
            reply_to_id: message.reply_to_id,
            author_signature: message.author_signature.clone(),
            view_count: message.view_count,
            forward_count: message.forward_count,
            reactions: Self::parse_reactions(message),
        })
    }

    /// Sender resolution: only user-like senders contribute name and handle
    fn parse_sender(sender: Option<&RawSender>) -> (i64, Option<String>, Option<String>) {
        match sender {
            Some(s) if s.is_user => (s.id, s.display_name.clone(), s.handle.clone()),
            Some(s) => (s.id, None, None),
            None => (0, None, None),
        }
    }

    /// Compact textual reaction encoding: `"<symbol> <count>"` pairs in
    /// source order, space-joined; an empty set maps to `None`
    fn parse_reactions(message: &RawMessage) -> Option<String> {
        let parts: Vec<String> = message
            .reactions
            .iter()
            .filter(|r| !r.symbol.is_empty())
            .map(|r| format!("{} {}", r.symbol, r.count))
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}
