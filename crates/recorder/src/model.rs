//! Conversation record model (§3): `{user_id, source, content,
//! occurred_at}`, unique on the full tuple — a duplicate insert is
//! silently ignored via `INSERT IGNORE` against a composite key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of the conversation a row represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationSource {
    Ai,
    User,
}

impl ConversationSource {
    /// The MySQL `ENUM('ai','user')` literal this variant maps to.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ConversationSource::Ai => "ai",
            ConversationSource::User => "user",
        }
    }
}

/// A single conversation row ready for insertion.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConversationRow {
    pub user_id: String,
    pub source: String,
    pub content: String,
    pub occurred_at: DateTime<Utc>,
}

impl ConversationRow {
    pub fn new(
        user_id: impl Into<String>,
        source: ConversationSource,
        content: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            source: source.as_db_str().to_string(),
            content: content.into(),
            occurred_at,
        }
    }
}

/// The wire payload for a single record's value: a JSON array of Q/A
/// pairs (§4.6 step 3).
#[derive(Debug, Clone, Deserialize)]
pub struct QaPair {
    #[serde(rename = "Q", default)]
    pub q: String,
    #[serde(rename = "A", default)]
    pub a: String,
}

/// Expands a batch of Q/A pairs into rows (§4.6 step 4): each non-empty
/// trimmed `Q` yields one `ai` row, each non-empty `A` yields one `user`
/// row, in source order.
pub fn expand_rows(
    user_id: &str,
    pairs: &[QaPair],
    occurred_at: DateTime<Utc>,
) -> Vec<ConversationRow> {
    let mut rows = Vec::with_capacity(pairs.len() * 2);
    for pair in pairs {
        let q = pair.q.trim();
        if !q.is_empty() {
            rows.push(ConversationRow::new(
                user_id,
                ConversationSource::Ai,
                q,
                occurred_at,
            ));
        }
        let a = pair.a.trim();
        if !a.is_empty() {
            rows.push(ConversationRow::new(
                user_id,
                ConversationSource::User,
                a,
                occurred_at,
            ));
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_rows_skips_empty_fields() {
        let pairs = vec![
            QaPair { q: "hello".into(), a: "".into() },
            QaPair { q: "  ".into(), a: "hi there".into() },
        ];
        let rows = expand_rows("user-1", &pairs, Utc::now());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].source, "ai");
        assert_eq!(rows[0].content, "hello");
        assert_eq!(rows[1].source, "user");
        assert_eq!(rows[1].content, "hi there");
    }

    #[test]
    fn empty_batch_expands_to_no_rows() {
        let rows = expand_rows("user-1", &[], Utc::now());
        assert!(rows.is_empty());
    }
}
