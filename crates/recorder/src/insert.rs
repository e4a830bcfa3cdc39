//! Batched `INSERT IGNORE` sub-batch logic (§4.6 step 5, "Idempotency").

use pipeline_core::error::RecorderError;
use pipeline_core::timezone::to_pipeline_zone;
use sqlx::MySqlPool;
use tracing::debug;

use crate::model::ConversationRow;

/// Result of inserting one sub-batch: `rows_affected()` vs. the submitted
/// row count distinguishes `inserted` from `ignored` duplicates.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertOutcome {
    pub inserted: u64,
    pub ignored: u64,
}

impl InsertOutcome {
    fn add(&mut self, other: InsertOutcome) {
        self.inserted += other.inserted;
        self.ignored += other.ignored;
    }
}

/// Inserts `rows` in sub-batches of `sub_batch_size`, using `INSERT
/// IGNORE` against the `(user_id, source, content, occurred_at)`
/// composite unique key.
pub async fn insert_rows(
    pool: &MySqlPool,
    rows: &[ConversationRow],
    sub_batch_size: usize,
) -> Result<InsertOutcome, RecorderError> {
    let mut outcome = InsertOutcome::default();
    if rows.is_empty() {
        return Ok(outcome);
    }

    for chunk in rows.chunks(sub_batch_size.max(1)) {
        outcome.add(insert_sub_batch(pool, chunk).await?);
    }

    Ok(outcome)
}

async fn insert_sub_batch(
    pool: &MySqlPool,
    rows: &[ConversationRow],
) -> Result<InsertOutcome, RecorderError> {
    let mut query = String::from(
        "INSERT IGNORE INTO conversations (user_id, source, content, occurred_at) VALUES ",
    );
    for i in 0..rows.len() {
        if i > 0 {
            query.push(',');
        }
        query.push_str("(?, ?, ?, ?)");
    }

    let mut q = sqlx::query(&query);
    for row in rows {
        // The `occurred_at` column is a timezone-naive DATETIME(3); bind the
        // pipeline zone's local wall-clock reading of the instant, not the
        // raw UTC fields (§9 "Timezone normalization").
        let occurred_at_local = to_pipeline_zone(row.occurred_at).naive_local();
        q = q
            .bind(&row.user_id)
            .bind(&row.source)
            .bind(&row.content)
            .bind(occurred_at_local);
    }

    let result = q.execute(pool).await?;
    let inserted = result.rows_affected();
    let submitted = rows.len() as u64;
    let ignored = submitted.saturating_sub(inserted);

    debug!(
        submitted,
        inserted, ignored, "conversations sub-batch inserted"
    );

    Ok(InsertOutcome { inserted, ignored })
}
