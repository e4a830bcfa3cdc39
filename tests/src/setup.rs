//! Common test setup: a real MySQL testcontainer wired to the recorder
//! crate, with the broker's DLQ sink mocked.

use std::sync::Arc;

use recorder::{RecorderClient, RecorderConfig};

use crate::containers::TestContainers;
use crate::mocks::MockDlqSink;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
    user_id VARCHAR(191) NOT NULL,
    source ENUM('ai', 'user') NOT NULL,
    content TEXT NOT NULL,
    occurred_at DATETIME(3) NOT NULL,
    UNIQUE KEY uq_conversation (user_id, source, content(255), occurred_at)
)
"#;

/// Test context wiring a real MySQL container to the recorder pipeline,
/// with a capturing mock in place of the real DLQ producer.
pub struct TestContext {
    pub containers: TestContainers,
    pub recorder_config: RecorderConfig,
    pub recorder_client: Arc<RecorderClient>,
    pub dlq: Arc<MockDlqSink>,
}

impl TestContext {
    pub async fn new() -> Self {
        let containers = TestContainers::start().await;

        let recorder_config = RecorderConfig::new(containers.mysql_url.clone());
        let recorder_client = Arc::new(
            RecorderClient::connect(&recorder_config)
                .await
                .expect("failed to connect recorder client"),
        );

        sqlx::query(SCHEMA_SQL)
            .execute(recorder_client.pool())
            .await
            .expect("failed to create conversations schema");

        let dlq = Arc::new(MockDlqSink::new());

        Self {
            containers,
            recorder_config,
            recorder_client,
            dlq,
        }
    }

    pub async fn truncate(&self) {
        sqlx::query("TRUNCATE TABLE conversations")
            .execute(self.recorder_client.pool())
            .await
            .expect("failed to truncate conversations");
    }

    pub async fn conversation_count(&self, user_id: &str) -> i64 {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversations WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.recorder_client.pool())
            .await
            .expect("count query failed");
        row.0
    }
}
