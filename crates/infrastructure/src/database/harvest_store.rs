use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use harvester_crawler::{BatchOutcome, HarvestRecord, HarvestStore};
use harvester_domain::CrawlerResult;

/// 采集结果的SQLite落库实现
///
/// (source, natural_key)唯一约束保证幂等，重复记录计入skipped
pub struct SqliteHarvestStore {
    pool: SqlitePool,
}

impl SqliteHarvestStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn count_by_source(&self, source: &str) -> CrawlerResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM harvest_records WHERE source = ?")
                .bind(source)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[async_trait]
impl HarvestStore for SqliteHarvestStore {
    async fn save_batch(
        &self,
        source: &str,
        records: &[HarvestRecord],
    ) -> CrawlerResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for record in records {
            let payload = match serde_json::to_string(&record.payload) {
                Ok(payload) => payload,
                Err(e) => {
                    debug!("记录 {} 序列化失败: {}", record.natural_key, e);
                    outcome.failed += 1;
                    continue;
                }
            };
            let result = sqlx::query(
                "INSERT OR IGNORE INTO harvest_records (source, natural_key, payload) VALUES (?, ?, ?)",
            )
            .bind(source)
            .bind(&record.natural_key)
            .bind(&payload)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                outcome.saved += 1;
            } else {
                outcome.skipped += 1;
            }
        }

        debug!(
            "{}批次落库: 保存{}条, 跳过{}条, 失败{}条",
            source, outcome.saved, outcome.skipped, outcome.failed
        );
        Ok(outcome)
    }
}
