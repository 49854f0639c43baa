use tracing::{info, warn};

/// 连续重复批次检测器
///
/// 在单次爬取的分页循环内使用：法规来源的列表通常按最新在前排序，
/// 一旦连续若干批次全部是已入库数据，后续页面必然重复，继续爬取
/// 只会浪费配额和时间
#[derive(Debug)]
pub struct DuplicateDetector {
    /// 连续全重复批次计数
    consecutive_duplicate_batches: u32,
    /// 连续重复批次停止阈值
    duplicate_threshold: u32,
    total_fetched: i64,
    total_saved: i64,
    total_skipped: i64,
}

pub const DEFAULT_DUPLICATE_THRESHOLD: u32 = 3;

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(DEFAULT_DUPLICATE_THRESHOLD)
    }
}

impl DuplicateDetector {
    pub fn new(duplicate_threshold: u32) -> Self {
        Self {
            consecutive_duplicate_batches: 0,
            duplicate_threshold: duplicate_threshold.max(1),
            total_fetched: 0,
            total_saved: 0,
            total_skipped: 0,
        }
    }

    /// 记录一个批次的结果，返回是否应该停止爬取
    ///
    /// 空批次（batch_size为0）既不累计也不重置计数；
    /// 只有出现新数据的批次才会重置连续重复计数
    pub fn record_batch(&mut self, batch_size: i64, saved_count: i64) -> bool {
        self.total_fetched += batch_size;
        self.total_saved += saved_count;
        self.total_skipped += batch_size - saved_count;

        if saved_count == 0 && batch_size > 0 {
            self.consecutive_duplicate_batches += 1;
            info!(
                "批次统计 - 本批次: 获取{}条, 新增0条 | 连续重复批次: {}/{}",
                batch_size, self.consecutive_duplicate_batches, self.duplicate_threshold
            );
            if self.consecutive_duplicate_batches >= self.duplicate_threshold {
                warn!(
                    "连续 {} 个批次全部重复，停止爬取",
                    self.consecutive_duplicate_batches
                );
                return true;
            }
        } else if saved_count > 0 {
            info!(
                "批次统计 - 本批次: 获取{}条, 新增{}条 | 连续重复批次已重置",
                batch_size, saved_count
            );
            self.consecutive_duplicate_batches = 0;
        }

        false
    }

    /// 简化版：直接传入本批次是否有新数据
    ///
    /// data_count不为正时按空批次处理，不影响任何计数
    pub fn record_batch_simple(&mut self, has_new_data: bool, data_count: i64) -> bool {
        if data_count <= 0 {
            return self.record_batch(0, 0);
        }
        if has_new_data {
            self.record_batch(data_count, data_count)
        } else {
            self.record_batch(data_count, 0)
        }
    }

    /// 检查是否应该停止（不更新计数）
    pub fn should_stop(&self) -> bool {
        self.consecutive_duplicate_batches >= self.duplicate_threshold
    }

    pub fn reset(&mut self) {
        self.consecutive_duplicate_batches = 0;
    }

    pub fn total_fetched(&self) -> i64 {
        self.total_fetched
    }

    pub fn total_saved(&self) -> i64 {
        self.total_saved
    }

    pub fn total_skipped(&self) -> i64 {
        self.total_skipped
    }

    pub fn summary(&self) -> String {
        format!(
            "获取{}条，保存{}条，跳过{}条，连续重复{}次",
            self.total_fetched, self.total_saved, self.total_skipped,
            self.consecutive_duplicate_batches
        )
    }
}
