/// CAS（Compare-And-Swap）操作最大重试次数
pub const MAX_CAS_RETRIES: u32 = 20;

/// 每天毫秒数
pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// 每用户锁表超过该大小时清理空闲条目
pub const USER_LOCK_PRUNE_THRESHOLD: usize = 1000;

/// 每个用户保留的最近测验结果条数
pub const MAX_STORED_QUIZ_RESULTS: usize = 50;

/// 到期提醒中被视为高优先级的到期卡片数
pub const HIGH_PRIORITY_DUE_COUNT: usize = 10;
