use std::time::Duration;

/// Number of batches inserted by one insert phase of the maintenance job.
pub const BATCH_NUM: usize = 50_000;
pub const BATCH_SIZE: usize = 100;
pub const UPDATE_ROWS: usize = 50_000;

/// Age in days used by the swap retention of the maintenance job.
pub const RETENTION_DAYS: i64 = 3;

pub const PARTITION_BATCH_NUM: usize = 10;
pub const PARTITION_BATCH_SIZE: usize = 100_000;
pub const PARTITION_TOTAL_DAYS: u32 = 60;
pub const PARTITION_RETENTION_DAYS: i64 = 7;

pub const QUERY_NUM: usize = 1000;
pub const QUERY_START_MAX_ROW: u64 = 5000;

pub const KV_ROWS: [usize; 4] = [1000, 10_000, 100_000, 1_000_000];
pub const KV_LOOPS: usize = 10;
pub const KV_TEST_NAME: &str = "run1";

/// Progress is logged every this many batches / updates.
pub const LOG_EVERY: usize = 100;

pub const FACT_TABLE: &str = "test_table";
pub const PARTITION_PARENT: &str = "servingfeature";

/// Environment variable consulted by the binaries for the database file.
pub const DB_PATH_ENV: &str = "LOAD_DRIVER_DB";

pub const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

// SQLITE_MAX_VARIABLE_NUMBER for SQLite >= 3.32.
pub const BIND_LIMIT: usize = 32766;

pub const SECONDS_PER_DAY: i64 = 86_400;

pub const PRAGMAS: &str = r#"
    PRAGMA busy_timeout       = 10000;
    PRAGMA journal_mode       = WAL;
    PRAGMA journal_size_limit = 200000000;
    PRAGMA synchronous        = NORMAL;
    PRAGMA foreign_keys       = ON;
    PRAGMA temp_store         = MEMORY;
    PRAGMA cache_size         = -16000;
"#;

pub const VERSION_QUERY: &str = "SELECT sqlite_version()";
