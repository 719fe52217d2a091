use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use claudec_domain::{ApiCallRecord, CallStatus, TokenUsage};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, warn};

const SCHEMA_VERSION: i64 = 1;

/// Rotation policy knobs, resolved once from the environment at startup.
#[derive(Debug, Clone, Copy)]
pub struct RotationPolicy {
    pub auto_rotate: bool,
    pub max_days: u32,
    pub max_records: u64,
    pub max_size_mb: u64,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self { auto_rotate: true, max_days: 30, max_records: 1000, max_size_mb: 100 }
    }
}

/// Embedded SQL call log, one file plus its WAL sidecar. Writes are
/// serialized through the single connection's lock; the 5-second busy
/// timeout tolerates a concurrent external reader.
#[derive(Clone)]
pub struct CallLogStore {
    conn: Arc<Mutex<Connection>>,
}

impl CallLogStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o755));
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        // SQLite disables FK enforcement per-connection by default, even
        // with the `bundled` feature — without this, token_usage's
        // ON DELETE CASCADE never fires and rotation orphans rows.
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let store = Self { conn: Arc::new(Mutex::new(conn)) };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at INTEGER NOT NULL
            );",
        )?;

        let current: Option<i64> =
            conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0)).optional()?.flatten();

        if current.unwrap_or(0) < SCHEMA_VERSION {
            conn.execute_batch(
                "BEGIN;
                CREATE TABLE IF NOT EXISTS api_calls (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    timestamp TEXT NOT NULL,
                    session_id TEXT,
                    api_base_url TEXT NOT NULL,
                    request_json TEXT NOT NULL,
                    headers_json TEXT,
                    response_json TEXT,
                    model TEXT NOT NULL,
                    status TEXT NOT NULL,
                    http_status INTEGER NOT NULL,
                    error_message TEXT,
                    duration_ms INTEGER NOT NULL,
                    tool_count INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS token_usage (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    api_call_id INTEGER NOT NULL REFERENCES api_calls(id) ON DELETE CASCADE,
                    session_id TEXT,
                    prompt_tokens INTEGER NOT NULL,
                    completion_tokens INTEGER NOT NULL,
                    total_tokens INTEGER NOT NULL,
                    cached_tokens INTEGER NOT NULL,
                    prompt_cache_hit_tokens INTEGER NOT NULL,
                    prompt_cache_miss_tokens INTEGER NOT NULL,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_api_calls_timestamp ON api_calls(timestamp);
                CREATE INDEX IF NOT EXISTS idx_api_calls_session_id ON api_calls(session_id);
                CREATE INDEX IF NOT EXISTS idx_token_usage_api_call_id ON token_usage(api_call_id);
                CREATE INDEX IF NOT EXISTS idx_token_usage_session_id ON token_usage(session_id);
                COMMIT;",
            )?;
            conn.execute(
                "INSERT INTO schema_version (version, description, applied_at) VALUES (?1, ?2, ?3)",
                params![SCHEMA_VERSION, "initial schema", Utc::now().timestamp()],
            )?;
        }
        Ok(())
    }

    /// Inserts an `api_calls` row, plus a `token_usage` row extracted from
    /// `response_body` when `record.status == Success` and the body
    /// parses with a `usage` object.
    pub fn insert(&self, record: &ApiCallRecord, response_body: Option<&str>) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO api_calls
                (timestamp, session_id, api_base_url, request_json, response_json, model,
                 status, http_status, error_message, duration_ms, tool_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.iso_timestamp,
                record.session_id,
                record.api_base_url,
                record.request_json,
                record.response_json,
                record.model,
                record.status.as_str(),
                record.http_status,
                record.error_message,
                record.duration_ms,
                record.tool_count,
                record.created_at,
            ],
        )?;
        let api_call_id = conn.last_insert_rowid();

        if record.status == CallStatus::Success
            && let Some(body) = response_body
            && let Ok(usage) = extract_usage(body)
        {
            conn.execute(
                "INSERT INTO token_usage
                    (api_call_id, session_id, prompt_tokens, completion_tokens, total_tokens,
                     cached_tokens, prompt_cache_hit_tokens, prompt_cache_miss_tokens, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    api_call_id,
                    record.session_id,
                    usage.prompt_tokens,
                    usage.completion_tokens,
                    usage.total_tokens,
                    usage.cached_tokens,
                    usage.prompt_cache_hit_tokens,
                    usage.prompt_cache_miss_tokens,
                    record.created_at,
                ],
            )?;
        }

        Ok(api_call_id)
    }

    /// Applies the three rotation policies (age, count, size) in order,
    /// running VACUUM once at the end if anything was deleted. No-op when
    /// `policy.auto_rotate` is false.
    pub fn rotate(&self, policy: &RotationPolicy, db_path: &Path) -> anyhow::Result<()> {
        if !policy.auto_rotate {
            return Ok(());
        }

        let conn = self.conn.lock().unwrap();
        let mut deleted_any = false;

        if policy.max_days > 0 {
            let cutoff = Utc::now().timestamp() - (policy.max_days as i64) * 86_400;
            let n = conn.execute("DELETE FROM api_calls WHERE created_at < ?1", params![cutoff])?;
            if n > 0 {
                info!(deleted = n, "rotated api_calls rows by age");
                deleted_any = true;
            }
        }

        if policy.max_records > 0 {
            let n = conn.execute(
                "DELETE FROM api_calls WHERE id NOT IN (
                    SELECT id FROM api_calls ORDER BY created_at DESC LIMIT ?1
                 )",
                params![policy.max_records as i64],
            )?;
            if n > 0 {
                info!(deleted = n, "rotated api_calls rows by count");
                deleted_any = true;
            }
        }

        if policy.max_size_mb > 0
            && let Ok(metadata) = std::fs::metadata(db_path)
            && metadata.len() > policy.max_size_mb * 1024 * 1024
        {
            let keep_fraction = 0.75;
            let current: i64 = conn.query_row("SELECT COUNT(*) FROM api_calls", [], |row| row.get(0))?;
            let keep = ((current as f64) * keep_fraction) as i64;
            let n = conn.execute(
                "DELETE FROM api_calls WHERE id NOT IN (
                    SELECT id FROM api_calls ORDER BY created_at DESC LIMIT ?1
                 )",
                params![keep],
            )?;
            if n > 0 {
                warn!(deleted = n, size_bytes = metadata.len(), "rotated api_calls rows by size");
                deleted_any = true;
            }
        }

        if deleted_any {
            conn.execute_batch("VACUUM;")?;
        }
        Ok(())
    }
}

/// Scans a response body's `usage` object with provider-tolerant field
/// precedence (Moonshot/DeepSeek/Anthropic variants), defaulting any
/// missing field to 0. Precedence is decided by field *presence*, not
/// truthiness — a provider reporting an explicit `0` still wins over a
/// lower-priority fallback field.
fn extract_usage(response_body: &str) -> anyhow::Result<TokenUsage> {
    let value: serde_json::Value = serde_json::from_str(response_body)?;
    let usage = value.get("usage").ok_or_else(|| anyhow::anyhow!("response has no usage object"))?;

    let get_i64 = |key: &str| usage.get(key).and_then(serde_json::Value::as_i64).unwrap_or(0);
    let field = |key: &str| usage.get(key).and_then(serde_json::Value::as_i64);

    let prompt_tokens = field("input_tokens").unwrap_or_else(|| get_i64("prompt_tokens"));
    let completion_tokens = field("output_tokens").unwrap_or_else(|| get_i64("completion_tokens"));
    let total_tokens = field("total_tokens").unwrap_or(prompt_tokens + completion_tokens);

    let cached_tokens = field("cached_tokens").unwrap_or_else(|| {
        usage
            .get("prompt_tokens_details")
            .and_then(|d| d.get("cached_tokens"))
            .and_then(serde_json::Value::as_i64)
            .unwrap_or_else(|| get_i64("cache_read_input_tokens"))
    });

    Ok(TokenUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens,
        cached_tokens,
        prompt_cache_hit_tokens: get_i64("prompt_cache_hit_tokens"),
        prompt_cache_miss_tokens: get_i64("prompt_cache_miss_tokens"),
    })
}
