use std::path::PathBuf;

use derive_setters::Setters;

/// Startup-resolved environment, read once and threaded through the
/// application rather than re-read from `std::env` at each call site.
#[derive(Debug, Clone, Setters)]
#[setters(strip_option)]
pub struct ClaudeCEnv {
    pub use_bedrock: bool,
    pub aws_region: String,
    pub aws_profile: String,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_session_token: Option<String>,
    pub aws_auth_command: Option<String>,

    pub db_path_override: Option<PathBuf>,
    pub db_auto_rotate: bool,
    pub db_max_days: Option<u32>,
    pub db_max_records: Option<u64>,
    pub db_max_size_mb: Option<u64>,

    pub disable_prompt_caching: bool,
    pub bash_timeout_secs: Option<u64>,

    pub home: Option<PathBuf>,
    pub xdg_data_home: Option<PathBuf>,
}

impl ClaudeCEnv {
    /// Resolves every recognized environment variable at process startup.
    pub fn from_std_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Testable resolution path: `lookup` stands in for `std::env::var` so
    /// tests can supply a fixed map instead of mutating process-global
    /// state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let truthy = |v: &str| matches!(v, "1" | "true" | "TRUE");

        Self {
            use_bedrock: lookup("CLAUDE_CODE_USE_BEDROCK").as_deref().is_some_and(truthy),
            aws_region: lookup("AWS_REGION")
                .or_else(|| lookup("AWS_DEFAULT_REGION"))
                .unwrap_or_else(|| "us-west-2".to_string()),
            aws_profile: lookup("AWS_PROFILE").unwrap_or_else(|| "default".to_string()),
            aws_access_key_id: lookup("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: lookup("AWS_SECRET_ACCESS_KEY"),
            aws_session_token: lookup("AWS_SESSION_TOKEN"),
            aws_auth_command: lookup("AWS_AUTH_COMMAND"),

            db_path_override: lookup("CLAUDE_C_DB_PATH").map(PathBuf::from),
            db_auto_rotate: lookup("CLAUDE_C_DB_AUTO_ROTATE").as_deref() != Some("0"),
            db_max_days: lookup("CLAUDE_C_DB_MAX_DAYS").and_then(|v| v.parse().ok()),
            db_max_records: lookup("CLAUDE_C_DB_MAX_RECORDS").and_then(|v| v.parse().ok()),
            db_max_size_mb: lookup("CLAUDE_C_DB_MAX_SIZE_MB").and_then(|v| v.parse().ok()),

            disable_prompt_caching: lookup("DISABLE_PROMPT_CACHING").as_deref().is_some_and(truthy),
            bash_timeout_secs: lookup("CLAUDE_C_BASH_TIMEOUT").and_then(|v| v.parse().ok()),

            home: lookup("HOME").map(PathBuf::from),
            xdg_data_home: lookup("XDG_DATA_HOME").map(PathBuf::from),
        }
    }

    /// `$XDG_DATA_HOME/claude-c` if set, else `$HOME/.local/share/claude-c`.
    pub fn data_dir(&self) -> PathBuf {
        if let Some(xdg) = &self.xdg_data_home {
            return xdg.join("claude-c");
        }
        self.home.clone().unwrap_or_else(|| PathBuf::from(".")).join(".local/share/claude-c")
    }

    /// Resolves the call-log database path in order: `CLAUDE_C_DB_PATH`;
    /// `./.claude-c/api_calls.db` (created if possible); `$XDG_DATA_HOME` or
    /// `$HOME`-derived data dir; `./api_calls.db` as a last resort.
    pub fn db_path(&self) -> PathBuf {
        self.resolve_db_path(|| std::fs::create_dir_all("./.claude-c").is_ok())
    }

    /// Same resolution order as [`Self::db_path`], with the cwd-directory
    /// side effect injected so tests can exercise every branch without
    /// touching the real filesystem.
    fn resolve_db_path(&self, ensure_cwd_dir: impl FnOnce() -> bool) -> PathBuf {
        if let Some(path) = &self.db_path_override {
            return path.clone();
        }
        if ensure_cwd_dir() {
            return PathBuf::from("./.claude-c/api_calls.db");
        }
        if self.xdg_data_home.is_some() || self.home.is_some() {
            return self.data_dir().join("api_calls.db");
        }
        PathBuf::from("./api_calls.db")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir().join("history")
    }
}
