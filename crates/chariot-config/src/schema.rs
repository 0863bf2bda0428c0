use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration, read from `chariot.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChariotConfig {
    pub runtime: RuntimeConfig,
    pub agents: AgentsConfig,
    pub sessions: SessionsConfig,
    pub logging: LoggingConfig,
}

// ── Runtime ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// JSON program executed into the bootstrap runtime before any session
    /// is created. Its globals seed every session.
    pub bootstrap: Option<PathBuf>,
    /// Entries retained by the in-memory log sink.
    pub log_buffer: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bootstrap: None,
            log_buffer: 1000,
        }
    }
}

// ── Agents ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Plan runs admitted at once per agent when the start call gives none.
    pub max_concurrent: usize,
    /// Scheduler tick when the start call gives none.
    pub poll_interval_ms: u64,
    /// Pending wake-ups buffered per agent before publishes coalesce.
    pub event_queue_capacity: usize,
    /// Lifecycle events buffered for slow subscribers.
    pub event_bus_capacity: usize,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            poll_interval_ms: 3000,
            event_queue_capacity: 64,
            event_bus_capacity: 1024,
        }
    }
}

impl AgentsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ── Sessions ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Idle time after which a session expires.
    pub timeout_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 1800,
            cleanup_interval_secs: 300,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let icon = match self.severity {
            WarningSeverity::Error => "❌",
            WarningSeverity::Warning => "⚠️ ",
        };
        write!(f, "{} {}: {}", icon, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl ChariotConfig {
    /// Check the config for problems. Returns the non-fatal warnings, or an
    /// error listing every fatal one.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Agent scheduling ───
        if self.agents.max_concurrent == 0 {
            warnings.push(ConfigWarning {
                field: "agents.max_concurrent".into(),
                message: "max_concurrent is 0, so no plan run could ever be admitted".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to 1 for strictly serialized agents".into()),
            });
        }
        if self.agents.poll_interval_ms == 0 {
            warnings.push(ConfigWarning {
                field: "agents.poll_interval_ms".into(),
                message: "poll interval is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Use e.g. 3000 for a three second tick".into()),
            });
        } else if self.agents.poll_interval_ms < 50 {
            warnings.push(ConfigWarning {
                field: "agents.poll_interval_ms".into(),
                message: format!(
                    "poll interval {}ms will keep agents busy re-evaluating triggers",
                    self.agents.poll_interval_ms
                ),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }
        if self.agents.event_queue_capacity == 0 {
            warnings.push(ConfigWarning {
                field: "agents.event_queue_capacity".into(),
                message: "event queue capacity is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Use e.g. 64".into()),
            });
        }
        if self.agents.event_bus_capacity == 0 {
            warnings.push(ConfigWarning {
                field: "agents.event_bus_capacity".into(),
                message: "event bus capacity is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Use e.g. 1024".into()),
            });
        }

        // ── Sessions ───
        if self.sessions.timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "sessions.timeout_secs".into(),
                message: "sessions expire immediately".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Bootstrap ───
        if let Some(ref path) = self.runtime.bootstrap {
            if !path.exists() {
                warnings.push(ConfigWarning {
                    field: "runtime.bootstrap".into(),
                    message: format!("bootstrap program {} does not exist", path.display()),
                    severity: WarningSeverity::Warning,
                    hint: None,
                });
            }
        }

        // ── Logging format ───
        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
