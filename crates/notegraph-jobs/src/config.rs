//! Orchestrator and notification configuration.

use std::time::Duration;

use notegraph_core::defaults;

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| !matches!(v.trim().to_lowercase().as_str(), "false" | "0" | "no" | "off"))
        .unwrap_or(default)
}

/// Configuration for one enrichment run.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentConfig {
    /// Items claimed per run.
    pub batch_size: i64,
    /// Age after which a `processing` claim is considered abandoned.
    pub stale_after_secs: i64,
    /// Upper bound on one extraction call.
    pub extraction_timeout_secs: u64,
    /// Upper bound on one embedding call.
    pub embedding_timeout_secs: u64,
    /// User groups processed at the same time.
    pub max_concurrent_groups: usize,
    /// Known names per kind sent as extraction context.
    pub context_limit: i64,
    /// Run project suggestions for notes left without a project.
    pub suggest_projects: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::QUEUE_BATCH_SIZE,
            stale_after_secs: defaults::QUEUE_STALE_AFTER_SECS,
            extraction_timeout_secs: defaults::EXTRACTION_TIMEOUT_SECS,
            embedding_timeout_secs: defaults::EMBEDDING_TIMEOUT_SECS,
            max_concurrent_groups: defaults::MAX_CONCURRENT_GROUPS,
            context_limit: defaults::KNOWLEDGE_CONTEXT_LIMIT,
            suggest_projects: true,
        }
    }
}

impl EnrichmentConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `ENRICH_BATCH_SIZE` | `10` |
    /// | `ENRICH_STALE_AFTER_SECS` | `600` (at least `60`) |
    /// | `ENRICH_EXTRACTION_TIMEOUT_SECS` | `120` |
    /// | `ENRICH_EMBEDDING_TIMEOUT_SECS` | `30` |
    /// | `ENRICH_MAX_CONCURRENT_GROUPS` | `2` |
    /// | `ENRICH_CONTEXT_LIMIT` | `50` |
    /// | `ENRICH_SUGGEST_PROJECTS` | `true` |
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            batch_size: env_parse("ENRICH_BATCH_SIZE")
                .unwrap_or(d.batch_size)
                .max(1),
            stale_after_secs: env_parse("ENRICH_STALE_AFTER_SECS")
                .unwrap_or(d.stale_after_secs)
                .max(defaults::QUEUE_MIN_STALE_AFTER_SECS),
            extraction_timeout_secs: env_parse("ENRICH_EXTRACTION_TIMEOUT_SECS")
                .unwrap_or(d.extraction_timeout_secs),
            embedding_timeout_secs: env_parse("ENRICH_EMBEDDING_TIMEOUT_SECS")
                .unwrap_or(d.embedding_timeout_secs),
            max_concurrent_groups: env_parse("ENRICH_MAX_CONCURRENT_GROUPS")
                .unwrap_or(d.max_concurrent_groups)
                .max(1),
            context_limit: env_parse("ENRICH_CONTEXT_LIMIT").unwrap_or(d.context_limit),
            suggest_projects: env_flag("ENRICH_SUGGEST_PROJECTS", d.suggest_projects),
        }
    }

    pub fn with_batch_size(mut self, n: i64) -> Self {
        self.batch_size = n;
        self
    }

    /// Values below [`defaults::QUEUE_MIN_STALE_AFTER_SECS`] are raised to it.
    pub fn with_stale_after_secs(mut self, secs: i64) -> Self {
        self.stale_after_secs = secs.max(defaults::QUEUE_MIN_STALE_AFTER_SECS);
        self
    }

    pub fn with_extraction_timeout_secs(mut self, secs: u64) -> Self {
        self.extraction_timeout_secs = secs;
        self
    }

    pub fn with_embedding_timeout_secs(mut self, secs: u64) -> Self {
        self.embedding_timeout_secs = secs;
        self
    }

    pub fn with_max_concurrent_groups(mut self, n: usize) -> Self {
        self.max_concurrent_groups = n.max(1);
        self
    }

    pub fn with_context_limit(mut self, n: i64) -> Self {
        self.context_limit = n;
        self
    }

    pub fn with_suggest_projects(mut self, enabled: bool) -> Self {
        self.suggest_projects = enabled;
        self
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding_timeout_secs)
    }
}

/// Where clarification questions are delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    /// Webhook receiving questions. `None` selects the log-only channel.
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: defaults::NOTIFY_TIMEOUT_SECS,
        }
    }
}

impl NotificationConfig {
    /// Reads `NOTIFY_WEBHOOK_URL` and `NOTIFY_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self {
            webhook_url: std::env::var("NOTIFY_WEBHOOK_URL")
                .ok()
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
            timeout_secs: env_parse("NOTIFY_TIMEOUT_SECS").unwrap_or(defaults::NOTIFY_TIMEOUT_SECS),
        }
    }

    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrichment_defaults() {
        let c = EnrichmentConfig::default();
        assert_eq!(c.batch_size, 10);
        assert_eq!(c.stale_after_secs, 600);
        assert_eq!(c.extraction_timeout(), Duration::from_secs(120));
        assert_eq!(c.embedding_timeout(), Duration::from_secs(30));
        assert_eq!(c.max_concurrent_groups, 2);
        assert_eq!(c.context_limit, 50);
        assert!(c.suggest_projects);
    }

    #[test]
    fn test_enrichment_builders() {
        let c = EnrichmentConfig::default()
            .with_batch_size(3)
            .with_extraction_timeout_secs(1)
            .with_max_concurrent_groups(0)
            .with_suggest_projects(false);
        assert_eq!(c.batch_size, 3);
        assert_eq!(c.extraction_timeout_secs, 1);
        assert_eq!(c.max_concurrent_groups, 1, "concurrency is at least one");
        assert!(!c.suggest_projects);
    }

    #[test]
    fn test_stale_window_has_a_floor() {
        let c = EnrichmentConfig::default().with_stale_after_secs(0);
        assert_eq!(c.stale_after_secs, defaults::QUEUE_MIN_STALE_AFTER_SECS);

        let c = EnrichmentConfig::default().with_stale_after_secs(-5);
        assert_eq!(c.stale_after_secs, 60);

        let c = EnrichmentConfig::default().with_stale_after_secs(900);
        assert_eq!(c.stale_after_secs, 900);
    }

    #[test]
    fn test_notification_defaults_to_log_only() {
        let c = NotificationConfig::default();
        assert!(c.webhook_url.is_none());
        assert_eq!(c.timeout_secs, 10);
        assert_eq!(
            c.with_webhook_url("http://hook").webhook_url.as_deref(),
            Some("http://hook")
        );
    }
}
