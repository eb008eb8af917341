//! The reaper itself: fetch facts, decide, kill

use std::time::{Duration, Instant};

use tidepool_core::{Result, Value};

use super::cache::FactCache;
use super::facts::{ServerConnectionLimit, ServerConnectionUsage, SleepingSession};
use super::policy::{ReapDecision, ReapPolicy};
use super::statements;
use crate::managed::ManagedConnection;

/// A session the reaper tried and failed to kill
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillFailure {
    pub session_id: u64,
    pub error: String,
}

/// Result of one reaping pass
#[derive(Debug, Clone, PartialEq)]
pub struct ReapOutcome {
    pub limit: ServerConnectionLimit,
    pub usage: ServerConnectionUsage,
    pub decision: ReapDecision,
    /// Sessions killed, in kill order
    pub killed: Vec<u64>,
    pub failures: Vec<KillFailure>,
}

impl ReapOutcome {
    pub fn killed_count(&self) -> usize {
        self.killed.len()
    }
}

/// Kills sessions of one database user that have been sleeping too long
pub struct ZombieReaper {
    user: String,
    policy: ReapPolicy,
    limit: FactCache<ServerConnectionLimit>,
    usage: FactCache<ServerConnectionUsage>,
}

impl ZombieReaper {
    /// `limit_ttl` and `usage_ttl` control how long each fact is reused
    /// before it is queried again.
    pub fn new(
        user: impl Into<String>,
        policy: ReapPolicy,
        limit_ttl: Duration,
        usage_ttl: Duration,
    ) -> Self {
        Self {
            user: user.into(),
            policy,
            limit: FactCache::new(limit_ttl),
            usage: FactCache::new(usage_ttl),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn policy(&self) -> &ReapPolicy {
        &self.policy
    }

    /// Last fetched connection ceiling
    pub fn cached_limit(&self) -> Option<ServerConnectionLimit> {
        self.limit.current()
    }

    /// Last fetched usage
    pub fn cached_usage(&self) -> Option<ServerConnectionUsage> {
        self.usage.current()
    }

    /// Forget both cached facts
    pub fn invalidate(&self) {
        self.limit.invalidate();
        self.usage.invalidate();
    }

    /// Fetch both facts, going to the server only for stale ones
    pub async fn observe(
        &self,
        conn: &ManagedConnection,
    ) -> Result<(ServerConnectionLimit, ServerConnectionUsage)> {
        let now = Instant::now();

        let limit = self
            .limit
            .refresh_if_stale(now, || async {
                let result = conn.query(statements::SERVER_CONNECTION_LIMIT, &[]).await?;
                let limit = ServerConnectionLimit::from_result(&result)?;
                tracing::debug!(total = limit.total, user_scoped = limit.user_scoped, "fetched connection limit");
                Ok(limit)
            })
            .await?;

        let usage = self
            .usage
            .refresh_if_stale(now, || async {
                let result = conn
                    .query(
                        statements::SERVER_CONNECTION_USAGE,
                        &[Value::String(self.user.clone())],
                    )
                    .await?;
                let usage = ServerConnectionUsage::from_result(&result)?;
                tracing::debug!(used = usage.used, max_idle_secs = usage.max_idle_secs, "fetched connection usage");
                Ok(usage)
            })
            .await?;

        Ok((limit, usage))
    }

    /// Run one reaping pass on `conn`.
    ///
    /// Errors fetching facts or listing sessions are returned. Individual
    /// kill failures are collected in the outcome.
    #[tracing::instrument(skip_all, fields(user = %self.user, session_id = conn.session_id()))]
    pub async fn reap(&self, conn: &ManagedConnection) -> Result<ReapOutcome> {
        let (limit, usage) = self.observe(conn).await?;
        let decision = self.policy.decide(&limit, &usage);

        let mut outcome = ReapOutcome {
            limit,
            usage,
            decision,
            killed: Vec::new(),
            failures: Vec::new(),
        };

        let ReapDecision::KillIdleSince { min_idle_secs, reason } = decision else {
            tracing::debug!(used = usage.used, total = limit.total, "no zombie connections to reap");
            return Ok(outcome);
        };

        let result = conn
            .query(
                statements::SLEEPING_SESSIONS,
                &[Value::UInt64(min_idle_secs), Value::String(self.user.clone())],
            )
            .await?;
        let own_session = conn.session_id();
        let targets: Vec<SleepingSession> = SleepingSession::from_result(&result)?
            .into_iter()
            .filter(|session| session.session_id != own_session)
            .collect();

        tracing::debug!(%reason, min_idle_secs, targets = targets.len(), "reaping zombie connections");

        let (killed, failures) = kill_sessions(conn, &targets).await;
        outcome.killed = killed;
        outcome.failures = failures;

        if !outcome.killed.is_empty() {
            self.usage.invalidate();
        }

        tracing::info!(
            %reason,
            killed = outcome.killed.len(),
            failed = outcome.failures.len(),
            "reaped zombie connections"
        );
        Ok(outcome)
    }
}

/// Kill each target, collecting successes and failures. Never stops early.
async fn kill_sessions(
    conn: &ManagedConnection,
    targets: &[SleepingSession],
) -> (Vec<u64>, Vec<KillFailure>) {
    let mut killed = Vec::new();
    let mut failures = Vec::new();

    for target in targets {
        match conn
            .execute(&statements::kill_session(target.session_id), &[])
            .await
        {
            Ok(_) => {
                tracing::debug!(kill_target = target.session_id, idle_secs = target.idle_secs, "killed session");
                killed.push(target.session_id);
            }
            Err(err) => {
                tracing::warn!(kill_target = target.session_id, error = %err, "failed to kill session");
                failures.push(KillFailure {
                    session_id: target.session_id,
                    error: err.to_string(),
                });
            }
        }
    }

    (killed, failures)
}
