//! SQL issued by the reaper

/// Effective connection ceiling for the current credential.
///
/// When a per-user limit is set the ceiling is the lesser of it and the
/// global limit.
pub const SERVER_CONNECTION_LIMIT: &str = "SELECT \
    IF(@@max_user_connections > 0, LEAST(@@max_user_connections, @@max_connections), @@max_connections) AS total, \
    IF(@@max_user_connections > 0, TRUE, FALSE) AS user_limit";

/// Session count and longest idle time for a user. Binds: user.
pub const SERVER_CONNECTION_USAGE: &str = "SELECT COUNT(ID) AS total, COALESCE(MAX(TIME), 0) AS max_age \
    FROM information_schema.PROCESSLIST WHERE USER = ?";

/// Sleeping sessions of a user idle for at least N seconds, longest idle
/// first. Binds: min idle seconds, user.
pub const SLEEPING_SESSIONS: &str = "SELECT ID, TIME FROM information_schema.PROCESSLIST \
    WHERE COMMAND = 'Sleep' AND TIME >= ? AND USER = ? ORDER BY TIME DESC";

/// Terminate one session. The id is inlined since `KILL` cannot be prepared
/// on every server version.
pub fn kill_session(session_id: u64) -> String {
    format!("KILL {}", session_id)
}
