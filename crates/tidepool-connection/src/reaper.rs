//! Zombie connection reaping
//!
//! Callers that are torn down without closing their pools leave sessions
//! sleeping on the server. The reaper compares the credential's server-side
//! usage against its connection ceiling and kills sessions that have been
//! idle for too long.
//!
//! Both server facts are cached with their own TTL (`FactCache`), and the
//! kill decision is a pure function (`ReapPolicy::decide`) so it can be
//! tested without a server.

mod cache;
mod facts;
mod policy;
pub(crate) mod statements;
mod zombie;


pub use cache::{CachedFact, FactCache};
pub use facts::{ServerConnectionLimit, ServerConnectionUsage, SleepingSession};
pub use policy::{ReapDecision, ReapPolicy, ReapReason};
pub use zombie::{KillFailure, ReapOutcome, ZombieReaper};
