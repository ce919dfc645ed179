//! Identity-scoped sessions that carry captured values across independent
//! requests.
//!
//! The store is constructed once at startup and shared by handle; callers only
//! ever receive snapshots, and all mutation goes through the store's methods.
//! A background task sweeps sessions idle for longer than the expiry window.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

/// Idle time after which a session is swept.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// User agents are truncated before fingerprinting.
const USER_AGENT_FINGERPRINT_CHARS: usize = 64;

/// What a request offers for identifying its caller.
#[derive(Debug, Clone, Default)]
pub struct RequestIdentity {
    pub session_id: Option<String>,
    pub authorization: Option<String>,
    pub remote_addr: Option<IpAddr>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub last_activity: DateTime<Utc>,
    /// `<table>.<column>` (lowercased) -> last non-null value seen.
    pub captured: HashMap<String, Value>,
}

impl Session {
    pub fn new(id: &str, now: DateTime<Utc>) -> Self {
        Session { id: id.to_string(), last_activity: now, captured: HashMap::new() }
    }
}

pub fn capture_key(table: &str, column: &str) -> String {
    format!("{}.{}", table.to_lowercase(), column.to_lowercase())
}

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: chrono::Duration,
}

impl Default for SessionStore {
    fn default() -> Self { Self::new(DEFAULT_SESSION_TTL) }
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(30));
        SessionStore { sessions: RwLock::new(HashMap::new()), ttl }
    }

    /// Resolve a stable identity. First match wins: explicit session id,
    /// then the authentication credential, then a fingerprint of network
    /// origin and (truncated) user agent. Never fails.
    pub fn identify(req: &RequestIdentity) -> String {
        if let Some(sid) = non_empty(req.session_id.as_deref()) {
            return format!("sid:{}", sid);
        }
        if let Some(auth) = non_empty(req.authorization.as_deref()) {
            // credentials are never kept in memory verbatim
            return format!("auth:{:016x}", xxh3_64(auth.as_bytes()));
        }
        let origin = req.remote_addr.map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".to_string());
        let agent: String = req.user_agent.as_deref().unwrap_or("").chars().take(USER_AGENT_FINGERPRINT_CHARS).collect();
        format!("fp:{:016x}", xxh3_64(format!("{}|{}", origin, agent).as_bytes()))
    }

    pub fn get_or_create(&self, id: &str) -> Session {
        self.get_or_create_at(id, Utc::now())
    }

    /// Return a snapshot of the session, creating it on first sight and
    /// refreshing `last_activity` either way.
    pub fn get_or_create_at(&self, id: &str, now: DateTime<Utc>) -> Session {
        let mut map = self.sessions.write();
        let session = map.entry(id.to_string()).or_insert_with(|| {
            debug!(target: "session", session = id, "session created");
            Session::new(id, now)
        });
        session.last_activity = now;
        session.clone()
    }

    /// Store every non-null value of `row` under `<table>.<column>`.
    /// Returns false when the session is gone (e.g. swept mid-request).
    pub fn capture(&self, id: &str, table: &str, row: &Map<String, Value>) -> bool {
        let mut map = self.sessions.write();
        let Some(session) = map.get_mut(id) else {
            debug!(target: "session", session = id, "capture skipped: session no longer present");
            return false;
        };
        for (column, value) in row.iter().filter(|(_, v)| !v.is_null()) {
            session.captured.insert(capture_key(table, column), value.clone());
        }
        true
    }

    /// Snapshot without refreshing activity.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    /// Drop sessions idle for longer than the expiry window. Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut map = self.sessions.write();
        let before = map.len();
        map.retain(|_, s| now - s.last_activity <= self.ttl);
        before - map.len()
    }

    pub fn len(&self) -> usize { self.sessions.read().len() }

    pub fn is_empty(&self) -> bool { self.sessions.read().is_empty() }

    /// Run `sweep` every `interval` on the runtime, independent of request handling.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        info!(target: "session", interval_secs = interval.as_secs(), "session sweeper started");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = self.sweep(Utc::now());
                if removed > 0 { debug!(target: "session", removed = removed, "session_sweep"); }
            }
        })
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
