//! Session-based topic filter

use contracts::Value;
use coordinator::KvStore;

/// Prefix of camera image topics
pub const CAMERA_PREFIX: &str = "/camera/";

/// Prefix of timeseries topics, followed by the session name
pub const TIMESERIES_PREFIX: &str = "/timeseries/";

/// Prefix of session control topics; the payload is the session name
pub const SESSION_PREFIX: &str = "/session/";

/// Decides which bus messages reach realtime clients
pub struct SessionFilter;

impl SessionFilter {
    /// Camera topics always pass; a timeseries topic passes only when it
    /// names the active session exactly
    pub fn should_forward(topic: &str, active_session: Option<&str>) -> bool {
        if topic.starts_with(CAMERA_PREFIX) {
            return true;
        }
        match (topic.strip_prefix(TIMESERIES_PREFIX), active_session) {
            (Some(session), Some(active)) => !active.is_empty() && session == active,
            _ => false,
        }
    }

    /// Active session as stored in the coordinator, if any
    pub fn active_session(store: &KvStore) -> Option<String> {
        match store.get(coordinator::KEY_ACTIVE_SESSION) {
            Some(Value::Str(session)) if !session.is_empty() => Some(session),
            _ => None,
        }
    }
}
