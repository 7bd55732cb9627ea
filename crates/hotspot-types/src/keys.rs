//! Channel and storage key conventions.
//!
//! | Pattern | Kind | Description |
//! |---------|------|-------------|
//! | `event_streams` | List | Known stream ids, oldest first |
//! | `{stream}:{schema}` | Channel / key | Point events (exact subscription) and snapshot data |
//! | `{stream}:{schema}*` | Pattern | Entity, mesh, node, log and delete updates |

/// Redis list holding every known stream id.
pub const STREAM_LIST_KEY: &str = "event_streams";

/// Exact channel (and snapshot key) for a schema on a stream.
pub fn channel_key(stream: &str, schema: &str) -> String {
    format!("{stream}:{schema}")
}

/// Prefix pattern matching every channel of a schema on a stream.
pub fn channel_pattern(stream: &str, schema: &str) -> String {
    format!("{stream}:{schema}*")
}

/// Remove the `{stream}:` prefix from a channel name.
///
/// Returns `None` when the channel belongs to a different stream.
pub fn strip_stream<'a>(stream: &str, channel: &'a str) -> Option<&'a str> {
    channel.strip_prefix(stream)?.strip_prefix(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_stream_prefix() {
        assert_eq!(channel_key("s1", "PlayerDamaged"), "s1:PlayerDamaged");
        assert_eq!(channel_pattern("s1", "GameNode"), "s1:GameNode*");
    }

    #[test]
    fn strip_stream_requires_separator() {
        assert_eq!(strip_stream("s1", "s1:GameNode:root"), Some("GameNode:root"));
        assert_eq!(strip_stream("s1", "s10:GameNode"), None);
        assert_eq!(strip_stream("s1", "s2:GameNode"), None);
    }
}
