use hickory_proto::op::Message;
use tokio::time::Instant;

/// Response cache keyed by the normalized question.
///
/// Implementations may hand back entries whose expiry already passed; callers decide
/// whether to serve them stale.
pub trait DnsCachePort: Send + Sync {
    fn get_with_expire(&self, key: &str) -> Option<(Message, Instant)>;

    fn set_with_expire(&self, key: &str, msg: Message, expire: Instant);

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
