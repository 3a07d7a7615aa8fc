use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Idle connections kept per upstream client.
pub const MAX_IDLE_CONNECTIONS: usize = 8;

pub trait PooledConnection: Send + 'static {
    /// Best-effort graceful close. Errors are ignored.
    fn shutdown(self) -> BoxFuture<'static, ()>;
}

/// LIFO stack of idle connections owned by one client.
///
/// The most recently returned connection is handed out first so that warm
/// connections stay warm and cold ones age out at the bottom.
pub struct ConnectionPool<C> {
    idle: Mutex<VecDeque<C>>,
    capacity: usize,
}

impl<C: PooledConnection> ConnectionPool<C> {
    pub fn new(capacity: usize) -> Self {
        Self {
            idle: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn take(&self) -> Option<C> {
        self.lock().pop_back()
    }

    /// Returns a connection. Past the bound it is closed on a detached task.
    pub fn put(&self, conn: C) {
        let overflow = {
            let mut idle = self.lock();
            if idle.len() < self.capacity {
                idle.push_back(conn);
                None
            } else {
                Some(conn)
            }
        };

        if let Some(conn) = overflow {
            debug!(capacity = self.capacity, "Connection pool full, closing connection");
            tokio::spawn(conn.shutdown());
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties the pool and waits for every idle connection to close.
    pub async fn close(&self) {
        let drained: Vec<C> = self.lock().drain(..).collect();
        futures::future::join_all(drained.into_iter().map(PooledConnection::shutdown)).await;
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<C>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeConn {
        id: usize,
        closed: Arc<AtomicUsize>,
    }

    impl PooledConnection for FakeConn {
        fn shutdown(self) -> BoxFuture<'static, ()> {
            Box::pin(async move {
                self.closed.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    fn conn(id: usize, closed: &Arc<AtomicUsize>) -> FakeConn {
        FakeConn {
            id,
            closed: closed.clone(),
        }
    }

    #[tokio::test]
    async fn test_lifo_order() {
        let closed = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::new(4);
        pool.put(conn(1, &closed));
        pool.put(conn(2, &closed));

        assert_eq!(pool.take().map(|c| c.id), Some(2));
        assert_eq!(pool.take().map(|c| c.id), Some(1));
        assert!(pool.take().is_none());
    }

    #[tokio::test]
    async fn test_overflow_is_closed() {
        let closed = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::new(2);
        for id in 0..5 {
            pool.put(conn(id, &closed));
        }
        assert_eq!(pool.len(), 2);

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(closed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_close_drains() {
        let closed = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::new(MAX_IDLE_CONNECTIONS);
        pool.put(conn(1, &closed));
        pool.put(conn(2, &closed));

        pool.close().await;
        assert!(pool.is_empty());
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }
}
