//! 进程内会话表：每个浏览器会话一份独立状态，闲置超时后回收

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::runner::SharedSession;
use crate::model::SessionState;
use crate::util::logging::standards::events;

struct SessionEntry {
    state: SharedSession,
    last_active: Instant,
}

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    max_images: usize,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(max_images: usize, idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_images,
            idle_timeout,
        }
    }

    /// 取出会话状态，不存在则新建；同时刷新活跃时间
    pub fn get_or_create(&self, session_id: &str) -> SharedSession {
        let mut sessions = self.sessions.lock();
        let entry = sessions.entry(session_id.to_string()).or_insert_with(|| {
            info!(event = events::SESSION_CREATED, session_id = %session_id);
            SessionEntry {
                state: Arc::new(Mutex::new(SessionState::new(self.max_images))),
                last_active: Instant::now(),
            }
        });
        entry.last_active = Instant::now();
        entry.state.clone()
    }

    pub fn get(&self, session_id: &str) -> Option<SharedSession> {
        let mut sessions = self.sessions.lock();
        sessions.get_mut(session_id).map(|entry| {
            entry.last_active = Instant::now();
            entry.state.clone()
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// 回收闲置会话，运行中的会话保留；返回回收数量
    pub fn sweep_idle(&self) -> usize {
        self.sweep_idle_at(Instant::now())
    }

    fn sweep_idle_at(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|session_id, entry| {
            let idle = now.saturating_duration_since(entry.last_active);
            if idle < self.idle_timeout {
                return true;
            }
            let busy = entry
                .state
                .try_lock()
                .map_or(true, |state| state.is_busy());
            if !busy {
                info!(
                    event = events::SESSION_EXPIRED,
                    session_id = %session_id,
                    idle_secs = idle.as_secs()
                );
            }
            busy
        });
        before - sessions.len()
    }

    /// 后台定期回收
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = self.sweep_idle();
                if removed > 0 {
                    debug!(event = events::SESSION_EXPIRED, removed, remaining = self.len());
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UploadedImage;

    #[test]
    fn same_id_shares_state() {
        let registry = SessionRegistry::new(2, Duration::from_secs(60));
        let a = registry.get_or_create("s1");
        let b = registry.get_or_create("s1");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &registry.get_or_create("s2")));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn idle_sessions_are_evicted_and_previews_released() {
        let registry = SessionRegistry::new(2, Duration::from_secs(60));
        let session = registry.get_or_create("s1");
        let image = UploadedImage::ingest(vec![1, 2, 3], "image/png", None, 64, None).unwrap();
        let preview = image.preview().path().to_path_buf();
        session.lock().ingest(image).unwrap();
        drop(session);

        assert_eq!(registry.sweep_idle_at(Instant::now()), 0);
        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(registry.sweep_idle_at(later), 1);
        assert!(registry.is_empty());
        assert!(!preview.exists());
    }

    #[test]
    fn busy_sessions_survive_sweep() {
        let registry = SessionRegistry::new(2, Duration::from_secs(60));
        registry.get_or_create("s1").lock().set_busy(true);
        let later = Instant::now() + Duration::from_secs(120);
        assert_eq!(registry.sweep_idle_at(later), 0);
        assert!(registry.get("s1").is_some());
    }
}
