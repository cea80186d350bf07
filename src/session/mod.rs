//! 会话级 API 密钥缓存
//!
//! 每个会话最多为每个 provider 保存一个密钥，写入时不做校验，
//! 首次调用上游时才知道密钥是否有效。会话空闲超过 TTL 后视为不存在，
//! 由后台清理任务定期回收。

pub mod token;

use crate::error::RelayError;
use crate::providers::ProviderKind;
use crate::Result;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// 会话标识（UUID v4）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// 只接受合法 UUID，其余输入视为无效会话
    pub fn parse(raw: &str) -> Option<Self> {
        uuid::Uuid::parse_str(raw).ok().map(|id| Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct SessionEntry {
    credentials: HashMap<String, String>,
    last_seen: Instant,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            credentials: HashMap::new(),
            last_seen: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.last_seen.elapsed() > ttl
    }
}

/// 会话密钥存储，通过 `Arc` 在请求处理器之间共享
pub struct SessionStore {
    sessions: DashMap<SessionId, SessionEntry>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// 保存或覆盖某个 provider 的密钥
    pub fn set(&self, session: &SessionId, provider: &str, api_key: &str) -> Result<()> {
        let provider = provider.trim();
        // 密钥原样保存，只在判空时忽略空白
        if provider.is_empty() || api_key.trim().is_empty() {
            return Err(RelayError::input("Provider and API key are required"));
        }

        let mut entry = self
            .sessions
            .entry(session.clone())
            .or_insert_with(SessionEntry::new);
        if entry.is_expired(self.ttl) {
            entry.credentials.clear();
        }
        entry
            .credentials
            .insert(provider.to_string(), api_key.to_string());
        entry.last_seen = Instant::now();
        Ok(())
    }

    /// 读取密钥，不存在时返回 None，由调用方决定如何处理
    pub fn get(&self, session: &SessionId, provider: &str) -> Option<String> {
        let mut entry = self.sessions.get_mut(session)?;
        if entry.is_expired(self.ttl) {
            return None;
        }
        entry.last_seen = Instant::now();
        entry
            .credentials
            .get(provider)
            .filter(|key| !key.is_empty())
            .cloned()
    }

    /// 已保存密钥的 provider，按固定顺序返回
    pub fn list_active(&self, session: &SessionId) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.get(session, kind.as_str()).is_some())
            .collect()
    }

    /// 清理过期会话，返回清理数量
    pub fn purge_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| !entry.is_expired(self.ttl));
        let purged = before.saturating_sub(self.sessions.len());
        if purged > 0 {
            debug!(purged, "清理过期会话");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
