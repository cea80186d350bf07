//! 会话 cookie 签名
//!
//! token 格式为 `<session-id>.<hex(HMAC-SHA256(session-id))>`，
//! 校验失败的 token 一律视为新客户端。

use super::SessionId;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// 会话 cookie 名
pub const SESSION_COOKIE: &str = "chatrelay_session";

#[derive(Clone)]
pub struct SessionSigner {
    secret: Vec<u8>,
}

impl SessionSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length")
    }

    pub fn sign(&self, session: &SessionId) -> String {
        let mut mac = self.mac();
        mac.update(session.as_str().as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("{}.{}", session.as_str(), signature)
    }

    /// 校验 token，签名使用常量时间比较
    pub fn verify(&self, token: &str) -> Option<SessionId> {
        let (raw_id, signature_hex) = token.split_once('.')?;
        let session = SessionId::parse(raw_id)?;
        let signature = hex::decode(signature_hex).ok()?;

        let mut mac = self.mac();
        mac.update(session.as_str().as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(session)
    }

    /// `Set-Cookie` 头的值
    pub fn cookie_header(&self, session: &SessionId) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE,
            self.sign(session)
        )
    }
}

/// 从 `Cookie` 头中取出会话 token
pub fn find_session_token(cookie_header: &str) -> Option<&str> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}
