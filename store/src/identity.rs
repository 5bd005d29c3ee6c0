//! Sessions, user identity and counters.
//!
//! The identity service (out of scope here) writes `session:<token>` records;
//! the gateway reads them and resolves a stable game-internal uid through the
//! `openid_to_uid` mapping, allocating from a monotonic counter on first
//! sight. User records live in a hash per uid.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::redis::Store;

/// Guest accounts are minted by the identity service with this openid prefix.
pub const GUEST_PREFIX: &str = "guest_";

const USER_UID_COUNTER: &str = "global:user_uid";
const BATTLE_ID_COUNTER: &str = "global:battle_id";

/// Session record written by the identity service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub user_id: u64,
    pub openid: String,
    pub username: String,
    #[serde(default)]
    pub login_time: i64,
    pub expires_at: i64,
    #[serde(default)]
    pub app_id: String,
}

impl SessionData {
    pub fn is_expired(&self, now_unix: i64) -> bool {
        now_unix > self.expires_at
    }
}

/// Persistent per-user resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub exp: i64,
    pub gold: i64,
    pub diamond: i64,
    pub nickname: String,
}

pub fn is_guest(openid: &str) -> bool {
    openid.starts_with(GUEST_PREFIX)
}

pub fn level_for_exp(exp: i64) -> i32 {
    (exp / 1000) as i32
}

/// Resources a user starts with on first sight. Guests get a reduced grant.
pub fn initial_user(openid: &str, username: &str) -> UserRecord {
    let (gold, diamond) = if is_guest(openid) { (50, 5) } else { (100, 10) };
    UserRecord {
        exp: 0,
        gold,
        diamond,
        nickname: username.to_string(),
    }
}

#[derive(Clone)]
pub struct IdentityStore {
    store: Store,
}

impl IdentityStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Resolve a session token. Returns `None` for unknown or expired tokens.
    pub async fn session(&self, token: &str) -> Result<Option<SessionData>, StoreError> {
        let Some(session) = self
            .store
            .get_json::<SessionData>(&format!("session:{token}"))
            .await?
        else {
            return Ok(None);
        };
        if session.is_expired(unix_now()) {
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Look up the uid mapped to an openid, or allocate one and materialise
    /// the default user record.
    pub async fn find_or_create_user(
        &self,
        openid: &str,
        username: &str,
    ) -> Result<(UserRecord, u64), StoreError> {
        let mapping_key = format!("openid_to_uid:{openid}");

        if let Some(existing) = self.store.get_string(&mapping_key).await? {
            if let Ok(uid) = existing.parse::<u64>() {
                let record = self.load_user(uid).await?;
                return Ok((record, uid));
            }
        }

        let uid = self.store.incr(USER_UID_COUNTER).await?;
        self.store.set_string(&mapping_key, &uid.to_string()).await?;

        let record = initial_user(openid, username);
        self.save_user(uid, &record).await?;
        tracing::info!(
            openid,
            username,
            uid,
            guest = is_guest(openid),
            "created new user"
        );
        Ok((record, uid))
    }

    pub async fn load_user(&self, uid: u64) -> Result<UserRecord, StoreError> {
        let fields = self.store.hget_all(&format!("user:{uid}")).await?;
        Ok(user_from_fields(&fields))
    }

    pub async fn save_user(&self, uid: u64, record: &UserRecord) -> Result<(), StoreError> {
        self.store
            .hset_all(
                &format!("user:{uid}"),
                &[
                    ("exp", record.exp.to_string()),
                    ("gold", record.gold.to_string()),
                    ("diamond", record.diamond.to_string()),
                    ("nickname", record.nickname.clone()),
                ],
            )
            .await
    }

    /// Allocate the next room id.
    pub async fn next_battle_id(&self) -> Result<u64, StoreError> {
        self.store.incr(BATTLE_ID_COUNTER).await
    }

    /// Routing table: which gateway hosts a user's socket. Written at auth,
    /// cleared when the session closes. A stale entry self-heals via TTL.
    pub async fn set_user_gateway(&self, uid: u64, notify_addr: &str) -> Result<(), StoreError> {
        self.store
            .set_string_ex(
                &format!("user_gateway:{uid}"),
                notify_addr,
                Duration::from_secs(24 * 3600),
            )
            .await
    }

    pub async fn user_gateway(&self, uid: u64) -> Result<Option<String>, StoreError> {
        self.store.get_string(&format!("user_gateway:{uid}")).await
    }

    pub async fn clear_user_gateway(&self, uid: u64) -> Result<(), StoreError> {
        self.store.delete(&format!("user_gateway:{uid}")).await
    }
}

fn user_from_fields(fields: &HashMap<String, String>) -> UserRecord {
    let int = |name: &str| {
        fields
            .get(name)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
    };
    UserRecord {
        exp: int("exp"),
        gold: int("gold"),
        diamond: int("diamond"),
        nickname: fields.get("nickname").cloned().unwrap_or_default(),
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_detection() {
        assert!(is_guest("guest_abc123"));
        assert!(!is_guest("wx_openid_1"));
        assert!(!is_guest("gues"));
    }

    #[test]
    fn level_derivation() {
        assert_eq!(level_for_exp(0), 0);
        assert_eq!(level_for_exp(999), 0);
        assert_eq!(level_for_exp(1000), 1);
        assert_eq!(level_for_exp(12_500), 12);
    }

    #[test]
    fn guests_get_reduced_grant() {
        let guest = initial_user("guest_x", "visitor");
        let regular = initial_user("openid_x", "player");
        assert_eq!((guest.gold, guest.diamond), (50, 5));
        assert_eq!((regular.gold, regular.diamond), (100, 10));
        assert_eq!(guest.exp, 0);
    }

    #[test]
    fn session_expiry() {
        let session = SessionData {
            user_id: 0,
            openid: "o".into(),
            username: "u".into(),
            login_time: 0,
            expires_at: 1_000,
            app_id: String::new(),
        };
        assert!(!session.is_expired(999));
        assert!(!session.is_expired(1_000));
        assert!(session.is_expired(1_001));
    }

    #[test]
    fn user_record_field_parsing() {
        let mut fields = HashMap::new();
        fields.insert("exp".to_string(), "2500".to_string());
        fields.insert("gold".to_string(), "77".to_string());
        fields.insert("nickname".to_string(), "ada".to_string());
        let record = user_from_fields(&fields);
        assert_eq!(record.exp, 2500);
        assert_eq!(record.gold, 77);
        assert_eq!(record.diamond, 0);
        assert_eq!(record.nickname, "ada");
    }
}
