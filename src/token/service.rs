//! Issuance, validation, rotation, and revocation against a [`TokenStore`].
//!
//! Check order is fixed: absent, expired, revoked, rotated, then the secret
//! hash. Expiry comes before the rotated/revoked flags so an expired token
//! never reveals what happened to it, and the used-check comes before the
//! hash comparison so a replayed handle revokes its lineage even when the
//! presenter does not know the secret.

use chrono::{Duration, Utc};
use serde_json::json;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::guard::alert::{AlertDispatcher, AlertSeverity};
use crate::token::error::TokenError;
use crate::token::hasher::CredentialHasher;
use crate::token::model::RefreshTokenRecord;
use crate::token::store::{StoreError, TokenStore};

/// Request metadata stamped onto issued records.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<IpAddr>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn TokenStore>,
    hasher: Arc<dyn CredentialHasher>,
    alerts: Arc<dyn AlertDispatcher>,
}

impl TokenService {
    #[must_use]
    pub fn new(
        store: Arc<dyn TokenStore>,
        hasher: Arc<dyn CredentialHasher>,
        alerts: Arc<dyn AlertDispatcher>,
    ) -> Self {
        Self {
            store,
            hasher,
            alerts,
        }
    }

    /// Mint a record for a freshly generated `jti` and secret. A new login
    /// passes a fresh `lineage_id`; rotation reuses the old one.
    ///
    /// # Errors
    /// Fails with [`TokenError::Store`] when the record cannot be persisted,
    /// including a `jti` collision.
    pub async fn issue(
        &self,
        user_id: Uuid,
        jti: Uuid,
        lineage_id: Uuid,
        raw_secret: &str,
        ttl_seconds: i64,
        client: &ClientInfo,
    ) -> Result<RefreshTokenRecord, TokenError> {
        let now = Utc::now();
        let secret_hash = self
            .hasher
            .hash(raw_secret)
            .map_err(|err| TokenError::Store(StoreError::Backend(err)))?;
        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            jti,
            lineage_id,
            user_id,
            secret_hash,
            issued_at: now,
            expires_at: now + Duration::seconds(ttl_seconds),
            ip_address: client.ip_address,
            user_agent: client.user_agent.clone(),
            last_used_at: None,
            is_used: false,
            is_revoked: false,
            replaced_by_jti: None,
        };
        self.store.insert(&record).await?;
        Ok(record)
    }

    /// Check a presented token against stored state and stamp its last use.
    ///
    /// # Errors
    /// `InvalidToken` for an unknown `jti` or a wrong secret, `TokenExpired`
    /// past expiry, `TokenRevoked` once revoked, `ReplayDetected` when the
    /// record was already rotated away (after revoking its lineage).
    pub async fn validate(
        &self,
        jti: Uuid,
        raw_secret: &str,
    ) -> Result<RefreshTokenRecord, TokenError> {
        let now = Utc::now();
        let Some(mut record) = self.store.find(jti).await? else {
            return Err(TokenError::InvalidToken);
        };
        if record.is_expired(now) {
            return Err(TokenError::TokenExpired);
        }
        if record.is_revoked {
            return Err(TokenError::TokenRevoked);
        }
        if record.is_used {
            self.handle_replay(&record, "validate").await;
            return Err(TokenError::ReplayDetected);
        }
        if !self.hasher.verify(raw_secret, &record.secret_hash) {
            return Err(TokenError::InvalidToken);
        }
        self.store.touch_last_used(jti, now).await?;
        record.last_used_at = Some(now);
        Ok(record)
    }

    /// Retire `old_jti` exactly once and mint its successor in the same
    /// lineage. The retire step is a conditional update; losing it means a
    /// concurrent caller (or an attacker racing a stolen token) already won,
    /// which is handled exactly like a replay.
    ///
    /// # Errors
    /// `Unauthorized` when the old token does not exist; otherwise the same
    /// kinds as [`TokenService::validate`].
    pub async fn rotate(
        &self,
        old_jti: Uuid,
        old_secret: &str,
        new_jti: Uuid,
        new_secret: &str,
        ttl_seconds: i64,
        client: &ClientInfo,
    ) -> Result<RefreshTokenRecord, TokenError> {
        let now = Utc::now();
        let Some(old) = self.store.find(old_jti).await? else {
            return Err(TokenError::Unauthorized);
        };
        if old.is_expired(now) {
            return Err(TokenError::TokenExpired);
        }
        if old.is_revoked {
            return Err(TokenError::TokenRevoked);
        }
        if old.is_used {
            self.handle_replay(&old, "rotate").await;
            return Err(TokenError::ReplayDetected);
        }
        if !self.hasher.verify(old_secret, &old.secret_hash) {
            return Err(TokenError::InvalidToken);
        }

        let secret_hash = self
            .hasher
            .hash(new_secret)
            .map_err(|err| TokenError::Store(StoreError::Backend(err)))?;
        let successor = RefreshTokenRecord {
            id: Uuid::new_v4(),
            jti: new_jti,
            lineage_id: old.lineage_id,
            user_id: old.user_id,
            secret_hash,
            issued_at: now,
            expires_at: now + Duration::seconds(ttl_seconds),
            ip_address: client.ip_address,
            user_agent: client.user_agent.clone(),
            last_used_at: None,
            is_used: false,
            is_revoked: false,
            replaced_by_jti: None,
        };

        if !self.store.mark_rotated(old_jti, new_jti, now).await? {
            // Someone else flipped the record between our read and the
            // conditional update. Indistinguishable from replay, same
            // treatment.
            self.handle_replay(&old, "rotate").await;
            return Err(TokenError::ReplayDetected);
        }
        self.store.insert(&successor).await?;
        Ok(successor)
    }

    /// # Errors
    /// Fails with [`TokenError::Store`] on backend failure.
    pub async fn revoke(&self, jti: Uuid) -> Result<bool, TokenError> {
        Ok(self.store.revoke(jti).await?)
    }

    /// # Errors
    /// Fails with [`TokenError::Store`] on backend failure.
    pub async fn revoke_lineage(&self, lineage_id: Uuid, user_id: Uuid) -> Result<u64, TokenError> {
        Ok(self.store.revoke_lineage(lineage_id, user_id).await?)
    }

    /// Forced logout: revoke every live record the user has.
    ///
    /// # Errors
    /// Fails with [`TokenError::Store`] on backend failure.
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, TokenError> {
        Ok(self.store.revoke_all_for_user(user_id).await?)
    }

    /// # Errors
    /// Fails with [`TokenError::Store`] on backend failure.
    pub async fn list_active(&self, user_id: Uuid) -> Result<Vec<RefreshTokenRecord>, TokenError> {
        Ok(self.store.list_active(user_id, Utc::now()).await?)
    }

    /// # Errors
    /// Fails with [`TokenError::Store`] on backend failure.
    pub async fn count_active(&self, user_id: Uuid) -> Result<u64, TokenError> {
        Ok(self.store.count_active(user_id, Utc::now()).await?)
    }

    /// Purge every record past expiry. Returns how many were removed.
    ///
    /// # Errors
    /// Fails with [`TokenError::Store`] on backend failure.
    pub async fn sweep_expired(&self) -> Result<u64, TokenError> {
        Ok(self.store.delete_expired(Utc::now()).await?)
    }

    /// A token observed as already rotated at the moment of use: revoke the
    /// whole lineage and raise an alert. The revocation is best-effort; even
    /// if the store fails here the caller still sees the replay error, and
    /// the failure is logged for operators.
    async fn handle_replay(&self, record: &RefreshTokenRecord, operation: &str) {
        warn!(
            jti = %record.jti,
            lineage = %record.lineage_id,
            user = %record.user_id,
            operation,
            "refresh token reuse detected, revoking lineage"
        );
        match self
            .store
            .revoke_lineage(record.lineage_id, record.user_id)
            .await
        {
            Ok(revoked) => {
                info!(revoked, lineage = %record.lineage_id, "lineage revoked after token reuse");
            }
            Err(err) => {
                error!("failed to revoke lineage after token reuse: {err}");
            }
        }
        self.alerts.send(
            AlertSeverity::Critical,
            "refresh token replay detected",
            json!({
                "jti": record.jti,
                "lineage_id": record.lineage_id,
                "user_id": record.user_id,
                "operation": operation,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::alert::MemoryAlertDispatcher;
    use crate::token::generate_secret;
    use crate::token::hasher::Sha256Hasher;
    use crate::token::store::MemoryTokenStore;
    use async_trait::async_trait;
    use chrono::DateTime;

    const TTL: i64 = 3600;

    struct Harness {
        service: TokenService,
        store: Arc<MemoryTokenStore>,
        alerts: Arc<MemoryAlertDispatcher>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryTokenStore::new());
        let alerts = Arc::new(MemoryAlertDispatcher::new());
        let service = TokenService::new(store.clone(), Arc::new(Sha256Hasher), alerts.clone());
        Harness {
            service,
            store,
            alerts,
        }
    }

    async fn login(service: &TokenService, user_id: Uuid) -> (RefreshTokenRecord, String) {
        let secret = generate_secret().unwrap();
        let record = service
            .issue(
                user_id,
                Uuid::new_v4(),
                Uuid::new_v4(),
                &secret,
                TTL,
                &ClientInfo::default(),
            )
            .await
            .unwrap();
        (record, secret)
    }

    #[tokio::test]
    async fn issue_stores_hash_not_secret() {
        let h = harness();
        let (record, secret) = login(&h.service, Uuid::new_v4()).await;

        assert_ne!(record.secret_hash, secret);
        assert!(!record.is_used);
        assert!(!record.is_revoked);
        assert!(record.replaced_by_jti.is_none());
        assert!(Sha256Hasher.verify(&secret, &record.secret_hash));
    }

    #[tokio::test]
    async fn validate_accepts_live_token_and_stamps_use() {
        let h = harness();
        let (record, secret) = login(&h.service, Uuid::new_v4()).await;

        let validated = h.service.validate(record.jti, &secret).await.unwrap();
        assert_eq!(validated.jti, record.jti);
        assert!(validated.last_used_at.is_some());

        let stored = h.store.find(record.jti).await.unwrap().unwrap();
        assert!(stored.last_used_at.is_some());
    }

    #[tokio::test]
    async fn validate_unknown_jti_is_invalid_token() {
        let h = harness();
        let err = h.service.validate(Uuid::new_v4(), "secret").await.unwrap_err();
        assert!(matches!(err, TokenError::InvalidToken));
    }

    #[tokio::test]
    async fn validate_wrong_secret_keeps_lineage_alive() {
        let h = harness();
        let user = Uuid::new_v4();
        let (record, _) = login(&h.service, user).await;

        let err = h.service.validate(record.jti, "wrong").await.unwrap_err();
        assert!(matches!(err, TokenError::InvalidToken));

        // A bad secret is not a replay: nothing is revoked, no alert.
        assert_eq!(h.service.count_active(user).await.unwrap(), 1);
        assert!(h.alerts.sent().is_empty());
    }

    #[tokio::test]
    async fn validate_revoked_token_reports_revoked() {
        let h = harness();
        let (record, secret) = login(&h.service, Uuid::new_v4()).await;
        h.service.revoke(record.jti).await.unwrap();

        let err = h.service.validate(record.jti, &secret).await.unwrap_err();
        assert!(matches!(err, TokenError::TokenRevoked));
    }

    #[tokio::test]
    async fn expiry_wins_over_used_and_revoked() {
        let h = harness();
        let now = Utc::now();
        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            jti: Uuid::new_v4(),
            lineage_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            secret_hash: Sha256Hasher.hash("secret").unwrap(),
            issued_at: now - Duration::hours(2),
            expires_at: now - Duration::hours(1),
            ip_address: None,
            user_agent: None,
            last_used_at: None,
            is_used: true,
            is_revoked: true,
            replaced_by_jti: None,
        };
        h.store.insert(&record).await.unwrap();

        let err = h.service.validate(record.jti, "secret").await.unwrap_err();
        assert!(matches!(err, TokenError::TokenExpired));
        // Expired tokens never trigger replay side effects.
        assert!(h.alerts.sent().is_empty());
    }

    #[tokio::test]
    async fn rotate_retires_old_and_mints_successor_in_lineage() {
        let h = harness();
        let user = Uuid::new_v4();
        let (old, old_secret) = login(&h.service, user).await;

        let new_jti = Uuid::new_v4();
        let new_secret = generate_secret().unwrap();
        let successor = h
            .service
            .rotate(old.jti, &old_secret, new_jti, &new_secret, TTL, &ClientInfo::default())
            .await
            .unwrap();

        assert_eq!(successor.jti, new_jti);
        assert_eq!(successor.lineage_id, old.lineage_id);
        assert_eq!(successor.user_id, user);
        assert!(!successor.is_used);

        let retired = h.store.find(old.jti).await.unwrap().unwrap();
        assert!(retired.is_used);
        assert_eq!(retired.replaced_by_jti, Some(new_jti));

        // Old secret is dead, successor validates.
        assert!(h.service.validate(old.jti, &old_secret).await.is_err());
        assert!(h.service.validate(new_jti, &new_secret).await.is_ok());
    }

    #[tokio::test]
    async fn rotate_with_wrong_secret_is_invalid_not_replay() {
        let h = harness();
        let user = Uuid::new_v4();
        let (old, _) = login(&h.service, user).await;

        let err = h
            .service
            .rotate(
                old.jti,
                "wrong",
                Uuid::new_v4(),
                "next",
                TTL,
                &ClientInfo::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::InvalidToken));
        assert_eq!(h.service.count_active(user).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rotate_unknown_jti_is_unauthorized() {
        let h = harness();
        let err = h
            .service
            .rotate(
                Uuid::new_v4(),
                "secret",
                Uuid::new_v4(),
                "next",
                TTL,
                &ClientInfo::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::Unauthorized));
    }

    #[tokio::test]
    async fn second_rotation_of_same_token_revokes_whole_lineage() {
        let h = harness();
        let user = Uuid::new_v4();
        let (old, old_secret) = login(&h.service, user).await;

        let successor = h
            .service
            .rotate(
                old.jti,
                &old_secret,
                Uuid::new_v4(),
                &generate_secret().unwrap(),
                TTL,
                &ClientInfo::default(),
            )
            .await
            .unwrap();

        let err = h
            .service
            .rotate(
                old.jti,
                &old_secret,
                Uuid::new_v4(),
                "next",
                TTL,
                &ClientInfo::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::ReplayDetected));
        assert!(err.is_client_fault());

        // Both the replayed record and its successor are dead.
        let old_stored = h.store.find(old.jti).await.unwrap().unwrap();
        let new_stored = h.store.find(successor.jti).await.unwrap().unwrap();
        assert!(old_stored.is_revoked);
        assert!(new_stored.is_revoked);
        assert_eq!(h.service.count_active(user).await.unwrap(), 0);

        assert_eq!(h.alerts.count_of(AlertSeverity::Critical), 1);
    }

    #[tokio::test]
    async fn replayed_validate_also_revokes_lineage() {
        let h = harness();
        let user = Uuid::new_v4();
        let (old, old_secret) = login(&h.service, user).await;
        h.service
            .rotate(
                old.jti,
                &old_secret,
                Uuid::new_v4(),
                &generate_secret().unwrap(),
                TTL,
                &ClientInfo::default(),
            )
            .await
            .unwrap();

        let err = h.service.validate(old.jti, &old_secret).await.unwrap_err();
        assert!(matches!(err, TokenError::ReplayDetected));
        assert_eq!(h.service.count_active(user).await.unwrap(), 0);
        assert_eq!(h.alerts.count_of(AlertSeverity::Critical), 1);
    }

    /// Store double whose conditional update always reports a lost race.
    struct RaceLosingStore {
        inner: MemoryTokenStore,
    }

    #[async_trait]
    impl crate::token::store::TokenStore for RaceLosingStore {
        async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
            self.inner.insert(record).await
        }
        async fn find(&self, jti: Uuid) -> Result<Option<RefreshTokenRecord>, StoreError> {
            self.inner.find(jti).await
        }
        async fn mark_rotated(
            &self,
            _jti: Uuid,
            _replaced_by: Uuid,
            _now: DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn touch_last_used(&self, jti: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
            self.inner.touch_last_used(jti, now).await
        }
        async fn revoke(&self, jti: Uuid) -> Result<bool, StoreError> {
            self.inner.revoke(jti).await
        }
        async fn revoke_lineage(&self, lineage_id: Uuid, user_id: Uuid) -> Result<u64, StoreError> {
            self.inner.revoke_lineage(lineage_id, user_id).await
        }
        async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
            self.inner.revoke_all_for_user(user_id).await
        }
        async fn list_active(
            &self,
            user_id: Uuid,
            now: DateTime<Utc>,
        ) -> Result<Vec<RefreshTokenRecord>, StoreError> {
            self.inner.list_active(user_id, now).await
        }
        async fn count_active(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64, StoreError> {
            self.inner.count_active(user_id, now).await
        }
        async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
            self.inner.delete_expired(now).await
        }
    }

    #[tokio::test]
    async fn losing_the_conditional_update_is_treated_as_replay() {
        let store = Arc::new(RaceLosingStore {
            inner: MemoryTokenStore::new(),
        });
        let alerts = Arc::new(MemoryAlertDispatcher::new());
        let service = TokenService::new(store.clone(), Arc::new(Sha256Hasher), alerts.clone());

        let user = Uuid::new_v4();
        let secret = generate_secret().unwrap();
        let old = service
            .issue(user, Uuid::new_v4(), Uuid::new_v4(), &secret, TTL, &ClientInfo::default())
            .await
            .unwrap();

        let err = service
            .rotate(
                old.jti,
                &secret,
                Uuid::new_v4(),
                "next",
                TTL,
                &ClientInfo::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::ReplayDetected));
        assert_eq!(service.count_active(user).await.unwrap(), 0);
        assert_eq!(alerts.count_of(AlertSeverity::Critical), 1);
    }

    #[tokio::test]
    async fn revoke_all_for_user_counts_flips() {
        let h = harness();
        let user = Uuid::new_v4();
        login(&h.service, user).await;
        login(&h.service, user).await;
        login(&h.service, user).await;

        let revoked = h.service.revoke_all_for_user(user).await.unwrap();
        assert_eq!(revoked, 3);
        assert_eq!(h.service.count_active(user).await.unwrap(), 0);

        // Already-revoked records do not flip twice.
        assert_eq!(h.service.revoke_all_for_user(user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_records() {
        let h = harness();
        let user = Uuid::new_v4();
        login(&h.service, user).await;
        let secret = generate_secret().unwrap();
        h.service
            .issue(user, Uuid::new_v4(), Uuid::new_v4(), &secret, -10, &ClientInfo::default())
            .await
            .unwrap();

        assert_eq!(h.service.sweep_expired().await.unwrap(), 1);
        assert_eq!(h.store.len().await, 1);
        assert_eq!(h.service.sweep_expired().await.unwrap(), 0);
    }
}
