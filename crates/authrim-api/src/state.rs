//! Shared application state and wiring
//!
//! Handlers receive everything through `AppState`; cross-request shared
//! mutation lives exclusively behind the storage adapters and actors.

use crate::auth::SessionAuthenticator;
use authrim_audit::{AuditLogger, AuditWorker, QueuedAuditLogger, TracingAuditLogger};
use authrim_config::AppConfig;
use authrim_core::actors::{CodeStoreHandle, DpopJtiGuard, FamilyStoreHandle};
use authrim_core::services::{
    AuthorizeService, ClientRegistry, DeviceAuthorizationService, IntrospectionService, ParService,
    RevocationService, TokenEngine, TokenEngineConfig, TokenGrantService,
};
use authrim_core::stores::{
    ClientStore, InMemoryClientStore, InMemoryRoleStore, InMemoryUserStore, RevocationList,
    RoleStore, UserStore,
};
use authrim_crypto::{JwksCacheHandle, SigningKeyManager, TokenSigner};
use authrim_kv::{JwksResponseCache, MemoryTtlStore, TtlStore};
use authrim_scim::{
    GroupSearchBackend, InMemoryGroupSearch, InMemoryUserSearch, ScimGroupService,
    ScimUserService, UserSearchBackend,
};
use chrono::Duration;
use secrecy::ExposeSecret;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<ClientRegistry>,
    pub authorize: Arc<AuthorizeService>,
    pub grants: Arc<TokenGrantService>,
    pub engine: Arc<TokenEngine>,
    pub introspection: Arc<IntrospectionService>,
    pub revocation: Arc<RevocationService>,
    pub par: Arc<ParService>,
    pub device: Arc<DeviceAuthorizationService>,
    pub scim_users: Arc<ScimUserService>,
    pub scim_groups: Arc<ScimGroupService>,
    pub key_manager: Arc<SigningKeyManager>,
    pub jwks_cache: Arc<JwksResponseCache>,
    pub users: Arc<dyn UserStore>,
    pub clients: Arc<dyn ClientStore>,
    pub roles: Arc<dyn RoleStore>,
    pub sessions: Arc<dyn SessionAuthenticator>,
    pub audit: Arc<dyn AuditLogger>,
    /// Bearer token protecting the admin and SCIM surfaces; `None` leaves
    /// them open (development only).
    pub admin_token: Option<String>,
}

/// Bridges the key manager's invalidation hook onto the KV-layer cache.
struct JwksCacheAdapter(Arc<JwksResponseCache>);

impl JwksCacheHandle for JwksCacheAdapter {
    fn invalidate(&self) -> anyhow::Result<()> {
        self.0.invalidate();
        Ok(())
    }
}

/// Everything `build_state` needs beyond the config.
pub struct StateStores {
    pub clients: Arc<dyn ClientStore>,
    pub users: Arc<dyn UserStore>,
    pub roles: Arc<dyn RoleStore>,
    /// List-endpoint search: SQL compilation over the relational store, or
    /// AST evaluation over the in-memory one.
    pub user_search: Arc<dyn UserSearchBackend>,
    pub group_search: Arc<dyn GroupSearchBackend>,
    pub kv: Arc<dyn TtlStore>,
    pub sessions: Arc<dyn SessionAuthenticator>,
    pub audit: Arc<dyn AuditLogger>,
    pub admin_token: Option<String>,
}

impl StateStores {
    /// In-process stores plus the tracing audit sink behind a bounded
    /// queue; the default for single-node runs and tests.
    pub fn in_memory(sessions: Arc<dyn SessionAuthenticator>) -> Self {
        let (queued, rx) = QueuedAuditLogger::new(1024);
        tokio::spawn(AuditWorker::new(rx, Arc::new(TracingAuditLogger)).run());
        let users: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
        let roles: Arc<dyn RoleStore> = Arc::new(InMemoryRoleStore::new());
        Self {
            clients: Arc::new(InMemoryClientStore::new()),
            user_search: Arc::new(InMemoryUserSearch::new(users.clone())),
            group_search: Arc::new(InMemoryGroupSearch::new(roles.clone())),
            users,
            roles,
            kv: Arc::new(MemoryTtlStore::new()),
            sessions,
            audit: Arc::new(queued),
            admin_token: None,
        }
    }

    /// Relational stores over a MySQL pool; ephemeral state stays in
    /// process.
    pub async fn relational(
        config: &AppConfig,
        sessions: Arc<dyn SessionAuthenticator>,
    ) -> anyhow::Result<Self> {
        let pool = authrim_db::connect(&config.database).await?;
        let (queued, rx) = QueuedAuditLogger::new(1024);
        tokio::spawn(AuditWorker::new(rx, Arc::new(TracingAuditLogger)).run());
        let users = Arc::new(authrim_db::UserRepository::new(pool.clone()));
        let roles = Arc::new(authrim_db::RoleRepository::new(pool.clone()));
        Ok(Self {
            clients: Arc::new(authrim_db::ClientRepository::new(pool)),
            user_search: users.clone(),
            group_search: roles.clone(),
            users,
            roles,
            kv: Arc::new(MemoryTtlStore::new()),
            sessions,
            audit: Arc::new(queued),
            admin_token: std::env::var("AUTHRIM_ADMIN_TOKEN").ok(),
        })
    }

    /// Pick relational when the configured URL is a MySQL DSN.
    pub async fn from_config(
        config: &AppConfig,
        sessions: Arc<dyn SessionAuthenticator>,
    ) -> anyhow::Result<Self> {
        if config.database.url.expose_secret().starts_with("mysql://") {
            Self::relational(config, sessions).await
        } else {
            let mut stores = Self::in_memory(sessions);
            stores.admin_token = std::env::var("AUTHRIM_ADMIN_TOKEN").ok();
            Ok(stores)
        }
    }
}

/// Wire the full service graph.
pub async fn build_state(config: AppConfig, stores: StateStores) -> anyhow::Result<AppState> {
    let issuer = config.server.issuer_url.trim_end_matches('/').to_string();
    let tokens = &config.tokens;

    let key_manager = Arc::new(
        SigningKeyManager::new(Duration::seconds(tokens.key_overlap_secs as i64)).await?,
    );
    let jwks_cache = Arc::new(JwksResponseCache::new());
    key_manager.set_jwks_cache(Arc::new(JwksCacheAdapter(jwks_cache.clone())));

    let signer = TokenSigner::new(key_manager.clone());
    let registry = Arc::new(ClientRegistry::new(stores.clients.clone()));

    let codes = CodeStoreHandle::spawn(stores.kv.clone());
    let families = FamilyStoreHandle::spawn(stores.kv.clone());
    let dpop_jti = DpopJtiGuard::spawn(stores.kv.clone());

    let engine = Arc::new(TokenEngine::new(
        signer,
        TokenEngineConfig {
            issuer: issuer.clone(),
            access_token_ttl: Duration::seconds(tokens.access_token_ttl_secs as i64),
            id_token_ttl: Duration::seconds(tokens.id_token_ttl_secs as i64),
            refresh_token_ttl: Duration::seconds(tokens.refresh_token_ttl_secs as i64),
            dpop_proof_window_secs: tokens.dpop_proof_window_secs,
        },
        RevocationList::new(stores.kv.clone()),
        families,
        dpop_jti,
        stores.audit.clone(),
    ));

    let authorize = Arc::new(AuthorizeService::new(
        registry.clone(),
        codes.clone(),
        stores.kv.clone(),
        Duration::seconds(tokens.auth_code_ttl_secs as i64),
        stores.audit.clone(),
    ));

    let device = Arc::new(DeviceAuthorizationService::new(
        stores.kv.clone(),
        &issuer,
        Duration::seconds(tokens.device_code_ttl_secs as i64),
    ));

    let grants = Arc::new(TokenGrantService::new(
        engine.clone(),
        codes,
        stores.users.clone(),
        device.clone(),
        stores.kv.clone(),
        stores.audit.clone(),
    ));

    let par = Arc::new(ParService::new(
        stores.kv.clone(),
        Duration::seconds(tokens.par_request_ttl_secs as i64),
    ));

    let scim_users = Arc::new(ScimUserService::new(
        stores.users.clone(),
        stores.user_search.clone(),
        stores.audit.clone(),
        config.scim.max_page_size,
    ));
    let scim_groups = Arc::new(ScimGroupService::new(
        stores.roles.clone(),
        stores.group_search.clone(),
        stores.audit.clone(),
        config.scim.max_page_size,
    ));

    Ok(AppState {
        introspection: Arc::new(IntrospectionService::new(engine.clone())),
        revocation: Arc::new(RevocationService::new(engine.clone(), stores.audit.clone())),
        config: Arc::new(config),
        registry,
        authorize,
        grants,
        engine,
        par,
        device,
        scim_users,
        scim_groups,
        key_manager,
        jwks_cache,
        users: stores.users,
        clients: stores.clients,
        roles: stores.roles,
        sessions: stores.sessions,
        audit: stores.audit,
        admin_token: stores.admin_token,
    })
}
