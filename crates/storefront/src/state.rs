//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use luzimarket_core::DeliveryZone;

use crate::config::StorefrontConfig;
use crate::db::memory::{
    MemoryCredentialStore, MemoryPreferenceStore, MemoryUserStore, MemoryZoneCatalog,
};
use crate::db::{
    CredentialStore, PgCredentialStore, PgPreferenceStore, PgUserStore, PgZoneCatalog,
    PreferenceStore, UserStore, ZoneCatalog,
};
use crate::services::auth::AuthService;
use crate::services::delivery::DeliveryService;
use crate::services::identity::{IdentityError, IdentityService};

/// The stores backing every request.
#[derive(Clone)]
pub struct Stores {
    pub credentials: Arc<dyn CredentialStore>,
    pub users: Arc<dyn UserStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub catalog: Arc<dyn ZoneCatalog>,
}

impl Stores {
    /// `PostgreSQL`-backed stores sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool, config: &StorefrontConfig) -> Self {
        Self {
            credentials: Arc::new(PgCredentialStore::new(pool.clone())),
            users: Arc::new(PgUserStore::new(pool.clone())),
            preferences: Arc::new(PgPreferenceStore::new(pool.clone())),
            catalog: Arc::new(PgZoneCatalog::new(pool.clone(), config.zone_cache_ttl)),
        }
    }

    /// In-memory stores over a fixed zone list.
    #[must_use]
    pub fn in_memory(zones: Vec<DeliveryZone>) -> Self {
        Self {
            credentials: Arc::new(MemoryCredentialStore::new()),
            users: Arc::new(MemoryUserStore::new()),
            preferences: Arc::new(MemoryPreferenceStore::new()),
            catalog: Arc::new(MemoryZoneCatalog::new(zones)),
        }
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like stores and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: Option<PgPool>,
    stores: Stores,
    identity: IdentityService,
}

impl AppState {
    /// Create application state over `PostgreSQL`.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential lifetimes are out of range.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, IdentityError> {
        let stores = Stores::postgres(&pool, &config);
        Self::with_stores(config, Some(pool), stores)
    }

    /// Create application state over arbitrary stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential lifetimes are out of range.
    pub fn with_stores(
        config: StorefrontConfig,
        pool: Option<PgPool>,
        stores: Stores,
    ) -> Result<Self, IdentityError> {
        let identity = IdentityService::new(Arc::clone(&stores.credentials), &config.tokens)?;
        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                stores,
                identity,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// The database pool, absent when running on in-memory stores.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    /// Get a reference to the session identity service.
    #[must_use]
    pub fn identity(&self) -> &IdentityService {
        &self.inner.identity
    }

    /// Account service for this request.
    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(self.inner.stores.users.as_ref())
    }

    /// Delivery preference service for this request.
    #[must_use]
    pub fn delivery(&self) -> DeliveryService<'_> {
        DeliveryService::new(
            self.inner.stores.catalog.as_ref(),
            self.inner.stores.preferences.as_ref(),
        )
    }
}
