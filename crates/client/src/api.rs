//! Storefront API client.
//!
//! Holds the credential pair in [`SessionStorage`] and attaches the access
//! credential to every authorized call.
//!
//! # Refresh on 401
//!
//! A request rejected with 401 triggers at most one refresh, after which it
//! is retried once. A second 401 is terminal: the stored session is cleared
//! (forced logout) and [`ClientError::Unauthorized`] is returned. Concurrent
//! requests that hit 401 together share a single refresh; the rotation
//! credential is single-use, so racing refreshes would log the user out.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::instrument;
use url::Url;

use luzimarket_core::{
    DeliveryUpdate, DeliveryZone, DeliveryZoneId, SessionSummary, StateCode, TokenPair,
};

use crate::error::ClientError;
use crate::storage::{
    ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SessionStorage, clear_selection,
};

/// Storefront API client.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    http: reqwest::Client,
    base_url: Url,
    storage: Arc<dyn SessionStorage>,
    /// Serializes refreshes so one rotation credential is redeemed once.
    refresh_lock: Mutex<()>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl ApiClient {
    /// Create a client for the storefront at `base_url`.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created. This should never happen
    /// under normal circumstances as we use standard TLS configuration.
    #[must_use]
    pub fn new(base_url: Url, storage: Arc<dyn SessionStorage>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            inner: Arc::new(ApiClientInner {
                http,
                base_url,
                storage,
                refresh_lock: Mutex::new(()),
            }),
        }
    }

    /// The storage this client keeps its credentials in.
    #[must_use]
    pub fn storage(&self) -> Arc<dyn SessionStorage> {
        Arc::clone(&self.inner.storage)
    }

    /// Whether a credential pair is stored.
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.access_token().is_some() && self.refresh_token().is_some()
    }

    fn access_token(&self) -> Option<String> {
        self.inner.storage.get(ACCESS_TOKEN_KEY)
    }

    fn refresh_token(&self) -> Option<String> {
        self.inner.storage.get(REFRESH_TOKEN_KEY)
    }

    fn store_pair(&self, pair: &TokenPair) {
        self.inner
            .storage
            .set(ACCESS_TOKEN_KEY, pair.access_token.clone());
        self.inner
            .storage
            .set(REFRESH_TOKEN_KEY, pair.refresh_token.clone());
    }

    /// Forget the session: both credentials and the ephemeral selection.
    pub fn clear_session(&self) {
        self.inner.storage.remove(ACCESS_TOKEN_KEY);
        self.inner.storage.remove(REFRESH_TOKEN_KEY);
        clear_selection(self.inner.storage.as_ref());
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Start a guest session and store its credentials.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the request fails.
    #[instrument(skip(self))]
    pub async fn start_guest(&self) -> Result<TokenPair, ClientError> {
        let response = self
            .request(Method::POST, "/api/auth/guest", None, None)
            .await?;
        let pair: TokenPair = decode(response).await?;
        self.store_pair(&pair);
        Ok(pair)
    }

    /// Create an account. A stored guest session is carried forward.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Api` with status 409 if the email is taken.
    #[instrument(skip_all, fields(email = %email))]
    pub async fn register(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<TokenPair, ClientError> {
        self.sign_in("/api/auth/register", email, password).await
    }

    /// Sign in. A stored guest session and its delivery choice are carried
    /// forward.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Api` with status 401 on bad credentials.
    #[instrument(skip_all, fields(email = %email))]
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<TokenPair, ClientError> {
        self.sign_in("/api/auth/login", email, password).await
    }

    async fn sign_in(
        &self,
        path: &str,
        email: &str,
        password: &SecretString,
    ) -> Result<TokenPair, ClientError> {
        let body = json!({ "email": email, "password": password.expose_secret() });
        let bearer = self.access_token();
        let response = self
            .request(Method::POST, path, Some(&body), bearer.as_deref())
            .await?;
        let pair: TokenPair = decode(response).await?;
        self.store_pair(&pair);
        Ok(pair)
    }

    /// Exchange the stored rotation credential for a fresh pair.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Unauthorized` and clears the session if the
    /// rotation credential is rejected.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<TokenPair, ClientError> {
        let _guard = self.inner.refresh_lock.lock().await;
        self.rotate().await
    }

    /// Redeem the rotation credential. Caller holds `refresh_lock`.
    async fn rotate(&self) -> Result<TokenPair, ClientError> {
        let refresh_token = self.refresh_token().ok_or(ClientError::NoActiveSession)?;
        let body = json!({ "refreshToken": refresh_token });
        let response = self
            .request(Method::POST, "/api/auth/refresh", Some(&body), None)
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::info!("rotation credential rejected, clearing session");
            self.clear_session();
            return Err(ClientError::Unauthorized);
        }

        let pair: TokenPair = decode(response).await?;
        self.store_pair(&pair);
        Ok(pair)
    }

    /// End the session on the server and locally.
    ///
    /// Local state is cleared even if the server call fails.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the server call fails.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self
            .authorized(Method::POST, "/api/auth/logout", None)
            .await;
        self.clear_session();
        match result {
            Ok(_) | Err(ClientError::NoActiveSession | ClientError::Unauthorized) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Current subject and its restored delivery preference.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoActiveSession` if no credentials are stored.
    pub async fn session(&self) -> Result<SessionSummary, ClientError> {
        let response = self
            .authorized(Method::GET, "/api/auth/session", None)
            .await?;
        decode(response).await
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Active zones of `state`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the request fails.
    pub async fn zones(&self, state: &StateCode) -> Result<Vec<DeliveryZone>, ClientError> {
        let mut url = self.inner.base_url.join("/api/delivery/zones")?;
        url.query_pairs_mut().append_pair("state", state.as_str());
        let response = self.inner.http.get(url).send().await?;
        decode(response).await
    }

    /// One active zone, read from the live catalog. `None` once the zone
    /// has been deactivated or never existed.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the request fails.
    pub async fn zone(&self, id: DeliveryZoneId) -> Result<Option<DeliveryZone>, ClientError> {
        let url = self
            .inner
            .base_url
            .join(&format!("/api/delivery/zones/{id}"))?;
        let response = self.inner.http.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response).await.map(Some)
    }

    /// Save the delivery location for the current subject.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Api` with status 400 if the selection is invalid.
    #[instrument(skip_all, fields(state = %state, zone_id = %zone_id))]
    pub async fn update_session(
        &self,
        state: &StateCode,
        zone_id: DeliveryZoneId,
    ) -> Result<DeliveryUpdate, ClientError> {
        let body = json!({ "deliveryZoneId": zone_id, "stateCode": state });
        let response = self
            .authorized(Method::PATCH, "/api/auth/update-session", Some(&body))
            .await?;
        decode(response).await
    }

    // =========================================================================
    // Transport
    // =========================================================================

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        let url = self.inner.base_url.join(path)?;
        let mut request = self.inner.http.request(method, url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Send with the access credential, refreshing once on 401.
    async fn authorized(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ClientError> {
        let access = self.access_token().ok_or(ClientError::NoActiveSession)?;
        let response = self
            .request(method.clone(), path, body, Some(&access))
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let renewed = self.renew_after_rejection(&access).await?;
        let retried = self.request(method, path, body, Some(&renewed)).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(path, "request rejected after refresh, forcing logout");
            self.clear_session();
            return Err(ClientError::Unauthorized);
        }
        Ok(retried)
    }

    /// Obtain an access credential newer than `rejected`.
    async fn renew_after_rejection(&self, rejected: &str) -> Result<String, ClientError> {
        let _guard = self.inner.refresh_lock.lock().await;

        // Someone else already rotated while we waited.
        if let Some(current) = self.access_token()
            && current != rejected
        {
            return Ok(current);
        }

        let pair = self.rotate().await?;
        Ok(pair.access_token)
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let message = response
        .json::<ErrorBody>()
        .await
        .map_or_else(|_| status.to_string(), |body| body.error);
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}
