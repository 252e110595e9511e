use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::Value as JsonValue;
use url::Url;

use crate::cache::CacheStore;
use crate::error::{Error, Result};
use crate::model::{convert, Converted, Entity, Model, ResponseMeta, StringList};
use crate::utils::with_query;

mod rate_limit;

pub use rate_limit::RateLimitState;
use rate_limit::RateLimit;

/// Default API base URL.
pub const DEFAULT_URL: &str = "https://api.royaleapi.com";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const DEFAULT_CACHE_TABLE: &str = "cache";

/// The outcome of one dispatched request: the decoded payload plus where it
/// came from. `meta` is `None` when the payload was served from the cache.
#[derive(Debug)]
pub(crate) struct Fetched {
    pub payload: JsonValue,
    pub cached: bool,
    pub at: DateTime<Utc>,
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    base: String,
    timeout: Duration,
    cache: Option<CacheStore>,
    cache_ttl: Duration,
    rate_limit: RateLimit,
}

/// Asynchronous API client. Cheap to clone; all clones share the same HTTP
/// connection pool, response cache and rate-limit state.
///
/// ```no_run
/// # use rsroyale::client::Client;
/// # async fn run() -> rsroyale::error::Result<()> {
/// let client = Client::new("my api token")?;
/// let player = client.get_player("#2P0LYQ").await?;
///
/// assert_eq!(player.tag(), Some("#2P0LYQ"));
/// # Ok(()) }
/// ```
///
/// For synchronous use, see [`blocking::Client`][crate::blocking::Client].
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

/// Builder for [`Client`], covering the base URL, timeout and the optional
/// response cache.
///
/// ```no_run
/// # use rsroyale::client::Client;
/// # use std::time::Duration;
/// # fn main() -> rsroyale::error::Result<()> {
/// let client = Client::builder("my api token")
///     .timeout(Duration::from_secs(5))
///     .cache("royale-cache.db")
///     .cache_ttl(Duration::from_secs(60))
///     .build()?;
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct ClientBuilder {
    token: String,
    base_url: String,
    timeout: Duration,
    cache_path: Option<PathBuf>,
    cache_table: String,
    cache_ttl: Duration,
    user_agent_suffix: Option<String>,
}

impl ClientBuilder {
    fn new(token: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            token: token.into(),
            base_url: DEFAULT_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            cache_path: None,
            cache_table: DEFAULT_CACHE_TABLE.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            user_agent_suffix: None,
        }
    }

    /// Use a different base URL. Only use this if you know what you are
    /// doing (or are pointing the client at a test server).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Default timeout for each individual API call. Can be overridden per
    /// call; there is no cross-call deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable the response cache, stored in a SQLite database at `path`.
    pub fn cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Table name used inside the cache database.
    pub fn cache_table(mut self, table: impl Into<String>) -> Self {
        self.cache_table = table.into();
        self
    }

    /// How long a cached response stays fresh.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Appends to the default User-Agent header.
    pub fn user_agent(mut self, suffix: impl Into<String>) -> Self {
        self.user_agent_suffix = Some(suffix.into());
        self
    }

    pub fn build(self) -> Result<Client> {
        if self.token.is_empty() {
            return Err(Error::CannotCreateClient(String::from(
                "API token mustn't be empty",
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.token))?,
        );

        let user_agent = match &self.user_agent_suffix {
            Some(suffix) => format!("rsroyale/{} {}", env!("CARGO_PKG_VERSION"), suffix),
            None => format!("rsroyale/{}", env!("CARGO_PKG_VERSION")),
        };
        headers.insert(header::USER_AGENT, HeaderValue::from_str(&user_agent)?);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::CannotCreateClient(format!("{:?}", e)))?;

        let cache = match &self.cache_path {
            Some(path) => Some(CacheStore::open(path, &self.cache_table)?),
            None => None,
        };

        Ok(Client {
            inner: Arc::new(Inner {
                http,
                base: self.base_url.trim_end_matches('/').to_string(),
                timeout: self.timeout,
                cache,
                cache_ttl: self.cache_ttl,
                rate_limit: RateLimit::default(),
            }),
        })
    }
}

impl Client {
    /// Creates a client with default settings: no cache, 10 second timeout,
    /// the official API base URL.
    pub fn new(token: impl Into<String>) -> Result<Client> {
        ClientBuilder::new(token).build()
    }

    /// Returns a [`ClientBuilder`] for customized construction.
    pub fn builder(token: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(token)
    }

    /// The quota state as last reported by the server.
    pub fn rate_limit(&self) -> RateLimitState {
        self.inner.rate_limit.snapshot()
    }

    /// Empties the response cache. Does nothing when caching is disabled.
    pub fn clear_cache(&self) -> Result<()> {
        match &self.inner.cache {
            Some(cache) => cache.clear(),
            None => Ok(()),
        }
    }

    /// Builds the canonical URL for an endpoint: base + path, query merged
    /// and sorted so that equal requests share a cache bucket.
    pub(crate) fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let url = Url::parse(&format!("{}{}", self.inner.base, path))?;
        Ok(with_query(url, params))
    }

    /// The core request pipeline: cache lookup, rate-limit gate, transport
    /// call, status classification, cache write.
    ///
    /// On any dispatch failure the cache is consulted once more (even for
    /// `force_refresh` calls); a still-fresh record silently substitutes for
    /// the error. That trades consistency for availability and is the
    /// documented behavior, not an accident.
    pub(crate) async fn perform(
        &self,
        url: Url,
        method: Method,
        timeout: Option<Duration>,
        body: Option<JsonValue>,
        force_refresh: bool,
    ) -> Result<Fetched> {
        let bucket = url.as_str().to_string();

        if !force_refresh {
            if let Some(record) = self.fresh_cache_record(&bucket)? {
                tracing::debug!(bucket = %bucket, "serving from cache");
                return Ok(Fetched {
                    at: record.stored_at_utc(),
                    payload: record.payload,
                    cached: true,
                    meta: None,
                });
            }
        }

        match self.dispatch(&url, method, timeout, body).await {
            Ok(fetched) => Ok(fetched),
            Err(e) => {
                if let Ok(Some(record)) = self.fresh_cache_record(&bucket) {
                    tracing::debug!(
                        bucket = %bucket,
                        error = %e,
                        "dispatch failed, falling back to cached data"
                    );
                    return Ok(Fetched {
                        at: record.stored_at_utc(),
                        payload: record.payload,
                        cached: true,
                        meta: None,
                    });
                }
                Err(e)
            }
        }
    }

    /// Cache lookup applying the TTL. Uses the same freshness rule for both
    /// the normal pre-dispatch check and the fallback-on-error path.
    fn fresh_cache_record(&self, bucket: &str) -> Result<Option<crate::cache::CacheRecord>> {
        let Some(cache) = &self.inner.cache else {
            return Ok(None);
        };

        Ok(cache
            .get(bucket)?
            .filter(|record| record.is_fresh(self.inner.cache_ttl)))
    }

    /// One network round trip: gate, send, classify, absorb headers, cache.
    async fn dispatch(
        &self,
        url: &Url,
        method: Method,
        timeout: Option<Duration>,
        body: Option<JsonValue>,
    ) -> Result<Fetched> {
        self.inner.rate_limit.preflight(url.path())?;

        let mut request = self
            .inner
            .http
            .request(method.clone(), url.clone())
            .timeout(timeout.unwrap_or(self.inner.timeout));
        if let Some(json) = &body {
            request = request.json(json);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let text = response.text().await?;

        // Non-JSON bodies (the version endpoint, some error pages) are kept
        // as plain strings.
        let payload: JsonValue =
            serde_json::from_str(&text).unwrap_or(JsonValue::String(text));

        tracing::debug!(method = %method, url = %url, status, "dispatched request");

        classify(status, &payload)?;

        self.inner.rate_limit.absorb(&headers);
        if let Some(cache) = &self.inner.cache {
            cache.put(url.as_str(), &payload)?;
        }

        Ok(Fetched {
            payload,
            cached: false,
            at: Utc::now(),
            meta: Some(ResponseMeta { status, headers }),
        })
    }

    /// Dispatches and converts in one step; the shape is narrowed by the
    /// accessor that knows what the endpoint returns.
    pub(crate) async fn get_model<M: Model>(
        &self,
        url: Url,
        method: Method,
        timeout: Option<Duration>,
        body: Option<JsonValue>,
    ) -> Result<Converted<M>> {
        let fetched = self.perform(url.clone(), method, timeout, body, false).await?;
        convert(self.clone(), url, fetched)
    }

    /// Gets the API version string.
    pub async fn version(&self) -> Result<String> {
        let url = self.endpoint("/version", &[])?;
        self.get_model::<Entity>(url, Method::GET, None, None)
            .await?
            .text()
    }

    /// Gets the list of endpoints available in the API.
    pub async fn endpoints(&self) -> Result<StringList> {
        let url = self.endpoint("/endpoints", &[])?;
        self.get_model::<Entity>(url, Method::GET, None, None)
            .await?
            .strings()
    }

    /// Gets your token's usage statistics. This endpoint is exempt from the
    /// client-side rate-limit gate so the quota stays observable even when
    /// it is exhausted.
    pub async fn auth_stats(&self) -> Result<Entity> {
        let url = self.endpoint("/auth/stats", &[])?;
        self.get_model::<Entity>(url, Method::GET, None, None)
            .await?
            .one()
    }

    /// Gets the game constants. `keys`/`exclude` filter which top-level
    /// fields are included in the response.
    pub async fn constants(&self, options: FetchOptions) -> Result<Entity> {
        let url = self.endpoint("/constants", &options.to_params())?;
        self.get_model::<Entity>(url, Method::GET, options.timeout, None)
            .await?
            .one()
    }
}

/// Query options shared by most endpoints. Every field maps to a
/// whitelisted query parameter; anything else is unrepresentable.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Limit the number of items returned in the response.
    pub limit: Option<u32>,
    /// Resume a paged listing after this cursor.
    pub after: Option<String>,
    /// Resume a paged listing before this cursor.
    pub before: Option<String>,
    /// Only include these top-level keys in the response.
    pub keys: Vec<String>,
    /// Exclude these top-level keys from the response.
    pub exclude: Vec<String>,
    /// Overrides the client-wide timeout for this call.
    pub timeout: Option<Duration>,
}

impl FetchOptions {
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn keys<I: IntoIterator<Item = S>, S: Into<String>>(mut self, keys: I) -> Self {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude<I: IntoIterator<Item = S>, S: Into<String>>(mut self, exclude: I) -> Self {
        self.exclude = exclude.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(after) = &self.after {
            params.push(("after", after.clone()));
        }
        if let Some(before) = &self.before {
            params.push(("before", before.clone()));
        }
        if !self.keys.is_empty() {
            params.push(("keys", self.keys.join(",")));
        }
        if !self.exclude.is_empty() {
            params.push(("exclude", self.exclude.join(",")));
        }
        params
    }
}

/// Maps a status code to the error taxonomy. 2xx is success; everything in
/// the table below must stay exactly as documented by the service.
fn classify(status: u16, payload: &JsonValue) -> Result<()> {
    if (200..300).contains(&status) {
        return Ok(());
    }

    let message = error_message(payload);

    Err(match status {
        401 | 403 => Error::Unauthorized { status, message },
        400 | 404 => Error::NotFound { status, message },
        417 => Error::NotTracked { message },
        429 => Error::RateLimited { message },
        s if s >= 500 => Error::ServerFault { status, message },
        _ => Error::UnexpectedStatus { status, message },
    })
}

fn error_message(payload: &JsonValue) -> String {
    match payload {
        JsonValue::String(s) => s.clone(),
        JsonValue::Object(map) => map
            .get("message")
            .or_else(|| map.get("error"))
            .and_then(JsonValue::as_str)
            .unwrap_or("")
            .to_string(),
        _ => String::new(),
    }
}
