//! PetKit cloud HTTP client
//!
//! Resolves the regional gateway through the passport server, opens a
//! session with the account credentials and downloads the device roster
//! plus one detail document per feeder. A vendor "session expired" reply
//! triggers one re-login, shared by every request that saw the same expired
//! session.

use crate::client::SnapshotSource;
use crate::config::{MonitorConfig, PetkitCredentials, TimezoneSetting, CHINA_BASE_URL};
use crate::error::{PetkitError, Result};
use crate::model::{FeederRecord, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::try_join_all;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// Vendor error code meaning the session id is no longer valid
const SESSION_EXPIRED_CODE: i64 = 5;
/// Renew sessions this long before the vendor's stated expiry
const SESSION_RENEW_MARGIN_SECS: i64 = 60;

const API_VERSION: &str = "8.1.0";
const CLIENT_HEADER: &str = "petkit-feeder-rust";
const LOCALE: &str = "en-US";

/// Vendor reply envelope: either `result` or `error` is set
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
    error: Option<VendorError>,
}

#[derive(Debug, Clone, Deserialize)]
struct VendorError {
    code: i64,
    #[serde(default)]
    msg: String,
}

enum Reply<T> {
    Ok(T),
    Vendor(VendorError),
}

#[derive(Debug, Deserialize)]
struct RegionServers {
    list: Vec<RegionServer>,
}

#[derive(Debug, Clone, Deserialize)]
struct RegionServer {
    id: String,
    name: String,
    gateway: String,
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    session: SessionInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionInfo {
    id: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DeviceRoster {
    #[serde(default)]
    devices: Vec<RosterEntry>,
}

#[derive(Debug, Deserialize)]
struct RosterEntry {
    #[serde(rename = "type")]
    kind: String,
    data: RosterDevice,
}

#[derive(Debug, Deserialize)]
struct RosterDevice {
    id: Value,
    #[serde(rename = "type")]
    device_type: String,
}

impl RosterEntry {
    fn is_feeder(&self) -> bool {
        self.kind.eq_ignore_ascii_case("feeder")
    }
}

/// Gateway chosen for the configured region
#[derive(Debug, Clone)]
struct ResolvedRegion {
    id: String,
    gateway: Url,
}

#[derive(Debug, Clone)]
struct Session {
    id: String,
    expires_at: DateTime<Utc>,
}

impl Session {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(SESSION_RENEW_MARGIN_SECS) < self.expires_at
    }
}

/// HTTP snapshot source backed by the PetKit cloud API
#[derive(Debug)]
pub struct PetkitHttpClient {
    http: Client,
    credentials: PetkitCredentials,
    region: String,
    timezone: TimezoneSetting,
    passport_url: Url,
    base_url_override: Option<Url>,
    resolved: RwLock<Option<ResolvedRegion>>,
    session: RwLock<Option<Session>>,
}

impl PetkitHttpClient {
    /// Build a client from monitor configuration
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PetkitError::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            credentials: config.account.clone(),
            region: config.region.clone(),
            timezone: config.timezone,
            passport_url: with_trailing_slash(config.api.passport_url.clone()),
            base_url_override: config.api.base_url.clone().map(with_trailing_slash),
            resolved: RwLock::new(None),
            session: RwLock::new(None),
        })
    }

    /// Resolve (and cache) the regional gateway
    async fn region(&self) -> Result<ResolvedRegion> {
        if let Some(resolved) = self.resolved.read().await.clone() {
            return Ok(resolved);
        }

        let resolved = if let Some(base) = &self.base_url_override {
            ResolvedRegion {
                id: self.region.clone(),
                gateway: base.clone(),
            }
        } else if self.region.eq_ignore_ascii_case("china") || self.region.eq_ignore_ascii_case("cn")
        {
            ResolvedRegion {
                id: "CN".to_string(),
                gateway: Url::parse(CHINA_BASE_URL)?,
            }
        } else {
            self.lookup_region().await?
        };

        info!(
            "Using PetKit gateway {} for region '{}'",
            resolved.gateway, resolved.id
        );
        *self.resolved.write().await = Some(resolved.clone());
        Ok(resolved)
    }

    async fn lookup_region(&self) -> Result<ResolvedRegion> {
        let url = self.passport_url.join("v1/regionservers")?;
        debug!("Resolving region '{}' via {}", self.region, url);

        let servers = match self.send::<RegionServers>(self.http.get(url)).await? {
            Reply::Ok(servers) => servers,
            Reply::Vendor(err) => {
                return Err(PetkitError::region(format!(
                    "Region list unavailable ({}): {}",
                    err.code, err.msg
                )))
            }
        };

        let wanted = self.region.trim();
        let server = servers
            .list
            .into_iter()
            .find(|s| s.name.eq_ignore_ascii_case(wanted) || s.id.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| PetkitError::region(format!("Unknown region '{wanted}'")))?;

        let gateway = Url::parse(&server.gateway).map_err(|e| {
            PetkitError::region(format!("Region '{}' has invalid gateway: {e}", server.name))
        })?;

        Ok(ResolvedRegion {
            id: server.id,
            gateway: with_trailing_slash(gateway),
        })
    }

    /// Current session id, logging in when absent or about to expire
    async fn session_id(&self, region: &ResolvedRegion) -> Result<String> {
        if let Some(session) = self.session.read().await.as_ref() {
            if session.is_fresh(Utc::now()) {
                return Ok(session.id.clone());
            }
        }
        self.renew_session(region, None).await
    }

    /// Log in under the session write lock
    ///
    /// Requests that were rejected with the same session id queue on the
    /// lock; whoever arrives after the first renewal finds a different fresh
    /// session and reuses it instead of logging in again.
    async fn renew_session(
        &self,
        region: &ResolvedRegion,
        rejected: Option<&str>,
    ) -> Result<String> {
        let mut slot = self.session.write().await;
        if let Some(current) = slot.as_ref() {
            if current.is_fresh(Utc::now()) && rejected.map_or(true, |id| id != current.id) {
                return Ok(current.id.clone());
            }
        }

        *slot = None;
        let session = self.login(region).await?;
        let id = session.id.clone();
        *slot = Some(session);
        Ok(id)
    }

    async fn login(&self, region: &ResolvedRegion) -> Result<Session> {
        let url = region.gateway.join("user/login")?;
        let timezone_name = self.timezone.vendor_name().unwrap_or_default();
        let digest = self.credentials.password_digest();
        let form = [
            ("username", self.credentials.email.as_str()),
            ("password", digest.as_str()),
            ("encrypt", "1"),
            ("oldVersion", ""),
            ("region", region.id.as_str()),
            ("timezoneId", timezone_name.as_str()),
        ];

        debug!("Logging in to PetKit as {}", self.credentials.email);
        let request = self.decorate(self.http.post(url)).form(&form);
        let result = match self.send::<LoginResult>(request).await? {
            Reply::Ok(result) => result,
            Reply::Vendor(err) => {
                return Err(PetkitError::authentication(format!(
                    "Login rejected ({}): {}",
                    err.code, err.msg
                )))
            }
        };

        let expires_in = result.session.expires_in.unwrap_or(3600);
        let session = Session {
            id: result.session.id,
            expires_at: Utc::now() + ChronoDuration::seconds(expires_in),
        };
        info!("PetKit session established (expires in {}s)", expires_in);
        Ok(session)
    }

    /// GET an endpoint with the session header, re-logging in once on expiry
    async fn authorized_get<T: DeserializeOwned>(
        &self,
        region: &ResolvedRegion,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = region.gateway.join(path)?;
        let mut session = self.session_id(region).await?;
        let mut relogged = false;

        loop {
            let request = self
                .decorate(self.http.get(url.clone()))
                .header("X-Session", session.as_str())
                .query(query);

            match self.send::<T>(request).await? {
                Reply::Ok(value) => return Ok(value),
                Reply::Vendor(err) if err.code == SESSION_EXPIRED_CODE && !relogged => {
                    warn!("PetKit session expired, logging in again");
                    session = self.renew_session(region, Some(&session)).await?;
                    relogged = true;
                }
                Reply::Vendor(err) if err.code == SESSION_EXPIRED_CODE => {
                    return Err(PetkitError::authentication(format!(
                        "Session rejected after re-login: {}",
                        err.msg
                    )))
                }
                Reply::Vendor(err) => {
                    return Err(PetkitError::generic(format!(
                        "{path} failed ({}): {}",
                        err.code, err.msg
                    )))
                }
            }
        }
    }

    fn decorate(&self, request: RequestBuilder) -> RequestBuilder {
        let mut request = request
            .header("X-Api-Version", API_VERSION)
            .header("X-Client", CLIENT_HEADER)
            .header("X-Locale", LOCALE);
        if let Some(tz) = self.timezone.vendor_name() {
            request = request.header("X-Timezone", tz);
        }
        request
    }

    /// Send a request and unwrap the vendor envelope
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Reply<T>> {
        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();

        match status {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(PetkitError::authentication(format!("HTTP {status}")));
            }
            s if s.is_server_error() => {
                let body = response.text().await.unwrap_or_default();
                return Err(PetkitError::server(format!("HTTP {status}: {body}")));
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                return Err(PetkitError::generic(format!("HTTP {status}: {body}")));
            }
        }

        let bytes = response.bytes().await.map_err(classify_transport_error)?;
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;
        match (envelope.result, envelope.error) {
            (_, Some(err)) => Ok(Reply::Vendor(err)),
            (Some(result), None) => Ok(Reply::Ok(result)),
            (None, None) => Err(PetkitError::parsing(
                "Vendor reply contained neither result nor error",
            )),
        }
    }
}

#[async_trait]
impl SnapshotSource for PetkitHttpClient {
    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        let region = self.region().await?;
        let roster: DeviceRoster = self
            .authorized_get(&region, "discovery/device_roster", &[])
            .await?;

        let feeders: Vec<RosterDevice> = roster
            .devices
            .into_iter()
            .filter(RosterEntry::is_feeder)
            .map(|entry| entry.data)
            .collect();
        debug!("Device roster lists {} feeder(s)", feeders.len());

        let details = feeders.iter().map(|device| {
            let region = &region;
            async move {
                let id = match &device.id {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let path = format!("{}/device_detail", device.device_type.to_lowercase());
                let detail: Value = self
                    .authorized_get(region, &path, &[("id", id)])
                    .await?;
                FeederRecord::from_device_json(&device.device_type, detail)
            }
        });
        let records = try_join_all(details).await?;

        Ok(Snapshot::new(Utc::now(), records))
    }

    fn describe(&self) -> String {
        format!("PetKit cloud ({})", self.region)
    }
}

fn classify_transport_error(err: reqwest::Error) -> PetkitError {
    if err.is_timeout() {
        PetkitError::timeout(err.to_string())
    } else if err.is_connect() {
        PetkitError::network(err.to_string())
    } else {
        PetkitError::Http(err)
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
