//! Ezviz cloud API client
//!
//! Covers the two calls the bridge consumes: account login and the device
//! listing for one category. Vendor result codes are translated into
//! `EzvizError` at this boundary so callers only ever see the closed
//! taxonomy.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::EzvizError;
use crate::ezviz::coordinator::DeviceSource;

const LOGIN_PATH: &str = "/v3/users/login/v5";
const PAGE_LIST_PATH: &str = "/v3/userdevices/v1/resources/pagelist";

const META_CODE_OK: i32 = 200;
/// Account registered against a different regional host; the response names
/// the proper one.
const META_CODE_WRONG_REGION: i32 = 1100;
const META_CODE_INCORRECT_ACCOUNT: i32 = 1013;
const META_CODE_INCORRECT_PASSWORD: i32 = 1014;
const META_CODE_SESSION_EXPIRED: i32 = 1102;
const META_CODE_MFA_REQUIRED: i32 = 6002;

/// Client bound to one Ezviz account.
pub struct EzvizClient {
    email: String,
    password: String,
    api_url: String,
    /// Cached session id from the last successful login.
    session: RwLock<Option<String>>,
    http: Client,
}

// ============================================================================
// Wire types (vendor-defined; only consumed fields are typed)
// ============================================================================

#[derive(Debug, Deserialize)]
struct Meta {
    code: i32,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    meta: Meta,
    #[serde(rename = "loginSession")]
    login_session: Option<LoginSession>,
    #[serde(rename = "loginArea")]
    login_area: Option<LoginArea>,
}

#[derive(Debug, Deserialize)]
struct LoginSession {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct LoginArea {
    #[serde(rename = "apiDomain")]
    api_domain: Option<String>,
}

/// Device listing for one category filter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceInfosResponse {
    #[serde(default, rename = "deviceInfos")]
    pub device_infos: Vec<DeviceInfo>,
    #[serde(default, rename = "SWITCH")]
    pub switch: HashMap<String, Vec<SwitchFeature>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceInfo {
    #[serde(rename = "deviceSerial")]
    pub device_serial: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwitchFeature {
    #[serde(rename = "type")]
    pub feature_type: i32,
    #[serde(default)]
    pub enable: bool,
}

#[derive(Debug, Deserialize)]
struct PageListResponse {
    meta: Meta,
    #[serde(flatten)]
    devices: DeviceInfosResponse,
}

enum PageListOutcome {
    Devices(DeviceInfosResponse),
    SessionExpired,
}

impl EzvizClient {
    pub fn new(
        email: &str,
        password: &str,
        api_url: &str,
        timeout_secs: u64,
    ) -> Result<Self, EzvizError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            email: email.to_string(),
            password: password.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            session: RwLock::new(None),
            http,
        })
    }

    /// Log in and cache the session id. A single attempt; callers decide
    /// whether to retry.
    pub async fn login(&self) -> Result<(), EzvizError> {
        let url = format!("{}{}", self.api_url, LOGIN_PATH);

        let params = [
            ("account", self.email.as_str()),
            ("password", self.password.as_str()),
        ];

        let resp = self.http.post(&url).form(&params).send().await?;
        let result: LoginResponse = resp
            .json()
            .await
            .map_err(|e| EzvizError::Api(format!("login parse failed: {}", e)))?;

        if result.meta.code != META_CODE_OK {
            return Err(login_failure(result.meta, result.login_area));
        }

        let session = result
            .login_session
            .ok_or_else(|| EzvizError::Api("login response missing session".to_string()))?;

        {
            let mut guard = self.session.write().await;
            *guard = Some(session.session_id);
        }

        tracing::debug!("[Ezviz] Logged in as {}", self.email);
        Ok(())
    }

    /// List devices of one category (e.g. "SWITCH"), with one re-login when
    /// the cached session has expired.
    pub async fn get_device_infos(
        &self,
        filter_type: &str,
    ) -> Result<DeviceInfosResponse, EzvizError> {
        let session_id = self.ensure_session().await?;

        match self.fetch_page_list(filter_type, &session_id).await? {
            PageListOutcome::Devices(devices) => Ok(devices),
            PageListOutcome::SessionExpired => {
                self.clear_session().await;
                let session_id = self.ensure_session().await?;

                match self.fetch_page_list(filter_type, &session_id).await? {
                    PageListOutcome::Devices(devices) => Ok(devices),
                    PageListOutcome::SessionExpired => Err(EzvizError::AuthFailed),
                }
            }
        }
    }

    async fn fetch_page_list(
        &self,
        filter_type: &str,
        session_id: &str,
    ) -> Result<PageListOutcome, EzvizError> {
        let url = format!("{}{}", self.api_url, PAGE_LIST_PATH);

        let resp = self
            .http
            .post(&url)
            .header("sessionId", session_id)
            .query(&[("filter", filter_type), ("groupId", "-1")])
            .send()
            .await?;

        let result: PageListResponse = resp
            .json()
            .await
            .map_err(|e| EzvizError::Api(format!("device list parse failed: {}", e)))?;

        match result.meta.code {
            META_CODE_OK => Ok(PageListOutcome::Devices(result.devices)),
            META_CODE_SESSION_EXPIRED => Ok(PageListOutcome::SessionExpired),
            code => Err(EzvizError::Api(format!(
                "device list failed with code {}: {}",
                code,
                result.meta.message.unwrap_or_default()
            ))),
        }
    }

    async fn ensure_session(&self) -> Result<String, EzvizError> {
        {
            let session = self.session.read().await;
            if let Some(ref id) = *session {
                return Ok(id.clone());
            }
        }

        self.login().await?;

        let session = self.session.read().await;
        session
            .clone()
            .ok_or_else(|| EzvizError::Api("no session after login".to_string()))
    }

    async fn clear_session(&self) {
        let mut guard = self.session.write().await;
        *guard = None;
    }
}

#[async_trait]
impl DeviceSource for EzvizClient {
    async fn device_infos(&self, filter_type: &str) -> Result<DeviceInfosResponse, EzvizError> {
        self.get_device_infos(filter_type).await
    }
}

/// Map a non-OK login result code onto the error taxonomy.
fn login_failure(meta: Meta, area: Option<LoginArea>) -> EzvizError {
    match meta.code {
        META_CODE_MFA_REQUIRED => EzvizError::VerificationRequired,
        META_CODE_INCORRECT_ACCOUNT | META_CODE_INCORRECT_PASSWORD => EzvizError::AuthFailed,
        META_CODE_WRONG_REGION => {
            let domain = area
                .and_then(|a| a.api_domain)
                .unwrap_or_else(|| "unknown".to_string());
            EzvizError::InvalidHost(format!("account belongs to region {}", domain))
        }
        code => EzvizError::Api(format!(
            "login failed with code {}: {}",
            code,
            meta.message.unwrap_or_default()
        )),
    }
}
