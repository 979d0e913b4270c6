use std::io::Read;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::config::ResolvedConfig;
use crate::domain::{ArchivePayload, PlanSet, RetrievePlan};
use crate::error::RetrieveError;

pub const RETRIEVE_PLAN_PATH: &str = "/metadata/retrieve/plan";

/// Sends a JSON body and hands back the raw response stream.
pub trait RequestExecutor: Send + Sync {
    fn post_json(&self, url: &str, body: Vec<u8>) -> Result<Box<dyn Read + Send>, RetrieveError>;
}

/// Turns one retrieve plan into the archive it produces.
pub trait PlanExecutor {
    fn execute(&self, key: &str, plan: &RetrievePlan) -> Result<ArchivePayload, RetrieveError>;
}

/// Requests routed through the site's own API with the session access token.
#[derive(Clone)]
pub struct DefaultConnection {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl DefaultConnection {
    pub fn new(
        host: &str,
        api_version: &str,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RetrieveError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: format!(
                "{}/api/v{}",
                host.trim_end_matches('/'),
                api_version.trim_start_matches('v')
            ),
            access_token,
        })
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl RequestExecutor for DefaultConnection {
    fn post_json(&self, url: &str, body: Vec<u8>) -> Result<Box<dyn Read + Send>, RetrieveError> {
        let url = self.url_for(url);
        debug!(%url, "default connection request");
        let response = send_with_retries(|| {
            authorize(
                self.client.post(&url).body(body.clone()),
                self.access_token.as_deref(),
            )
        })?;
        Ok(Box::new(handle_status(response)?))
    }
}

/// Requests sent straight to a plan's own host, authenticated with the JWT.
#[derive(Clone)]
pub struct HostConnection {
    client: Client,
    jwt: Option<String>,
}

impl HostConnection {
    pub fn new(jwt: Option<String>, timeout: Duration) -> Result<Self, RetrieveError> {
        Ok(Self {
            client: build_client(timeout)?,
            jwt,
        })
    }

    pub fn url_for(host: &str, port: Option<&str>, path: &str) -> String {
        match port.map(str::trim).filter(|port| !port.is_empty()) {
            Some(port) => format!("{host}:{port}/api/v2{path}"),
            None => format!("{host}/api/v2{path}"),
        }
    }
}

impl RequestExecutor for HostConnection {
    fn post_json(&self, url: &str, body: Vec<u8>) -> Result<Box<dyn Read + Send>, RetrieveError> {
        debug!(%url, "host connection request");
        let response = send_with_retries(|| {
            authorize(self.client.post(url).body(body.clone()), self.jwt.as_deref())
        })?;
        Ok(Box::new(handle_status(response)?))
    }
}

pub struct PlatformClient {
    default: DefaultConnection,
    host: HostConnection,
}

impl PlatformClient {
    pub fn new(config: &ResolvedConfig) -> Result<Self, RetrieveError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            default: DefaultConnection::new(
                &config.host,
                &config.api_version,
                config.access_token.clone(),
                timeout,
            )?,
            host: HostConnection::new(config.jwt.clone(), timeout)?,
        })
    }

    pub fn fetch_plan(&self) -> Result<PlanSet, RetrieveError> {
        let body = self.default.post_json(RETRIEVE_PLAN_PATH, Vec::new())?;
        decode_plan(body)
    }

    /// Plans naming their own host bypass the default API connection.
    pub fn executor_for(&self, plan: &RetrievePlan) -> &dyn RequestExecutor {
        if plan.remote_host().is_some() {
            &self.host
        } else {
            &self.default
        }
    }
}

impl PlanExecutor for PlatformClient {
    fn execute(&self, key: &str, plan: &RetrievePlan) -> Result<ArchivePayload, RetrieveError> {
        let body = serde_json::to_vec(&plan.metadata)
            .map_err(|err| RetrieveError::PlanDecode(err.to_string()))?;
        let url = match plan.remote_host() {
            Some(host) => HostConnection::url_for(host, plan.port.as_deref(), &plan.url),
            None => plan.url.clone(),
        };
        debug!(plan = key, %url, kind = %plan.kind, "making retrieve request");
        let reader = self.executor_for(plan).post_json(&url, body)?;
        Ok(ArchivePayload::new(key, reader))
    }
}

pub fn decode_plan(reader: impl Read) -> Result<PlanSet, RetrieveError> {
    serde_json::from_reader(reader).map_err(|err| RetrieveError::PlanDecode(err.to_string()))
}

fn build_client(timeout: Duration) -> Result<Client, RetrieveError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("meta-retrieve/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| RetrieveError::Transport(err.to_string()))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|err| RetrieveError::Transport(err.to_string()))
}

fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

fn handle_status(response: Response) -> Result<Response, RetrieveError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response
        .text()
        .unwrap_or_else(|_| "request failed".to_string());
    Err(RetrieveError::TransportStatus { status, message })
}

fn send_with_retries<F>(mut make_req: F) -> Result<Response, RetrieveError>
where
    F: FnMut() -> RequestBuilder,
{
    const MAX_RETRIES: usize = 3;
    const BASE_DELAY_MS: u64 = 200;
    let mut attempt = 0usize;
    loop {
        match make_req().send() {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if attempt < MAX_RETRIES && is_retryable_status(status) {
                    thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                    attempt += 1;
                    continue;
                }
                return Ok(resp);
            }
            Err(err) => {
                if attempt < MAX_RETRIES && is_retryable_error(&err) {
                    thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                    attempt += 1;
                    continue;
                }
                return Err(RetrieveError::Transport(err.to_string()));
            }
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}
