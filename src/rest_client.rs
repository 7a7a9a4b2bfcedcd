use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

use crate::{
    config::DEFAULT_API_BASE_URL, DeviceCommand, DeviceDescription, DeviceId,
    DeviceStatusPayload, Session, SmartThingsApi, SmartThingsError, SmartThingsResult,
    TranslatorConfig,
};

/// Hard stop for `_links.next` chains.
const MAX_PAGES: usize = 100;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_owned(),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            user_agent: format!("hc-smartthings/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl From<&TranslatorConfig> for ClientConfig {
    fn from(config: &TranslatorConfig) -> Self {
        ClientConfig::new()
            .base_url(config.api_base_url.as_str())
            .timeout(config.request_timeout())
            .connect_timeout(config.request_timeout().min(Duration::from_secs(5)))
    }
}

/// `SmartThingsApi` over the SmartThings REST API.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default, rename = "_links")]
    links: Option<PageLinks>,
}

#[derive(Deserialize)]
struct PageLinks {
    next: Option<Link>,
}

#[derive(Deserialize)]
struct Link {
    href: String,
}

#[derive(Serialize)]
struct CommandsBody<'a> {
    commands: [&'a DeviceCommand; 1],
}

#[derive(Deserialize)]
struct CommandsResponse {
    #[serde(default)]
    results: Vec<CommandResult>,
}

#[derive(Deserialize)]
struct CommandResult {
    #[serde(default)]
    status: String,
}

/// Whether a non-success status concerns reading state or executing a command.
#[derive(Clone, Copy, PartialEq)]
enum CallKind {
    Read,
    Command,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> SmartThingsResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| SmartThingsError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(
        &self,
        session: &Session,
        request: RequestBuilder,
        kind: CallKind,
    ) -> SmartThingsResult<Vec<u8>> {
        session.ensure_open()?;
        let request = request.bearer_auth(session.token()).send();
        let response = tokio::select! {
            response = request => response.map_err(map_transport_error)?,
            _ = session.closed() => return Err(SmartThingsError::SessionClosed),
        };
        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if status.is_success() {
            return Ok(body.to_vec());
        }
        let message = String::from_utf8_lossy(&body).chars().take(512).collect();
        Err(map_status(status, message, kind))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        session: &Session,
        request: RequestBuilder,
    ) -> SmartThingsResult<T> {
        let body = self.send(session, request, CallKind::Read).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl SmartThingsApi for RestClient {
    async fn list_devices(&self, session: &Session) -> SmartThingsResult<Vec<DeviceDescription>> {
        let mut request = self.client.get(format!("{}/devices", self.base_url));
        if let Some(location_id) = session.location_id() {
            request = request.query(&[("locationId", location_id)]);
        }
        let mut devices = Vec::new();
        for page_no in 0..MAX_PAGES {
            let page: Page<DeviceDescription> = self.get_json(session, request).await?;
            log::trace!("devices page {}: {} items", page_no, page.items.len());
            devices.extend(page.items);
            match page.links.and_then(|links| links.next) {
                Some(next) => request = self.client.get(next.href),
                None => return Ok(devices),
            }
        }
        log::warn!(
            "Device listing exceeded {} pages, ignoring the remainder",
            MAX_PAGES
        );
        Ok(devices)
    }

    async fn device_status(
        &self,
        session: &Session,
        device_id: &DeviceId,
    ) -> SmartThingsResult<DeviceStatusPayload> {
        let request = self
            .client
            .get(format!("{}/devices/{}/status", self.base_url, device_id));
        self.get_json(session, request).await
    }

    async fn execute_command(
        &self,
        session: &Session,
        device_id: &DeviceId,
        command: &DeviceCommand,
    ) -> SmartThingsResult<()> {
        let request = self
            .client
            .post(format!("{}/devices/{}/commands", self.base_url, device_id))
            .json(&CommandsBody {
                commands: [command],
            });
        let body = self.send(session, request, CallKind::Command).await?;
        if body.is_empty() {
            return Ok(());
        }
        let response: CommandsResponse = serde_json::from_slice(&body)?;
        match response
            .results
            .iter()
            .find(|result| result.status.eq_ignore_ascii_case("FAILED"))
        {
            Some(_) => Err(SmartThingsError::CommandRejected(format!(
                "{}.{} failed on device {}",
                command.capability, command.command, device_id
            ))),
            None => Ok(()),
        }
    }
}

fn map_transport_error(err: reqwest::Error) -> SmartThingsError {
    if err.is_timeout() {
        SmartThingsError::TransientNetwork(format!("request timed out: {err}"))
    } else if err.is_decode() {
        SmartThingsError::Decode(err.to_string())
    } else {
        SmartThingsError::TransientNetwork(err.to_string())
    }
}

fn map_status(status: StatusCode, message: String, kind: CallKind) -> SmartThingsError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SmartThingsError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            SmartThingsError::TransientNetwork(format!("HTTP {}: {}", status.as_u16(), message))
        }
        s if s.is_server_error() => {
            SmartThingsError::TransientNetwork(format!("HTTP {}: {}", status.as_u16(), message))
        }
        s if s.is_client_error() && kind == CallKind::Command => {
            SmartThingsError::CommandRejected(format!("HTTP {}: {}", status.as_u16(), message))
        }
        _ => SmartThingsError::Api {
            status: status.as_u16(),
            message,
        },
    }
}
