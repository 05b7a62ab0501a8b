//! The device's REST API over reqwest 🌐

use crate::error::DeviceCommandError;
use crate::player::traits::{DeviceCommands, DeviceResult, Drive, MediaSource, Runner};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

/// Payloads up to this size go as hex in the query string
const INLINE_WRITE_LIMIT: usize = 128;

/// Items whose values never leave the device unmasked
const SECRET_ITEMS: &[&str] = &["network password"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub firmware_version: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub unique_id: String,
}

impl DeviceInfo {
    /// Stable key for per-device state
    pub fn identity(&self) -> Option<&str> {
        [self.unique_id.as_str(), self.hostname.as_str()]
            .into_iter()
            .find(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct UltimateDevice {
    client: Client,
    base: Url,
    password: Option<String>,
}

fn transport_error(operation: &str, e: reqwest::Error) -> DeviceCommandError {
    if e.is_timeout() {
        DeviceCommandError::Timeout {
            operation: operation.to_string(),
        }
    } else {
        DeviceCommandError::Network {
            operation: operation.to_string(),
            message: e.to_string(),
        }
    }
}

fn protocol_error(operation: &str, message: impl Into<String>) -> DeviceCommandError {
    DeviceCommandError::Protocol {
        operation: operation.to_string(),
        message: message.into(),
    }
}

/// Upper-case hex as the device expects it
fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

fn address(value: u16) -> String {
    format!("{:04X}", value)
}

/// Config values come back as strings or numbers, sometimes wrapped in a
/// detail object
fn config_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => ["current", "value", "selected"]
            .iter()
            .find_map(|key| map.get(*key))
            .and_then(config_value),
        _ => None,
    }
}

fn mask_secrets(category: &mut Value) {
    let Some(categories) = category.as_object_mut() else {
        return;
    };
    for items in categories.values_mut() {
        let Some(items) = items.as_object_mut() else {
            continue;
        };
        for (name, value) in items.iter_mut() {
            if SECRET_ITEMS.contains(&name.trim().to_ascii_lowercase().as_str()) {
                if let Value::String(s) = value {
                    if !s.is_empty() {
                        *s = "********".to_string();
                    }
                }
            }
        }
    }
}

impl UltimateDevice {
    pub fn new(base_url: &str, password: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let base = Url::parse(base_url.trim_end_matches('/'))?;
        let client = Client::builder()
            .user_agent(concat!("ultiplay/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base,
            password: password.filter(|p| !p.is_empty()),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> DeviceResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| protocol_error("url", format!("{} cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.password {
            Some(password) => request.header("X-Password", password),
            None => request,
        }
    }

    /// Send and map failures: timeout, non-2xx status, or transport
    async fn send(&self, operation: &str, request: RequestBuilder) -> DeviceResult<Response> {
        debug!(operation, "Device request");
        let response = self
            .with_auth(request)
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeviceCommandError::Status {
                operation: operation.to_string(),
                status: status.as_u16(),
                message: body.trim().chars().take(200).collect(),
            });
        }
        Ok(response)
    }

    async fn json(&self, operation: &str, request: RequestBuilder) -> DeviceResult<Value> {
        let response = self.send(operation, request).await?;
        let text = response.text().await.map_err(|e| transport_error(operation, e))?;
        serde_json::from_str(&text).map_err(|e| protocol_error(operation, format!("invalid JSON: {}", e)))
    }

    /// Commands answer `{"errors": [...]}`; a non-empty list is a failure
    async fn command(&self, operation: &str, request: RequestBuilder) -> DeviceResult<()> {
        let response = self.send(operation, request).await?;
        let text = response.text().await.map_err(|e| transport_error(operation, e))?;

        let errors = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("errors").and_then(Value::as_array).cloned())
            .unwrap_or_default();
        if errors.is_empty() {
            Ok(())
        } else {
            let joined: Vec<String> = errors
                .iter()
                .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
                .collect();
            Err(protocol_error(operation, joined.join("; ")))
        }
    }

    async fn machine(&self, action: &str) -> DeviceResult<()> {
        let operation = format!("machine:{}", action);
        let url = self.url(&["v1", &operation])?;
        self.command(&operation, self.client.put(url)).await
    }

    fn upload_form(name: &str, bytes: &[u8]) -> Form {
        Form::new().part("file", Part::bytes(bytes.to_vec()).file_name(name.to_string()))
    }

    // --- Beyond the command contract ---

    pub async fn info(&self) -> DeviceResult<DeviceInfo> {
        let value = self.json("info", self.client.get(self.url(&["v1", "info"])?)).await?;
        serde_json::from_value(value).map_err(|e| protocol_error("info", e.to_string()))
    }

    pub async fn version(&self) -> DeviceResult<String> {
        let value = self.json("version", self.client.get(self.url(&["v1", "version"])?)).await?;
        value
            .get("version")
            .and_then(config_value)
            .ok_or_else(|| protocol_error("version", "missing version"))
    }

    pub async fn list_config_categories(&self) -> DeviceResult<Vec<String>> {
        let value = self.json("configs", self.client.get(self.url(&["v1", "configs"])?)).await?;
        let categories = value
            .get("categories")
            .and_then(Value::as_array)
            .ok_or_else(|| protocol_error("configs", "missing categories"))?;
        Ok(categories
            .iter()
            .filter_map(|c| c.as_str().map(str::to_string))
            .collect())
    }

    pub async fn get_category(&self, category: &str) -> DeviceResult<Value> {
        let operation = format!("configs/{}", category);
        let mut value = self
            .json(&operation, self.client.get(self.url(&["v1", "configs", category])?))
            .await?;
        if let Some(map) = value.as_object_mut() {
            map.remove("errors");
        }
        mask_secrets(&mut value);
        Ok(value)
    }

    /// Every category in one JSON document, secrets masked
    pub async fn dump_config(&self) -> DeviceResult<Value> {
        let info = self.info().await.unwrap_or_default();
        let version = self.version().await.ok();

        let mut categories = Map::new();
        for category in self.list_config_categories().await? {
            let value = match self.get_category(&category).await {
                Ok(v) => v,
                Err(e) => json!({ "errors": [e.to_string()] }),
            };
            categories.insert(category, value);
        }

        Ok(json!({
            "general": {
                "base_url": self.base.as_str(),
                "rest_api_version": version,
                "device_type": info.product,
                "firmware_version": info.firmware_version,
            },
            "categories": categories,
        }))
    }
}

impl DeviceCommands for UltimateDevice {
    async fn drive_on(&self, drive: Drive) -> DeviceResult<()> {
        let operation = format!("drives/{}:on", drive.id());
        let url = self.url(&["v1", "drives", &format!("{}:on", drive.id())])?;
        self.command(&operation, self.client.put(url)).await
    }

    async fn mount(&self, drive: Drive, image: &MediaSource) -> DeviceResult<()> {
        let operation = format!("drives/{}:mount", drive.id());
        let url = self.url(&["v1", "drives", &format!("{}:mount", drive.id())])?;

        let request = match image {
            MediaSource::Remote(path) => self
                .client
                .put(url)
                .query(&[("image", path.as_str()), ("mode", "readwrite")]),
            MediaSource::Upload { name, bytes } => {
                let kind = crate::player::classify::extension(name).unwrap_or_else(|| "d64".to_string());
                self.client
                    .post(url)
                    .query(&[("type", kind.as_str()), ("mode", "readonly")])
                    .multipart(Self::upload_form(name, bytes))
            }
        };
        self.command(&operation, request).await
    }

    async fn reboot(&self) -> DeviceResult<()> {
        self.machine("reboot").await
    }

    async fn reset(&self) -> DeviceResult<()> {
        self.machine("reset").await
    }

    async fn pause(&self) -> DeviceResult<()> {
        self.machine("pause").await
    }

    async fn resume(&self) -> DeviceResult<()> {
        self.machine("resume").await
    }

    async fn read_memory(&self, addr: u16, length: u16) -> DeviceResult<Vec<u8>> {
        let operation = "machine:readmem";
        let url = self.url(&["v1", operation])?;
        let request = self
            .client
            .get(url)
            .query(&[("address", address(addr)), ("length", length.to_string())]);

        let response = self.send(operation, request).await?;
        let bytes = response.bytes().await.map_err(|e| transport_error(operation, e))?;
        Ok(bytes.to_vec())
    }

    async fn write_memory(&self, addr: u16, bytes: &[u8]) -> DeviceResult<()> {
        let operation = "machine:writemem";
        let url = self.url(&["v1", operation])?;

        let request = if bytes.len() <= INLINE_WRITE_LIMIT {
            self.client
                .put(url)
                .query(&[("address", address(addr)), ("data", hex(bytes))])
        } else {
            self.client
                .post(url)
                .query(&[("address", address(addr))])
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(bytes.to_vec())
        };
        self.command(operation, request).await
    }

    async fn run(&self, runner: Runner, media: &MediaSource, song: Option<u16>) -> DeviceResult<()> {
        let operation = format!("runners:{}", runner.endpoint());
        let url = self.url(&["v1", &operation])?;
        let songnr: Vec<(&str, String)> = song.map(|n| ("songnr", n.to_string())).into_iter().collect();

        let request = match media {
            MediaSource::Remote(path) => self
                .client
                .put(url)
                .query(&[("file", path.as_str())])
                .query(&songnr),
            MediaSource::Upload { name, bytes } => self
                .client
                .post(url)
                .query(&songnr)
                .multipart(Self::upload_form(name, bytes)),
        };
        self.command(&operation, request).await
    }

    async fn get_config(&self, category: &str, item: &str) -> DeviceResult<String> {
        let operation = format!("configs/{}/{}", category, item);
        let url = self.url(&["v1", "configs", category, item])?;
        let value = self.json(&operation, self.client.get(url)).await?;

        value
            .get(category)
            .and_then(|c| c.get(item))
            .and_then(config_value)
            .ok_or_else(|| protocol_error(&operation, "item missing from response"))
    }

    async fn set_config(&self, category: &str, item: &str, value: &str) -> DeviceResult<()> {
        let operation = format!("configs/{}/{}", category, item);
        let url = self.url(&["v1", "configs", category, item])?;
        self.command(&operation, self.client.put(url).query(&[("value", value)]))
            .await
    }

    async fn batch_set_config(&self, category: &str, items: &[(String, String)]) -> DeviceResult<()> {
        let values: Map<String, Value> = items
            .iter()
            .map(|(item, value)| (item.clone(), Value::String(value.clone())))
            .collect();
        let mut body = Map::new();
        body.insert(category.to_string(), Value::Object(values));

        let url = self.url(&["v1", "configs"])?;
        self.command("configs", self.client.post(url).json(&body)).await
    }
}
