use chrono::Utc;
use reqwest::{Client, Url};
use serde_json::Value;

use super::credentials::AwsCredentials;
use super::sigv4::{sign_request, SigningParams};
use crate::core::errors::RagError;

/// Signed JSON client for one AWS service in one region.
#[derive(Clone)]
pub struct AwsJsonClient {
    client: Client,
    credentials: AwsCredentials,
    region: String,
    service: String,
}

impl AwsJsonClient {
    pub fn new(credentials: AwsCredentials, region: &str, service: &str) -> Self {
        Self {
            client: Client::new(),
            credentials,
            region: region.to_string(),
            service: service.to_string(),
        }
    }

    pub async fn post_json(&self, url: &str, body: &Value) -> Result<Value, RagError> {
        self.send_json("POST", url, body).await
    }

    pub async fn put_json(&self, url: &str, body: &Value) -> Result<Value, RagError> {
        self.send_json("PUT", url, body).await
    }

    async fn send_json(&self, method: &str, url: &str, body: &Value) -> Result<Value, RagError> {
        let parsed = Url::parse(url).map_err(|e| RagError::Params(format!("bad URL {}: {}", url, e)))?;
        let payload = serde_json::to_vec(body).map_err(RagError::internal)?;

        let params = SigningParams {
            credentials: &self.credentials,
            region: &self.region,
            service: &self.service,
            time: Utc::now(),
        };
        let headers = sign_request(&params, method, &parsed, &payload)?;

        let mut request = match method {
            "PUT" => self.client.put(parsed),
            _ => self.client.post(parsed),
        };
        request = request.header("content-type", "application/json");
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let res = request.body(payload).send().await?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::external(&self.service, status, text));
        }

        let text = res.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}
