//! JSON-over-HTTP binding of the ticket backend.
//!
//! Routes: `POST /tickets/`, `GET /tickets/?limit=N`, `GET /tickets/{id}/thread`,
//! `POST /tickets/{id}/followup`, `POST /tickets/{id}/close`.

use std::time::Duration;

use async_trait::async_trait;
use helpdesk_schema::NewTicket;
use reqwest::RequestBuilder;
use serde::Serialize;
use serde_json::Value;

use crate::{ServiceConfig, TicketService, TransportError};

#[derive(Debug, Clone)]
pub struct HttpTicketService {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    history_limit: usize,
}

#[derive(Serialize)]
struct CreateTicketBody<'a> {
    subject: &'a str,
    description: &'a str,
    severity: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_upn: Option<&'a str>,
}

#[derive(Serialize)]
struct FollowupBody<'a> {
    message: &'a str,
}

impl HttpTicketService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::from_config(&ServiceConfig::new(base_url))
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            history_limit: config.history_limit,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value, TransportError> {
        let resp = match self.authorize(builder).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Err(TransportError::Timeout),
            Err(e) if e.is_connect() => return Err(TransportError::Connect(e.to_string())),
            Err(e) => return Err(TransportError::Request(e.to_string())),
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<Value>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TicketService for HttpTicketService {
    async fn create(&self, input: &NewTicket) -> Result<Value, TransportError> {
        let body = CreateTicketBody {
            subject: &input.subject,
            description: &input.description,
            severity: input.severity.as_str(),
            user_upn: input.submitter.as_deref(),
        };
        tracing::debug!(subject = %input.subject, "POST /tickets/");
        self.send(self.client.post(self.url("/tickets/")).json(&body))
            .await
    }

    async fn list(&self) -> Result<Vec<Value>, TransportError> {
        let builder = self
            .client
            .get(self.url("/tickets/"))
            .query(&[("limit", self.history_limit)]);
        match self.send(builder).await? {
            Value::Array(items) => Ok(items),
            other => Err(TransportError::Decode(format!(
                "expected ticket list, got {}",
                json_kind(&other)
            ))),
        }
    }

    async fn get_thread(&self, ticket_id: &str) -> Result<Value, TransportError> {
        let url = self.url(&format!("/tickets/{}/thread", urlencoding::encode(ticket_id)));
        self.send(self.client.get(url)).await
    }

    async fn append_followup(&self, ticket_id: &str, text: &str) -> Result<Value, TransportError> {
        let url = self.url(&format!(
            "/tickets/{}/followup",
            urlencoding::encode(ticket_id)
        ));
        self.send(self.client.post(url).json(&FollowupBody { message: text }))
            .await
    }

    async fn close(&self, ticket_id: &str) -> Result<Value, TransportError> {
        let url = self.url(&format!("/tickets/{}/close", urlencoding::encode(ticket_id)));
        self.send(self.client.post(url)).await
    }

    /// The backend has no dedicated health route; a one-item listing is the
    /// cheapest authenticated round trip.
    async fn health(&self) -> Result<(), TransportError> {
        let builder = self.client.get(self.url("/tickets/")).query(&[("limit", 1)]);
        self.send(builder).await.map(|_| ())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let service = HttpTicketService::new("http://localhost:8000/");
        assert_eq!(service.url("/tickets/"), "http://localhost:8000/tickets/");
    }

    #[test]
    fn create_body_maps_submitter_to_user_upn() {
        let input = NewTicket::new("VPN down", "tunnel drops").with_submitter("sam@example.com");
        let body = CreateTicketBody {
            subject: &input.subject,
            description: &input.description,
            severity: input.severity.as_str(),
            user_upn: input.submitter.as_deref(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["user_upn"], "sam@example.com");
        assert_eq!(json["severity"], "medium");
    }

    #[test]
    fn json_kind_names_values() {
        assert_eq!(json_kind(&serde_json::json!({})), "object");
        assert_eq!(json_kind(&serde_json::json!(null)), "null");
    }
}
