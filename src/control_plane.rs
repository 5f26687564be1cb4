use crate::error::{BifrostError, Result};
use crate::model::{Certificate, RoutingRule};
use crate::traits::{CertificateAuthority, RoutingControlPlane};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Shared HTTP plumbing for the edge control-plane API.
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl ControlPlaneClient {
    pub fn new(http: reqwest::Client, base_url: String, token: Option<String>) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, self.url(path));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Map a non-success response to the provider's own code/message so the
    /// caller can act on it.
    async fn api_error(response: reqwest::Response) -> BifrostError {
        let status = response.status();
        match response.json::<ApiError>().await {
            Ok(body) if !body.code.is_empty() => BifrostError::ExternalService {
                code: body.code,
                message: body.message,
            },
            _ => BifrostError::ExternalService {
                code: status.as_u16().to_string(),
                message: status
                    .canonical_reason()
                    .unwrap_or("control plane request failed")
                    .to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct CertificateRequestBody<'a> {
    domain: &'a str,
    alt_names: &'a [String],
    validation_method: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    contact_email: &'a str,
}

#[derive(Debug, Deserialize)]
struct CertificateCreated {
    id: String,
}

/// Certificate authority over the control-plane HTTP API.
pub struct HttpCertificateAuthority {
    client: ControlPlaneClient,
}

impl HttpCertificateAuthority {
    pub fn new(client: ControlPlaneClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CertificateAuthority for HttpCertificateAuthority {
    async fn find_by_domain(&self, domain: &str) -> Result<Option<Certificate>> {
        let response = self
            .client
            .request(reqwest::Method::GET, "/certificates")
            .query(&[("domain", domain)])
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(response.json().await?)),
            _ => Err(ControlPlaneClient::api_error(response).await),
        }
    }

    async fn describe(&self, id: &str) -> Result<Certificate> {
        let response = self
            .client
            .request(reqwest::Method::GET, &format!("/certificates/{id}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(BifrostError::CertificateNotFound(id.to_string())),
            s if s.is_success() => Ok(response.json().await?),
            _ => Err(ControlPlaneClient::api_error(response).await),
        }
    }

    async fn request(
        &self,
        domain: &str,
        alt_names: &[String],
        contact_email: &str,
    ) -> Result<String> {
        let body = CertificateRequestBody {
            domain,
            alt_names,
            validation_method: "DNS",
            contact_email,
        };
        let response = self
            .client
            .request(reqwest::Method::POST, "/certificates")
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            let created: CertificateCreated = response.json().await?;
            Ok(created.id)
        } else {
            Err(ControlPlaneClient::api_error(response).await)
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .request(reqwest::Method::DELETE, &format!("/certificates/{id}"))
            .send()
            .await?;

        match response.status() {
            // Already absent is success
            StatusCode::NOT_FOUND => Ok(()),
            s if s.is_success() => Ok(()),
            _ => Err(ControlPlaneClient::api_error(response).await),
        }
    }
}

#[derive(Debug, Serialize)]
struct RuleBody<'a> {
    host_headers: &'a [String],
    target: &'a str,
    priority: u32,
}

#[derive(Debug, Serialize)]
struct AttachBody<'a> {
    certificate_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListenerInfo {
    endpoint: String,
}

/// Routing control plane over the control-plane HTTP API.
pub struct HttpRoutingControlPlane {
    client: ControlPlaneClient,
}

impl HttpRoutingControlPlane {
    pub fn new(client: ControlPlaneClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RoutingControlPlane for HttpRoutingControlPlane {
    async fn list_rules(&self, listener_id: &str) -> Result<Vec<RoutingRule>> {
        let response = self
            .client
            .request(
                reqwest::Method::GET,
                &format!("/listeners/{listener_id}/rules"),
            )
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(ControlPlaneClient::api_error(response).await)
        }
    }

    async fn create_rule(
        &self,
        listener_id: &str,
        host_headers: &[String],
        target: &str,
        priority: u32,
    ) -> Result<RoutingRule> {
        let body = RuleBody {
            host_headers,
            target,
            priority,
        };
        let response = self
            .client
            .request(
                reqwest::Method::POST,
                &format!("/listeners/{listener_id}/rules"),
            )
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(ControlPlaneClient::api_error(response).await)
        }
    }

    async fn delete_rule(&self, listener_id: &str, rule_id: &str) -> Result<()> {
        let response = self
            .client
            .request(
                reqwest::Method::DELETE,
                &format!("/listeners/{listener_id}/rules/{rule_id}"),
            )
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            s if s.is_success() => Ok(()),
            _ => Err(ControlPlaneClient::api_error(response).await),
        }
    }

    async fn attach_certificate(&self, listener_id: &str, certificate_id: &str) -> Result<()> {
        let response = self
            .client
            .request(
                reqwest::Method::POST,
                &format!("/listeners/{listener_id}/certificates"),
            )
            .json(&AttachBody { certificate_id })
            .send()
            .await?;

        match response.status() {
            // Already attached is success
            StatusCode::CONFLICT => {
                debug!(certificate_id, "certificate already attached");
                Ok(())
            }
            s if s.is_success() => Ok(()),
            _ => Err(ControlPlaneClient::api_error(response).await),
        }
    }

    async fn detach_certificate(&self, listener_id: &str, certificate_id: &str) -> Result<()> {
        let response = self
            .client
            .request(
                reqwest::Method::DELETE,
                &format!("/listeners/{listener_id}/certificates/{certificate_id}"),
            )
            .send()
            .await?;

        match response.status() {
            // Not attached is success
            StatusCode::NOT_FOUND => Ok(()),
            s if s.is_success() => Ok(()),
            _ => Err(ControlPlaneClient::api_error(response).await),
        }
    }

    async fn listener_endpoint(&self, listener_id: &str) -> Result<String> {
        let response = self
            .client
            .request(reqwest::Method::GET, &format!("/listeners/{listener_id}"))
            .send()
            .await?;

        if response.status().is_success() {
            let info: ListenerInfo = response.json().await?;
            Ok(info.endpoint)
        } else {
            Err(ControlPlaneClient::api_error(response).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let client = ControlPlaneClient::new(
            reqwest::Client::new(),
            "https://edge.internal/api/".to_string(),
            None,
        );
        assert_eq!(
            client.url("/certificates"),
            "https://edge.internal/api/certificates"
        );
    }

    #[test]
    fn certificate_request_body_carries_the_contact() {
        let alt_names = vec!["*.example.com".to_string()];
        let body = CertificateRequestBody {
            domain: "example.com",
            alt_names: &alt_names,
            validation_method: "DNS",
            contact_email: "ops@service.example",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contact_email"], "ops@service.example");

        let body = CertificateRequestBody {
            contact_email: "",
            ..body
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("contact_email").is_none());
    }

    #[test]
    fn api_error_body_shape() {
        let err: ApiError =
            serde_json::from_str(r#"{"code":"DuplicateRule","message":"priority taken"}"#).unwrap();
        assert_eq!(err.code, "DuplicateRule");
        assert_eq!(err.message, "priority taken");
    }
}
