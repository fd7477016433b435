// # Cloudflare DNS Provider
//
// `DnsProvider` implementation over the Cloudflare API v4, bound to one zone.
//
// Every method is a single HTTP request. Whether a write is needed is decided
// by the reconciler; this crate never retries, caches or compares.
//
// ## Security Requirements
//
// - API token NEVER appears in logs or `Debug` output
// - Provider fails fast if token or zone ID is empty
//
// ## API Reference
//
// - Verify token: GET `/user/tokens/verify`
// - List DNS records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Create DNS record: POST `/zones/:zone_id/dns_records`
// - Update DNS record: PUT `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use hostsync_core::config::ProviderConfig;
use hostsync_core::traits::{DnsProvider, DnsProviderFactory, DnsRecord, RecordParams, RecordType};
use hostsync_core::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PROVIDER: &str = "cloudflare";

/// Response envelope shared by every Cloudflare v4 endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform every GET request (verify, list)
/// - Log the intended POST/PUT payload
/// - Return a synthesized record instead of writing
pub struct CloudflareProvider {
    /// ⚠️ NEVER log this value
    api_token: String,
    zone_id: String,
    base_url: String,
    client: reqwest::Client,
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `zone_id`: ID of the zone every record lives in
    /// - `dry_run`: If true, perform reads but only log writes
    pub fn new(
        api_token: impl Into<String>,
        zone_id: impl Into<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let api_token = api_token.into();
        let zone_id = zone_id.into();

        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }
        if zone_id.is_empty() {
            return Err(Error::config("Cloudflare zone ID cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            zone_id,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run,
        })
    }

    /// Point the provider at a different API root (used by tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether writes are only logged
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, self.zone_id)
    }

    /// Send a request and unwrap the Cloudflare envelope
    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::http(format!("Cloudflare request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(map_status(status.as_u16(), &error_text));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("Failed to parse response: {}", e)))?;

        if !envelope.success {
            return Err(Error::provider(PROVIDER, describe_errors(&envelope.errors)));
        }

        envelope
            .result
            .ok_or_else(|| Error::provider(PROVIDER, "Invalid response format: missing result"))
    }

    /// Record the provider would have returned for a write in dry-run mode
    fn simulated(&self, id: &str, params: &RecordParams) -> DnsRecord {
        DnsRecord {
            id: id.to_string(),
            record_type: params.record_type,
            name: params.name.clone(),
            content: params.content.clone(),
            ttl: params.ttl,
            proxied: params.proxied,
            comment: Some(params.comment.clone()),
        }
    }
}

/// Map a non-success HTTP status to the error taxonomy
fn map_status(status: u16, body: &str) -> Error {
    match status {
        401 | 403 => Error::auth(format!(
            "Invalid API token or insufficient permissions. Status: {}",
            status
        )),
        404 => Error::not_found(format!("Cloudflare resource not found: {}", body)),
        409 => Error::provider(
            PROVIDER,
            format!("Conflict: record is being changed elsewhere. Status: {}", status),
        ),
        429 => Error::rate_limited(format!("Cloudflare rate limit exceeded. Status: {}", status)),
        500..=599 => Error::provider(
            PROVIDER,
            format!("Cloudflare server error (transient): {} - {}", status, body),
        ),
        _ => Error::provider(PROVIDER, format!("Request failed: {} - {}", status, body)),
    }
}

fn describe_errors(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "Request unsuccessful".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{} ({})", e.message, e.code))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Deserialize)]
struct TokenStatus {
    status: String,
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn list_records(&self, name: &str, record_type: RecordType) -> Result<Vec<DnsRecord>> {
        tracing::debug!("Listing {} records for {}", record_type.as_str(), name);

        let request = self
            .client
            .get(self.records_url())
            .query(&[("name", name), ("type", record_type.as_str())]);

        self.send(request).await
    }

    async fn create_record(&self, params: &RecordParams) -> Result<DnsRecord> {
        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send POST to {} with payload: {}",
                self.records_url(),
                serde_json::to_string(params)?
            );
            return Ok(self.simulated("dry-run", params));
        }

        let request = self.client.post(self.records_url()).json(params);
        let record: DnsRecord = self.send(request).await?;

        tracing::debug!("Cloudflare assigned record ID {} to {}", record.id, record.name);
        Ok(record)
    }

    async fn update_record(&self, record_id: &str, params: &RecordParams) -> Result<DnsRecord> {
        let url = format!("{}/{}", self.records_url(), record_id);

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send PUT to {} with payload: {}",
                url,
                serde_json::to_string(params)?
            );
            return Ok(self.simulated(record_id, params));
        }

        let request = self.client.put(url).json(params);
        self.send(request).await
    }

    async fn verify(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/user/tokens/verify", self.base_url))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::http(format!("Cloudflare request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read Cloudflare response: {}", e)))?;

        // Throttling and outages say nothing about the token
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(map_status(status.as_u16(), &body));
        }

        // Anything else that is not a success envelope is a rejected token
        let envelope: Envelope<TokenStatus> = serde_json::from_str(&body).map_err(|_| {
            Error::auth(format!("API token rejected. Status: {}", status.as_u16()))
        })?;
        if !status.is_success() || !envelope.success {
            return Err(Error::auth(format!(
                "API token rejected: {}",
                describe_errors(&envelope.errors)
            )));
        }
        let token = envelope
            .result
            .ok_or_else(|| Error::auth("Token verification returned no result"))?;

        if token.status != "active" {
            return Err(Error::auth(format!("API token is {}", token.status)));
        }

        tracing::info!(
            "Cloudflare API token verified (zone: {}, mode: {})",
            self.zone_id,
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Cloudflare { api_token, zone_id } => {
                // Check for dry-run mode environment variable
                let dry_run = std::env::var("HOSTSYNC_MODE")
                    .unwrap_or_default()
                    .eq_ignore_ascii_case("dry-run");

                if dry_run {
                    tracing::warn!(
                        "Cloudflare provider running in DRY-RUN mode - no changes will be made"
                    );
                }

                Ok(Box::new(CloudflareProvider::new(
                    api_token.clone(),
                    zone_id.clone(),
                    dry_run,
                )?))
            }
        }
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use hostsync_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// hostsync_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &hostsync_core::ProviderRegistry) {
    registry.register_provider("cloudflare", Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params(content: &str) -> RecordParams {
        RecordParams {
            record_type: RecordType::A,
            name: "app".to_string(),
            content: content.to_string(),
            ttl: 1,
            proxied: true,
            comment: "Managed by hostsync".to_string(),
        }
    }

    fn record_json(id: &str, content: &str) -> serde_json::Value {
        json!({
            "id": id,
            "type": "A",
            "name": "app.example.com",
            "content": content,
            "ttl": 1,
            "proxied": true,
            "comment": "Managed by hostsync",
            "zone_id": "zone-1",
            "created_on": "2024-01-01T00:00:00Z"
        })
    }

    fn ok(result: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "errors": [],
            "messages": [],
            "result": result
        }))
    }

    async fn provider(server: &MockServer, dry_run: bool) -> CloudflareProvider {
        CloudflareProvider::new("secret-token", "zone-1", dry_run)
            .unwrap()
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_list_filters_by_name_and_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones/zone-1/dns_records"))
            .and(query_param("name", "app.example.com"))
            .and(query_param("type", "A"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(ok(json!([record_json("rec-1", "192.0.2.1")])))
            .expect(1)
            .mount(&server)
            .await;

        let records = provider(&server, false)
            .await
            .list_records("app.example.com", RecordType::A)
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "rec-1");
        assert_eq!(records[0].content, "192.0.2.1");
        assert!(records[0].proxied);
    }

    #[tokio::test]
    async fn test_create_posts_managed_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/zones/zone-1/dns_records"))
            .and(body_partial_json(json!({
                "type": "A",
                "name": "app",
                "content": "192.0.2.1",
                "ttl": 1,
                "proxied": true,
                "comment": "Managed by hostsync"
            })))
            .respond_with(ok(record_json("rec-9", "192.0.2.1")))
            .expect(1)
            .mount(&server)
            .await;

        let record = provider(&server, false)
            .await
            .create_record(&params("192.0.2.1"))
            .await
            .unwrap();

        assert_eq!(record.id, "rec-9");
    }

    #[tokio::test]
    async fn test_update_puts_by_record_id() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/zones/zone-1/dns_records/rec-1"))
            .and(body_partial_json(json!({ "content": "192.0.2.99" })))
            .respond_with(ok(record_json("rec-1", "192.0.2.99")))
            .expect(1)
            .mount(&server)
            .await;

        let record = provider(&server, false)
            .await
            .update_record("rec-1", &params("192.0.2.99"))
            .await
            .unwrap();

        assert_eq!(record.content, "192.0.2.99");
    }

    #[tokio::test]
    async fn test_dry_run_skips_writes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ok(record_json("rec-1", "192.0.2.1")))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ok(record_json("rec-1", "192.0.2.1")))
            .expect(0)
            .mount(&server)
            .await;

        let provider = provider(&server, true).await;
        let created = provider.create_record(&params("192.0.2.1")).await.unwrap();
        let updated = provider
            .update_record("rec-1", &params("192.0.2.2"))
            .await
            .unwrap();

        assert_eq!(created.content, "192.0.2.1");
        assert_eq!(updated.id, "rec-1");
        assert_eq!(updated.content, "192.0.2.2");
    }

    #[tokio::test]
    async fn test_unsuccessful_envelope_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "errors": [{ "code": 81057, "message": "Record already exists." }],
                "result": null
            })))
            .mount(&server)
            .await;

        let err = provider(&server, false)
            .await
            .create_record(&params("192.0.2.1"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Provider { .. }));
        assert!(err.to_string().contains("Record already exists."));
    }

    #[tokio::test]
    async fn test_status_codes_map_to_error_kinds() {
        let cases = [
            (403, "auth"),
            (404, "not_found"),
            (429, "rate_limited"),
            (502, "provider"),
        ];

        for (status, kind) in cases {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
                .mount(&server)
                .await;

            let err = provider(&server, false)
                .await
                .list_records("app.example.com", RecordType::A)
                .await
                .unwrap_err();

            let matched = match kind {
                "auth" => matches!(err, Error::Authentication(_)),
                "not_found" => matches!(err, Error::NotFound(_)),
                "rate_limited" => matches!(err, Error::RateLimited(_)),
                _ => matches!(err, Error::Provider { .. }),
            };
            assert!(matched, "status {} gave {:?}", status, err);
        }
    }

    #[tokio::test]
    async fn test_verify_accepts_active_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/tokens/verify"))
            .respond_with(ok(json!({ "id": "tok", "status": "active" })))
            .mount(&server)
            .await;

        assert!(provider(&server, false).await.verify().await.is_ok());
    }

    #[tokio::test]
    async fn test_verify_rejects_bad_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/tokens/verify"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let err = provider(&server, false).await.verify().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_verify_treats_malformed_token_as_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/tokens/verify"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "success": false,
                "errors": [{
                    "code": 6003,
                    "message": "Invalid request headers",
                    "error_chain": [{ "code": 6111, "message": "Invalid format for Authorization header" }]
                }],
                "messages": [],
                "result": null
            })))
            .mount(&server)
            .await;

        let err = provider(&server, false).await.verify().await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)), "got {:?}", err);
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Invalid request headers"));
    }

    #[tokio::test]
    async fn test_verify_outage_is_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/tokens/verify"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = provider(&server, false).await.verify().await.unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_empty_credentials_rejected() {
        assert!(matches!(
            CloudflareProvider::new("", "zone", false),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            CloudflareProvider::new("token", "", false),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_factory_creation() {
        let config = ProviderConfig::Cloudflare {
            api_token: "test_token".to_string(),
            zone_id: "test_zone".to_string(),
        };

        let provider = CloudflareFactory.create(&config).unwrap();
        assert_eq!(provider.provider_name(), "cloudflare");
    }

    #[test]
    fn test_dry_run_flag_is_reported() {
        assert!(
            CloudflareProvider::new("token", "zone", true)
                .unwrap()
                .is_dry_run()
        );
        assert!(
            !CloudflareProvider::new("token", "zone", false)
                .unwrap()
                .is_dry_run()
        );
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let provider = CloudflareProvider::new("secret_token_12345", "zone", false).unwrap();

        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareProvider"));
        assert!(debug_str.contains("<REDACTED>"));
    }
}
