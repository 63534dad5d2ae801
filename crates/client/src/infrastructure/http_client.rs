//! reqwest adapter for the orchestrator, payment and management services.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use url::Url;

use arcana_protocol::{BlikPaymentRequest, DivinationFormData};

use crate::ports::{AdminSummary, ApiError, DateRange, OrchestratorPort, StartedProcess};

const ADMIN_PASSWORD_HEADER: &str = "X-Admin-Password";

/// HTTP client for the backend REST endpoints.
#[derive(Clone)]
pub struct OrchestratorClient {
    client: Client,
    base_url: Url,
}

impl OrchestratorClient {
    pub fn new(base_url: Url, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `base_url` extended by `segments`, each percent-encoded as one segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Only cannot-be-a-base URLs refuse segments; config admits http(s) only.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn process_url(&self, user_id: &str) -> Url {
        self.endpoint(&["orchestrator-service", "process", user_id])
    }

    fn blik_url(&self) -> Url {
        self.endpoint(&["payment-service", "blik"])
    }

    fn profit_url(&self, range: Option<&DateRange>) -> Url {
        let mut url = self.endpoint(&["management-service", "profit"]);
        if let Some(range) = range {
            url.query_pairs_mut()
                .append_pair("startDate", &range.from)
                .append_pair("endDate", &range.to);
        }
        url
    }
}

/// Body of `GET /management-service/profit`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfitResponse {
    profit: f64,
    total_used_tokens: f64,
    total_payments: f64,
}

async fn ensure_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::RequestFailed(e.to_string()))?;
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl OrchestratorPort for OrchestratorClient {
    async fn start_divination_process(
        &self,
        user_id: &str,
        form: &DivinationFormData,
    ) -> Result<StartedProcess, ApiError> {
        let url = self.process_url(user_id);
        tracing::debug!(url = %url, user_id = %user_id, "Starting divination process");

        let response = self
            .client
            .post(url)
            .json(form)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;
        let response = ensure_success(response).await.inspect_err(|e| {
            tracing::error!(error = %e, user_id = %user_id, "Backend rejected process start");
        })?;

        let started: StartedProcess = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        tracing::info!(
            user_id = %user_id,
            process_id = ?started.process_id,
            "Divination process started"
        );
        Ok(started)
    }

    async fn send_blik_payment(&self, request: &BlikPaymentRequest) -> Result<(), ApiError> {
        tracing::debug!(
            user_id = %request.user_id,
            process_id = %request.process_id,
            "Submitting BLIK payment"
        );

        let response = self
            .client
            .post(self.blik_url())
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn admin_summary(
        &self,
        password: &str,
        range: Option<DateRange>,
    ) -> Result<AdminSummary, ApiError> {
        let url = self.profit_url(range.as_ref());
        tracing::debug!(url = %url, "Fetching profit summary");

        let response = self
            .client
            .get(url)
            .header(ADMIN_PASSWORD_HEADER, password)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;
        let response = ensure_success(response).await.inspect_err(|e| {
            tracing::error!(error = %e, "Management service rejected profit request");
        })?;

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;
        let profit: ProfitResponse = serde_json::from_str(&body).map_err(|e| {
            ApiError::InvalidResponse(format!("Invalid response structure: {e}"))
        })?;

        Ok(AdminSummary {
            total_revenue: profit.total_payments,
            token_usage: profit.total_used_tokens,
            profit: profit.profit,
            date_range: range,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer exactly one HTTP request with `status` and `body`; yields the raw request.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (SocketAddr, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.expect("read");
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .filter_map(|line| line.split_once(':'))
                        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.expect("write");
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });
        (addr, task)
    }

    fn client_for(addr: SocketAddr) -> OrchestratorClient {
        let base = Url::parse(&format!("http://{addr}")).expect("url");
        OrchestratorClient::new(base, Duration::from_secs(5))
    }

    fn form() -> DivinationFormData {
        DivinationFormData {
            name: "Ada".to_string(),
            date_of_birth: "1990-01-01".to_string(),
            favorite_color: "violet".to_string(),
            favorite_number: "7".to_string(),
            relationship_status: "single".to_string(),
        }
    }

    #[test]
    fn builds_endpoint_urls() {
        let base = Url::parse("http://api.local:8080/").expect("url");
        let client = OrchestratorClient::new(base, Duration::from_secs(5));

        assert_eq!(
            client.process_url("user-1").as_str(),
            "http://api.local:8080/orchestrator-service/process/user-1"
        );
        assert_eq!(
            client.blik_url().as_str(),
            "http://api.local:8080/payment-service/blik"
        );
        assert_eq!(
            client.profit_url(None).as_str(),
            "http://api.local:8080/management-service/profit"
        );
    }

    #[test]
    fn endpoints_keep_base_path() {
        let base = Url::parse("https://gateway.local/api/").expect("url");
        let client = OrchestratorClient::new(base, Duration::from_secs(5));

        assert_eq!(
            client.blik_url().as_str(),
            "https://gateway.local/api/payment-service/blik"
        );
    }

    #[test]
    fn user_id_stays_one_path_segment() {
        let base = Url::parse("http://api.local:8080").expect("url");
        let client = OrchestratorClient::new(base, Duration::from_secs(5));

        let url = client.process_url("a/b?c");

        assert_eq!(
            url.as_str(),
            "http://api.local:8080/orchestrator-service/process/a%2Fb%3Fc"
        );
        assert!(url.query().is_none());
    }

    #[test]
    fn profit_url_carries_date_range() {
        let base = Url::parse("http://api.local:8080").expect("url");
        let client = OrchestratorClient::new(base, Duration::from_secs(5));
        let range = DateRange {
            from: "2024-01-01".to_string(),
            to: "2024-01-31".to_string(),
        };

        assert_eq!(
            client.profit_url(Some(&range)).as_str(),
            "http://api.local:8080/management-service/profit?startDate=2024-01-01&endDate=2024-01-31"
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_request_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let base = Url::parse(&format!("http://{addr}")).expect("url");
        let client = OrchestratorClient::new(base, Duration::from_secs(2));
        let request = BlikPaymentRequest {
            user_id: "u".to_string(),
            process_id: "p".to_string(),
            blik_code: "123456".to_string(),
        };

        let err = client
            .send_blik_payment(&request)
            .await
            .expect_err("connection refused");
        assert!(matches!(err, ApiError::RequestFailed(_)));
    }

    #[tokio::test]
    async fn start_process_posts_form_and_reads_process_id() {
        let (addr, server) = serve_once("200 OK", r#"{"processId":"p-42"}"#).await;
        let client = client_for(addr);

        let started = client
            .start_divination_process("user-7", &form())
            .await
            .expect("started");

        assert_eq!(started.process_id.as_deref(), Some("p-42"));
        let request = server.await.expect("server");
        assert!(request.starts_with("POST /orchestrator-service/process/user-7 HTTP/1.1"));
        assert!(request.contains(r#""dateOfBirth":"1990-01-01""#));
    }

    #[tokio::test]
    async fn non_success_status_keeps_body() {
        let (addr, server) = serve_once("402 Payment Required", "declined").await;
        let client = client_for(addr);
        let request = BlikPaymentRequest {
            user_id: "u".to_string(),
            process_id: "p".to_string(),
            blik_code: "123456".to_string(),
        };

        let err = client
            .send_blik_payment(&request)
            .await
            .expect_err("rejected");

        assert_eq!(
            err,
            ApiError::Status {
                status: 402,
                body: "declined".to_string()
            }
        );
        let raw = server.await.expect("server");
        assert!(raw.starts_with("POST /payment-service/blik HTTP/1.1"));
        assert!(raw.contains(r#""BLIKCode":"123456""#));
    }

    #[tokio::test]
    async fn admin_summary_sends_password_and_maps_fields() {
        let (addr, server) = serve_once(
            "200 OK",
            r#"{"profit":80.5,"totalUsedTokens":3000,"totalPayments":120}"#,
        )
        .await;
        let range = DateRange {
            from: "2024-01-01".to_string(),
            to: "2024-01-31".to_string(),
        };

        let summary = client_for(addr)
            .admin_summary("s3cret", Some(range.clone()))
            .await
            .expect("summary");

        assert_eq!(
            summary,
            AdminSummary {
                total_revenue: 120.0,
                token_usage: 3000.0,
                profit: 80.5,
                date_range: Some(range),
            }
        );
        let raw = server.await.expect("server");
        assert!(raw.starts_with(
            "GET /management-service/profit?startDate=2024-01-01&endDate=2024-01-31 HTTP/1.1"
        ));
        assert!(raw.to_ascii_lowercase().contains("x-admin-password: s3cret"));
    }

    #[tokio::test]
    async fn admin_summary_rejects_non_numeric_fields() {
        let (addr, _server) = serve_once(
            "200 OK",
            r#"{"profit":"lots","totalUsedTokens":3000,"totalPayments":120}"#,
        )
        .await;

        let err = client_for(addr)
            .admin_summary("s3cret", None)
            .await
            .expect_err("invalid");

        assert!(
            matches!(err, ApiError::InvalidResponse(ref msg) if msg.starts_with("Invalid response structure")),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn admin_summary_wrong_password_is_a_status_error() {
        let (addr, _server) = serve_once("401 Unauthorized", "bad password").await;

        let err = client_for(addr)
            .admin_summary("nope", None)
            .await
            .expect_err("unauthorized");

        assert_eq!(
            err,
            ApiError::Status {
                status: 401,
                body: "bad password".to_string()
            }
        );
    }
}
