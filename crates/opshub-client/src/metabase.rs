use std::time::Duration;

use opshub_protocol::{DashboardRequest, DashboardResponse, MetabaseHealth};

use crate::error::ClientError;
use crate::http::{build_client, get_json, join_url, read_json, send_checked};

/// Client for the dashboard generator in front of Metabase.
#[derive(Clone)]
pub struct MetabaseClient {
    base_url: String,
    http: reqwest::Client,
}

impl MetabaseClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: base_url.into(),
            http: build_client(Some(timeout))?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<MetabaseHealth, ClientError> {
        let url = join_url(&self.base_url, "/healthz");
        get_json(&self.http, &url, &[], "Health check failed").await
    }

    pub async fn generate_dashboard(
        &self,
        request: &DashboardRequest,
    ) -> Result<DashboardResponse, ClientError> {
        if request.query.trim().is_empty() {
            return Err(ClientError::InvalidSelection("dashboard query is empty".into()));
        }
        let url = join_url(&self.base_url, "/dashboards/generate");
        let resp = send_checked(
            self.http.post(&url).json(request),
            &url,
            "Failed to generate dashboard",
        )
        .await?;
        let dashboard: DashboardResponse = read_json(resp, &url).await?;
        tracing::info!(
            dashboard_id = dashboard.dashboard_id,
            card_id = dashboard.card_id,
            "dashboard generated"
        );
        Ok(dashboard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> MetabaseClient {
        MetabaseClient::new(server.base_url(), Duration::from_secs(5)).expect("client")
    }

    #[tokio::test]
    async fn generate_posts_request_and_decodes_reply() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/dashboards/generate")
                    .json_body(json!({"query": "errors by host", "dashboardId": 3}));
                then.status(200).json_body(json!({
                    "message": "created",
                    "dashboard_id": 3,
                    "dashboard_url": "http://mb/dashboard/3",
                    "card_id": 17,
                    "dashboard": {"name": "Ops"},
                    "card": {}
                }));
            })
            .await;
        let reply = client(&server)
            .generate_dashboard(&DashboardRequest {
                query: "errors by host".into(),
                dashboard_id: Some(3),
                ..Default::default()
            })
            .await
            .expect("generate");
        mock.assert_async().await;
        assert_eq!(reply.card_id, 17);
        assert_eq!(reply.dashboard_url, "http://mb/dashboard/3");
    }

    #[tokio::test]
    async fn generate_surfaces_detail_or_fallback() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/dashboards/generate")
                    .json_body_partial(r#"{"query":"bad"}"#);
                then.status(422).json_body(json!({"detail": "could not translate query"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/dashboards/generate")
                    .json_body_partial(r#"{"query":"opaque"}"#);
                then.status(500).json_body(json!({}));
            })
            .await;
        let mb = client(&server);
        let request = |q: &str| DashboardRequest {
            query: q.into(),
            ..Default::default()
        };
        let err = mb.generate_dashboard(&request("bad")).await.unwrap_err();
        assert!(err.to_string().contains("could not translate query"));
        let err = mb.generate_dashboard(&request("opaque")).await.unwrap_err();
        assert!(err.to_string().contains("Failed to generate dashboard"));
        assert!(matches!(
            mb.generate_dashboard(&request("  ")).await,
            Err(ClientError::InvalidSelection(_))
        ));
    }

    #[tokio::test]
    async fn health_reads_version() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/healthz");
                then.status(200).json_body(json!({"status": "ok", "version": "0.49"}));
            })
            .await;
        let health = client(&server).health().await.expect("health");
        assert_eq!(health.version.as_deref(), Some("0.49"));
    }
}
