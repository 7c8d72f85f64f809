use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Existing dashboard to add the card to.
    #[serde(
        rename = "dashboardId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub dashboard_id: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub dashboard_id: i64,
    #[serde(default)]
    pub dashboard_url: String,
    #[serde(default)]
    pub card_id: i64,
    #[serde(default)]
    pub dashboard: Map<String, Value>,
    #[serde(default)]
    pub card: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetabaseHealth {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}
