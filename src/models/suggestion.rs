use serde::Serialize;

use super::TimeSlot;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
    pub id: String,
    pub name: Option<String>,
    pub duration: i64,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebookingSuggestion {
    pub time_slot: TimeSlot,
    pub service: ServiceSummary,
    pub provider: ProviderSummary,
    pub customer_id: String,
    pub formatted_date_time: String,
    pub score: f64,
}
