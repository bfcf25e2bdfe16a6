// Usage metrics and chargeback value types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregated usage for one application over one collector period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetric {
    pub application_id: Uuid,
    pub application_name: String,
    pub workspace_id: Uuid,
    pub workspace_name: String,
    pub period_start: NaiveDate,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub messages_in: u64,
    pub messages_out: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargebackRates {
    pub cost_per_gb_in: f64,
    pub cost_per_gb_out: f64,
    pub cost_per_million_messages: f64,
    pub effective_date: NaiveDate,
}

impl ChargebackRates {
    /// Latest table already in effect on `day`.
    pub fn effective_on(tables: &[ChargebackRates], day: NaiveDate) -> Option<&ChargebackRates> {
        tables
            .iter()
            .filter(|t| t.effective_date <= day)
            .max_by_key(|t| t.effective_date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargebackLineItem {
    pub workspace_id: Uuid,
    pub workspace_name: String,
    pub application_id: Uuid,
    pub application_name: String,
    pub ingress_gb: f64,
    pub egress_gb: f64,
    pub message_count: u64,
    pub ingress_cost: f64,
    pub egress_cost: f64,
    pub message_cost: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargebackSummary {
    pub line_items: Vec<ChargebackLineItem>,
    pub total_ingress_gb: f64,
    pub total_egress_gb: f64,
    pub total_messages: u64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargebackReport {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub rates: ChargebackRates,
    #[serde(flatten)]
    pub summary: ChargebackSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(date: (i32, u32, u32), cost: f64) -> ChargebackRates {
        ChargebackRates {
            cost_per_gb_in: cost,
            cost_per_gb_out: cost,
            cost_per_million_messages: cost,
            effective_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
        }
    }

    #[test]
    fn test_effective_rate_table_selection() {
        let tables = vec![table((2024, 1, 1), 1.0), table((2025, 6, 1), 2.0)];

        let day = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(ChargebackRates::effective_on(&tables, day).unwrap().cost_per_gb_in, 1.0);

        let day = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        assert_eq!(ChargebackRates::effective_on(&tables, day).unwrap().cost_per_gb_in, 2.0);

        let day = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert!(ChargebackRates::effective_on(&tables, day).is_none());
    }
}
