// Chargeback Aggregator: usage records to per-application cost reports

pub mod aggregate;
pub mod export;

pub use aggregate::aggregate;
pub use export::{export_filename, to_csv};

use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::ChargebackConfig;
use crate::db::repository::{Repositories, UsageRepository};
use crate::domain::{ChargebackRates, ChargebackReport, UsageMetric};
use crate::errors::{AppError, Result};

/// Inclusive billing period.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BillingPeriod {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl BillingPeriod {
    pub fn validate(&self) -> Result<()> {
        if self.from > self.to {
            return Err(AppError::Validation(format!(
                "Billing period start {} is after its end {}",
                self.from, self.to
            )));
        }
        Ok(())
    }
}

/// Loads usage for a period and prices it with the rate table in effect.
pub struct ChargebackService {
    usage: Arc<dyn UsageRepository>,
    rate_tables: Vec<ChargebackRates>,
}

impl ChargebackService {
    pub fn new(repos: &Repositories, config: &ChargebackConfig) -> Self {
        Self {
            usage: repos.usage.clone(),
            rate_tables: config.rate_tables.iter().map(ChargebackRates::from).collect(),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn report(&self, period: BillingPeriod) -> Result<ChargebackReport> {
        period.validate()?;
        let rates = ChargebackRates::effective_on(&self.rate_tables, period.from)
            .cloned()
            .ok_or_else(|| {
                AppError::Configuration(format!("No rate table in effect on {}", period.from))
            })?;

        let metrics = self.usage.find_for_period(period.from, period.to).await?;
        let summary = aggregate(&metrics, &rates);
        tracing::info!(
            line_items = summary.line_items.len(),
            total_cost = summary.total_cost,
            "Chargeback report computed"
        );

        Ok(ChargebackReport {
            period_start: period.from,
            period_end: period.to,
            rates,
            summary,
        })
    }

    /// Store collector records for later reports.
    #[tracing::instrument(skip(self, metrics), fields(count = metrics.len()))]
    pub async fn ingest(&self, metrics: Vec<UsageMetric>) -> Result<u64> {
        if metrics.is_empty() {
            return Err(AppError::Validation("No usage records supplied".to_string()));
        }
        self.usage.upsert_batch(&metrics).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateTableConfig;
    use crate::db::MemoryStore;
    use uuid::Uuid;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn service() -> ChargebackService {
        let config = ChargebackConfig {
            rate_tables: vec![
                RateTableConfig {
                    cost_per_gb_in: 0.10,
                    cost_per_gb_out: 0.05,
                    cost_per_million_messages: 0.01,
                    effective_date: day(1, 1),
                },
                RateTableConfig {
                    cost_per_gb_in: 0.20,
                    cost_per_gb_out: 0.10,
                    cost_per_million_messages: 0.02,
                    effective_date: day(9, 1),
                },
            ],
        };
        ChargebackService::new(
            &Repositories::from_store(Arc::new(MemoryStore::new())),
            &config,
        )
    }

    fn usage(app: Uuid, period_start: NaiveDate, bytes_in: u64) -> UsageMetric {
        UsageMetric {
            application_id: app,
            application_name: "orders".into(),
            workspace_id: Uuid::new_v4(),
            workspace_name: "retail".into(),
            period_start,
            bytes_in,
            bytes_out: 0,
            messages_in: 0,
            messages_out: 0,
        }
    }

    #[tokio::test]
    async fn test_report_uses_period_records_and_rate_table() {
        let svc = service();
        let app = Uuid::new_v4();
        svc.ingest(vec![
            usage(app, day(9, 1), 1 << 30),
            usage(app, day(9, 2), 1 << 30),
            usage(app, day(10, 1), 1 << 30),
        ])
        .await
        .unwrap();

        let report = svc
            .report(BillingPeriod {
                from: day(9, 1),
                to: day(9, 30),
            })
            .await
            .unwrap();
        assert_eq!(report.rates.cost_per_gb_in, 0.20);
        assert_eq!(report.summary.line_items.len(), 1);
        assert!((report.summary.total_ingress_gb - 2.0).abs() < 1e-9);
        assert!((report.summary.total_cost - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_inverted_period_is_rejected() {
        let err = service()
            .report(BillingPeriod {
                from: day(9, 30),
                to: day(9, 1),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_period_before_any_rate_table() {
        let err = service()
            .report(BillingPeriod {
                from: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                to: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }
}
