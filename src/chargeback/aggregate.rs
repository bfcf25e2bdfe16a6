// Pure fold from usage records to cost line items

use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{ChargebackLineItem, ChargebackRates, ChargebackSummary, UsageMetric};

pub const BYTES_PER_GB: f64 = 1_073_741_824.0;
pub const MESSAGES_PER_MILLION: f64 = 1_000_000.0;

#[derive(Default)]
struct Totals {
    bytes_in: u64,
    bytes_out: u64,
    messages_in: u64,
    messages_out: u64,
}

/// Group `metrics` by application, price each group with `rates` and sort the
/// line items by total cost, highest first. Equal costs keep first-appearance
/// order.
pub fn aggregate(metrics: &[UsageMetric], rates: &ChargebackRates) -> ChargebackSummary {
    let mut order: Vec<&UsageMetric> = Vec::new();
    let mut groups: HashMap<Uuid, Totals> = HashMap::new();

    for metric in metrics {
        let totals = groups.entry(metric.application_id).or_insert_with(|| {
            order.push(metric);
            Totals::default()
        });
        totals.bytes_in = totals.bytes_in.saturating_add(metric.bytes_in);
        totals.bytes_out = totals.bytes_out.saturating_add(metric.bytes_out);
        totals.messages_in = totals.messages_in.saturating_add(metric.messages_in);
        totals.messages_out = totals.messages_out.saturating_add(metric.messages_out);
    }

    let mut line_items: Vec<ChargebackLineItem> = order
        .into_iter()
        .filter_map(|first| {
            groups
                .get(&first.application_id)
                .map(|totals| price(first, totals, rates))
        })
        .collect();
    line_items.sort_by(|a, b| b.total_cost.total_cmp(&a.total_cost));

    let mut summary = ChargebackSummary {
        line_items: Vec::new(),
        total_ingress_gb: 0.0,
        total_egress_gb: 0.0,
        total_messages: 0,
        total_cost: 0.0,
    };
    for item in &line_items {
        summary.total_ingress_gb += item.ingress_gb;
        summary.total_egress_gb += item.egress_gb;
        summary.total_messages = summary.total_messages.saturating_add(item.message_count);
        summary.total_cost += item.total_cost;
    }
    summary.line_items = line_items;
    summary
}

fn price(first: &UsageMetric, totals: &Totals, rates: &ChargebackRates) -> ChargebackLineItem {
    let ingress_gb = totals.bytes_in as f64 / BYTES_PER_GB;
    let egress_gb = totals.bytes_out as f64 / BYTES_PER_GB;
    let message_count = totals.messages_in.saturating_add(totals.messages_out);

    let ingress_cost = ingress_gb * rates.cost_per_gb_in;
    let egress_cost = egress_gb * rates.cost_per_gb_out;
    let message_cost = (message_count as f64 / MESSAGES_PER_MILLION) * rates.cost_per_million_messages;

    ChargebackLineItem {
        workspace_id: first.workspace_id,
        workspace_name: first.workspace_name.clone(),
        application_id: first.application_id,
        application_name: first.application_name.clone(),
        ingress_gb,
        egress_gb,
        message_count,
        ingress_cost,
        egress_cost,
        message_cost,
        total_cost: ingress_cost + egress_cost + message_cost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const GB: u64 = 1 << 30;

    fn rates() -> ChargebackRates {
        ChargebackRates {
            cost_per_gb_in: 0.10,
            cost_per_gb_out: 0.05,
            cost_per_million_messages: 0.01,
            effective_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        }
    }

    fn metric(app: Uuid, name: &str, bytes_in: u64, bytes_out: u64, msg_in: u64, msg_out: u64) -> UsageMetric {
        UsageMetric {
            application_id: app,
            application_name: name.into(),
            workspace_id: Uuid::nil(),
            workspace_name: "platform".into(),
            period_start: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            bytes_in,
            bytes_out,
            messages_in: msg_in,
            messages_out: msg_out,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_single_application_costs() {
        let app = Uuid::new_v4();
        let metrics = vec![metric(app, "orders", 10 * GB, 5 * GB, 1_000_000, 500_000)];

        let summary = aggregate(&metrics, &rates());
        assert_eq!(summary.line_items.len(), 1);
        let item = &summary.line_items[0];
        assert!(close(item.ingress_gb, 10.0));
        assert!(close(item.egress_gb, 5.0));
        assert_eq!(item.message_count, 1_500_000);
        assert!(close(item.ingress_cost, 1.0));
        assert!(close(item.egress_cost, 0.25));
        assert!(close(item.message_cost, 0.015));
        assert!(close(item.total_cost, 1.265));
        assert!(close(summary.total_cost, 1.265));
    }

    #[test]
    fn test_aggregate_is_deterministic() {
        let metrics = vec![
            metric(Uuid::new_v4(), "a", 3 * GB, GB, 10, 10),
            metric(Uuid::new_v4(), "b", GB, 7 * GB, 99, 1),
        ];
        assert_eq!(aggregate(&metrics, &rates()), aggregate(&metrics, &rates()));
    }

    #[test]
    fn test_records_for_same_application_are_merged() {
        let app = Uuid::new_v4();
        let metrics = vec![metric(app, "orders", GB, 0, 0, 0), metric(app, "orders", GB, 0, 0, 0)];

        let summary = aggregate(&metrics, &rates());
        assert_eq!(summary.line_items.len(), 1);
        assert!(close(summary.line_items[0].ingress_gb, 2.0));
        assert!(close(summary.total_ingress_gb, 2.0));
    }

    #[test]
    fn test_empty_input() {
        let summary = aggregate(&[], &rates());
        assert!(summary.line_items.is_empty());
        assert_eq!(summary.total_cost, 0.0);
        assert_eq!(summary.total_messages, 0);
    }

    #[test]
    fn test_line_items_sorted_by_cost_descending() {
        let cheap = Uuid::new_v4();
        let pricey = Uuid::new_v4();
        let metrics = vec![
            metric(cheap, "cheap", GB, 0, 0, 0),
            metric(pricey, "pricey", 100 * GB, 0, 0, 0),
        ];

        let summary = aggregate(&metrics, &rates());
        assert_eq!(summary.line_items[0].application_id, pricey);
        assert_eq!(summary.line_items[1].application_id, cheap);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let metrics = vec![metric(first, "first", GB, 0, 0, 0), metric(second, "second", GB, 0, 0, 0)];

        let summary = aggregate(&metrics, &rates());
        assert_eq!(summary.line_items[0].application_id, first);
        assert_eq!(summary.line_items[1].application_id, second);
    }
}
