// CSV rendering of a chargeback report

use crate::domain::ChargebackReport;

const HEADER: [&str; 9] = [
    "Workspace",
    "Application",
    "Ingress (GB)",
    "Egress (GB)",
    "Messages",
    "Ingress Cost",
    "Egress Cost",
    "Message Cost",
    "Total Cost",
];

/// Download name for a report covering `report`'s period.
pub fn export_filename(report: &ChargebackReport) -> String {
    format!(
        "kafka-chargeback-platform-{}-to-{}.csv",
        report.period_start.format("%Y-%m-%d"),
        report.period_end.format("%Y-%m-%d")
    )
}

/// One quoted row per line item followed by a `TOTAL` row.
pub fn to_csv(report: &ChargebackReport) -> String {
    let summary = &report.summary;
    let mut out = String::new();
    push_row(&mut out, HEADER.iter().map(|h| h.to_string()));

    for item in &summary.line_items {
        push_row(
            &mut out,
            [
                item.workspace_name.clone(),
                item.application_name.clone(),
                format!("{:.2}", item.ingress_gb),
                format!("{:.2}", item.egress_gb),
                item.message_count.to_string(),
                format!("{:.2}", item.ingress_cost),
                format!("{:.2}", item.egress_cost),
                format!("{:.2}", item.message_cost),
                format!("{:.2}", item.total_cost),
            ],
        );
    }

    let ingress_cost: f64 = summary.line_items.iter().map(|i| i.ingress_cost).sum();
    let egress_cost: f64 = summary.line_items.iter().map(|i| i.egress_cost).sum();
    let message_cost: f64 = summary.line_items.iter().map(|i| i.message_cost).sum();
    push_row(
        &mut out,
        [
            "TOTAL".to_string(),
            String::new(),
            format!("{:.2}", summary.total_ingress_gb),
            format!("{:.2}", summary.total_egress_gb),
            summary.total_messages.to_string(),
            format!("{:.2}", ingress_cost),
            format!("{:.2}", egress_cost),
            format!("{:.2}", message_cost),
            format!("{:.2}", summary.total_cost),
        ],
    );
    out
}

fn push_row(out: &mut String, cells: impl IntoIterator<Item = String>) {
    let row = cells
        .into_iter()
        .map(|cell| format!("\"{}\"", cell.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&row);
    out.push('\n');
}
