//! Text rendering of lists, dashboard metrics and the training panel.
//!
//! Numeric fields are coerced here and only here: a missing or malformed
//! value reads as zero. Stored records are never rewritten.
use serde_json::Value;
use std::fmt::Write as _;

use crate::model::{Record, ResourceKind};
use crate::paginate::{ListSnapshot, ViewStatus};
use crate::training::{TrainingPhase, TrainingSnapshot};

/// Ports shown on the dashboard.
pub const DASHBOARD_PORTS: usize = 4;

/// Numeric value of `field`, zero when missing or not a number. Strings are
/// read up to the first character that cannot continue a number, so `"12%"`
/// is 12.
pub fn numeric(record: &Record, field: &str) -> f64 {
    let value = match record.get(field) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => leading_number(s).unwrap_or(0.0),
        _ => 0.0,
    };
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Longest prefix of `raw` (after leading whitespace) that reads as a
/// decimal number with optional sign and exponent.
fn leading_number(raw: &str) -> Option<f64> {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let int_end = digits_from(end);
    let mut seen_digit = int_end > end;
    end = int_end;
    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        seen_digit |= frac_end > end + 1;
        end = frac_end;
    }
    if !seen_digit {
        return None;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }
    s[..end].parse::<f64>().ok()
}

pub fn text(record: &Record, field: &str) -> String {
    match record.get(field) {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy)]
enum Cell {
    Text(&'static str),
    Number(&'static str),
}

struct Column {
    header: &'static str,
    cell: Cell,
}

const fn t(header: &'static str, field: &'static str) -> Column {
    Column {
        header,
        cell: Cell::Text(field),
    }
}

const fn n(header: &'static str, field: &'static str) -> Column {
    Column {
        header,
        cell: Cell::Number(field),
    }
}

const PLANT_COLUMNS: &[Column] = &[
    t("Plant", "plant_name"),
    t("Date", "date"),
    n("Capacity (MTPA)", "max_operating_capacity_mtpa"),
    n("Stock Util (%)", "stock_utilization_percent"),
    n("Coal EOD (t)", "coal_eod_stock_tonnes"),
    n("Limestone EOD (t)", "limestone_eod_stock_tonnes"),
];

const PORT_COLUMNS: &[Column] = &[
    t("Port", "port_name"),
    t("Date", "date"),
    n("Coal EOD (t)", "coal_eod_storage_tonnes"),
    n("Limestone EOD (t)", "limestone_eod_storage_tonnes"),
    n("Steel EOD (t)", "steel_eod_storage_tonnes"),
];

const TRAIN_COLUMNS: &[Column] = &[
    t("Trip", "trip_id"),
    t("Rake", "rake_id"),
    t("Source", "source"),
    t("Destination", "destination"),
    t("Material", "material"),
    n("Qty (t)", "quantity_tonnes"),
    n("Delay (h)", "delay_h"),
    n("Trip Cost (INR)", "total_trip_cost_inr"),
];

const VESSEL_COLUMNS: &[Column] = &[
    t("Vessel", "vessel_id"),
    t("Load Port", "load_port"),
    t("Discharge Port", "discharge_port"),
    t("Material", "material"),
    n("Freight (INR/t)", "ocean_freight_inr_tonne"),
    n("Demurrage (INR/h)", "demurrage_rate_inr_hr"),
    n("Contract Qty (t)", "contract_quantity_tonnes"),
];

const LOGISTICS_COLUMNS: &[Column] = &[t("Type", "type")];

fn columns(kind: ResourceKind) -> &'static [Column] {
    match kind {
        ResourceKind::Plants => PLANT_COLUMNS,
        ResourceKind::Ports => PORT_COLUMNS,
        ResourceKind::Trains => TRAIN_COLUMNS,
        ResourceKind::Vessels => VESSEL_COLUMNS,
        ResourceKind::Logistics => LOGISTICS_COLUMNS,
    }
}

pub fn render_table(kind: ResourceKind, records: &[Record]) -> String {
    let cols = columns(kind);
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            cols.iter()
                .map(|c| match c.cell {
                    Cell::Text(f) => text(r, f),
                    Cell::Number(f) => format!("{:.2}", numeric(r, f)),
                })
                .collect()
        })
        .collect();

    let widths: Vec<usize> = cols
        .iter()
        .enumerate()
        .map(|(i, c)| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(c.header.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    let header: Vec<String> = cols
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:<w$}", c.header, w = *w))
        .collect();
    let _ = writeln!(out, "{}", header.join(" | ").trim_end());
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", rule.join("-+-"));
    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .zip(cols.iter().zip(&widths))
            .map(|(v, (c, w))| match c.cell {
                Cell::Number(_) => format!("{:>w$}", v, w = *w),
                Cell::Text(_) => format!("{:<w$}", v, w = *w),
            })
            .collect();
        let _ = writeln!(out, "{}", cells.join(" | ").trim_end());
    }
    out
}

/// A list view in one of its three states.
pub fn render_list(snapshot: &ListSnapshot) -> String {
    let mut out = format!("{}\n", snapshot.resource.title());
    match &snapshot.status {
        ViewStatus::Loading => {
            out.push_str("Loading data...\n");
            return out;
        }
        ViewStatus::Error(msg) => {
            let _ = writeln!(out, "Error: {}", msg);
            if snapshot.records.is_empty() {
                return out;
            }
        }
        ViewStatus::Populated => {}
    }
    if snapshot.records.is_empty() {
        out.push_str("No records.\n");
    } else {
        out.push_str(&render_table(snapshot.resource, &snapshot.records));
    }
    let _ = write!(
        out,
        "{} records, {} page(s) loaded",
        snapshot.records.len(),
        snapshot.cursor.page
    );
    if snapshot.loading {
        out.push_str(", loading...");
    } else if !snapshot.exhausted {
        out.push_str(", more available");
    }
    out.push('\n');
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct StockPoint {
    pub name: String,
    pub coal: f64,
    pub limestone: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSummary {
    pub total_plants: usize,
    pub total_ports: usize,
    pub total_logistics: usize,
    pub total_capacity_mtpa: f64,
    pub avg_utilization_percent: f64,
    pub ports: Vec<String>,
    pub stock: Vec<StockPoint>,
    pub utilization: Vec<(String, f64)>,
}

impl DashboardSummary {
    /// `plants` and `logistics` are expected already deduplicated.
    pub fn compute(plants: &[Record], ports: &[Record], logistics: &[Record]) -> Self {
        let shown_ports = &ports[..ports.len().min(DASHBOARD_PORTS)];
        let total_capacity_mtpa = plants
            .iter()
            .map(|p| numeric(p, "max_operating_capacity_mtpa"))
            .sum();
        let utilization_sum: f64 = plants
            .iter()
            .map(|p| numeric(p, "stock_utilization_percent"))
            .sum();
        Self {
            total_plants: plants.len(),
            total_ports: shown_ports.len(),
            total_logistics: logistics.len(),
            total_capacity_mtpa,
            avg_utilization_percent: utilization_sum / plants.len().max(1) as f64,
            ports: shown_ports.iter().map(|p| text(p, "port_name")).collect(),
            stock: plants
                .iter()
                .map(|p| StockPoint {
                    name: text(p, "plant_name"),
                    coal: numeric(p, "coal_eod_stock_tonnes"),
                    limestone: numeric(p, "limestone_eod_stock_tonnes"),
                })
                .collect(),
            utilization: plants
                .iter()
                .map(|p| (text(p, "plant_name"), numeric(p, "stock_utilization_percent")))
                .collect(),
        }
    }
}

pub fn render_dashboard(summary: &DashboardSummary, error: Option<&str>) -> String {
    let mut out = String::from("Logistics Dashboard\n");
    if let Some(err) = error {
        let _ = writeln!(out, "Data Warning: {}", err);
    }
    let _ = writeln!(out, "Total Plants:      {} (unique facilities)", summary.total_plants);
    let _ = writeln!(out, "Total Ports:       {}", summary.total_ports);
    let _ = writeln!(out, "Logistics Types:   {}", summary.total_logistics);
    let _ = writeln!(out, "Total Capacity:    {:.1} MTPA", summary.total_capacity_mtpa);
    let _ = writeln!(out, "Avg Utilization:   {:.1} %", summary.avg_utilization_percent);
    if !summary.ports.is_empty() {
        let _ = writeln!(out, "Ports:             {}", summary.ports.join(", "));
    }
    if !summary.stock.is_empty() {
        out.push_str("\nPlant stock (t)           coal      limestone   util %\n");
        for (point, (_, util)) in summary.stock.iter().zip(&summary.utilization) {
            let _ = writeln!(
                out,
                "{:<20} {:>12.1} {:>14.1} {:>8.1}",
                point.name, point.coal, point.limestone, util
            );
        }
    }
    out
}

pub fn render_training(snapshot: &TrainingSnapshot) -> String {
    let mut out = String::from("AI Model Training\n");
    if let Some(last) = &snapshot.last_success {
        let _ = writeln!(out, "Last Successful Run: {}", last);
    }
    let action = if snapshot.polling {
        "Training in Progress..."
    } else {
        match snapshot.phase {
            TrainingPhase::Success | TrainingPhase::Error => "Start New Training",
            _ => "Ready",
        }
    };
    let _ = writeln!(out, "Current Status: {}", snapshot.phase);
    let _ = writeln!(out, "{}", snapshot.message);
    let _ = writeln!(out, "[{}]", action);
    out
}
