use crate::core::checkouts::CheckoutRow;
use crate::core::fines::{FineRow, FineStatement};
use crate::core::flash::Flash;
use crate::core::requests::RequestRow;
use crate::domain::fine::Payment;
use crate::domain::money::format_currency;
use crate::domain::patron::PatronSummary;
use crate::payment::PaymentRequest;
use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

/// A record that can be printed as one row of a table or CSV file.
pub trait Tabular {
    fn headers() -> Vec<&'static str>;
    fn cells(&self) -> Vec<String>;
}

fn day(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

impl Tabular for CheckoutRow {
    fn headers() -> Vec<&'static str> {
        vec!["key", "title", "author", "call_number", "due", "status", "renewable", "note", "borrower"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.key.clone(),
            self.title.clone(),
            text(&self.author),
            text(&self.call_number),
            day(self.recall_due_date.or(self.due_date)),
            self.status.to_string(),
            if self.renewable { "yes" } else { "no" }.to_string(),
            text(&self.non_renewable_reason),
            text(&self.borrower),
        ]
    }
}

impl Tabular for RequestRow {
    fn headers() -> Vec<&'static str> {
        vec!["key", "source", "title", "status", "pickup", "placed", "not_needed_after", "borrower"]
    }

    fn cells(&self) -> Vec<String> {
        let status = match &self.cdl_waitlist_position {
            Some(position) => format!("{} (waitlist {})", self.status, position),
            None => self.status.clone(),
        };
        vec![
            self.key.clone(),
            self.source_label.to_string(),
            self.title.clone(),
            status,
            self.pickup_label.clone().or_else(|| self.pickup_library.clone()).unwrap_or_default(),
            day(self.placed_date),
            day(self.fill_by_date),
            text(&self.borrower),
        ]
    }
}

impl Tabular for FineRow {
    fn headers() -> Vec<&'static str> {
        vec!["key", "status", "owed", "fee", "billed", "title", "borrower"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.key.clone(),
            self.status.clone(),
            format_currency(self.owed),
            format_currency(self.fee),
            day(self.bill_date),
            text(&self.title),
            text(&self.borrower),
        ]
    }
}

impl Tabular for Payment {
    fn headers() -> Vec<&'static str> {
        vec!["key", "description", "amount", "paid", "resolution", "title"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.key.clone(),
            self.description.clone(),
            format_currency(self.amount),
            day(self.payment_date),
            self.resolution.clone(),
            text(&self.title),
        ]
    }
}

pub fn render<T: Tabular + Serialize>(items: &[T], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(items)?),
        OutputFormat::Csv => to_csv(items),
        OutputFormat::Table => Ok(to_table(items)),
    }
}

fn to_csv<T: Tabular>(items: &[T]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(T::headers())?;
    for item in items {
        writer.write_record(item.cells())?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn to_table<T: Tabular>(items: &[T]) -> String {
    if items.is_empty() {
        return "(none)".to_string();
    }
    let headers = T::headers();
    let rows: Vec<Vec<String>> = items.iter().map(Tabular::cells).collect();
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(h.len()))
                .max()
                .unwrap_or(0)
                .min(48)
        })
        .collect();

    let line = |cells: Vec<String>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| {
                let cell: String = cell.chars().take(*width).collect();
                format!("{:<width$}", cell, width = *width)
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = vec![line(headers.iter().map(|h| h.to_string()).collect())];
    out.push(widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("  "));
    out.extend(rows.into_iter().map(line));
    out.join("\n")
}

pub fn render_summary(summary: &PatronSummary, format: OutputFormat) -> Result<String> {
    let pairs = [
        ("name", summary.name.clone()),
        ("status", summary.status_label.to_string()),
        ("role", format!("{:?}", summary.role).to_lowercase()),
        ("checkouts", summary.checkouts.to_string()),
        ("overdue", summary.overdue.to_string()),
        ("recalled", summary.recalled.to_string()),
        ("requests", summary.requests.to_string()),
        ("ready_for_pickup", summary.ready_for_pickup.to_string()),
        ("total_owed", format_currency(summary.total_owed)),
        ("group_checkouts", summary.group_checkouts.to_string()),
        ("group_requests", summary.group_requests.to_string()),
        ("group_owed", format_currency(summary.group_owed)),
    ];
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(summary)?),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer.write_record(pairs.iter().map(|(k, _)| *k))?;
            writer.write_record(pairs.iter().map(|(_, v)| v.as_str()))?;
            let bytes = writer
                .into_inner()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        OutputFormat::Table => Ok(pairs
            .iter()
            .map(|(k, v)| format!("{:<18}{}", k, v))
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

pub fn render_statement(statement: &FineStatement, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(statement)?),
        OutputFormat::Csv => render(&statement.fines, format),
        OutputFormat::Table => Ok(format!(
            "{}\n\nTotal owed: {}{}\n\nPayment history\n{}",
            to_table(&statement.fines),
            statement.total_owed_label,
            if statement.can_pay { "" } else { " (payment not available)" },
            to_table(&statement.payments)
        )),
    }
}

pub fn render_flash(flash: &Flash, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(flash)?),
        _ => Ok(flash.to_string()),
    }
}

pub fn render_payment_form(request: &PaymentRequest, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(request)?),
        _ => {
            let mut out = vec![format!("POST {}", request.form_url())];
            out.extend(request.fields.iter().map(|f| format!("{}={}", f.name, f.value)));
            Ok(out.join("\n"))
        }
    }
}
