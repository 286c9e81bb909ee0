//! Output formatters for query results.

use std::collections::BTreeSet;

use clap::ValueEnum;
use comfy_table::{Cell, Table};

use dirquery_client::{LdapPage, VirtualListView};
use dirquery_proto::{Control, SearchEntry, SearchRequest, VlvTarget};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format a list of entries.
    fn format_entries(&self, entries: &[SearchEntry]) -> String;

    /// Format one page and the cookie to resume from.
    fn format_page(&self, page: &LdapPage<SearchEntry>) -> String;

    /// Format a virtual list view window.
    fn format_window(&self, window: &VirtualListView<SearchEntry>) -> String;

    /// Format a count.
    fn format_count(&self, count: u64) -> String;

    /// Format an existence check.
    fn format_exists(&self, exists: bool) -> String;

    /// Format the values of one attribute.
    fn format_values(&self, attribute: &str, values: &[String]) -> String;

    /// Format a request that was built but not sent.
    fn format_request(&self, request: &SearchRequest) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_entries(&self, entries: &[SearchEntry]) -> String {
        if entries.is_empty() {
            return "No results".to_string();
        }

        let columns = attribute_columns(entries);
        let mut table = Table::new();
        let mut headers = vec![Cell::new("dn")];
        headers.extend(columns.iter().map(Cell::new));
        table.set_header(headers);

        for entry in entries {
            let mut cells = vec![Cell::new(&entry.dn)];
            for column in &columns {
                cells.push(Cell::new(display_value(entry, column)));
            }
            table.add_row(cells);
        }

        format!("{}\n{} entr{}", table, entries.len(), if entries.len() == 1 { "y" } else { "ies" })
    }

    fn format_page(&self, page: &LdapPage<SearchEntry>) -> String {
        let mut output = self.format_entries(&page.items);
        if page.has_next_page() {
            output.push_str(&format!("\nnext page cookie: {}", hex::encode(&page.next_page)));
        } else {
            output.push_str("\nlast page");
        }
        output
    }

    fn format_window(&self, window: &VirtualListView<SearchEntry>) -> String {
        format!(
            "{}\nposition {} of {}",
            self.format_entries(&window.items),
            window.target_position,
            window.content_count
        )
    }

    fn format_count(&self, count: u64) -> String {
        count.to_string()
    }

    fn format_exists(&self, exists: bool) -> String {
        exists.to_string()
    }

    fn format_values(&self, attribute: &str, values: &[String]) -> String {
        let mut table = Table::new();
        table.set_header(vec![attribute]);
        for value in values {
            table.add_row(vec![value]);
        }
        format!("{}\n{} value(s)", table, values.len())
    }

    fn format_request(&self, request: &SearchRequest) -> String {
        let mut table = Table::new();
        table.set_header(vec!["field", "value"]);
        table.add_row(vec!["base".to_string(), request.base_dn.clone()]);
        table.add_row(vec!["scope".to_string(), request.scope.to_string()]);
        table.add_row(vec!["filter".to_string(), request.filter.clone()]);
        table.add_row(vec!["attributes".to_string(), request.attributes.join(", ")]);
        for control in request.controls() {
            table.add_row(vec![control.kind().to_string(), describe_control(control)]);
        }
        table.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_entries(&self, entries: &[SearchEntry]) -> String {
        let rows: Vec<serde_json::Value> = entries.iter().map(entry_to_json).collect();
        serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_page(&self, page: &LdapPage<SearchEntry>) -> String {
        let value = serde_json::json!({
            "items": page.items.iter().map(entry_to_json).collect::<Vec<_>>(),
            "page_size": page.page_size,
            "next_page": page.has_next_page().then(|| hex::encode(&page.next_page)),
            "filter": page.filter,
        });
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_window(&self, window: &VirtualListView<SearchEntry>) -> String {
        let value = serde_json::json!({
            "items": window.items.iter().map(entry_to_json).collect::<Vec<_>>(),
            "content_count": window.content_count,
            "target_position": window.target_position,
            "context_id": window.context_id.as_ref().map(hex::encode),
        });
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_count(&self, count: u64) -> String {
        serde_json::json!({ "count": count }).to_string()
    }

    fn format_exists(&self, exists: bool) -> String {
        serde_json::json!({ "exists": exists }).to_string()
    }

    fn format_values(&self, attribute: &str, values: &[String]) -> String {
        let value = serde_json::json!({ "attribute": attribute, "values": values });
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_request(&self, request: &SearchRequest) -> String {
        let controls: Vec<serde_json::Value> = request
            .controls()
            .iter()
            .map(|control| {
                serde_json::json!({
                    "kind": control.kind(),
                    "oid": control.oid(),
                    "value": describe_control(control),
                })
            })
            .collect();
        let value = serde_json::json!({
            "base": request.base_dn,
            "scope": request.scope.to_string(),
            "filter": request.filter,
            "attributes": request.attributes,
            "types_only": request.types_only,
            "controls": controls,
        });
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
    }
}

/// CSV formatter.
pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format_entries(&self, entries: &[SearchEntry]) -> String {
        let columns = attribute_columns(entries);
        let mut output = String::from("dn");
        for column in &columns {
            output.push(',');
            output.push_str(&csv_field(column));
        }
        output.push('\n');

        for entry in entries {
            output.push_str(&csv_field(&entry.dn));
            for column in &columns {
                output.push(',');
                output.push_str(&csv_field(&display_value(entry, column)));
            }
            output.push('\n');
        }
        output
    }

    fn format_page(&self, page: &LdapPage<SearchEntry>) -> String {
        let mut output = self.format_entries(&page.items);
        if page.has_next_page() {
            output.push_str(&format!("# next page cookie: {}\n", hex::encode(&page.next_page)));
        }
        output
    }

    fn format_window(&self, window: &VirtualListView<SearchEntry>) -> String {
        self.format_entries(&window.items)
    }

    fn format_count(&self, count: u64) -> String {
        format!("count\n{}", count)
    }

    fn format_exists(&self, exists: bool) -> String {
        format!("exists\n{}", exists)
    }

    fn format_values(&self, attribute: &str, values: &[String]) -> String {
        let mut output = csv_field(attribute);
        output.push('\n');
        for value in values {
            output.push_str(&csv_field(value));
            output.push('\n');
        }
        output
    }

    fn format_request(&self, request: &SearchRequest) -> String {
        let mut output = String::from("field,value\n");
        output.push_str(&format!("base,{}\n", csv_field(&request.base_dn)));
        output.push_str(&format!("scope,{}\n", request.scope));
        output.push_str(&format!("filter,{}\n", csv_field(&request.filter)));
        output.push_str(&format!("attributes,{}\n", csv_field(&request.attributes.join(" "))));
        for control in request.controls() {
            output.push_str(&format!("{},{}\n", control.kind(), csv_field(&describe_control(control))));
        }
        output
    }
}

/// Union of attribute names across entries, text and binary.
fn attribute_columns(entries: &[SearchEntry]) -> Vec<String> {
    let mut columns = BTreeSet::new();
    for entry in entries {
        columns.extend(entry.attributes.keys().cloned());
        columns.extend(entry.binary_attributes.keys().cloned());
    }
    columns.into_iter().collect()
}

/// Values of one attribute joined for display.
fn display_value(entry: &SearchEntry, attribute: &str) -> String {
    if let Some(values) = entry.attribute(attribute) {
        return values.join("; ");
    }
    match entry.binary_attributes.get(attribute) {
        Some(values) => values
            .iter()
            .map(|v| format!("<{} bytes>", v.len()))
            .collect::<Vec<_>>()
            .join("; "),
        None => String::new(),
    }
}

fn entry_to_json(entry: &SearchEntry) -> serde_json::Value {
    let mut obj = serde_json::Map::new();
    obj.insert("dn".to_string(), serde_json::Value::String(entry.dn.clone()));
    for (name, values) in &entry.attributes {
        obj.insert(name.clone(), serde_json::json!(values));
    }
    for (name, values) in &entry.binary_attributes {
        let encoded: Vec<String> = values.iter().map(hex::encode).collect();
        obj.insert(name.clone(), serde_json::json!(encoded));
    }
    serde_json::Value::Object(obj)
}

fn describe_control(control: &Control) -> String {
    match control {
        Control::Paging(page) => format!("size={} cookie={}", page.size, hex::encode(&page.cookie)),
        Control::Sort(sort) => sort
            .keys
            .iter()
            .map(|key| {
                if key.reverse {
                    format!("-{}", key.attribute)
                } else {
                    key.attribute.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(","),
        Control::Vlv(vlv) => match &vlv.target {
            VlvTarget::Offset { offset, .. } => format!(
                "offset={} before={} after={}",
                offset, vlv.before_count, vlv.after_count
            ),
            VlvTarget::GreaterOrEqual(value) => format!(
                "from='{}' before={} after={}",
                value, vlv.before_count, vlv.after_count
            ),
        },
        Control::Raw(raw) => format!("critical={}", raw.critical),
    }
}

/// Quote a CSV field when it contains a delimiter, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
