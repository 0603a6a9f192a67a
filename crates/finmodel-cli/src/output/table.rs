use colored::Colorize;
use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Format output as tables using the tabled crate. Each per-period schedule
/// is printed with line items as rows and periods as columns.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result(result);
                print_envelope_notes(map);
            } else {
                print_flat_object(map);
            }
        }
        Value::Array(arr) => print_schedule(arr),
        _ => println!("{}", value),
    }
}

fn print_result(result: &Value) {
    match result {
        Value::Array(rows) => print_schedule(rows),
        Value::Object(map) => {
            let mut scalars = Map::new();
            for (key, val) in map {
                match val {
                    Value::Array(rows) if is_schedule(rows) => {
                        println!("\n{}", title(key).bold());
                        print_schedule(rows);
                    }
                    Value::Object(inner) => {
                        println!("\n{}", title(key).bold());
                        print_flat_object(inner);
                    }
                    _ => {
                        scalars.insert(key.clone(), val.clone());
                    }
                }
            }
            if !scalars.is_empty() {
                print_flat_object(&scalars);
            }
        }
        other => println!("{}", format_value(other)),
    }
}

fn print_envelope_notes(envelope: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\n{}", "Warnings:".yellow().bold());
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

/// A schedule is a non-empty array of per-period objects.
fn is_schedule(rows: &[Value]) -> bool {
    rows.first()
        .and_then(Value::as_object)
        .is_some_and(|first| first.contains_key("period"))
}

fn print_schedule(rows: &[Value]) {
    if rows.is_empty() {
        println!("(empty)");
        return;
    }
    let Some(Value::Object(first)) = rows.first() else {
        for item in rows {
            println!("{}", format_value(item));
        }
        return;
    };

    let mut builder = Builder::default();
    let mut header = vec!["Line".to_string()];
    header.extend(rows.iter().map(|r| {
        r.get("label")
            .map(format_value)
            .unwrap_or_default()
    }));
    builder.push_record(header);

    for key in first.keys().filter(|k| *k != "period" && *k != "label") {
        let mut record = vec![key.clone()];
        record.extend(
            rows.iter()
                .map(|r| r.get(key).map(format_value).unwrap_or_default()),
        );
        builder.push_record(record);
    }

    println!("{}", Table::from(builder));
}

fn print_flat_object(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.as_str(), &format_value(val)]);
    }
    println!("{}", Table::from(builder));
}

fn title(key: &str) -> String {
    key.split('_')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decimals arrive as strings; shorten long fractions for display.
fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => round_decimal_string(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

fn round_decimal_string(s: &str) -> String {
    match s.split_once('.') {
        Some((int, frac))
            if frac.len() > 4 && int.trim_start_matches('-').chars().all(|c| c.is_ascii_digit()) =>
        {
            match s.parse::<f64>() {
                Ok(v) => format!("{v:.4}"),
                Err(_) => s.to_string(),
            }
        }
        _ => s.to_string(),
    }
}
