use serde_json::{Map, Value};
use std::io;

type StdoutWriter<'a> = csv::Writer<io::StdoutLock<'a>>;

/// Write output as CSV to stdout. A full model is written long-form, one row
/// per schedule line with periods as columns; a single schedule is written
/// one row per period.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(stdout.lock());

    let body = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    match body {
        Value::Array(rows) => write_rows(&mut wtr, rows),
        Value::Object(map) if map.values().any(is_schedule) => write_model(&mut wtr, map),
        Value::Object(map) => write_fields(&mut wtr, map),
        other => {
            let _ = wtr.write_record([&format_csv_value(other)]);
        }
    }

    let _ = wtr.flush();
}

fn is_schedule(value: &Value) -> bool {
    value
        .as_array()
        .and_then(|rows| rows.first())
        .and_then(Value::as_object)
        .is_some_and(|first| first.contains_key("period"))
}

fn write_model(wtr: &mut StdoutWriter<'_>, model: &Map<String, Value>) {
    let labels: Vec<String> = model
        .values()
        .find_map(|v| v.as_array().filter(|_| is_schedule(v)))
        .map(|rows| {
            rows.iter()
                .map(|r| r.get("label").map(format_csv_value).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default();

    let mut header = vec!["schedule".to_string(), "line".to_string()];
    header.extend(labels);
    let _ = wtr.write_record(&header);

    for (name, section) in model {
        match section {
            Value::Array(rows) if is_schedule(section) => {
                let Some(Value::Object(first)) = rows.first() else {
                    continue;
                };
                for key in first.keys().filter(|k| *k != "period" && *k != "label") {
                    let mut record = vec![name.clone(), key.clone()];
                    record.extend(
                        rows.iter()
                            .map(|r| r.get(key).map(format_csv_value).unwrap_or_default()),
                    );
                    let _ = wtr.write_record(&record);
                }
            }
            Value::Object(fields) => {
                for (key, val) in fields {
                    let _ = wtr.write_record([name.as_str(), key.as_str(), &format_csv_value(val)]);
                }
            }
            other => {
                let _ = wtr.write_record([name.as_str(), "", &format_csv_value(other)]);
            }
        }
    }
}

fn write_fields(wtr: &mut StdoutWriter<'_>, map: &Map<String, Value>) {
    let _ = wtr.write_record(["field", "value"]);
    for (key, val) in map {
        let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
    }
}

fn write_rows(wtr: &mut StdoutWriter<'_>, arr: &[Value]) {
    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
        let _ = wtr.write_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(*h).map(format_csv_value).unwrap_or_default())
                    .collect();
                let _ = wtr.write_record(&row);
            }
        }
    } else {
        for item in arr {
            let _ = wtr.write_record([&format_csv_value(item)]);
        }
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
