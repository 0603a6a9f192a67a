use serde_json::Value;

/// Print just the key answers from the output.
///
/// For a projection these are the reconciliation flags and headline growth
/// figures from the summary; otherwise the first well-known field found.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);
    let summary = result_obj.get("summary").unwrap_or(result_obj);

    let priority_keys = [
        "valid",
        "is_balanced",
        "cash_flow_reconciled",
        "revenue_cagr",
        "ebitda_cagr",
        "eps_cagr",
        "total_cash_plug",
        "ending_debt_to_ebitda",
    ];

    if let Value::Object(map) = summary {
        let lines: Vec<String> = priority_keys
            .iter()
            .filter_map(|key| {
                map.get(*key)
                    .filter(|v| !v.is_null())
                    .map(|v| format!("{}: {}", key, format_minimal(v)))
            })
            .collect();
        if !lines.is_empty() {
            println!("{}", lines.join("\n"));
            return;
        }

        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(summary));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
