use serde_json::{Map, Value};
use std::io;

type StdoutWriter<'a> = csv::Writer<io::StdoutLock<'a>>;

/// Write a command result as CSV to stdout.
///
/// Listings become one row per change; outlier output becomes one row per
/// retained amount; everything else is written as field/value pairs.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let written = match value {
        Value::Object(map) => match (map.get("result"), map.get("changes")) {
            (Some(Value::Object(result)), _) => match result.get("months") {
                Some(Value::Object(months)) => write_months(&mut wtr, months),
                _ => write_fields(&mut wtr, result),
            },
            (_, Some(Value::Array(changes))) => write_rows(&mut wtr, changes),
            _ => match map.get("change") {
                Some(Value::Object(change)) => write_fields(&mut wtr, change),
                _ => write_fields(&mut wtr, map),
            },
        },
        Value::Array(arr) => write_rows(&mut wtr, arr),
        _ => wtr.write_record([&format_csv_value(value)]),
    };

    if let Err(e) = written.and_then(|_| wtr.flush().map_err(csv::Error::from)) {
        eprintln!("CSV write error: {}", e);
    }
}

fn write_fields(wtr: &mut StdoutWriter<'_>, map: &Map<String, Value>) -> csv::Result<()> {
    wtr.write_record(["field", "value"])?;
    for (key, val) in map {
        wtr.write_record([key.as_str(), &format_csv_value(val)])?;
    }
    Ok(())
}

fn write_months(wtr: &mut StdoutWriter<'_>, months: &Map<String, Value>) -> csv::Result<()> {
    wtr.write_record(["month", "amount"])?;
    for (month, kept) in months {
        for amount in kept.as_array().into_iter().flatten() {
            wtr.write_record([month.as_str(), &format_csv_value(amount)])?;
        }
    }
    Ok(())
}

fn write_rows(wtr: &mut StdoutWriter<'_>, arr: &[Value]) -> csv::Result<()> {
    let Some(Value::Object(first)) = arr.first() else {
        for item in arr {
            wtr.write_record([&format_csv_value(item)])?;
        }
        return Ok(());
    };

    let headers: Vec<&str> = first.keys().map(String::as_str).collect();
    wtr.write_record(&headers)?;
    for map in arr.iter().filter_map(Value::as_object) {
        let row: Vec<String> = headers
            .iter()
            .map(|h| map.get(*h).map(format_csv_value).unwrap_or_default())
            .collect();
        wtr.write_record(&row)?;
    }
    Ok(())
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
