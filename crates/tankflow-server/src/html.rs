//! Overview page rendering
//!
//! Server-side rendered table of all known transactions, newest first.
//! Kept dependency-free on purpose; the page is a diagnostic view, not a UI.

use tankflow_ingest::record::Record;
use tankflow_ingest::store::Snapshot;

/// Escape text for safe HTML interpolation
fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn table_row(record: &Record) -> String {
    let license_plate = record
        .raw_attributes
        .get("AdditionalEntry")
        .map(String::as_str)
        .unwrap_or("");

    format!(
        "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td><td>{}</td></tr>\n",
        escape(&record.id),
        record.timestamp.format("%d.%m.%Y %H:%M:%S"),
        escape(&record.tank_identifier),
        escape(&record.product_type),
        record.quantity,
        escape(license_plate),
    )
}

/// Render the transaction overview page
pub fn render_overview(snapshot: &Snapshot) -> String {
    let mut rows = String::new();
    for record in snapshot.records_newest_first() {
        rows.push_str(&table_row(record));
    }

    let last_sync = snapshot
        .last_sync_at
        .map(|t| t.format("%d.%m.%Y %H:%M:%S").to_string())
        .unwrap_or_else(|| "noch nie".to_string());

    let warning = match &snapshot.last_sync_error {
        Some(error) => format!(
            "<p class=\"warning\">Letzter Abgleich unvollst&auml;ndig: {}</p>\n",
            escape(error)
        ),
        None => String::new(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="de">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Tankdaten</title>
<style>
body {{ font-family: sans-serif; margin: 2em; }}
table {{ border-collapse: collapse; width: 100%; }}
th, td {{ border: 1px solid #ccc; padding: 6px 10px; text-align: left; }}
th {{ background: #f0f0f0; }}
tr:nth-child(even) {{ background: #fafafa; }}
.meta {{ color: #666; }}
.warning {{ color: #b00; }}
button {{ padding: 6px 14px; }}
</style>
</head>
<body>
<h1>Tankdaten</h1>
<p class="meta">Letzte Aktualisierung: {last_sync} &mdash; {count} Transaktionen</p>
{warning}<button onclick="reload()">Jetzt aktualisieren</button>
<table>
<thead>
<tr><th>Nummer</th><th>Datum + Uhrzeit</th><th>S&auml;ulennummer</th><th>Artikel</th><th>Menge (Liter)</th><th>Kennzeichen</th></tr>
</thead>
<tbody>
{rows}</tbody>
</table>
<script>
function reload() {{
  fetch('/reload').then(function () {{ setTimeout(function () {{ location.reload(); }}, 2000); }});
}}
</script>
</body>
</html>
"#,
        last_sync = last_sync,
        count = snapshot.records.len(),
        rows = rows,
    )
}
