use console::{Alignment, pad_str};
use devtunnel::runtime::state::TunnelRecord;
use devtunnel::ui::style as ui;
use serde::Serialize;

/// One `list` row; `alive` is only known with `--verify`.
pub type ListRow = (TunnelRecord, Option<bool>);

#[derive(Serialize)]
struct JsonRow<'a> {
    #[serde(flatten)]
    record: &'a TunnelRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    alive: Option<bool>,
}

pub fn render_json(rows: &[ListRow]) -> serde_json::Result<String> {
    let rows: Vec<JsonRow<'_>> = rows
        .iter()
        .map(|(record, alive)| JsonRow {
            record,
            alive: *alive,
        })
        .collect();
    serde_json::to_string_pretty(&rows)
}

pub fn render_table(rows: &[ListRow]) -> String {
    if rows.is_empty() {
        return ui::dim("no active tunnels");
    }
    let verified = rows.iter().any(|(_, alive)| alive.is_some());

    let mut headers = vec!["NAME", "METHOD", "LOCAL", "PUBLIC URL"];
    if verified {
        headers.push("STATUS");
    }
    let cells: Vec<Vec<(String, String)>> = rows
        .iter()
        .map(|(record, alive)| {
            let method = record.method.to_string();
            let local = record.local_endpoint();
            let mut row = vec![
                (record.name.clone(), record.name.clone()),
                (ui::method(&method), method),
                (local.clone(), local),
                (ui::url(&record.public_url), record.public_url.clone()),
            ];
            if let Some(alive) = alive {
                let plain = if *alive { "alive" } else { "dead" };
                row.push((ui::liveness(*alive), plain.to_string()));
            }
            row
        })
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            cells
                .iter()
                .map(|row| row[i].1.len())
                .chain(std::iter::once(header.len()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(join_padded(
        headers.iter().map(|h| ui::header(h)),
        &widths,
    ));
    for row in cells {
        lines.push(join_padded(row.into_iter().map(|(styled, _)| styled), &widths));
    }
    lines.join("\n")
}

fn join_padded(cells: impl Iterator<Item = String>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, width)| pad_str(&cell, *width, Alignment::Left, None).into_owned())
        .collect();
    padded.join("  ").trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use devtunnel::runtime::state::BackendHandle;
    use devtunnel::runtime::tunnel::TunnelMethod;

    fn record(name: &str, port: u16) -> TunnelRecord {
        TunnelRecord {
            name: name.into(),
            method: TunnelMethod::QuickEphemeral,
            local_port: port,
            public_url: format!("https://{name}-words.trycloudflare.com"),
            handle: BackendHandle::Process { pid: 4242 },
            config_path: None,
            log_path: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[test]
    fn empty_table_says_so() {
        assert!(render_table(&[]).contains("no active tunnels"));
    }

    #[test]
    fn table_has_header_and_one_line_per_record() {
        let table = render_table(&[(record("api", 8080), None), (record("web", 3000), None)]);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("PUBLIC URL"));
        assert!(!lines[0].contains("STATUS"));
        assert!(lines[1].contains("api") && lines[1].contains("localhost:8080"));
        assert!(lines[2].contains("https://web-words.trycloudflare.com"));
    }

    #[test]
    fn verified_table_adds_status_column() {
        let table = render_table(&[(record("web", 3000), Some(false))]);
        assert!(table.lines().next().unwrap().contains("STATUS"));
        assert!(table.contains("dead"));
    }

    #[test]
    fn json_includes_alive_only_when_verified() {
        let plain: serde_json::Value =
            serde_json::from_str(&render_json(&[(record("web", 3000), None)]).unwrap()).unwrap();
        assert_eq!(plain[0]["name"], "web");
        assert_eq!(plain[0]["method"], "quick_ephemeral");
        assert!(plain[0].get("alive").is_none());

        let verified: serde_json::Value =
            serde_json::from_str(&render_json(&[(record("web", 3000), Some(true))]).unwrap())
                .unwrap();
        assert_eq!(verified[0]["alive"], true);
        assert_eq!(verified[0]["handle"]["kind"], "process");
    }
}
