//! CSV rendering for the REPORT command.

use skiff_store::HistoryEntry;

/// Render history records as CSV, newest entry last.
///
/// The operation field is quoted; embedded double quotes are replaced with
/// single quotes so the output stays one row per record.
pub fn render_csv(entries: &[HistoryEntry]) -> String {
    let mut out = String::from("id,owner_id,operation,timestamp\n");
    for entry in entries {
        let owner = entry
            .owner_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        let operation = entry.operation.replace('"', "'");
        out.push_str(&format!(
            "{},{},\"{}\",{}\n",
            entry.id,
            owner,
            operation,
            entry.occurred_at.to_rfc3339()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry(id: i64, owner_id: Option<i64>, operation: &str) -> HistoryEntry {
        HistoryEntry {
            id,
            owner_id,
            operation: operation.to_string(),
            actor: "alice".to_string(),
            occurred_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn renders_header_and_rows() {
        let csv = render_csv(&[
            entry(1, Some(3), "LOGIN_OK"),
            entry(2, None, "LOGIN_FAIL:UserNotFound"),
        ]);

        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "id,owner_id,operation,timestamp");
        assert_eq!(lines[1], "1,3,\"LOGIN_OK\",2024-05-01T12:00:00+00:00");
        assert_eq!(
            lines[2],
            "2,,\"LOGIN_FAIL:UserNotFound\",2024-05-01T12:00:00+00:00"
        );
    }

    #[test]
    fn double_quotes_are_neutralized() {
        let csv = render_csv(&[entry(1, Some(1), "ECHO_OK: \"hi\"")]);
        assert!(csv.contains("\"ECHO_OK: 'hi'\""));
    }

    #[test]
    fn empty_history_is_header_only() {
        assert_eq!(render_csv(&[]), "id,owner_id,operation,timestamp\n");
    }
}
