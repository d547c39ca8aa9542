use std::{collections::BTreeMap, io::Write};

use anyhow::{Context, Result};

use crate::datetime::{format_seconds, format_timestamp};
use crate::fix_command::FixedEntry;
use crate::mapping::{CopiedEntry, UnmappedEntry};
use crate::time_entry::{Client, TimeEntry};

/// Consoleに一覧や確認用の表を表示するためのtrait。
pub trait ConsolePresenter {
    /// メッセージを1行表示する。
    fn show_message(&mut self, message: &str) -> Result<()>;

    /// クライアントの一覧を表示する。
    fn show_clients(&mut self, clients: &[Client]) -> Result<()>;

    /// 番号付きでタイムエントリーを表示する。番号は0から始まる。
    fn show_time_entries(&mut self, time_entries: &[TimeEntry]) -> Result<()>;

    /// `fix`で変更される開始、終了時間を表示する。
    fn show_fixed_entries(&mut self, fixed_entries: &[FixedEntry]) -> Result<()>;

    /// コピー元とコピー先のプロジェクトの対応を表示する。
    fn show_project_mappings(
        &mut self,
        source_workspace: i64,
        dest_workspace: i64,
        copied_entries: &[CopiedEntry],
    ) -> Result<()>;

    /// マッピングがなくコピーしないエントリーを表示する。
    fn show_unmapped_entries(&mut self, unmapped: &[UnmappedEntry]) -> Result<()>;

    /// コピーするタイムエントリーを表示する。
    fn show_copied_entries(&mut self, copied_entries: &[CopiedEntry]) -> Result<()>;

    /// プロジェクトごとの合計時間を表示する。
    fn show_project_totals(&mut self, totals: &[(String, i64)]) -> Result<()>;

    /// `split`で作成されるタイムエントリーを表示する。
    fn show_split_parts(&mut self, parts: &[TimeEntry]) -> Result<()>;

    /// 送信結果を表示する。
    fn show_submission(&mut self, label: &str, result: &Result<TimeEntry>) -> Result<()>;
}

/// 区切り線付きの表形式で表示する。
pub struct ConsoleTable<'a, W: Write> {
    writer: &'a mut W,
}

impl<'a, W: Write> ConsoleTable<'a, W> {
    /// 新しい`ConsoleTable`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }

    fn line(&mut self, line: String) -> Result<()> {
        writeln!(self.writer, "{}", line).with_context(|| format!("Failed to write: {}", line))
    }
}

fn format_id(id: Option<i64>) -> String {
    id.map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_stop(entry: &TimeEntry) -> String {
    entry
        .stop
        .as_ref()
        .map(format_timestamp)
        .unwrap_or_else(|| "now".to_string())
}

impl<'a, W: Write> ConsolePresenter for ConsoleTable<'a, W> {
    fn show_message(&mut self, message: &str) -> Result<()> {
        self.line(message.to_string())
    }

    fn show_clients(&mut self, clients: &[Client]) -> Result<()> {
        self.line(format!(
            "| {:<9} | {:<45} | {:<9} |",
            "Workspace", "Client name", "Client id"
        ))?;
        for client in clients {
            self.line(format!(
                "| {:<9} | {:<45} | {:<9} |",
                client.workspace_id, client.name, client.id
            ))?;
        }

        Ok(())
    }

    fn show_time_entries(&mut self, time_entries: &[TimeEntry]) -> Result<()> {
        self.line(format!(
            "| {:<3} | {:<11} | {:<23} | {:<9} | {}",
            "#", "id", "Start", "Duration", "Description"
        ))?;
        for (index, entry) in time_entries.iter().enumerate() {
            self.line(format!(
                "| {:<3} | {:<11} | {:<23} | {:<9} | {}",
                index,
                format_id(entry.id),
                format_timestamp(&entry.start),
                format_seconds(entry.duration),
                entry.description
            ))?;
        }

        Ok(())
    }

    fn show_fixed_entries(&mut self, fixed_entries: &[FixedEntry]) -> Result<()> {
        self.line(format!(
            "| {:<11} | {:<23} | {:<23} | {:<23} | {:<23} | {:<9} | {:<15} | {}",
            "id",
            "Start (before)",
            "Start (after)",
            "Stop (before)",
            "Stop (after)",
            "Duration",
            "Duration (calc)",
            "Description"
        ))?;
        for fixed in fixed_entries {
            self.line(format!(
                "| {:<11} | {:<23} | {:<23} | {:<23} | {:<23} | {:<9} | {:<15} | {}",
                format_id(fixed.original.id),
                format_timestamp(&fixed.original.start),
                format_timestamp(&fixed.fixed.start),
                format_stop(&fixed.original),
                format_stop(&fixed.fixed),
                format_seconds(fixed.original.duration),
                format_seconds(fixed.calculated_duration()),
                fixed.original.description
            ))?;
        }

        Ok(())
    }

    fn show_project_mappings(
        &mut self,
        source_workspace: i64,
        dest_workspace: i64,
        copied_entries: &[CopiedEntry],
    ) -> Result<()> {
        // 同じ対応は1回だけ、コピー先の順に表示する
        let pairs: BTreeMap<(i64, i64), (&str, &str)> = copied_entries
            .iter()
            .filter_map(|copied| {
                copied.entry.project_id.map(|dest| {
                    (
                        (dest, copied.source_project_id),
                        (
                            copied.source_project_name.as_str(),
                            copied.dest_project_name.as_str(),
                        ),
                    )
                })
            })
            .collect();

        self.line(format!(
            "| {:<50} --> {:<50} |",
            "Source project", "Destination project"
        ))?;
        self.line(format!(
            "| {:<50} --> {:<50} |",
            format!("({})", source_workspace),
            format!("({})", dest_workspace)
        ))?;
        for (source_name, dest_name) in pairs.values() {
            self.line(format!("| {:<50} --> {:<50} |", source_name, dest_name))?;
        }

        Ok(())
    }

    fn show_unmapped_entries(&mut self, unmapped: &[UnmappedEntry]) -> Result<()> {
        for entry in unmapped {
            self.line(format!(
                "No mapped destination for time entry {} with project {} (id: {})",
                format_id(entry.source_id),
                entry.project_name,
                format_id(entry.project_id)
            ))?;
        }

        Ok(())
    }

    fn show_copied_entries(&mut self, copied_entries: &[CopiedEntry]) -> Result<()> {
        self.line(format!(
            "| {:<11} | {:<23} | {:<9} | {:<25} | {:<25} | {}",
            "Source id", "Start", "Duration", "Source project", "Destination project", "Description"
        ))?;
        for copied in copied_entries {
            self.line(format!(
                "| {:<11} | {:<23} | {:<9} | {:<25} | {:<25} | {}",
                format_id(copied.source_id),
                format_timestamp(&copied.entry.start),
                format_seconds(copied.entry.duration),
                copied.source_project_name,
                copied.dest_project_name,
                copied.entry.description
            ))?;
        }

        Ok(())
    }

    fn show_project_totals(&mut self, totals: &[(String, i64)]) -> Result<()> {
        self.line(format!("| {:<50} | {:>9} |", "Project", "Hours"))?;
        for (project, seconds) in totals {
            self.line(format!(
                "| {:<50} | {:>9.2} |",
                project,
                *seconds as f64 / 3600.0
            ))?;
        }

        Ok(())
    }

    fn show_split_parts(&mut self, parts: &[TimeEntry]) -> Result<()> {
        self.line(format!(
            "| {:<3} | {:<11} | {:<23} | {:<23} | {:<9} | {}",
            "#", "id", "Start", "Stop", "Duration", "Description"
        ))?;
        for (index, part) in parts.iter().enumerate() {
            self.line(format!(
                "| {:<3} | {:<11} | {:<23} | {:<23} | {:<9} | {}",
                index,
                format_id(part.id),
                format_timestamp(&part.start),
                format_stop(part),
                format_seconds(part.duration),
                part.description
            ))?;
        }

        Ok(())
    }

    fn show_submission(&mut self, label: &str, result: &Result<TimeEntry>) -> Result<()> {
        let line = match result {
            Ok(entry) => format!(
                "{}: ok (id: {}, start: {}, duration: {}) {}",
                label,
                format_id(entry.id),
                format_timestamp(&entry.start),
                format_seconds(entry.duration),
                entry.description
            ),
            Err(err) => format!("{}: failed: {:#}", label, err),
        };

        self.line(line)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    use super::{ConsolePresenter, ConsoleTable};
    use crate::datetime::{format_seconds, format_timestamp};
    use crate::mapping::CopiedEntry;
    use crate::time_entry::{Client, TimeEntry};

    /// テスト用にダミーのTimeEntryを作成する。
    fn dummy_entry(id: i64) -> TimeEntry {
        TimeEntry {
            id: Some(id),
            workspace_id: 1,
            project_id: Some(10),
            start: Utc.with_ymd_and_hms(2021, 1, 1, 9, 0, 0).unwrap(),
            stop: Some(Utc.with_ymd_and_hms(2021, 1, 1, 10, 30, 0).unwrap()),
            duration: 5400,
            description: format!("entry{}", id),
            tags: vec![],
        }
    }

    fn output_of<F>(show: F) -> String
    where
        F: FnOnce(&mut ConsoleTable<Vec<u8>>) -> anyhow::Result<()>,
    {
        let mut writer = Vec::new();
        let mut presenter = ConsoleTable::new(&mut writer);
        show(&mut presenter).unwrap();
        String::from_utf8(writer).unwrap()
    }

    #[test]
    fn test_show_clients() {
        let clients = vec![Client {
            id: 7,
            workspace_id: 1,
            name: "ACME".to_string(),
        }];

        let output = output_of(|presenter| presenter.show_clients(&clients));

        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("| Workspace | Client name"));
        assert_eq!(
            lines[1],
            format!("| {:<9} | {:<45} | {:<9} |", 1, "ACME", 7)
        );
    }

    #[rstest]
    #[case::no_entry(vec![], 1)]
    #[case::single(vec![dummy_entry(1)], 2)]
    #[case::double(vec![dummy_entry(1), dummy_entry(2)], 3)]
    fn test_show_time_entries(#[case] entries: Vec<TimeEntry>, #[case] expected_lines: usize) {
        let output = output_of(|presenter| presenter.show_time_entries(&entries));

        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), expected_lines);
        for (index, entry) in entries.iter().enumerate() {
            assert_eq!(
                lines[index + 1],
                format!(
                    "| {:<3} | {:<11} | {:<23} | {:<9} | {}",
                    index,
                    entry.id.unwrap(),
                    format_timestamp(&entry.start),
                    "1:30:00",
                    entry.description
                )
            );
        }
    }

    /// 同じプロジェクトの対応は1回だけ表示する。
    #[test]
    fn test_show_project_mappings_deduplicates() {
        let copied = |source_id: i64| CopiedEntry {
            source_id: Some(source_id),
            source_project_id: 10,
            source_project_name: "Source".to_string(),
            dest_project_name: "X".to_string(),
            entry: TimeEntry {
                id: None,
                workspace_id: 2,
                project_id: Some(20),
                ..dummy_entry(source_id)
            },
        };
        let entries = vec![copied(1), copied(2)];

        let output = output_of(|presenter| presenter.show_project_mappings(1, 2, &entries));

        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], format!("| {:<50} --> {:<50} |", "Source", "X"));
    }

    #[test]
    fn test_show_project_totals() {
        let totals = vec![("X".to_string(), 5400)];

        let output = output_of(|presenter| presenter.show_project_totals(&totals));

        assert!(output.lines().nth(1).unwrap().ends_with("|      1.50 |"));
    }

    #[test]
    fn test_show_submission() {
        let ok: anyhow::Result<TimeEntry> = Ok(dummy_entry(100));
        let failed: anyhow::Result<TimeEntry> = Err(anyhow!("400 Bad Request: nope"));

        let output = output_of(|presenter| {
            presenter.show_submission("entry 5", &ok)?;
            presenter.show_submission("entry 6", &failed)
        });

        let lines: Vec<_> = output.lines().collect();
        assert_eq!(
            lines[0],
            format!(
                "entry 5: ok (id: 100, start: {}, duration: {}) entry100",
                format_timestamp(&dummy_entry(100).start),
                format_seconds(5400)
            )
        );
        assert_eq!(lines[1], "entry 6: failed: 400 Bad Request: nope");
    }
}
