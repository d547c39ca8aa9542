use std::collections::BTreeMap;

use anyhow::Result;
use chrono::TimeZone;
use log::warn;

use crate::datetime::local_midnight;
use crate::error::ToolError;
use crate::time_entry::TimeEntry;

/// 1回で扱うタイムエントリーの上限。
///
/// ページングしないため、これを超える場合は期間を狭めて再実行してもらう。
pub const MAX_ENTRIES: usize = 99;

/// 指定したworkspaceのタイムエントリーだけを残す。順序は維持する。
pub fn filter_by_workspace(entries: Vec<TimeEntry>, workspace_id: i64) -> Vec<TimeEntry> {
    entries
        .into_iter()
        .filter(|entry| entry.workspace_id == workspace_id)
        .collect()
}

/// タイムエントリーの件数が上限を超えていないか確認する。
pub fn count_cap_check(entries: &[TimeEntry], max: usize) -> Result<(), ToolError> {
    if entries.len() > max {
        return Err(ToolError::TooManyEntries {
            count: entries.len(),
            max,
        });
    }

    Ok(())
}

/// 計測中のエントリーを取り除き、終了済みのエントリーだけを返す。
///
/// 計測中のエントリーはどのコマンドでも変更しないため、警告だけ出しておく。
pub fn split_running(entries: Vec<TimeEntry>) -> Vec<TimeEntry> {
    let (running, finished): (Vec<_>, Vec<_>) =
        entries.into_iter().partition(TimeEntry::is_running);
    running.iter().for_each(|entry| {
        warn!(
            "Skipping running time entry {:?}: {}",
            entry.id, entry.description
        )
    });

    finished
}

/// 開始時間が指定したタイムゾーンの00:00:00かどうか。
pub fn starts_at_local_midnight<Tz: TimeZone>(entry: &TimeEntry, tz: &Tz) -> Result<bool> {
    Ok(local_midnight(&entry.start, tz)? == entry.start)
}

/// プロジェクトごとの合計時間(秒)を計算する。
///
/// 計測中のエントリーは集計対象外とする。
pub fn total_duration_by_project<'a, I>(entries: I) -> BTreeMap<Option<i64>, i64>
where
    I: IntoIterator<Item = &'a TimeEntry>,
{
    entries
        .into_iter()
        .filter(|entry| !entry.is_running())
        .fold(BTreeMap::new(), |mut accumulate, entry| {
            *accumulate.entry(entry.project_id).or_insert(0) += entry.duration;
            accumulate
        })
}
