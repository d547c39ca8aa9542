use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use log::{info, warn};

use crate::console::ConsolePresenter;
use crate::datetime::{now, start_of_day};
use crate::filter::{count_cap_check, filter_by_workspace, split_running, MAX_ENTRIES};
use crate::time_entry::TimeEntry;
use crate::toggl::TogglRepository;

/// コマンドの実行結果。
#[derive(Debug, PartialEq)]
pub enum RunOutcome {
    /// workspaceの指定がなかったため、クライアント一覧を表示した。
    ClientsListed,
    /// 対象のタイムエントリーがなかった。
    NothingToDo,
    /// 利用者が確認で中止した。
    Cancelled,
    /// 送信した。
    Submitted(SubmitReport),
}

/// 送信結果の集計。
#[derive(Debug, Default, PartialEq)]
pub struct SubmitReport {
    /// APIから返された送信後のエントリー。
    pub succeeded: Vec<TimeEntry>,
    pub failed: usize,
}

/// 送信方法。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submission {
    Create,
    Update,
}

/// 指定日のLocalタイムゾーン00:00:00から現在までのworkspaceのタイムエントリーを取得する。
///
/// 件数が上限を超えた場合はエラーとし、計測中のエントリーは除外する。
pub async fn fetch_workspace_entries<T: TogglRepository + ?Sized>(
    toggl_client: &T,
    start_date: NaiveDate,
    workspace_id: i64,
) -> Result<Vec<TimeEntry>> {
    let start_at = start_of_day(start_date, &Local)?;
    let end_at = now();
    info!("Start at: {}, End at: {}", start_at, end_at);

    let time_entries = toggl_client
        .read_time_entries(&start_at, &end_at)
        .await
        .context("Failed to retrieve time entries")?;
    let time_entries = filter_by_workspace(time_entries, workspace_id);
    count_cap_check(&time_entries, MAX_ENTRIES)?;
    info!(
        "{} time entries retrieved from workspace {}",
        time_entries.len(),
        workspace_id
    );

    Ok(split_running(time_entries))
}

/// タイムエントリーを1件ずつ送信する。
///
/// 失敗しても残りの送信は続け、結果は1件ごとに表示する。
pub async fn submit_all<T, C>(
    toggl_client: &T,
    console: &mut C,
    submissions: Vec<(Submission, String, TimeEntry)>,
) -> Result<SubmitReport>
where
    T: TogglRepository + ?Sized,
    C: ConsolePresenter + ?Sized,
{
    let mut report = SubmitReport::default();
    for (submission, label, entry) in submissions {
        let result = match submission {
            Submission::Create => toggl_client.create_time_entry(&entry).await,
            Submission::Update => toggl_client.update_time_entry(&entry).await,
        };
        console.show_submission(&label, &result)?;
        match result {
            Ok(submitted) => report.succeeded.push(submitted),
            Err(err) => {
                warn!("{} was not submitted: {:#}", label, err);
                report.failed += 1;
            }
        }
    }
    info!(
        "{} submitted, {} failed",
        report.succeeded.len(),
        report.failed
    );

    Ok(report)
}
