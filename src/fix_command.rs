use anyhow::Result;
use chrono::{Local, NaiveDate, TimeZone};
use log::info;

use crate::clients_command::ClientsCommand;
use crate::console::ConsolePresenter;
use crate::datetime::{local_midnight, parse_command_date};
use crate::error::ToolError;
use crate::filter::starts_at_local_midnight;
use crate::pipeline::{fetch_workspace_entries, submit_all, RunOutcome, Submission};
use crate::prompt::{confirm, Prompt};
use crate::time_entry::TimeEntry;
use crate::toggl::TogglRepository;

/// `fix`サブコマンドの引数。
#[derive(Debug, Default, clap::Args)]
pub struct FixArgs {
    #[clap(
        short = 'w',
        long = "dest-workspace",
        help = "Workspace ID whose time entries are fixed"
    )]
    pub dest_workspace: Option<i64>,

    #[clap(
        short = 'd',
        long = "start-date",
        help = "Starting date for the query in YYYYMMDD format",
        parse(try_from_str = parse_command_date),
    )]
    pub start_date: Option<NaiveDate>,
}

/// 開始時間を00:00:00に揃えたタイムエントリー。
#[derive(Clone, Debug, PartialEq)]
pub struct FixedEntry {
    pub original: TimeEntry,
    pub fixed: TimeEntry,
}

impl FixedEntry {
    /// 修正後の開始、終了時間から計算した長さ(秒)。
    pub fn calculated_duration(&self) -> i64 {
        self.fixed
            .stop
            .map(|stop| (stop - self.fixed.start).num_seconds())
            .unwrap_or(self.fixed.duration)
    }
}

/// 開始時間が00:00:00でないタイムエントリーを選ぶ。
pub fn select_unaligned<Tz: TimeZone>(entries: Vec<TimeEntry>, tz: &Tz) -> Result<Vec<TimeEntry>> {
    let mut unaligned = Vec::new();
    for entry in entries {
        if !starts_at_local_midnight(&entry, tz)? {
            unaligned.push(entry);
        }
    }

    Ok(unaligned)
}

/// 開始時間を同じ日の00:00:00にし、長さを保ったまま終了時間をずらす。
///
/// 既に00:00:00に揃っているエントリーと計測中のエントリーは対象外とする。
pub fn fix_entries<Tz: TimeZone>(entries: &[TimeEntry], tz: &Tz) -> Result<Vec<FixedEntry>> {
    let mut fixed_entries = Vec::new();
    for entry in entries.iter().filter(|entry| !entry.is_running()) {
        let new_start = local_midnight(&entry.start, tz)?;
        if new_start == entry.start {
            continue;
        }
        fixed_entries.push(FixedEntry {
            original: entry.clone(),
            fixed: entry.with_span(new_start, entry.duration),
        });
    }

    Ok(fixed_entries)
}

/// `fix`サブコマンド。
pub struct FixCommand<'a, T: TogglRepository, P: Prompt, C: ConsolePresenter> {
    toggl_client: &'a T,
    prompt: &'a mut P,
    console: &'a mut C,
}

impl<'a, T: TogglRepository, P: Prompt, C: ConsolePresenter> FixCommand<'a, T, P, C> {
    /// 新しい`FixCommand`を返す。
    ///
    /// # Arguments
    /// * `toggl_client` - Toggl APIと通信するためのリポジトリ
    /// * `prompt` - 送信前の確認に使う
    /// * `console` - 一覧や変更内容の表示先
    pub fn new(toggl_client: &'a T, prompt: &'a mut P, console: &'a mut C) -> Self {
        Self {
            toggl_client,
            prompt,
            console,
        }
    }

    /// `fix`サブコマンドの処理を行う。
    ///
    /// 指定日以降のworkspaceのタイムエントリーのうち、開始時間がLocalタイムゾーンの00:00:00でないものを
    /// 00:00:00開始に修正する。変更内容を2回確認してから更新する。
    pub async fn run(&mut self, args: FixArgs) -> Result<RunOutcome> {
        let workspace_id = match args.dest_workspace {
            Some(workspace_id) => workspace_id,
            None => {
                ClientsCommand::new(self.toggl_client, &mut *self.console)
                    .run()
                    .await?;
                return Ok(RunOutcome::ClientsListed);
            }
        };
        let start_date = args
            .start_date
            .ok_or_else(|| ToolError::MissingArgument("Give a start date.".to_string()))?;

        let entries = fetch_workspace_entries(self.toggl_client, start_date, workspace_id).await?;
        let bad_entries = select_unaligned(entries, &Local)?;
        if bad_entries.is_empty() {
            self.console.show_message("No time entries to fix.")?;
            return Ok(RunOutcome::NothingToDo);
        }

        self.console
            .show_message("Found the following entries to be changed:")?;
        self.console.show_time_entries(&bad_entries)?;
        if !confirm(&mut *self.prompt, "Type y to proceed")? {
            self.console.show_message("Stopping.")?;
            return Ok(RunOutcome::Cancelled);
        }

        let fixed_entries = fix_entries(&bad_entries, &Local)?;
        info!("{} time entries will be fixed", fixed_entries.len());
        self.console
            .show_message("The following changes will be made:")?;
        self.console.show_fixed_entries(&fixed_entries)?;
        if !confirm(&mut *self.prompt, "Type y to send to Toggl")? {
            self.console.show_message("Canceled.")?;
            return Ok(RunOutcome::Cancelled);
        }

        let submissions = fixed_entries
            .into_iter()
            .map(|fixed| {
                let label = format!("entry {}", fixed.fixed.id.unwrap_or_default());
                (Submission::Update, label, fixed.fixed)
            })
            .collect();
        let report = submit_all(self.toggl_client, &mut *self.console, submissions).await?;

        Ok(RunOutcome::Submitted(report))
    }
}
