use anyhow::Result;
use chrono::{Duration, NaiveDate};
use log::{debug, info};

use crate::clients_command::ClientsCommand;
use crate::console::ConsolePresenter;
use crate::datetime::{format_seconds, parse_command_date, parse_duration};
use crate::error::ToolError;
use crate::pipeline::{fetch_workspace_entries, submit_all, RunOutcome, Submission};
use crate::prompt::{confirm, Prompt};
use crate::time_entry::TimeEntry;
use crate::toggl::TogglRepository;

/// `split`サブコマンドの引数。
#[derive(Debug, Default, clap::Args)]
pub struct SplitArgs {
    #[clap(
        short = 'w',
        long = "dest-workspace",
        help = "Workspace ID of the time entry to split"
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

/// `1.4/2/1`のような`/`区切りの比率をパースする。
///
/// 比率は0以上の有限の小数でなければならない。
pub fn parse_proportions(s: &str) -> Result<Vec<f64>, ToolError> {
    let proportions = s
        .split('/')
        .map(|token| {
            let token = token.trim();
            match token.parse::<f64>() {
                Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
                _ => Err(ToolError::InvalidProportion(format!(
                    "'{}' in '{}' is not a non-negative number",
                    token, s
                ))),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(proportions)
}

/// 合計時間(秒)を比率に応じて分配する。
///
/// 各比率の分は`round(weight / sum * total)`とし、丸めで生じた差分は先頭に加える。
/// 差分を加えると負になる場合は、先頭から順に引けるだけ引く。
/// 結果の合計は必ず`total_seconds`になる。
pub fn allocate_durations(total_seconds: i64, proportions: &[f64]) -> Result<Vec<i64>, ToolError> {
    if total_seconds < 0 {
        return Err(ToolError::InvalidDurationFormat(format!(
            "total duration must not be negative: {}",
            total_seconds
        )));
    }
    if proportions.is_empty() {
        return Err(ToolError::InvalidProportion(
            "at least one proportion is required".to_string(),
        ));
    }
    if let Some(invalid) = proportions
        .iter()
        .find(|weight| !weight.is_finite() || **weight < 0.0)
    {
        return Err(ToolError::InvalidProportion(invalid.to_string()));
    }
    let sum: f64 = proportions.iter().sum();
    if sum <= 0.0 {
        return Err(ToolError::InvalidProportion(
            "proportions must not all be zero".to_string(),
        ));
    }

    let mut shares: Vec<i64> = proportions
        .iter()
        .map(|weight| (weight / sum * total_seconds as f64).round() as i64)
        .collect();
    let residual = total_seconds - shares.iter().sum::<i64>();
    debug!("allocated {:?}, residual {}", shares, residual);

    if residual >= 0 || shares[0] + residual >= 0 {
        shares[0] += residual;
    } else {
        let mut deficit = -residual;
        for share in shares.iter_mut() {
            let taken = deficit.min(*share);
            *share -= taken;
            deficit -= taken;
            if deficit == 0 {
                break;
            }
        }
    }

    Ok(shares)
}

/// 分割後のタイムエントリーを作る。
///
/// 元の開始時間から順に隙間なく並べる。先頭は元のidを引き継ぎ、それ以外はidなしの新規エントリーとする。
/// workspace、プロジェクト、タグは元のエントリーから引き継ぐ。
pub fn build_split_parts(
    original: &TimeEntry,
    durations: &[i64],
    descriptions: &[String],
) -> Vec<TimeEntry> {
    let mut start = original.start;
    durations
        .iter()
        .zip(descriptions)
        .enumerate()
        .map(|(index, (&duration, description))| {
            let part = TimeEntry {
                id: if index == 0 { original.id } else { None },
                description: description.clone(),
                ..original.with_span(start, duration)
            };
            start = part.stop.unwrap_or(start);
            part
        })
        .collect()
}

/// `split`サブコマンド。
pub struct SplitCommand<'a, T: TogglRepository, P: Prompt, C: ConsolePresenter> {
    toggl_client: &'a T,
    prompt: &'a mut P,
    console: &'a mut C,
}

impl<'a, T: TogglRepository, P: Prompt, C: ConsolePresenter> SplitCommand<'a, T, P, C> {
    /// 新しい`SplitCommand`を返す。
    pub fn new(toggl_client: &'a T, prompt: &'a mut P, console: &'a mut C) -> Self {
        Self {
            toggl_client,
            prompt,
            console,
        }
    }

    /// `split`サブコマンドの処理を行う。
    ///
    /// 表示した一覧から1つ選んでもらい、合計時間と比率に応じて複数のタイムエントリーに分ける。
    /// 先頭は元のエントリーを更新し、残りは新規作成する。
    pub async fn run(&mut self, args: SplitArgs) -> Result<RunOutcome> {
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
        if entries.is_empty() {
            self.console.show_message("No time entries to split.")?;
            return Ok(RunOutcome::NothingToDo);
        }
        self.console.show_time_entries(&entries)?;

        let original = self.select_entry(&entries)?;
        let total = self.read_total_duration(original)?;
        let proportions_input = self.prompt.input("Proportions (e.g. 1.4/2/1)", "")?;
        let proportions = parse_proportions(&proportions_input)?;
        let durations = allocate_durations(total, &proportions)?;
        info!("Splitting entry {:?} into {:?}", original.id, durations);

        let descriptions = durations
            .iter()
            .enumerate()
            .map(|(index, _)| {
                self.prompt.input(
                    &format!("Description for part {}", index),
                    &original.description,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        let parts = build_split_parts(original, &durations, &descriptions);

        self.console
            .show_message("The following time entries will be sent:")?;
        self.console.show_split_parts(&parts)?;
        if !confirm(&mut *self.prompt, "Type y to send to Toggl")? {
            self.console.show_message("Canceled.")?;
            return Ok(RunOutcome::Cancelled);
        }

        let submissions = parts
            .into_iter()
            .enumerate()
            .map(|(index, part)| {
                let submission = if part.id.is_some() {
                    Submission::Update
                } else {
                    Submission::Create
                };
                (submission, format!("part {}", index), part)
            })
            .collect();
        let report = submit_all(self.toggl_client, &mut *self.console, submissions).await?;

        Ok(RunOutcome::Submitted(report))
    }

    /// 表示した番号でタイムエントリーを選んでもらう。
    fn select_entry<'e>(&mut self, entries: &'e [TimeEntry]) -> Result<&'e TimeEntry> {
        let answer = self.prompt.input("Select entry #", "")?;
        let entry = answer
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|index| entries.get(index))
            .ok_or_else(|| {
                ToolError::InvalidSelection(format!(
                    "'{}' is not a number between 0 and {}",
                    answer.trim(),
                    entries.len() - 1
                ))
            })?;

        Ok(entry)
    }

    /// 分割後の合計時間(秒)を入力してもらう。既定値は元の長さ。
    fn read_total_duration(&mut self, original: &TimeEntry) -> Result<i64> {
        let default = format_seconds(original.duration);
        let answer = self.prompt.input("Total duration", &default)?;
        let answer = if answer.trim().is_empty() {
            default
        } else {
            answer
        };
        let total = parse_duration(&answer)?.num_seconds();
        if total <= 0 {
            return Err(ToolError::InvalidDurationFormat(format!(
                "total duration must be positive: {}",
                answer
            ))
            .into());
        }
        if original
            .start
            .checked_add_signed(Duration::seconds(total))
            .is_none()
        {
            return Err(ToolError::InvalidDurationFormat(format!(
                "total duration is out of range: {}",
                answer
            ))
            .into());
        }

        Ok(total)
    }
}
