use std::{collections::HashMap, path::PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::info;

use crate::clients_command::ClientsCommand;
use crate::console::ConsolePresenter;
use crate::datetime::parse_command_date;
use crate::error::ToolError;
use crate::filter::total_duration_by_project;
use crate::mapping::{
    check_destination_projects, load_mappings, project_label, resolve_entries, select_mapping,
    CopiedEntry, MappingLookup, UnmappedEntry, DEFAULT_MAPPING_FILE,
};
use crate::pipeline::{fetch_workspace_entries, submit_all, RunOutcome, Submission};
use crate::prompt::{confirm, Prompt};
use crate::time_entry::{Project, TimeEntry};
use crate::toggl::TogglRepository;

/// `copy`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct CopyArgs {
    #[clap(
        short = 's',
        long = "source-workspace",
        help = "Workspace ID to use as the source"
    )]
    pub source_workspace: Option<i64>,

    #[clap(
        short = 'w',
        long = "dest-workspace",
        help = "Workspace ID to use as the destination"
    )]
    pub dest_workspace: Option<i64>,

    #[clap(
        short = 'd',
        long = "start-date",
        help = "Starting date for the query in YYYYMMDD format",
        parse(try_from_str = parse_command_date),
    )]
    pub start_date: Option<NaiveDate>,

    #[clap(
        long = "mappings",
        help = "Project mappings file",
        default_value = DEFAULT_MAPPING_FILE,
    )]
    pub mappings: PathBuf,
}

/// コピーの計画。送信前に全ての検証を終えたもの。
#[derive(Debug)]
pub struct CopyPlan {
    pub copied: Vec<CopiedEntry>,
    pub unmapped: Vec<UnmappedEntry>,
    pub dest_projects: HashMap<i64, Project>,
}

impl CopyPlan {
    /// コピー先のプロジェクトがすべてコピー先workspaceに存在するか確認する。
    pub fn check_destination_projects(&self) -> Result<(), ToolError> {
        check_destination_projects(&self.copied, &self.dest_projects)
    }

    /// コピー先プロジェクトごとの合計時間。
    pub fn totals_by_dest_project(&self) -> Vec<(String, i64)> {
        named_totals(self.copied.iter().map(|copied| &copied.entry), &self.dest_projects)
    }
}

fn named_totals<'a, I>(entries: I, projects: &HashMap<i64, Project>) -> Vec<(String, i64)>
where
    I: IntoIterator<Item = &'a TimeEntry>,
{
    total_duration_by_project(entries)
        .into_iter()
        .map(|(project_id, seconds)| (project_label(projects, project_id), seconds))
        .collect()
}

/// `copy`サブコマンド。
pub struct CopyCommand<'a, T: TogglRepository, P: Prompt, C: ConsolePresenter> {
    toggl_client: &'a T,
    prompt: &'a mut P,
    console: &'a mut C,
}

impl<'a, T: TogglRepository, P: Prompt, C: ConsolePresenter> CopyCommand<'a, T, P, C> {
    /// 新しい`CopyCommand`を返す。
    ///
    /// # Arguments
    /// * `toggl_client` - Toggl APIと通信するためのリポジトリ
    /// * `prompt` - 送信前の確認に使う
    /// * `console` - 対応表やコピー内容の表示先
    pub fn new(toggl_client: &'a T, prompt: &'a mut P, console: &'a mut C) -> Self {
        Self {
            toggl_client,
            prompt,
            console,
        }
    }

    /// `copy`サブコマンドの処理を行う。
    ///
    /// コピー元workspaceのタイムエントリーを、プロジェクトマッピングに従ってコピー先workspaceに新規作成する。
    pub async fn run(&mut self, args: CopyArgs) -> Result<RunOutcome> {
        let mappings = load_mappings(&args.mappings)?;

        let (source_workspace, dest_workspace) = match (args.source_workspace, args.dest_workspace)
        {
            (Some(source), Some(dest)) => (source, dest),
            _ => {
                ClientsCommand::new(self.toggl_client, &mut *self.console)
                    .run()
                    .await?;
                return Ok(RunOutcome::ClientsListed);
            }
        };
        let start_date = args
            .start_date
            .ok_or_else(|| ToolError::MissingArgument("Give a start date.".to_string()))?;

        let mapping = select_mapping(&mappings, source_workspace, dest_workspace)?;
        let lookup = MappingLookup::build(mapping)?;

        let plan = self
            .plan(&lookup, start_date, source_workspace, dest_workspace)
            .await?;

        // マッピングのないエントリーは、コピー先の検証に失敗しても表示する
        self.console.show_unmapped_entries(&plan.unmapped)?;
        if let Err(err) = plan.check_destination_projects() {
            if let ToolError::MissingDestinationProject(ids) = &err {
                self.console
                    .show_message("Not all destination projects exist in workspace:")?;
                for id in ids {
                    self.console.show_message(&id.to_string())?;
                }
            }
            return Err(err.into());
        }

        if plan.copied.is_empty() {
            self.console.show_message("No time entries to copy.")?;
            return Ok(RunOutcome::NothingToDo);
        }

        self.console
            .show_project_mappings(source_workspace, dest_workspace, &plan.copied)?;
        self.console.show_project_totals(&plan.totals_by_dest_project())?;
        self.console.show_copied_entries(&plan.copied)?;
        if !confirm(&mut *self.prompt, "Type y to send to Toggl")? {
            self.console.show_message("Canceled.")?;
            return Ok(RunOutcome::Cancelled);
        }

        let submissions = plan
            .copied
            .iter()
            .map(|copied| {
                let label = format!("entry {}", copied.source_id.unwrap_or_default());
                (Submission::Create, label, copied.entry.clone())
            })
            .collect();
        let report = submit_all(self.toggl_client, &mut *self.console, submissions).await?;

        self.console.show_message(&format!(
            "Created {} of {} time entries ({} failed).",
            report.succeeded.len(),
            plan.copied.len(),
            report.failed
        ))?;
        self.console
            .show_project_totals(&named_totals(&report.succeeded, &plan.dest_projects))?;

        Ok(RunOutcome::Submitted(report))
    }

    /// コピー元のタイムエントリーを取得し、コピー先のエントリーに変換する。
    ///
    /// コピー先プロジェクトの存在確認は`CopyPlan::check_destination_projects`で行う。
    /// ここまでの処理ではTogglへの書き込みは行わない。
    pub async fn plan(
        &self,
        lookup: &MappingLookup,
        start_date: NaiveDate,
        source_workspace: i64,
        dest_workspace: i64,
    ) -> Result<CopyPlan> {
        let source_entries =
            fetch_workspace_entries(self.toggl_client, start_date, source_workspace).await?;

        let source_projects = self
            .toggl_client
            .read_projects(source_workspace)
            .await
            .context("Failed to get source projects")?;
        let dest_projects = self
            .toggl_client
            .read_projects(dest_workspace)
            .await
            .context("Failed to get destination projects")?;

        let (copied, unmapped) = resolve_entries(
            &source_entries,
            lookup,
            dest_workspace,
            &source_projects,
            &dest_projects,
        );
        info!("{} time entries will be copied", copied.len());

        Ok(CopyPlan {
            copied,
            unmapped,
            dest_projects,
        })
    }
}
