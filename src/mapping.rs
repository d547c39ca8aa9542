use std::{
    collections::{BTreeSet, HashMap},
    fs,
    path::Path,
};

use anyhow::Result;
use log::{debug, info};
use serde::Deserialize;

use crate::error::ToolError;
use crate::time_entry::{Project, TimeEntry};

/// 既定のプロジェクトマッピングファイル。
pub const DEFAULT_MAPPING_FILE: &str = "project-mappings.json";

/// workspace間のプロジェクトの対応付け。
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ProjectMapping {
    pub source_workspace: i64,
    pub dest_workspace: i64,
    pub mapped_projects: Vec<MappedProject>,
}

/// 1つのプロジェクトの対応。
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MappedProject {
    pub source_project: i64,
    pub dest_project: i64,
}

/// コピー先に作成するタイムエントリーと、表示用のコピー元の情報。
#[derive(Clone, Debug, PartialEq)]
pub struct CopiedEntry {
    pub source_id: Option<i64>,
    pub source_project_id: i64,
    pub source_project_name: String,
    pub dest_project_name: String,
    pub entry: TimeEntry,
}

/// マッピングが見つからなかったタイムエントリー。
#[derive(Clone, Debug, PartialEq)]
pub struct UnmappedEntry {
    pub source_id: Option<i64>,
    pub project_id: Option<i64>,
    pub project_name: String,
}

/// コピー元プロジェクトからコピー先プロジェクトを引くための表。
#[derive(Debug)]
pub struct MappingLookup {
    projects: HashMap<i64, i64>,
}

/// マッピングファイルを読み込む。
///
/// ファイルが開けない、またはJSONとして解釈できない場合は設定エラーとする。
pub fn load_mappings(path: &Path) -> Result<Vec<ProjectMapping>> {
    let content = fs::read_to_string(path).map_err(|err| {
        ToolError::Config(format!(
            "Error opening project mappings file ({}): {}",
            path.display(),
            err
        ))
    })?;

    parse_mappings(&content).map_err(|err| {
        ToolError::Config(format!(
            "Error decoding contents of {}: {}",
            path.display(),
            err
        ))
        .into()
    })
}

fn parse_mappings(content: &str) -> serde_json::Result<Vec<ProjectMapping>> {
    serde_json::from_str(content)
}

/// workspaceの組に一致するマッピングを1つだけ選ぶ。
pub fn select_mapping(
    mappings: &[ProjectMapping],
    source_workspace: i64,
    dest_workspace: i64,
) -> Result<&ProjectMapping, ToolError> {
    let relevant: Vec<&ProjectMapping> = mappings
        .iter()
        .filter(|mapping| {
            mapping.source_workspace == source_workspace && mapping.dest_workspace == dest_workspace
        })
        .collect();

    match relevant.as_slice() {
        [mapping] => Ok(*mapping),
        [] => Err(ToolError::NoMappingFound {
            source_workspace,
            dest_workspace,
        }),
        _ => Err(ToolError::AmbiguousMapping {
            source_workspace,
            dest_workspace,
            count: relevant.len(),
        }),
    }
}

impl MappingLookup {
    /// マッピングから表を作る。同じコピー元プロジェクトが2回出てきたらエラーとする。
    pub fn build(mapping: &ProjectMapping) -> Result<Self, ToolError> {
        let mut projects = HashMap::with_capacity(mapping.mapped_projects.len());
        for pair in &mapping.mapped_projects {
            if projects
                .insert(pair.source_project, pair.dest_project)
                .is_some()
            {
                return Err(ToolError::DuplicateProjectMapping(pair.source_project));
            }
        }
        debug!("{} project mappings loaded", projects.len());

        Ok(Self { projects })
    }

    /// コピー元プロジェクトに対応するコピー先プロジェクトを返す。
    pub fn resolve(&self, source_project: i64) -> Option<i64> {
        self.projects.get(&source_project).copied()
    }
}

/// 表示用のプロジェクト名。取得できなかった場合はIDを表示する。
pub fn project_label(projects: &HashMap<i64, Project>, project_id: Option<i64>) -> String {
    match project_id {
        Some(id) => projects
            .get(&id)
            .map(|project| project.name.clone())
            .unwrap_or_else(|| format!("#{}", id)),
        None => "(no project)".to_string(),
    }
}

/// コピー元のタイムエントリーをコピー先のworkspace、プロジェクトに付け替える。
///
/// 元のエントリーは変更せず、idを持たない新しいエントリーを作る。
/// マッピングのないエントリーは`UnmappedEntry`として別に返す。
pub fn resolve_entries(
    entries: &[TimeEntry],
    lookup: &MappingLookup,
    dest_workspace: i64,
    source_projects: &HashMap<i64, Project>,
    dest_projects: &HashMap<i64, Project>,
) -> (Vec<CopiedEntry>, Vec<UnmappedEntry>) {
    let mut copied = Vec::new();
    let mut unmapped = Vec::new();

    for entry in entries {
        let resolved = entry
            .project_id
            .and_then(|source| lookup.resolve(source).map(|dest| (source, dest)));
        match resolved {
            Some((source_project_id, dest_project_id)) => copied.push(CopiedEntry {
                source_id: entry.id,
                source_project_id,
                source_project_name: project_label(source_projects, Some(source_project_id)),
                dest_project_name: project_label(dest_projects, Some(dest_project_id)),
                entry: TimeEntry {
                    id: None,
                    workspace_id: dest_workspace,
                    project_id: Some(dest_project_id),
                    ..entry.clone()
                },
            }),
            None => unmapped.push(UnmappedEntry {
                source_id: entry.id,
                project_id: entry.project_id,
                project_name: project_label(source_projects, entry.project_id),
            }),
        }
    }
    info!(
        "{} entries mapped, {} entries without mapping",
        copied.len(),
        unmapped.len()
    );

    (copied, unmapped)
}

/// コピー先のプロジェクトが全てコピー先のworkspaceに存在するか確認する。
pub fn check_destination_projects(
    copied: &[CopiedEntry],
    dest_projects: &HashMap<i64, Project>,
) -> Result<(), ToolError> {
    let missing: BTreeSet<i64> = copied
        .iter()
        .filter_map(|copied| copied.entry.project_id)
        .filter(|project_id| !dest_projects.contains_key(project_id))
        .collect();

    if !missing.is_empty() {
        return Err(ToolError::MissingDestinationProject(
            missing.into_iter().collect(),
        ));
    }

    Ok(())
}
