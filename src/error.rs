use thiserror::Error;

/// エラーの分類。
///
/// 分類ごとに利用者が取るべき対応が異なる。
/// - `Configuration`: 設定ファイルやマッピングファイルを修正する
/// - `UserInput`: コマンドライン引数や入力値を修正する
/// - `Validation`: マッピング設定や日付範囲を見直して再実行する
/// - `Upstream`: Toggl APIのレスポンスを確認する
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    UserInput,
    Validation,
    Upstream,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::Configuration => "configuration error",
            ErrorKind::UserInput => "input error",
            ErrorKind::Validation => "validation error",
            ErrorKind::Upstream => "upstream error",
        };
        f.write_str(label)
    }
}

/// ツール全体で扱うエラー。
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    MissingArgument(String),

    #[error("Date not in YYYYMMDD format: {0}")]
    InvalidDateFormat(String),

    #[error("Invalid duration: {0}")]
    InvalidDurationFormat(String),

    #[error("Invalid proportion: {0}")]
    InvalidProportion(String),

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Too many time entries to get at once ({count} > {max}); choose a different start date.")]
    TooManyEntries { count: usize, max: usize },

    #[error("No relevant project mappings for workspaces {source_workspace} -> {dest_workspace}.")]
    NoMappingFound {
        source_workspace: i64,
        dest_workspace: i64,
    },

    #[error("Multiple relevant project mappings ({count}) for workspaces {source_workspace} -> {dest_workspace}.")]
    AmbiguousMapping {
        source_workspace: i64,
        dest_workspace: i64,
        count: usize,
    },

    #[error("Multiple destination projects for source project {0}.")]
    DuplicateProjectMapping(i64),

    #[error("Not all destination projects exist in workspace: {}", join_ids(.0))]
    MissingDestinationProject(Vec<i64>),

    #[error("Toggl API error: {0}")]
    Upstream(String),
}

impl ToolError {
    /// エラーの分類を返す。
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::Config(_) => ErrorKind::Configuration,
            ToolError::MissingArgument(_)
            | ToolError::InvalidDateFormat(_)
            | ToolError::InvalidDurationFormat(_)
            | ToolError::InvalidProportion(_)
            | ToolError::InvalidSelection(_) => ErrorKind::UserInput,
            ToolError::TooManyEntries { .. }
            | ToolError::NoMappingFound { .. }
            | ToolError::AmbiguousMapping { .. }
            | ToolError::DuplicateProjectMapping(_)
            | ToolError::MissingDestinationProject(_) => ErrorKind::Validation,
            ToolError::Upstream(_) => ErrorKind::Upstream,
        }
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
