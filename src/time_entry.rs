use chrono::{DateTime, Duration, Utc};

/// Togglのタイムエントリー。
///
/// `id`は作成前のエントリーでは`None`になる。
/// `stop`は計測中のエントリーでは`None`になり、`duration`は負の値になる。
#[derive(Clone, Debug, PartialEq)]
pub struct TimeEntry {
    pub id: Option<i64>,
    pub workspace_id: i64,
    pub project_id: Option<i64>,
    pub start: DateTime<Utc>,
    pub stop: Option<DateTime<Utc>>,
    pub duration: i64,
    pub description: String,
    pub tags: Vec<String>,
}

impl TimeEntry {
    /// 計測中のエントリーかどうか。
    pub fn is_running(&self) -> bool {
        self.stop.is_none() || self.duration < 0
    }

    /// 開始時間と長さを置き換えた新しいエントリーを返す。
    ///
    /// 終了時間は`start + duration`で再計算する。
    pub fn with_span(&self, start: DateTime<Utc>, duration: i64) -> Self {
        Self {
            start,
            stop: Some(start + Duration::seconds(duration)),
            duration,
            ..self.clone()
        }
    }
}

/// Togglのプロジェクト。
#[derive(Clone, Debug, PartialEq)]
pub struct Project {
    pub id: i64,
    pub workspace_id: i64,
    pub name: String,
}

/// Togglのクライアント。
#[derive(Clone, Debug, PartialEq)]
pub struct Client {
    pub id: i64,
    pub workspace_id: i64,
    pub name: String,
}
