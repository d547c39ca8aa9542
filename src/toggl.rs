use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};
#[cfg(test)]
use mockall::automock;
use reqwest::{header::CONTENT_TYPE, Client as HttpClient, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;
use crate::time_entry::{Client, Project, TimeEntry};

const TOGGL_API_URL: &str = "https://api.track.toggl.com/api/v9";
const CREATED_WITH: &str = "toggl-tools";

/// Toggl APIのタイムエントリーをデシリアライズするための構造体。
#[derive(Debug, Deserialize)]
struct TogglTimeEntry {
    id: i64,
    workspace_id: i64,
    project_id: Option<i64>,
    start: DateTime<Utc>,
    stop: Option<DateTime<Utc>>,
    duration: i64,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl From<TogglTimeEntry> for TimeEntry {
    fn from(entry: TogglTimeEntry) -> Self {
        TimeEntry {
            id: Some(entry.id),
            workspace_id: entry.workspace_id,
            project_id: entry.project_id,
            start: entry.start,
            stop: entry.stop,
            duration: entry.duration,
            description: entry.description.unwrap_or_default(),
            tags: entry.tags.unwrap_or_default(),
        }
    }
}

/// タイムエントリーの作成、更新時に送信する構造体。
#[derive(Debug, Serialize)]
struct TogglTimeEntryRequest<'a> {
    created_with: &'static str,
    workspace_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<i64>,
    start: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<String>,
    duration: i64,
    description: &'a str,
    tags: &'a [String],
}

impl<'a> From<&'a TimeEntry> for TogglTimeEntryRequest<'a> {
    fn from(entry: &'a TimeEntry) -> Self {
        TogglTimeEntryRequest {
            created_with: CREATED_WITH,
            workspace_id: entry.workspace_id,
            project_id: entry.project_id,
            start: entry.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            stop: entry
                .stop
                .map(|stop| stop.to_rfc3339_opts(SecondsFormat::Secs, true)),
            duration: entry.duration,
            description: &entry.description,
            tags: &entry.tags,
        }
    }
}

/// Toggl APIのプロジェクト情報をデシリアライズするための構造体。
#[derive(Debug, Deserialize)]
struct TogglProject {
    id: i64,
    workspace_id: i64,
    name: String,
}

/// Toggl APIのクライアント情報をデシリアライズするための構造体。
#[derive(Debug, Deserialize)]
struct TogglClientInfo {
    id: i64,
    wid: i64,
    name: String,
}

/// Toggl APIへのアクセスを抽象化するリポジトリ。
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TogglRepository {
    /// クライアントの一覧を取得する。
    async fn read_clients(&self) -> Result<Vec<Client>>;

    /// 期間内のタイムエントリーを取得する。
    ///
    /// APIキーで参照できる全てのworkspaceのエントリーが返るため、呼び出し側でworkspaceを絞り込む。
    ///
    /// # Arguments
    ///
    /// * `start_at` - 取得するタイムエントリーの開始日時
    /// * `end_at` - 取得するタイムエントリーの終了日時
    async fn read_time_entries(
        &self,
        start_at: &DateTime<Utc>,
        end_at: &DateTime<Utc>,
    ) -> Result<Vec<TimeEntry>>;

    /// workspaceのプロジェクトをIDをキーにして取得する。
    async fn read_projects(&self, workspace_id: i64) -> Result<HashMap<i64, Project>>;

    /// タイムエントリーを新規作成する。
    async fn create_time_entry(&self, entry: &TimeEntry) -> Result<TimeEntry>;

    /// タイムエントリーを更新する。`entry.id`が必要。
    async fn update_time_entry(&self, entry: &TimeEntry) -> Result<TimeEntry>;
}

/// Toggl APIと通信するためのクライアント。
///
/// # Examples
///
/// ```
/// let client = TogglClient::new(&settings.toggl.api_key);
/// let time_entries = client.read_time_entries(&start_at, &end_at).await.unwrap();
/// ```
pub struct TogglClient {
    client: HttpClient,
    api_url: String,
    api_token: String,
}

impl TogglClient {
    /// 新しい`TogglClient`を返す。
    ///
    /// # Arguments
    ///
    /// * `api_token` - TogglのAPIトークン
    pub fn new(api_token: &str) -> Self {
        Self::with_base_url(api_token, TOGGL_API_URL)
    }

    /// 接続先を指定して`TogglClient`を返す。
    pub fn with_base_url(api_token: &str, api_url: &str) -> Self {
        Self {
            client: HttpClient::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        }
    }

    /// 認証情報を付与してリクエストを送信し、JSONとして返す。
    ///
    /// 成功以外のステータス、JSONでないレスポンスは`ToolError::Upstream`とする。
    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request
            .basic_auth(&self.api_token, Some("api_token"))
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to send request to Toggl API at {}", self.api_url))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;
        debug!("Toggl API responded with {}", status);

        if !status.is_success() {
            return Err(ToolError::Upstream(format!("{}: {}", status, body.trim())).into());
        }

        let value = serde_json::from_str(&body)
            .map_err(|_| ToolError::Upstream(format!("Unexpected response: {}", body.trim())))?;

        Ok(value)
    }
}

/// JSONの配列をデシリアライズする。配列でなければ`ToolError::Upstream`とする。
fn parse_list<T: DeserializeOwned>(value: Value) -> Result<Vec<T>> {
    if !value.is_array() {
        return Err(ToolError::Upstream(format!("Error, response was: {}", value)).into());
    }

    serde_json::from_value(value).context("Failed to deserialize response")
}

/// 空の一覧を`null`で返すエンドポイント用。
fn parse_nullable_list<T: DeserializeOwned>(value: Value) -> Result<Vec<T>> {
    if value.is_null() {
        return Ok(vec![]);
    }

    parse_list(value)
}

#[async_trait]
impl TogglRepository for TogglClient {
    async fn read_clients(&self) -> Result<Vec<Client>> {
        let value = self
            .send(self.client.get(format!("{}/me/clients", self.api_url)))
            .await
            .context("Failed to get client list from toggl")?;
        let clients = parse_nullable_list::<TogglClientInfo>(value)?
            .into_iter()
            .map(|client| Client {
                id: client.id,
                workspace_id: client.wid,
                name: client.name,
            })
            .collect();

        Ok(clients)
    }

    async fn read_time_entries(
        &self,
        start_at: &DateTime<Utc>,
        end_at: &DateTime<Utc>,
    ) -> Result<Vec<TimeEntry>> {
        let value = self
            .send(
                self.client
                    .get(format!("{}/me/time_entries", self.api_url))
                    .query(&[
                        ("start_date", start_at.to_rfc3339()),
                        ("end_date", end_at.to_rfc3339()),
                    ]),
            )
            .await?;
        let time_entries: Vec<TimeEntry> = parse_list::<TogglTimeEntry>(value)?
            .into_iter()
            .map(TimeEntry::from)
            .collect();
        info!("length of time entries: {}", time_entries.len());

        Ok(time_entries)
    }

    async fn read_projects(&self, workspace_id: i64) -> Result<HashMap<i64, Project>> {
        let value = self
            .send(self.client.get(format!(
                "{}/workspaces/{}/projects",
                self.api_url, workspace_id
            )))
            .await
            .with_context(|| format!("Failed to get project list of workspace {}", workspace_id))?;
        let projects = parse_nullable_list::<TogglProject>(value)?
            .into_iter()
            .map(|project| {
                (
                    project.id,
                    Project {
                        id: project.id,
                        workspace_id: project.workspace_id,
                        name: project.name,
                    },
                )
            })
            .collect();

        Ok(projects)
    }

    async fn create_time_entry(&self, entry: &TimeEntry) -> Result<TimeEntry> {
        let body = TogglTimeEntryRequest::from(entry);
        let value = self
            .send(
                self.client
                    .post(format!(
                        "{}/workspaces/{}/time_entries",
                        self.api_url, entry.workspace_id
                    ))
                    .json(&body),
            )
            .await?;
        let created: TogglTimeEntry =
            serde_json::from_value(value).context("Failed to deserialize created time entry")?;

        Ok(created.into())
    }

    async fn update_time_entry(&self, entry: &TimeEntry) -> Result<TimeEntry> {
        let id = entry.id.ok_or_else(|| {
            ToolError::MissingArgument("Time entry without id cannot be updated".to_string())
        })?;
        let body = TogglTimeEntryRequest::from(entry);
        let value = self
            .send(
                self.client
                    .put(format!(
                        "{}/workspaces/{}/time_entries/{}",
                        self.api_url, entry.workspace_id, id
                    ))
                    .json(&body),
            )
            .await?;
        let updated: TogglTimeEntry =
            serde_json::from_value(value).context("Failed to deserialize updated time entry")?;

        Ok(updated.into())
    }
}

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use chrono::{TimeZone, Utc};
    use mockito::Matcher;
    use serde_json::json;

    use super::{TogglClient, TogglRepository};
    use crate::error::ToolError;
    use crate::time_entry::TimeEntry;

    const TOKEN: &str = "secret-token";

    /// Basic認証ヘッダの期待値。
    fn expected_auth() -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:api_token", TOKEN)))
    }

    fn entry_json(id: i64, workspace_id: i64) -> serde_json::Value {
        json!({
            "id": id,
            "workspace_id": workspace_id,
            "project_id": 10,
            "start": "2021-01-01T09:00:00+00:00",
            "stop": "2021-01-01T10:00:00+00:00",
            "duration": 3600,
            "description": "work",
            "tags": ["billed"],
        })
    }

    #[tokio::test]
    async fn test_read_time_entries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/me/time_entries")
            .match_header("authorization", expected_auth().as_str())
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded(
                    "start_date".to_string(),
                    "2021-01-01T00:00:00+00:00".to_string(),
                ),
                Matcher::UrlEncoded(
                    "end_date".to_string(),
                    "2021-01-02T00:00:00+00:00".to_string(),
                ),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!([entry_json(5, 1), entry_json(6, 2)]).to_string())
            .create_async()
            .await;
        let client = TogglClient::with_base_url(TOKEN, &server.url());

        let entries = client
            .read_time_entries(
                &Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
                &Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap(),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0],
            TimeEntry {
                id: Some(5),
                workspace_id: 1,
                project_id: Some(10),
                start: Utc.with_ymd_and_hms(2021, 1, 1, 9, 0, 0).unwrap(),
                stop: Some(Utc.with_ymd_and_hms(2021, 1, 1, 10, 0, 0).unwrap()),
                duration: 3600,
                description: "work".to_string(),
                tags: vec!["billed".to_string()],
            }
        );
        assert_eq!(entries[1].workspace_id, 2);
    }

    /// 配列以外のレスポンスは上流のエラーとする。
    #[tokio::test]
    async fn test_read_time_entries_not_a_list() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/me/time_entries")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"error": "quota exceeded"}).to_string())
            .create_async()
            .await;
        let client = TogglClient::with_base_url(TOKEN, &server.url());

        let err = client
            .read_time_entries(&Utc::now(), &Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ToolError>(),
            Some(ToolError::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn test_read_time_entries_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/me/time_entries")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("Incorrect username and/or password")
            .create_async()
            .await;
        let client = TogglClient::with_base_url(TOKEN, &server.url());

        let err = client
            .read_time_entries(&Utc::now(), &Utc::now())
            .await
            .unwrap_err();

        let tool_error = err.downcast_ref::<ToolError>().unwrap();
        assert!(tool_error.to_string().contains("403"));
    }

    #[tokio::test]
    async fn test_read_projects() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/workspaces/2/projects")
            .match_header("authorization", expected_auth().as_str())
            .with_status(200)
            .with_body(
                json!([
                    {"id": 20, "workspace_id": 2, "name": "X", "active": true},
                    {"id": 21, "workspace_id": 2, "name": "Y", "active": false},
                ])
                .to_string(),
            )
            .create_async()
            .await;
        let client = TogglClient::with_base_url(TOKEN, &server.url());

        let projects = client.read_projects(2).await.unwrap();

        assert_eq!(projects.len(), 2);
        assert_eq!(projects[&20].name, "X");
        assert_eq!(projects[&21].workspace_id, 2);
    }

    #[tokio::test]
    async fn test_read_clients_null_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/me/clients")
            .with_status(200)
            .with_body("null")
            .create_async()
            .await;
        let client = TogglClient::with_base_url(TOKEN, &server.url());

        let clients = client.read_clients().await.unwrap();

        assert!(clients.is_empty());
    }

    #[tokio::test]
    async fn test_read_clients() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/me/clients")
            .with_status(200)
            .with_body(json!([{"id": 7, "wid": 1, "name": "ACME"}]).to_string())
            .create_async()
            .await;
        let client = TogglClient::with_base_url(TOKEN, &server.url());

        let clients = client.read_clients().await.unwrap();

        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].workspace_id, 1);
        assert_eq!(clients[0].name, "ACME");
    }

    /// 新規作成時はidを送らず、作成されたエントリーを返す。
    #[tokio::test]
    async fn test_create_time_entry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/workspaces/2/time_entries")
            .match_header("authorization", expected_auth().as_str())
            .match_body(Matcher::PartialJson(json!({
                "created_with": "toggl-tools",
                "workspace_id": 2,
                "project_id": 20,
                "start": "2021-01-01T09:00:00Z",
                "stop": "2021-01-01T10:00:00Z",
                "duration": 3600,
                "description": "work",
            })))
            .with_status(200)
            .with_body(entry_json(100, 2).to_string())
            .create_async()
            .await;
        let client = TogglClient::with_base_url(TOKEN, &server.url());
        let entry = TimeEntry {
            id: None,
            workspace_id: 2,
            project_id: Some(20),
            start: Utc.with_ymd_and_hms(2021, 1, 1, 9, 0, 0).unwrap(),
            stop: Some(Utc.with_ymd_and_hms(2021, 1, 1, 10, 0, 0).unwrap()),
            duration: 3600,
            description: "work".to_string(),
            tags: vec![],
        };

        let created = client.create_time_entry(&entry).await.unwrap();

        mock.assert_async().await;
        assert_eq!(created.id, Some(100));
    }

    #[tokio::test]
    async fn test_update_time_entry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/workspaces/1/time_entries/5")
            .match_body(Matcher::PartialJson(json!({
                "start": "2021-01-01T00:00:00Z",
                "stop": "2021-01-01T01:00:00Z",
                "duration": 3600,
            })))
            .with_status(200)
            .with_body(entry_json(5, 1).to_string())
            .create_async()
            .await;
        let client = TogglClient::with_base_url(TOKEN, &server.url());
        let entry = TimeEntry {
            id: Some(5),
            workspace_id: 1,
            project_id: Some(10),
            start: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
            stop: Some(Utc.with_ymd_and_hms(2021, 1, 1, 1, 0, 0).unwrap()),
            duration: 3600,
            description: "work".to_string(),
            tags: vec![],
        };

        let updated = client.update_time_entry(&entry).await.unwrap();

        mock.assert_async().await;
        assert_eq!(updated.id, Some(5));
    }

    #[tokio::test]
    async fn test_update_time_entry_without_id() {
        let client = TogglClient::with_base_url(TOKEN, "http://127.0.0.1:9");
        let entry = TimeEntry {
            id: None,
            workspace_id: 1,
            project_id: None,
            start: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
            stop: None,
            duration: 0,
            description: String::new(),
            tags: vec![],
        };

        let err = client.update_time_entry(&entry).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ToolError>(),
            Some(ToolError::MissingArgument(_))
        ));
    }

    /// 書き込みの失敗はステータスとレスポンスを含む上流のエラーになる。
    #[tokio::test]
    async fn test_create_time_entry_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/workspaces/2/time_entries")
            .with_status(400)
            .with_body("\"project not found\"")
            .create_async()
            .await;
        let client = TogglClient::with_base_url(TOKEN, &server.url());
        let entry = TimeEntry {
            id: None,
            workspace_id: 2,
            project_id: Some(99),
            start: Utc.with_ymd_and_hms(2021, 1, 1, 9, 0, 0).unwrap(),
            stop: Some(Utc.with_ymd_and_hms(2021, 1, 1, 10, 0, 0).unwrap()),
            duration: 3600,
            description: "work".to_string(),
            tags: vec![],
        };

        let err = client.create_time_entry(&entry).await.unwrap_err();

        let message = err.downcast_ref::<ToolError>().unwrap().to_string();
        assert!(message.contains("400"));
        assert!(message.contains("project not found"));
    }
}
