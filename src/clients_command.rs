use anyhow::{Context, Result};
use log::info;

use crate::console::ConsolePresenter;
use crate::time_entry::Client;
use crate::toggl::TogglRepository;

/// クライアントの一覧を表示するサブコマンド。
///
/// workspaceのIDを調べるために使う。
pub struct ClientsCommand<'a, T: TogglRepository, C: ConsolePresenter> {
    toggl_client: &'a T,
    console: &'a mut C,
}

impl<'a, T: TogglRepository, C: ConsolePresenter> ClientsCommand<'a, T, C> {
    /// 新しい`ClientsCommand`を返す。
    pub fn new(toggl_client: &'a T, console: &'a mut C) -> Self {
        Self {
            toggl_client,
            console,
        }
    }

    /// クライアントを取得して表示する。
    pub async fn run(&mut self) -> Result<Vec<Client>> {
        let clients = self
            .toggl_client
            .read_clients()
            .await
            .context("Failed to retrieve clients")?;
        info!("{} clients retrieved", clients.len());
        self.console.show_clients(&clients)?;

        Ok(clients)
    }
}
