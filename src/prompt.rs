use anyhow::{Context, Result};
use dialoguer::Input;
#[cfg(test)]
use mockall::automock;

/// 利用者への問い合わせ。
///
/// 確認なしにTogglへ送信しないよう、各コマンドはこのtraitを通して確認を取る。
#[cfg_attr(test, automock)]
pub trait Prompt {
    /// 文字列を入力してもらう。
    ///
    /// # Arguments
    ///
    /// * `message` - 表示するメッセージ
    /// * `default` - 空入力時の値。空文字列なら既定値なし
    fn input(&mut self, message: &str, default: &str) -> Result<String>;
}

/// 確認を取る。`y`が入力された場合だけ`true`を返す。
pub fn confirm<P: Prompt + ?Sized>(prompt: &mut P, message: &str) -> Result<bool> {
    let answer = prompt.input(&format!("{} [y/N]", message), "")?;

    Ok(answer.trim() == "y")
}

/// 端末から入力を受け付ける`Prompt`。
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn input(&mut self, message: &str, default: &str) -> Result<String> {
        let mut input = Input::<String>::new();
        input.with_prompt(message).allow_empty(true);
        if !default.is_empty() {
            input.default(default.to_string());
        }

        input.interact_text().context("Failed to read from terminal")
    }
}
