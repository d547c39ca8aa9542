use std::fmt::Display;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ToolError;

static CLOCK_DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-)?(\d+):([0-5]\d)(?::([0-5]\d))?$").expect("valid clock duration regex")
});
static UNIT_DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-)?\s*((?:\d+(?:\.\d+)?\s*[dhms]\s*)+)$").expect("valid unit duration regex")
});
static UNIT_TERM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*([dhms])").expect("valid unit term regex"));

#[cfg(not(test))]
/// 現在のUTC時間を取得する。
pub fn now() -> DateTime<Utc> {
    Utc::now()
}


#[cfg(test)]
pub use mock_datetime::now;

/// コマンドライン引数の日付(`YYYYMMDD`)をパースする。
///
/// # Examples
///
/// ```
/// let date = parse_command_date("20210131").unwrap();
/// ```
pub fn parse_command_date(s: &str) -> Result<NaiveDate, ToolError> {
    let invalid = || ToolError::InvalidDateFormat(s.to_string());
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let year = s[0..4].parse::<i32>().map_err(|_| invalid())?;
    let month = s[4..6].parse::<u32>().map_err(|_| invalid())?;
    let day = s[6..8].parse::<u32>().map_err(|_| invalid())?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

/// 時間の長さを表す文字列をパースする。
///
/// 受け付ける形式:
/// - 単位付きの項の並び: `1h30m`, `90s`, `1d 2h`, `1.5h`
/// - 時計形式: `1:30`, `1:30:15`
/// - 単位なしの整数(秒): `3600`
///
/// 先頭に`-`をつけると負の値になる。
pub fn parse_duration(s: &str) -> Result<Duration, ToolError> {
    let invalid = || ToolError::InvalidDurationFormat(s.to_string());
    let value = s.trim().to_lowercase();
    if value.is_empty() {
        return Err(invalid());
    }

    if let Ok(seconds) = value.parse::<i64>() {
        return Duration::try_seconds(seconds).ok_or_else(invalid);
    }

    if let Some(caps) = CLOCK_DURATION_RE.captures(&value) {
        let hours: i64 = caps[2].parse().map_err(|_| invalid())?;
        let minutes: i64 = caps[3].parse().map_err(|_| invalid())?;
        let seconds: i64 = caps
            .get(4)
            .map(|m| m.as_str().parse::<i64>())
            .transpose()
            .map_err(|_| invalid())?
            .unwrap_or(0);
        let total = hours
            .checked_mul(3600)
            .and_then(|total| total.checked_add(minutes * 60 + seconds))
            .ok_or_else(invalid)?;
        return Duration::try_seconds(signed(caps.get(1).is_some(), total)).ok_or_else(invalid);
    }

    let caps = UNIT_DURATION_RE.captures(&value).ok_or_else(invalid)?;
    let negative = caps.get(1).is_some();
    let total = UNIT_TERM_RE
        .captures_iter(&caps[2])
        .try_fold(0.0_f64, |acc, term| {
            let amount: f64 = term[1].parse().map_err(|_| invalid())?;
            let unit_seconds = match &term[2] {
                "d" => 86_400.0,
                "h" => 3_600.0,
                "m" => 60.0,
                "s" => 1.0,
                _ => return Err(invalid()),
            };
            Ok(acc + amount * unit_seconds)
        })?;

    // i64にキャストすると飽和するので、範囲外はここで弾く
    if !total.is_finite() || total.round() >= i64::MAX as f64 {
        return Err(invalid());
    }
    Duration::try_seconds(signed(negative, total.round() as i64)).ok_or_else(invalid)
}

fn signed(negative: bool, seconds: i64) -> i64 {
    if negative {
        -seconds
    } else {
        seconds
    }
}

/// 時間の長さを`[-]H:MM:SS`形式で表示する。
pub fn format_duration(duration: &Duration) -> String {
    let total = duration.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();

    format!(
        "{}{}:{:02}:{:02}",
        sign,
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// 秒数を`[-]H:MM:SS`形式で表示する。
pub fn format_seconds(seconds: i64) -> String {
    format_duration(&Duration::seconds(seconds))
}

/// 日時をLocalタイムゾーンで表示する。
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    format_timestamp_in(timestamp, &Local)
}

/// 日時を指定したタイムゾーンで表示する。
pub fn format_timestamp_in<Tz: TimeZone>(timestamp: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    timestamp
        .with_timezone(tz)
        .format("%a %Y-%m-%d %H:%M:%S")
        .to_string()
}

/// 指定したタイムゾーンでの日付の00:00:00を返す。
///
/// 00:00:00が存在しない日(夏時間の切り替え)は、その日の最初に存在する時刻(分単位)を返す。
pub fn start_of_day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Result<DateTime<Utc>> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .context("Failed to set hour, minute, and second")?;
    let (local, datetime) = (0..24 * 60)
        .map(|minutes| midnight + Duration::minutes(minutes))
        .find_map(|local| {
            tz.from_local_datetime(&local)
                .earliest()
                .map(|datetime| (local, datetime))
        })
        .with_context(|| format!("No valid local time on {}", date))?;
    if local != midnight {
        warn!("Midnight does not exist on {}, using {}", date, local.time());
    }

    Ok(datetime.to_utc())
}

/// 指定した日時と同じ日(指定したタイムゾーン)の00:00:00を返す。
pub fn local_midnight<Tz: TimeZone>(timestamp: &DateTime<Utc>, tz: &Tz) -> Result<DateTime<Utc>> {
    let date = timestamp.with_timezone(tz).date_naive();
    start_of_day(date, tz)
}
