use std::{net::IpAddr, panic::Location};

use time::{format_description::FormatItem, macros::format_description, OffsetDateTime, UtcOffset};

use crate::level::Level;

/// 行頭のタイムスタンプの書式（`yy-mm-dd HH:MM:SS.uuuuuu`）
const TIMESTAMP_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year repr:last_two]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]"
);

/// ログを出力した場所
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// 呼び出し元の場所を返却する。
    ///
    /// `#[track_caller]`の付いた関数から呼ぶと、その関数の呼び出し元になる。
    #[track_caller]
    pub fn caller() -> Self {
        Location::caller().into()
    }

    /// 既定のカテゴリに使うファイル名（拡張子なし）を返却する。
    pub(crate) fn file_stem(&self) -> &str {
        let name = self.file.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(&self.file);
        name.split('.').next().unwrap_or(name)
    }
}

impl From<&Location<'_>> for SourceLocation {
    fn from(location: &Location<'_>) -> Self {
        Self::new(location.file(), location.line())
    }
}

/// バッファに蓄積される1件のログ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    message: String,
    level: Level,
    timestamp: OffsetDateTime,
    category: String,
    location: SourceLocation,
}

impl LogEntry {
    /// 現在時刻で`LogEntry`を作成する。
    pub fn new(
        message: impl Into<String>,
        level: Level,
        category: impl Into<String>,
        location: SourceLocation,
    ) -> Self {
        Self::at(OffsetDateTime::now_utc(), message, level, category, location)
    }

    /// 指定された時刻で`LogEntry`を作成する。
    pub fn at(
        timestamp: OffsetDateTime,
        message: impl Into<String>,
        level: Level,
        category: impl Into<String>,
        location: SourceLocation,
    ) -> Self {
        Self {
            message: message.into(),
            level,
            timestamp,
            category: category.into(),
            location,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn location(&self) -> &SourceLocation {
        &self.location
    }
}

/// ログを1行の文字列に整形する。
///
/// 書式は次のとおり（行末は空白と改行）。
///
/// ```text
/// yy-mm-dd HH:MM:SS.uuuuuu <level>: [category] [pid] [ip] file line (N): message
/// ```
///
/// # 引数
///
/// - entry: 整形するログ。
/// - pid: プロセスID。
/// - host_addr: 行に出力するIPアドレス。
/// - offset: タイムスタンプを表示するタイムゾーンのオフセット。
///
/// # 戻り値
///
/// 改行を含む1行の文字列。
pub fn format_line(
    entry: &LogEntry,
    pid: u32,
    host_addr: IpAddr,
    offset: UtcOffset,
) -> Result<String, time::error::Format> {
    let timestamp = entry.timestamp.to_offset(offset).format(TIMESTAMP_FORMAT)?;

    Ok(format!(
        "{} <{}>: [{}] [{}] [{}] {} line ({}): {} \n",
        timestamp,
        entry.level,
        entry.category,
        pid,
        host_addr,
        entry.location.file,
        entry.location.line,
        entry.message,
    ))
}
