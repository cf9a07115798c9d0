use std::{fmt, str::FromStr};

/// ログの重要度
///
/// 重要度の高い順に並んでいる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// サービス全体が停止する（または停止させるべき）最も深刻なエラー
    Fatal,
    /// 処理は継続できるが、すぐに修正しなければならないエラー
    Error,
    /// 処理は継続できるが、注意を払うべき問題
    Warn,
    /// 業務イベントの情報
    Info,
    /// 開発時のデバッグ情報
    Debug,
}

impl Level {
    /// 小文字の名前を返却する。
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Fatal => "fatal",
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 不明なログレベル名
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level: {0:?}")]
pub struct ParseLevelError(String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fatal" => Ok(Level::Fatal),
            "error" => Ok(Level::Error),
            "warn" => Ok(Level::Warn),
            "info" => Ok(Level::Info),
            "debug" => Ok(Level::Debug),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Level::Error,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::INFO => Level::Info,
            // traceはdebugにまとめる
            tracing::Level::DEBUG | tracing::Level::TRACE => Level::Debug,
        }
    }
}
