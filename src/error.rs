use std::{fmt, io, path::PathBuf};

use thiserror::Error;

/// このクレートの結果型
pub type Result<T> = core::result::Result<T, Error>;

/// このクレートで発生するエラー
#[derive(Debug, Error)]
pub enum Error {
    /// ログディレクトリが不正（存在しない、ディレクトリでない、書き込めない）
    #[error("log directory {path:?} is invalid: {reason}")]
    Configuration { path: PathBuf, reason: String },

    /// ログファイルの作成、ロック、書き込みに失敗した
    #[error("failed to persist logs to {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// タイムスタンプを整形できなかった
    #[error(transparent)]
    Format(#[from] time::error::Format),
}

impl Error {
    pub(crate) fn configuration(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Configuration {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Persistence {
            path: path.into(),
            source,
        }
    }
}

/// ローテーションの手順
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationAction {
    Remove,
    Rename,
}

/// ローテーション中にスキップされた手順
///
/// 複数のプロセスが同時にローテーションすると発生し得るため、エラーとして
/// 伝播させず、`RotationReport`に記録する。
#[derive(Debug)]
pub struct RotationStepError {
    pub action: RotationAction,
    pub path: PathBuf,
    pub source: io::Error,
}

impl fmt::Display for RotationStepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self.action {
            RotationAction::Remove => "remove",
            RotationAction::Rename => "rename",
        };
        write!(f, "failed to {} {:?}: {}", action, self.path, self.source)
    }
}

impl std::error::Error for RotationStepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
