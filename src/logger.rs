use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    accumulator::Accumulator,
    appenders::RotatingFileWriter,
    config::LoggerConfig,
    entry::{LogEntry, SourceLocation},
    error::Result,
    level::Level,
    memory::{MemoryProbe, ProcessMemory},
};

/// 複数のスレッドで共有できるロガー
///
/// `clone`したハンドルはすべて同じバッファを共有する。最後のハンドルが破棄されたときに
/// 残ったログをフラッシュするが、終了時は`close`を呼んでエラーを確認すること。
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Mutex<Accumulator>>,
    default_category: Option<Arc<str>>,
}

impl Logger {
    /// `Logger`を作成する。
    ///
    /// ログディレクトリが不正な場合は`Error::Configuration`を返却し、ログは記録できない。
    pub fn new(config: LoggerConfig) -> Result<Self> {
        Self::with_probe(config, ProcessMemory::new())
    }

    /// メモリ使用量のプローブを指定して`Logger`を作成する。
    pub fn with_probe(config: LoggerConfig, probe: impl MemoryProbe + 'static) -> Result<Self> {
        let writer = RotatingFileWriter::new(&config)?;
        let accumulator = Accumulator::new(writer, config.auto_flush(), Box::new(probe));

        Ok(Self {
            inner: Arc::new(Mutex::new(accumulator)),
            default_category: config.default_category().map(Arc::from),
        })
    }

    /// ログを記録する。
    ///
    /// カテゴリが空の場合は、設定の既定カテゴリ、なければ呼び出し元のファイル名を使う。
    /// フラッシュが発生した場合は書き込みが終わるまで戻らない。
    #[track_caller]
    pub fn log(&self, level: Level, message: impl Into<String>, category: &str) -> Result<()> {
        self.log_at(level, message, category, SourceLocation::caller())
    }

    /// 出力場所を指定してログを記録する。
    pub fn log_at(
        &self,
        level: Level,
        message: impl Into<String>,
        category: &str,
        location: SourceLocation,
    ) -> Result<()> {
        let category = if !category.is_empty() {
            category.to_string()
        } else if let Some(default) = &self.default_category {
            default.to_string()
        } else {
            location.file_stem().to_string()
        };

        self.record(LogEntry::new(message, level, category, location))
    }

    /// 作成済みのログを記録する。
    pub fn record(&self, entry: LogEntry) -> Result<()> {
        self.inner.lock().record(entry)
    }

    #[track_caller]
    pub fn fatal(&self, message: impl Into<String>, category: &str) -> Result<()> {
        self.log(Level::Fatal, message, category)
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<String>, category: &str) -> Result<()> {
        self.log(Level::Error, message, category)
    }

    #[track_caller]
    pub fn warn(&self, message: impl Into<String>, category: &str) -> Result<()> {
        self.log(Level::Warn, message, category)
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>, category: &str) -> Result<()> {
        self.log(Level::Info, message, category)
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<String>, category: &str) -> Result<()> {
        self.log(Level::Debug, message, category)
    }

    /// 蓄積したログをファイルに書き込む。
    pub fn flush(&self) -> Result<()> {
        self.inner.lock().flush()
    }

    /// 蓄積しているログの件数
    pub fn pending(&self) -> usize {
        self.inner.lock().len()
    }

    /// 蓄積したログを書き込まずに破棄する。
    pub fn discard(&self) -> usize {
        self.inner.lock().discard()
    }

    /// 終了時に呼び出す。
    ///
    /// 残ったログをフラッシュしてハンドルを破棄する。他のハンドルがまだ残っている場合、
    /// それらは引き続き使える。
    pub fn close(self) -> Result<()> {
        self.flush()
    }

    /// 書き込み中のログファイルのパス
    pub fn active_path(&self) -> std::path::PathBuf {
        self.inner.lock().writer().active_path()
    }
}

/// `module_path!()`をカテゴリにしてログを記録する。
///
/// ```ignore
/// log_to!(logger, Level::Info, "user {} signed in", user_id)?;
/// ```
#[macro_export]
macro_rules! log_to {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $logger.log_at(
            $level,
            ::std::format!($($arg)+),
            ::std::module_path!(),
            $crate::SourceLocation::new(::std::file!(), ::std::line!()),
        )
    };
}
