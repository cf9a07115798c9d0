//! Buffered Rolling File Appender
//!
//! ----------------------------------------------------------------------------
//!
//! このクレートは、ログをメモリに蓄積し、まとめてファイルに書き込むロガーを提供する。
//! ログは`Logger`（`Accumulator`を共有するハンドル）に記録され、次のいずれかの条件で
//! `RotatingFileWriter`によりファイルへ追記される。
//!
//! - 蓄積した件数が`auto_flush`に達したとき
//! - プロセスの常駐メモリがログファイルの最大サイズ以上になったとき
//! - `flush`、`close`を呼び出したとき、または最後のハンドルが破棄されたとき
//!
//! 書き込みはファイルの排他ロック（advisory lock）の中で行うため、複数のプロセスが
//! 同じファイルに追記しても行が混ざらない。書き込み中のファイルが最大サイズを超えている場合、
//! 書き込む前に`{name}.1`〜`{name}.{max_backlog_files}`へローテーションし、
//! 最も古いファイルを削除する。
//!
//! ```ignore
//! use buffered_rolling_file_appender::{Logger, LoggerConfig};
//!
//! let logger = Logger::new(LoggerConfig::new("/var/log/app").with_max_backlog_files(3))?;
//! logger.info("started", "main")?;
//! logger.close()?;
//! ```

pub mod accumulator;
pub mod appenders;
pub mod config;
pub mod entry;
pub mod error;
pub mod layer;
pub mod level;
pub mod logger;
pub mod memory;

pub use accumulator::Accumulator;
pub use appenders::{RotatingFileWriter, RotationReport};
pub use config::LoggerConfig;
pub use entry::{LogEntry, SourceLocation};
pub use error::{Error, Result, RotationAction, RotationStepError};
pub use layer::BufferedLayer;
pub use level::Level;
pub use logger::Logger;
pub use memory::{MemoryProbe, ProcessMemory};
