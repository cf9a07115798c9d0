use tracing::{debug, error};

use crate::{
    appenders::RotatingFileWriter,
    entry::LogEntry,
    error::Result,
    memory::MemoryProbe,
};

/// ログをメモリに蓄積し、条件を満たしたときにまとめてファイルに書き込む
///
/// 内部でロックしないため、複数のスレッドから使う場合は呼び出し側で排他すること
/// （[`Logger`](crate::Logger)は`Mutex`で排他している）。
pub struct Accumulator {
    pending: Vec<LogEntry>,
    auto_flush: usize,
    writer: RotatingFileWriter,
    probe: Box<dyn MemoryProbe>,
}

impl Accumulator {
    /// `Accumulator`を作成する。
    ///
    /// # 引数
    ///
    /// - writer: フラッシュしたログを書き込むライター。
    /// - auto_flush: 何件蓄積したらフラッシュするか。0の場合は件数でフラッシュしない。
    /// - probe: メモリ使用量でフラッシュするために使うプローブ。
    pub fn new(writer: RotatingFileWriter, auto_flush: usize, probe: Box<dyn MemoryProbe>) -> Self {
        Self {
            pending: Vec::new(),
            auto_flush,
            writer,
            probe,
        }
    }

    /// ログを蓄積する。
    ///
    /// 蓄積した件数が`auto_flush`に達したか、プロセスの常駐メモリがログファイルの
    /// 最大サイズ以上になった場合は、戻る前にフラッシュする。
    pub fn record(&mut self, entry: LogEntry) -> Result<()> {
        self.pending.push(entry);

        if self.auto_flush > 0 && self.pending.len() >= self.auto_flush {
            return self.flush();
        }
        let max_kb = self.writer.max_file_size() / 1024;
        if matches!(self.probe.resident_kb(), Some(kb) if kb >= max_kb) {
            return self.flush();
        }

        Ok(())
    }

    /// 蓄積したログをすべてファイルに書き込み、バッファを空にする。
    ///
    /// 書き込みに失敗した場合、ログはバッファに残したままエラーを返却する。
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        self.writer.persist(&self.pending)?;
        debug!(count = self.pending.len(), "flushed log entries");
        self.pending.clear();

        Ok(())
    }

    /// 蓄積したログを書き込まずに破棄し、破棄した件数を返却する。
    pub fn discard(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn writer(&self) -> &RotatingFileWriter {
        &self.writer
    }
}

impl Drop for Accumulator {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!(error = %e, lost = self.pending.len(), "failed to flush logs on shutdown");
        }
    }
}
