use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    mem,
    net::IpAddr,
    path::{Path, PathBuf},
};

use fs4::fs_std::FileExt;
use regex::Regex;
use time::UtcOffset;
use tracing::{debug, warn};

use crate::{
    config::LoggerConfig,
    entry::{format_line, LogEntry},
    error::{Error, Result, RotationAction, RotationStepError},
};

/// ローテーションの結果
///
/// 失敗した手順は伝播させずにここへ記録する。
#[derive(Debug, Default)]
pub struct RotationReport {
    pub skipped: Vec<RotationStepError>,
}

impl RotationReport {
    /// スキップされた手順の数を返却する。
    pub fn skipped_steps(&self) -> usize {
        self.skipped.len()
    }

    /// すべての手順が成功したかを返却する。
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// サイズでローテーションするログファイルライター
///
/// 書き込み中のファイルは`{log_file_name}`、ローテーションしたファイルは
/// `{log_file_name}.1`（最新）から`{log_file_name}.{max_backlog_files}`（最古）となる。
#[derive(Debug)]
pub struct RotatingFileWriter {
    log_directory: PathBuf,
    log_file_name: String,
    max_file_size: u64,
    max_backlog_files: u32,
    host_addr: IpAddr,
    offset: UtcOffset,
    pid: u32,
    backlog_pattern: Regex,
}

impl RotatingFileWriter {
    /// `RotatingFileWriter`を作成する。
    ///
    /// # Arguments
    ///
    /// * config: ロガーの設定。ログディレクトリはここで検証する。
    ///
    /// # Returns
    ///
    /// `RotatingFileWriter`インスタンス。ディレクトリが不正な場合は`Error::Configuration`。
    pub fn new(config: &LoggerConfig) -> Result<Self> {
        let config = config.clone().validate()?;
        let backlog_pattern = create_backlog_pattern(config.log_file_name())
            .map_err(|e| Error::configuration(config.log_directory(), e.to_string()))?;

        Ok(Self {
            log_directory: config.log_directory().to_path_buf(),
            log_file_name: config.log_file_name().to_string(),
            max_file_size: config.max_file_size_kb().saturating_mul(1024),
            max_backlog_files: config.max_backlog_files(),
            host_addr: config.host_addr(),
            // マルチスレッドになると取得できないことがあるため、作成時に一度だけ取得する
            offset: UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
            pid: std::process::id(),
            backlog_pattern,
        })
    }

    /// 書き込み中のログファイルのパスを返却する。
    pub fn active_path(&self) -> PathBuf {
        self.log_directory.join(&self.log_file_name)
    }

    /// `index`番目のバックログファイルのパスを返却する。
    pub fn backlog_path(&self, index: u32) -> PathBuf {
        self.log_directory
            .join(format!("{}.{}", self.log_file_name, index))
    }

    pub fn log_directory(&self) -> &Path {
        &self.log_directory
    }

    /// ローテーションする閾値（バイト）
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn max_backlog_files(&self) -> u32 {
        self.max_backlog_files
    }

    /// ログをまとめてファイルに追記する。
    ///
    /// ファイルを排他ロックしてからサイズを確認し、閾値を超えていればローテーションして
    /// 新しいファイルに書き込む。バッチのすべての行は1回の書き込みで追記する。
    ///
    /// # 引数
    ///
    /// - entries: 書き込むログ。記録した順に並んでいること。
    ///
    /// # 戻り値
    ///
    /// ローテーションした場合はその結果。
    pub fn persist(&self, entries: &[LogEntry]) -> Result<Option<RotationReport>> {
        if entries.is_empty() {
            return Ok(None);
        }

        let mut buffer = String::new();
        for entry in entries {
            buffer.push_str(&format_line(entry, self.pid, self.host_addr, self.offset)?);
        }

        let path = self.active_path();
        let persistence = |e: io::Error| Error::persistence(&path, e);

        let mut file = self.lock_active().map_err(persistence)?;
        let size = file.metadata().map_err(persistence)?.len();

        let mut report = None;
        if size > self.max_file_size {
            report = Some(self.rotate());
            // 名前の変更に失敗した場合、パスはロック中のファイルのままなので開き直さない
            // （同じファイルを別に開いてロックすると自分のロックを待ち続ける）
            if !is_same_file(&file, &path).map_err(persistence)? {
                // 古いファイルのロックは、新しいファイルをロックしてから解放する
                let fresh = self.lock_active().map_err(persistence)?;
                drop(mem::replace(&mut file, fresh));
            }
        }

        file.write_all(buffer.as_bytes()).map_err(persistence)?;
        file.flush().map_err(persistence)?;
        FileExt::unlock(&file).map_err(persistence)?;

        Ok(report)
    }

    /// ログファイルをローテーションする。
    ///
    /// `{name}.{max}`を削除し、`{name}.{i}`を`{name}.{i+1}`に、書き込み中のファイルを
    /// `{name}.1`に名前を変更する。複数のプロセスが同時にローテーションすることがあるため、
    /// 個々の手順の失敗は無視して続行し、結果に記録する。
    pub fn rotate(&self) -> RotationReport {
        let mut report = RotationReport::default();
        let max = self.max_backlog_files;

        self.prune_backlog(&mut report);

        for i in (1..=max).rev() {
            let rotated = self.backlog_path(i);
            if !rotated.is_file() {
                continue;
            }
            if i == max {
                record_step(&mut report, RotationAction::Remove, &rotated, || {
                    fs::remove_file(&rotated)
                });
            } else {
                let next = self.backlog_path(i + 1);
                record_step(&mut report, RotationAction::Rename, &rotated, || {
                    fs::rename(&rotated, &next)
                });
            }
        }

        let active = self.active_path();
        if active.is_file() {
            let first = self.backlog_path(1);
            record_step(&mut report, RotationAction::Rename, &active, || {
                fs::rename(&active, &first)
            });
        }

        debug!(
            file = %active.display(),
            skipped = report.skipped_steps(),
            "rotated log files"
        );

        report
    }

    /// 存在するバックログファイルを番号順に返却する。
    pub fn backlog_files(&self) -> io::Result<Vec<(u32, PathBuf)>> {
        let mut files = Vec::new();
        for dir_entry in fs::read_dir(&self.log_directory)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(index) = self
                .backlog_pattern
                .captures(name)
                .and_then(|caps| caps[1].parse::<u32>().ok())
            else {
                continue;
            };
            files.push((index, dir_entry.path()));
        }
        files.sort_by_key(|(index, _)| *index);

        Ok(files)
    }

    /// 保持数を超える番号のバックログファイルを削除する。
    ///
    /// 保持数を減らして起動し直したときに残るファイルが対象。
    fn prune_backlog(&self, report: &mut RotationReport) {
        let files = match self.backlog_files() {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "failed to list backlog files");
                return;
            }
        };
        for (_, path) in files
            .into_iter()
            .filter(|(index, _)| *index > self.max_backlog_files)
        {
            record_step(report, RotationAction::Remove, &path, || fs::remove_file(&path));
        }
    }

    /// 書き込み中のファイルを開いて排他ロックする。
    ///
    /// ロックを待つ間に他のプロセスがローテーションした場合、開いたファイルは
    /// すでにバックログになっているため、開き直す。
    fn lock_active(&self) -> io::Result<File> {
        let path = self.active_path();
        loop {
            let file = create_writer(&path)?;
            FileExt::lock_exclusive(&file)?;
            if is_same_file(&file, &path)? {
                return Ok(file);
            }
            debug!(file = %path.display(), "log file rotated while waiting for lock");
        }
    }
}

/// バックログファイル名にマッチする正規表現を作成する。
///
/// # 引数
///
/// - log_file_name: ログファイル名。
///
/// # 戻り値
///
/// `{log_file_name}.{番号}`にマッチし、番号をキャプチャする正規表現。
fn create_backlog_pattern(log_file_name: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!(r"^{}\.(\d+)$", regex::escape(log_file_name)))
}

/// ライターを作成する。
///
/// ファイルが存在しない場合は空のファイルを作成する。ディレクトリは作成しない。
///
/// # 引数
///
/// * path: ログファイルパス。
///
/// # 戻り値
///
/// 追記モードで開いた`File`インスタンス。
fn create_writer(path: &Path) -> io::Result<File> {
    OpenOptions::new().append(true).create(true).open(path)
}

#[cfg(unix)]
fn is_same_file(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let opened = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(opened.dev() == current.dev() && opened.ino() == current.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn is_same_file(_file: &File, path: &Path) -> io::Result<bool> {
    // 開いているファイルの名前は変更できないため、存在すれば同じファイル
    Ok(path.is_file())
}

fn record_step<F>(report: &mut RotationReport, action: RotationAction, path: &Path, step: F)
where
    F: FnOnce() -> io::Result<()>,
{
    if let Err(source) = step() {
        let skipped = RotationStepError {
            action,
            path: path.to_path_buf(),
            source,
        };
        warn!(error = %skipped, "skipped log rotation step");
        report.skipped.push(skipped);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{mpsc, Arc},
        thread,
        time::Duration,
    };

    use super::*;
    use crate::{entry::SourceLocation, level::Level};

    fn entry(message: &str) -> LogEntry {
        LogEntry::new(message, Level::Info, "test", SourceLocation::new("lib.rs", 1))
    }

    fn writer(dir: &Path, max_file_size_kb: u64, max_backlog_files: u32) -> RotatingFileWriter {
        let config = LoggerConfig::new(dir)
            .with_log_file_name("app.log")
            .with_max_file_size_kb(max_file_size_kb)
            .with_max_backlog_files(max_backlog_files);
        RotatingFileWriter::new(&config).unwrap()
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_create_backlog_pattern() {
        let pattern = create_backlog_pattern("app.log").unwrap();

        assert!(pattern.is_match("app.log.3"));
        assert!(!pattern.is_match("app.log"));
        assert!(!pattern.is_match("appxlog.3"));
        assert!(!pattern.is_match("app.log.3.gz"));
    }

    #[test]
    fn test_new_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggerConfig::new(dir.path().join("missing"));

        assert!(matches!(
            RotatingFileWriter::new(&config),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_persist_appends_lines_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), 1024, 5);

        writer.persist(&[entry("a"), entry("b")]).unwrap();
        writer.persist(&[entry("c")]).unwrap();

        let content = read(&writer.active_path());
        let messages: Vec<_> = content
            .lines()
            .map(|line| line.rsplit(": ").next().unwrap().trim_end())
            .collect();
        assert_eq!(vec!["a", "b", "c"], messages);
        assert!(content.ends_with(" \n"));
    }

    #[test]
    fn test_persist_empty_batch_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), 1024, 5);

        assert!(writer.persist(&[]).unwrap().is_none());
        assert!(!writer.active_path().exists());
    }

    #[test]
    fn test_persist_rotates_oversized_file_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), 1, 5);
        let old = "x".repeat(1025);
        fs::write(writer.active_path(), &old).unwrap();

        let report = writer.persist(&[entry("fresh")]).unwrap();

        assert!(report.unwrap().is_clean());
        assert_eq!(old, read(&writer.backlog_path(1)));
        let content = read(&writer.active_path());
        assert_eq!(1, content.lines().count());
        assert!(content.contains("fresh"));
    }

    /// `persist`を別スレッドで実行し、戻らなければ失敗させる
    fn persist_within(
        writer: RotatingFileWriter,
        batch: Vec<LogEntry>,
        timeout: Duration,
    ) -> Option<RotationReport> {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let result = writer.persist(&batch).map_err(|e| e.to_string());
            tx.send(result).ok();
        });
        rx.recv_timeout(timeout)
            .expect("persist did not return")
            .unwrap()
    }

    #[test]
    fn test_persist_writes_to_locked_file_when_active_rename_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), 1, 5);
        let active = writer.active_path();
        // 名前の変更先が空でないディレクトリなので失敗する
        fs::create_dir(writer.backlog_path(1)).unwrap();
        fs::write(writer.backlog_path(1).join("keep"), "").unwrap();
        let old = "x".repeat(2000);
        fs::write(&active, &old).unwrap();

        let report = persist_within(writer, vec![entry("fresh")], Duration::from_secs(5));

        let report = report.unwrap();
        assert_eq!(1, report.skipped_steps());
        assert_eq!(RotationAction::Rename, report.skipped[0].action);
        let content = read(&active);
        assert!(content.starts_with(&old));
        assert!(content.ends_with("fresh \n"));
    }

    #[cfg(unix)]
    #[test]
    fn test_persist_reopens_file_rotated_while_waiting_for_lock() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), 1024, 5);
        let active = writer.active_path();
        let first = writer.backlog_path(1);
        fs::write(&active, "old\n").unwrap();

        // 他のプロセスの代わりにロックを保持する
        let holder = create_writer(&active).unwrap();
        FileExt::lock_exclusive(&holder).unwrap();

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let result = writer.persist(&[entry("fresh")]).map_err(|e| e.to_string());
            tx.send(result).ok();
        });
        thread::sleep(Duration::from_millis(200));

        // ロックを保持したままローテーションしてから解放する
        fs::rename(&active, &first).unwrap();
        FileExt::unlock(&holder).unwrap();
        drop(holder);

        rx.recv_timeout(Duration::from_secs(5))
            .expect("persist did not return")
            .unwrap();
        assert_eq!("old\n", read(&first));
        let content = read(&active);
        assert_eq!(1, content.lines().count());
        assert!(content.ends_with("fresh \n"));
    }

    #[test]
    fn test_persist_does_not_rotate_at_exact_cap() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), 1, 5);
        fs::write(writer.active_path(), "x".repeat(1024)).unwrap();

        assert!(writer.persist(&[entry("a")]).unwrap().is_none());
        assert!(!writer.backlog_path(1).exists());
    }

    #[test]
    fn test_active_file_stays_within_cap_plus_last_batch() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), 1, 3);

        for i in 0..200 {
            let batch = vec![entry(&format!("message {}", i)); 3];
            let before = fs::metadata(writer.active_path())
                .map(|m| m.len())
                .unwrap_or(0);
            writer.persist(&batch).unwrap();
            let after = fs::metadata(writer.active_path()).unwrap().len();
            let written = if before > writer.max_file_size() {
                after
            } else {
                after - before
            };
            assert!(after <= writer.max_file_size() + written);
        }

        let indices: Vec<_> = writer
            .backlog_files()
            .unwrap()
            .into_iter()
            .map(|(index, _)| index)
            .collect();
        assert_eq!(vec![1, 2, 3], indices);
    }

    #[test]
    fn test_rotate_keeps_newest_backlog_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), 1024, 2);

        fs::write(writer.active_path(), "A").unwrap();
        writer.rotate();
        assert_eq!("A", read(&writer.backlog_path(1)));

        fs::write(writer.active_path(), "B").unwrap();
        writer.rotate();
        assert_eq!("B", read(&writer.backlog_path(1)));
        assert_eq!("A", read(&writer.backlog_path(2)));

        fs::write(writer.active_path(), "C").unwrap();
        let report = writer.rotate();
        assert!(report.is_clean());
        assert_eq!("C", read(&writer.backlog_path(1)));
        assert_eq!("B", read(&writer.backlog_path(2)));
        assert!(!writer.backlog_path(3).exists());
        assert!(!writer.active_path().exists());
    }

    #[test]
    fn test_rotate_prunes_stray_backlog_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), 1024, 2);
        fs::write(writer.backlog_path(5), "stale").unwrap();
        fs::write(writer.active_path(), "A").unwrap();

        writer.rotate();

        assert!(!writer.backlog_path(5).exists());
        assert_eq!(1, writer.backlog_files().unwrap().len());
    }

    #[test]
    fn test_rotate_reports_skipped_steps() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer(dir.path(), 1024, 2);
        // 名前の変更先が空でないディレクトリなので失敗する
        fs::create_dir(writer.backlog_path(1)).unwrap();
        fs::write(writer.backlog_path(1).join("keep"), "").unwrap();
        fs::write(writer.active_path(), "A").unwrap();

        let report = writer.rotate();

        assert_eq!(1, report.skipped_steps());
        assert_eq!(RotationAction::Rename, report.skipped[0].action);
        assert_eq!("A", read(&writer.active_path()));
    }

    #[test]
    fn test_concurrent_writers_keep_lines_intact() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Arc::new(dir);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let dir = Arc::clone(&dir);
                thread::spawn(move || {
                    let writer = writer(dir.path(), 4, 50);
                    for i in 0..50 {
                        let batch: Vec<_> = (0..5)
                            .map(|j| entry(&format!("thread {} batch {} line {}", t, i, j)))
                            .collect();
                        writer.persist(&batch).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let writer = writer(dir.path(), 4, 50);
        let mut lines = 0;
        let mut paths: Vec<_> = writer
            .backlog_files()
            .unwrap()
            .into_iter()
            .map(|(_, path)| path)
            .collect();
        paths.push(writer.active_path());
        for path in paths {
            for line in read(&path).lines() {
                assert!(line.contains("thread "), "{}", line);
                assert!(line.ends_with(' '), "{}", line);
                lines += 1;
            }
        }
        assert_eq!(4 * 50 * 5, lines);
    }
}
