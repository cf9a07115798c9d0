use std::{
    fs,
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
};

use crate::error::{Error, Result};

/// 既定のログファイル名
pub const DEFAULT_LOG_FILE_NAME: &str = "application.log";
/// 既定のログファイルの最大サイズ（KB）
pub const DEFAULT_MAX_FILE_SIZE_KB: u64 = 1024;
/// 既定のバックログファイル数
pub const DEFAULT_MAX_BACKLOG_FILES: u32 = 5;
/// 既定の自動フラッシュ件数
pub const DEFAULT_AUTO_FLUSH: usize = 10_000;

/// ロガーの設定
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    log_directory: PathBuf,
    log_file_name: String,
    max_file_size_kb: u64,
    max_backlog_files: u32,
    auto_flush: usize,
    host_addr: IpAddr,
    default_category: Option<String>,
}

impl LoggerConfig {
    /// `LoggerConfig`を作成する。
    ///
    /// ディレクトリはここでは検証せず、`validate`で検証する。
    ///
    /// # 引数
    ///
    /// - directory: ログファイルを作成するディレクトリ。事前に作成しておくこと。
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            log_directory: directory.as_ref().to_path_buf(),
            log_file_name: DEFAULT_LOG_FILE_NAME.to_string(),
            max_file_size_kb: DEFAULT_MAX_FILE_SIZE_KB,
            max_backlog_files: DEFAULT_MAX_BACKLOG_FILES,
            auto_flush: DEFAULT_AUTO_FLUSH,
            host_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            default_category: None,
        }
    }

    pub fn with_log_file_name(mut self, name: impl Into<String>) -> Self {
        self.log_file_name = name.into();
        self
    }

    /// ログファイルの最大サイズ（KB）を設定する。1未満は1とする。
    pub fn with_max_file_size_kb(mut self, kb: u64) -> Self {
        self.max_file_size_kb = kb.max(1);
        self
    }

    /// 残すバックログファイル数を設定する。1未満は1とする。
    pub fn with_max_backlog_files(mut self, count: u32) -> Self {
        self.max_backlog_files = count.max(1);
        self
    }

    /// 何件蓄積したらフラッシュするかを設定する。0で件数による自動フラッシュを無効にする。
    pub fn with_auto_flush(mut self, count: usize) -> Self {
        self.auto_flush = count;
        self
    }

    /// 各行に出力するIPアドレスを設定する。
    pub fn with_host_addr(mut self, addr: IpAddr) -> Self {
        self.host_addr = addr;
        self
    }

    /// カテゴリが空のときに使うカテゴリを設定する。
    pub fn with_default_category(mut self, category: impl Into<String>) -> Self {
        self.default_category = Some(category.into());
        self
    }

    pub fn log_directory(&self) -> &Path {
        &self.log_directory
    }

    pub fn log_file_name(&self) -> &str {
        &self.log_file_name
    }

    pub fn max_file_size_kb(&self) -> u64 {
        self.max_file_size_kb
    }

    pub fn max_backlog_files(&self) -> u32 {
        self.max_backlog_files
    }

    pub fn auto_flush(&self) -> usize {
        self.auto_flush
    }

    pub fn host_addr(&self) -> IpAddr {
        self.host_addr
    }

    pub fn default_category(&self) -> Option<&str> {
        self.default_category.as_deref()
    }

    /// ログディレクトリを検証し、正規化したパスに置き換えた設定を返却する。
    ///
    /// ディレクトリが存在しない、ディレクトリでない、または書き込めない場合は
    /// `Error::Configuration`を返却する。既定のディレクトリへの切り替えはしない。
    pub fn validate(mut self) -> Result<Self> {
        let directory = fs::canonicalize(&self.log_directory)
            .map_err(|e| Error::configuration(&self.log_directory, e.to_string()))?;
        let metadata = fs::metadata(&directory)
            .map_err(|e| Error::configuration(&directory, e.to_string()))?;
        if !metadata.is_dir() {
            return Err(Error::configuration(directory, "not a directory"));
        }
        // 権限ビットだけでは所有者を考慮できないため、実際にファイルを作成して確認する
        tempfile::NamedTempFile::new_in(&directory)
            .map_err(|e| Error::configuration(&directory, format!("not writable: {}", e)))?;
        if self.log_file_name.is_empty()
            || self.log_file_name.contains(|c: char| c == '/' || c == '\\')
        {
            return Err(Error::configuration(
                directory,
                format!("invalid log file name {:?}", self.log_file_name),
            ));
        }

        self.log_directory = directory;
        Ok(self)
    }
}
