use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// 常駐メモリを読み直す既定の間隔
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// プロセスのメモリ使用量を取得する
///
/// バッファのサイズではなく、プロセス全体の常駐メモリを概算として使う。
/// `record`のたびに呼ばれるため、実装は軽くしておくこと。
pub trait MemoryProbe: Send {
    /// 常駐メモリ（KB）を返却する。取得できない場合は`None`。
    fn resident_kb(&mut self) -> Option<u64>;
}

impl<F> MemoryProbe for F
where
    F: FnMut() -> Option<u64> + Send,
{
    fn resident_kb(&mut self) -> Option<u64> {
        self()
    }
}

/// `sysinfo`で現在のプロセスの常駐メモリを取得する
///
/// procfsなどの読み込みは`interval`に一度だけ行い、その間は前回の値を返却する。
pub struct ProcessMemory {
    system: System,
    pid: Option<Pid>,
    interval: Duration,
    sample: Option<(Instant, Option<u64>)>,
}

impl ProcessMemory {
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_SAMPLE_INTERVAL)
    }

    /// 常駐メモリを読み直す間隔を指定して作成する。
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
            interval,
            sample: None,
        }
    }

    fn refresh(&mut self) -> Option<u64> {
        let pid = self.pid?;
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            false,
            ProcessRefreshKind::nothing().with_memory(),
        );

        self.system.process(pid).map(|process| process.memory() / 1024)
    }
}

impl Default for ProcessMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemory {
    fn resident_kb(&mut self) -> Option<u64> {
        if let Some((sampled_at, kb)) = self.sample {
            if sampled_at.elapsed() < self.interval {
                return kb;
            }
        }

        let kb = self.refresh();
        self.sample = Some((Instant::now(), kb));
        kb
    }
}
