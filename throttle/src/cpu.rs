use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Sample the system-wide CPU utilization (0-100).
///
/// Each call reads a fresh sample over `sysinfo`'s minimum update interval;
/// nothing is cached between calls. Sampling runs on the blocking pool so the
/// measurement sleep never stalls the async executor.
pub async fn sample_cpu_percent() -> f32 {
    tokio::task::spawn_blocking(|| {
        let mut sys = sysinfo::System::new();
        // CPU usage is computed as a delta between two refreshes
        sys.refresh_cpu_usage();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_cpu_usage();
        sys.global_cpu_usage()
    })
    .await
    .expect("cpu sampling task panicked")
}

pub struct CpuLimiter {
    enabled: AtomicBool,
    max_cpu_percent: AtomicU32,
    pause_millis: AtomicU64,
}

impl CpuLimiter {
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            max_cpu_percent: AtomicU32::new(0),
            pause_millis: AtomicU64::new(0),
        }
    }

    pub fn setup(&self, max_cpu_percent: u32, pause: std::time::Duration) {
        self.max_cpu_percent
            .store(max_cpu_percent, Ordering::Release);
        self.pause_millis
            .store(pause.as_millis() as u64, Ordering::Release);
        self.enabled.store(max_cpu_percent > 0, Ordering::Release);
    }

    pub async fn wait(&self) {
        if !self.enabled.load(Ordering::Acquire) {
            return;
        }
        let max_cpu_percent = self.max_cpu_percent.load(Ordering::Acquire) as f32;
        let pause =
            std::time::Duration::from_millis(self.pause_millis.load(Ordering::Acquire));
        loop {
            let usage = sample_cpu_percent().await;
            if usage <= max_cpu_percent {
                return;
            }
            tracing::warn!("high CPU usage ({usage:.1}%), pausing sync for {pause:?}");
            tokio::time::sleep(pause).await;
        }
    }
}

impl Default for CpuLimiter {
    fn default() -> Self {
        Self::new()
    }
}
