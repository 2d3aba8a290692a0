pub mod due_digest;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::WorkerConfig;
use crate::store::Store;

/// Timeout for individual worker invocations (5 minutes).
const WORKER_TIMEOUT: Duration = Duration::from_secs(300);

/// Drain period before scheduler shutdown to let in-flight tasks complete.
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// 所有 worker 的枚举，编译期保证完整性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    DueDigest,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DueDigest => "due_digest",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: WorkerName,
    pub cron: &'static str,
    pub enabled: bool,
}

pub struct WorkerManager {
    store: Arc<Store>,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
}

impl WorkerManager {
    pub fn new(store: Arc<Store>, shutdown_rx: broadcast::Receiver<()>, config: &WorkerConfig) -> Self {
        Self {
            store,
            shutdown_rx,
            config: config.clone(),
        }
    }

    /// Single source of truth for all planned jobs and their cron schedules.
    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        if !self.config.is_leader {
            return Vec::new();
        }

        vec![JobSpec {
            name: WorkerName::DueDigest,
            cron: "0 */15 * * * *",
            enabled: self.config.enable_due_digest,
        }]
    }

    /// 启动调度器并阻塞到收到关闭信号；非 leader 实例直接返回。
    pub async fn start(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.config.is_leader {
            tracing::info!("Not the worker leader; review jobs stay idle on this instance");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;
        let registered = self.register_jobs(&scheduler).await;
        scheduler.start().await?;
        tracing::info!(registered, "Review worker scheduler running");

        let _ = self.shutdown_rx.recv().await;
        tracing::info!(
            drain_ms = DRAIN_TIMEOUT.as_millis() as u64,
            "Shutdown requested; draining review workers"
        );
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        if let Err(err) = scheduler.shutdown().await {
            tracing::warn!(error = %err, "Review worker scheduler did not stop cleanly");
        }
        Ok(())
    }

    /// 返回成功注册的任务数量。
    async fn register_jobs(&self, scheduler: &JobScheduler) -> usize {
        let mut registered = 0;
        for spec in self.planned_jobs() {
            if !spec.enabled {
                tracing::info!(worker = spec.name.as_str(), "Worker disabled by configuration");
                continue;
            }

            let added = match spec.name {
                WorkerName::DueDigest => {
                    let store = self.store.clone();
                    schedule(scheduler, &spec, move || {
                        let store = store.clone();
                        async move { due_digest::run(&store).await }
                    })
                    .await
                }
            };
            if added {
                registered += 1;
                tracing::info!(worker = spec.name.as_str(), cron = spec.cron, "Worker scheduled");
            }
        }
        registered
    }
}

/// 单次执行期间持有，drop 时释放，超时取消也能复位。
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 注册 cron 任务：同一 worker 不重叠执行，单次运行受 `WORKER_TIMEOUT` 限制。
async fn schedule<Fut, F>(scheduler: &JobScheduler, spec: &JobSpec, mut run: F) -> bool
where
    F: FnMut() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let worker = spec.name.as_str();
    let in_flight = Arc::new(AtomicBool::new(false));

    let job = Job::new_async(spec.cron, move |_id, _scheduler| {
        let Some(guard) = RunGuard::acquire(&in_flight) else {
            tracing::warn!(worker, "Previous run still active; skipping this tick");
            return Box::pin(async {});
        };

        let fut = run();
        Box::pin(async move {
            let started = std::time::Instant::now();
            match tokio::time::timeout(WORKER_TIMEOUT, fut).await {
                Ok(()) => tracing::debug!(
                    worker,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Worker run finished"
                ),
                Err(_) => tracing::error!(
                    worker,
                    timeout_secs = WORKER_TIMEOUT.as_secs(),
                    "Worker run exceeded its time limit"
                ),
            }
            drop(guard);
        })
    });

    let result = match job {
        Ok(job) => scheduler.add(job).await.map(|_| ()),
        Err(err) => Err(err),
    };
    if let Err(err) = result {
        tracing::error!(error = %err, cron = spec.cron, worker, "Could not schedule worker");
        return false;
    }
    true
}
