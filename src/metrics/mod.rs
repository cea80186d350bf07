use crate::providers::ProviderKind;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 单个 provider 的转发计数
#[derive(Debug, Default)]
struct ProviderCounters {
    success: AtomicU64,
    failure: AtomicU64,
}

/// 按 provider 统计的转发结果
#[derive(Debug, Default)]
pub struct Metrics {
    providers: [ProviderCounters; 3],
    rejected_requests: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录成功转发
    pub fn record_success(&self, provider: ProviderKind) {
        self.providers[provider.index()]
            .success
            .fetch_add(1, Ordering::Relaxed);
    }

    /// 记录上游调用失败
    pub fn record_failure(&self, provider: ProviderKind) {
        self.providers[provider.index()]
            .failure
            .fetch_add(1, Ordering::Relaxed);
    }

    /// 记录未到达上游就被拒绝的请求（参数错误、缺少密钥等）
    pub fn record_rejected(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn successes(&self, provider: ProviderKind) -> u64 {
        self.providers[provider.index()]
            .success
            .load(Ordering::Relaxed)
    }

    pub fn failures(&self, provider: ProviderKind) -> u64 {
        self.providers[provider.index()]
            .failure
            .load(Ordering::Relaxed)
    }

    /// 导出 Prometheus 格式
    pub fn export_prometheus(&self) -> String {
        let mut out = String::from(
            "# HELP chatrelay_chat_requests_total Chat requests relayed to providers\n\
             # TYPE chatrelay_chat_requests_total counter\n",
        );
        for kind in ProviderKind::ALL {
            let _ = writeln!(
                out,
                "chatrelay_chat_requests_total{{provider=\"{}\",outcome=\"success\"}} {}",
                kind,
                self.successes(kind)
            );
            let _ = writeln!(
                out,
                "chatrelay_chat_requests_total{{provider=\"{}\",outcome=\"failure\"}} {}",
                kind,
                self.failures(kind)
            );
        }
        let _ = write!(
            out,
            "# HELP chatrelay_chat_requests_rejected Chat requests rejected before reaching a provider\n\
             # TYPE chatrelay_chat_requests_rejected counter\n\
             chatrelay_chat_requests_rejected {}\n",
            self.rejected_requests.load(Ordering::Relaxed)
        );
        out
    }
}

/// 获取全局指标实例
pub fn global_metrics() -> &'static Arc<Metrics> {
    use once_cell::sync::Lazy;
    static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| Arc::new(Metrics::new()));
    &METRICS
}
