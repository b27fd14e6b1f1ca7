//! Scheduler that walks the configured targets one at a time.

use std::time::Duration;

use crate::config::{SchedulerConfig, TargetConfig};
use crate::device::DeviceApi;
use crate::events::{ErrorCode, EventLogger, EventRecord, Severity};
use crate::runner::TestRunner;

/// Outcome of one pass over the target list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub passed: usize,
    pub failed: usize,
}

/// The main scheduler that runs every target's test in turn.
pub struct Scheduler<'a, D: DeviceApi> {
    config: &'a SchedulerConfig,
    runner: TestRunner<'a, D>,
    logger: &'a EventLogger,
}

impl<'a, D: DeviceApi> Scheduler<'a, D> {
    pub fn new(config: &'a SchedulerConfig, device: &'a D, logger: &'a EventLogger) -> Self {
        Self {
            config,
            runner: TestRunner::new(device, logger, config.retry_policy()),
            logger,
        }
    }

    /// Test every target once, waiting the inter-host interval after each.
    pub async fn run_cycle(&self) -> CycleSummary {
        let mut summary = CycleSummary::default();
        tracing::info!("Starting test cycle over {} targets", self.config.targets.len());

        for target_config in &self.config.targets {
            if self.test_target(target_config).await {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }

            let wait = self.config.inter_host_interval();
            self.logger.log(
                EventRecord::new(
                    true,
                    Severity::Info,
                    format!(
                        "Waiting interHostSchedulingIntervalMilliseconds {} after rpcmIpOrFqdn {}",
                        wait.as_millis(),
                        target_config.rpcm_ip_or_fqdn
                    ),
                )
                .code(ErrorCode::InterHostWait),
            );
            tokio::time::sleep(wait).await;
        }

        tracing::info!("Test cycle finished: {} passed, {} failed", summary.passed, summary.failed);
        summary
    }

    /// Run cycles forever, waiting the inter-check interval between them.
    pub async fn run_forever(&self) {
        loop {
            self.run_cycle().await;
            self.wait_inter_check(self.config.inter_check_interval()).await;
        }
    }

    async fn wait_inter_check(&self, wait: Duration) {
        self.logger.log(
            EventRecord::new(
                true,
                Severity::Info,
                format!("Waiting interCheckIntervalMinutes {}", self.config.inter_check_interval_minutes),
            )
            .code(ErrorCode::InterCheckWait),
        );
        tokio::time::sleep(wait).await;
    }

    async fn test_target(&self, target_config: &TargetConfig) -> bool {
        let target = target_config.target();
        self.runner.run_named(&target, &target_config.test_type).await
    }
}
