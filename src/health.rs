/*
 * Meeting Assistant CLI - Rust Edition
 * Copyright (c) 2024 Meeting Assistant Contributors
 *
 * This work is licensed under the Creative Commons Attribution-NonCommercial 4.0 International License.
 * To view a copy of this license, visit http://creativecommons.org/licenses/by-nc/4.0/
 *
 * You are free to share and adapt this work for non-commercial purposes with attribution.
 * Commercial use is prohibited without explicit written permission.
 *
 * For commercial licensing inquiries, please contact the project maintainers.
 */

//! `HealthChecker`: periodic probe of the primary transcriber, spec section
//! 4.5. Ticks on `health_check_interval`, tracks `consecutive_failures`, and
//! reports unhealthy once that count reaches `health_check_fail_threshold`.
//! A successful probe resets the counter to zero.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::transcriber::Transcriber;

pub struct HealthChecker {
    transcriber: Arc<dyn Transcriber>,
    interval: Duration,
    fail_threshold: u32,
    consecutive_failures: AtomicU32,
    unhealthy: AtomicBool,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HealthChecker {
    pub fn new(transcriber: Arc<dyn Transcriber>, interval: Duration, fail_threshold: u32) -> Arc<Self> {
        Arc::new(Self {
            transcriber,
            interval,
            fail_threshold: fail_threshold.max(1),
            consecutive_failures: AtomicU32::new(0),
            unhealthy: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        })
    }

    /// Spawns the polling loop. Safe to call once per checker instance.
    pub fn start(self: &Arc<Self>) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.interval);
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        this.probe_once().await;
                    }
                }
            }
        });
        *self.handle.lock() = Some(handle);
    }

    async fn probe_once(&self) {
        match self.transcriber.health_check().await {
            Ok(()) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                self.unhealthy.store(false, Ordering::SeqCst);
            }
            Err(err) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::warn!(
                    transcriber = self.transcriber.name(),
                    consecutive_failures = failures,
                    error = %err,
                    "transcriber health probe failed"
                );
                if failures >= self.fail_threshold {
                    self.unhealthy.store(true, Ordering::SeqCst);
                }
            }
        }
    }

    pub fn is_unhealthy(&self) -> bool {
        self.unhealthy.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }

    #[cfg(test)]
    pub(crate) async fn probe_once_for_test(&self) {
        self.probe_once().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcriber::{TranscribeOptions, TranscriptionResult};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool as StdAtomicBool;

    struct FlakyTranscriber {
        healthy: StdAtomicBool,
    }

    #[async_trait]
    impl Transcriber for FlakyTranscriber {
        async fn transcribe(
            &self,
            _wav_path: &std::path::Path,
            _options: &TranscribeOptions,
        ) -> anyhow::Result<TranscriptionResult> {
            unreachable!("not exercised in health tests")
        }

        async fn health_check(&self) -> anyhow::Result<()> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                anyhow::bail!("down")
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn reports_unhealthy_after_threshold_consecutive_failures() {
        let transcriber: Arc<dyn Transcriber> = Arc::new(FlakyTranscriber {
            healthy: StdAtomicBool::new(false),
        });
        let checker = HealthChecker::new(transcriber, Duration::from_secs(3600), 3);

        checker.probe_once_for_test().await;
        assert!(!checker.is_unhealthy());
        checker.probe_once_for_test().await;
        assert!(!checker.is_unhealthy());
        checker.probe_once_for_test().await;
        assert!(checker.is_unhealthy());
    }

    #[tokio::test]
    async fn success_resets_failure_counter() {
        let healthy = Arc::new(StdAtomicBool::new(false));
        struct Wrapper(Arc<StdAtomicBool>);
        #[async_trait]
        impl Transcriber for Wrapper {
            async fn transcribe(
                &self,
                _wav_path: &std::path::Path,
                _options: &TranscribeOptions,
            ) -> anyhow::Result<TranscriptionResult> {
                unreachable!()
            }
            async fn health_check(&self) -> anyhow::Result<()> {
                if self.0.load(Ordering::SeqCst) {
                    Ok(())
                } else {
                    anyhow::bail!("down")
                }
            }
            fn name(&self) -> &str {
                "wrapper"
            }
        }

        let transcriber: Arc<dyn Transcriber> = Arc::new(Wrapper(healthy.clone()));
        let checker = HealthChecker::new(transcriber, Duration::from_secs(3600), 3);
        checker.probe_once_for_test().await;
        checker.probe_once_for_test().await;
        assert_eq!(checker.consecutive_failures(), 2);

        healthy.store(true, Ordering::SeqCst);
        checker.probe_once_for_test().await;
        assert_eq!(checker.consecutive_failures(), 0);
        assert!(!checker.is_unhealthy());
    }
}
