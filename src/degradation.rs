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

//! `DegradationController`: selects primary vs. fallback transcriber based
//! on health-checker state, spec section 4.5.
//!
//! A chunk that fails mid-call does not itself switch the mode; only the
//! periodic health probe does (spec section 4.5/9) — this decouples
//! per-call failures from system-wide degradation to avoid thrashing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::health::HealthChecker;
use crate::transcriber::Transcriber;
use crate::types::Metrics;

pub struct DegradationController {
    primary: Arc<dyn Transcriber>,
    fallback: Arc<dyn Transcriber>,
    health_checker: Arc<HealthChecker>,
    enable_degradation: bool,
    metrics: Arc<Metrics>,
    was_degraded: AtomicBool,
}

impl DegradationController {
    pub fn new(
        primary: Arc<dyn Transcriber>,
        fallback: Arc<dyn Transcriber>,
        health_checker: Arc<HealthChecker>,
        enable_degradation: bool,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            primary,
            fallback,
            health_checker,
            enable_degradation,
            metrics,
            was_degraded: AtomicBool::new(false),
        }
    }

    /// Returns the fallback transcriber when the health checker reports
    /// unhealthy and degradation is enabled; otherwise the primary.
    pub fn get_transcriber(&self) -> Arc<dyn Transcriber> {
        if self.is_degraded() {
            if !self.was_degraded.swap(true, Ordering::SeqCst) {
                self.metrics.degradation_events.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    "ASR degraded to fallback transcriber"
                );
            }
            self.fallback.clone()
        } else {
            self.was_degraded.store(false, Ordering::SeqCst);
            self.primary.clone()
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.enable_degradation && self.health_checker.is_unhealthy()
    }
}
