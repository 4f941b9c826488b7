use std::time::{Duration, Instant};

use crate::config::ScrollOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSignal {
    LoadNext,
}

/// Throttled sampler for the "far from top" flag that drives the
/// scroll-to-top affordance. Leading-edge, with the latest dropped sample
/// applied by `tick` once the interval has passed.
#[derive(Debug, Clone)]
pub struct ScrollSampler {
    interval: Duration,
    threshold: f64,
    last_sample: Option<Instant>,
    pending: Option<f64>,
    far_from_top: bool,
}

impl ScrollSampler {
    pub fn new(interval: Duration, threshold: f64) -> Self {
        Self {
            interval,
            threshold,
            last_sample: None,
            pending: None,
            far_from_top: false,
        }
    }

    pub fn far_from_top(&self) -> bool {
        self.far_from_top
    }

    pub fn sample(&mut self, offset: f64, now: Instant) -> Option<bool> {
        if !self.ready(now) {
            self.pending = Some(offset);
            return None;
        }
        self.pending = None;
        self.apply(offset, now)
    }

    pub fn tick(&mut self, now: Instant) -> Option<bool> {
        if !self.ready(now) {
            return None;
        }
        let offset = self.pending.take()?;
        self.apply(offset, now)
    }

    pub fn reset(&mut self) {
        self.last_sample = None;
        self.pending = None;
    }

    fn ready(&self, now: Instant) -> bool {
        self.last_sample
            .map(|last| now.saturating_duration_since(last) >= self.interval)
            .unwrap_or(true)
    }

    fn apply(&mut self, offset: f64, now: Instant) -> Option<bool> {
        self.last_sample = Some(now);
        let far = offset > self.threshold;
        if far == self.far_from_top {
            return None;
        }
        self.far_from_top = far;
        Some(far)
    }
}

/// Forwards "sentinel is intersecting" reports. Repeats are passed through
/// untouched; the pagination in-flight guard absorbs them.
#[derive(Debug, Clone, Default)]
pub struct SentinelObserver {
    intersecting: bool,
}

impl SentinelObserver {
    pub fn observe(&mut self, intersecting: bool) -> Option<TriggerSignal> {
        self.intersecting = intersecting;
        intersecting.then_some(TriggerSignal::LoadNext)
    }

    pub fn is_intersecting(&self) -> bool {
        self.intersecting
    }
}

/// Owns the scroll sampler and the sentinel observer for the lifetime of the
/// feed view. Events arriving while detached are ignored.
#[derive(Debug, Clone)]
pub struct ScrollTrigger {
    sampler: ScrollSampler,
    sentinel: SentinelObserver,
    attached: bool,
}

impl ScrollTrigger {
    pub fn new(options: &ScrollOptions) -> Self {
        Self {
            sampler: ScrollSampler::new(options.throttle, f64::from(options.far_from_top_px)),
            sentinel: SentinelObserver::default(),
            attached: false,
        }
    }

    pub fn attach(&mut self) {
        self.attached = true;
    }

    pub fn detach(&mut self) {
        self.attached = false;
        self.sampler.reset();
        self.sentinel = SentinelObserver::default();
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn far_from_top(&self) -> bool {
        self.sampler.far_from_top()
    }

    pub fn on_scroll(&mut self, offset: f64, now: Instant) -> Option<bool> {
        if !self.attached {
            return None;
        }
        self.sampler.sample(offset, now)
    }

    pub fn tick(&mut self, now: Instant) -> Option<bool> {
        if !self.attached {
            return None;
        }
        self.sampler.tick(now)
    }

    pub fn on_intersection(&mut self, intersecting: bool) -> Option<TriggerSignal> {
        if !self.attached {
            return None;
        }
        self.sentinel.observe(intersecting)
    }
}
