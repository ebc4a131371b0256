#![allow(unused)]
use std::cell::RefCell;
use std::time::Duration;

use log::info;

/// Timings of one Newton solve plus the continuation steps recorded so far.
#[derive(Debug, Default, Clone)]
pub struct TimingStats {
    pub jacobian_times: Vec<Duration>,
    pub linear_solve_times: Vec<Duration>,
    /// `(step, λ1, duration)` of every continuation step.
    pub step_times: Vec<(usize, f64, Duration)>,
    pub total_time: Duration,
}

impl TimingStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(feature = "timing")]
    pub fn report_solve(&self) {
        if self.jacobian_times.is_empty() {
            return;
        }
        let total_jacobian: Duration = self.jacobian_times.iter().sum();
        let total_linear: Duration = self.linear_solve_times.iter().sum();
        let overhead = self.total_time.saturating_sub(total_jacobian + total_linear);

        info!(
            "solve {:.3}s | jacobian {:.3}ms (avg {:.3}ms, {}) | linear solve {:.3}ms (avg {:.3}ms, {}) | other {:.3}ms",
            self.total_time.as_secs_f64(),
            total_jacobian.as_secs_f64() * 1e3,
            total_jacobian.as_secs_f64() * 1e3 / self.jacobian_times.len() as f64,
            self.jacobian_times.len(),
            total_linear.as_secs_f64() * 1e3,
            total_linear.as_secs_f64() * 1e3 / self.linear_solve_times.len().max(1) as f64,
            self.linear_solve_times.len(),
            overhead.as_secs_f64() * 1e3,
        );
    }

    #[cfg(not(feature = "timing"))]
    pub fn report_solve(&self) {}

    #[cfg(feature = "timing")]
    pub fn report_steps(&self) {
        for (step, lambda, elapsed) in &self.step_times {
            info!("step {step:>3} | λ1 = {lambda:.1e} | {:.3}ms", elapsed.as_secs_f64() * 1e3);
        }
    }

    #[cfg(not(feature = "timing"))]
    pub fn report_steps(&self) {}
}

#[cfg(feature = "timing")]
thread_local! {
    static TIMING_STATS: RefCell<TimingStats> = RefCell::new(TimingStats::new());
}

/// Clears the per-solve timings. Continuation step timings survive.
#[cfg(feature = "timing")]
pub fn reset_timing() {
    TIMING_STATS.with(|stats| {
        let mut s = stats.borrow_mut();
        s.jacobian_times.clear();
        s.linear_solve_times.clear();
        s.total_time = Duration::ZERO;
    });
}

#[cfg(not(feature = "timing"))]
pub fn reset_timing() {}

#[cfg(feature = "timing")]
pub fn reset_step_timing() {
    TIMING_STATS.with(|stats| stats.borrow_mut().step_times.clear());
}

#[cfg(not(feature = "timing"))]
pub fn reset_step_timing() {}

#[cfg(feature = "timing")]
fn timed<F, R>(f: F) -> (R, Duration)
where
    F: FnOnce() -> R,
{
    let start = std::time::Instant::now();
    let result = f();
    (result, start.elapsed())
}

#[cfg(feature = "timing")]
pub fn record_jacobian<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let (result, elapsed) = timed(f);
    TIMING_STATS.with(|stats| stats.borrow_mut().jacobian_times.push(elapsed));
    result
}

#[cfg(not(feature = "timing"))]
pub fn record_jacobian<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}

#[cfg(feature = "timing")]
pub fn record_linear_solve<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let (result, elapsed) = timed(f);
    TIMING_STATS.with(|stats| stats.borrow_mut().linear_solve_times.push(elapsed));
    result
}

#[cfg(not(feature = "timing"))]
pub fn record_linear_solve<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}

#[cfg(feature = "timing")]
pub fn record_step<F, R>(step: usize, lambda: f64, f: F) -> R
where
    F: FnOnce() -> R,
{
    let (result, elapsed) = timed(f);
    TIMING_STATS.with(|stats| stats.borrow_mut().step_times.push((step, lambda, elapsed)));
    result
}

#[cfg(not(feature = "timing"))]
pub fn record_step<F, R>(_step: usize, _lambda: f64, f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}

#[cfg(feature = "timing")]
pub fn finalize_timing(total_time: Duration) -> TimingStats {
    TIMING_STATS.with(|stats| {
        let mut s = stats.borrow_mut();
        s.total_time = total_time;
        s.clone()
    })
}

#[cfg(not(feature = "timing"))]
pub fn finalize_timing(_total_time: Duration) -> TimingStats {
    TimingStats::new()
}

#[cfg(feature = "timing")]
pub fn finalize_and_report(total_time: Duration) {
    finalize_timing(total_time).report_solve();
}

#[cfg(not(feature = "timing"))]
pub fn finalize_and_report(_total_time: Duration) {}

/// Logs the step timings collected since the last [`reset_step_timing`].
pub fn report_step_timing() {
    finalize_timing(Duration::ZERO).report_steps();
}
