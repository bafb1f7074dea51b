// src/clock.rs
//
// Ingress time source. On x86-64 `now()` is a raw TSC read: strictly
// monotonic on a given hardware thread and far cheaper than a syscall, but
// not comparable across CPU migrations. Producers that care should pin
// themselves first (util::pin_to_core_if_set). Elsewhere it falls back to
// the monotonic clock.
//
// Calibration is an explicit one-shot that costs about a second; nothing
// here runs it lazily.

use std::sync::atomic::{AtomicU64, Ordering};

static TICKS_PER_SEC: AtomicU64 = AtomicU64::new(0);

#[inline]
pub fn now() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        unsafe { core::arch::x86_64::_rdtsc() }
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        monotonic_nanos()
    }
}

/// Monotonic wall-clock nanoseconds, used to calibrate the counter and as
/// the `now()` fallback off x86.
#[inline]
pub fn monotonic_nanos() -> u64 {
    #[cfg(target_os = "linux")]
    {
        use nix::time::{clock_gettime, ClockId};
        if let Ok(ts) = clock_gettime(ClockId::CLOCK_MONOTONIC_RAW) {
            return (ts.tv_sec() as u64) * 1_000_000_000 + (ts.tv_nsec() as u64);
        }
    }
    use std::time::Instant;
    static START: once_cell::sync::Lazy<Instant> = once_cell::sync::Lazy::new(Instant::now);
    START.elapsed().as_nanos() as u64
}

/// Measure counter ticks across a one-second wall-clock interval and store
/// the estimate for `ticks_per_sec` / `ticks_to_nanos`. Returns the
/// estimate.
pub fn calibrate() -> u64 {
    let wall0 = monotonic_nanos();
    let t0 = now();
    std::thread::sleep(std::time::Duration::from_secs(1));
    let t1 = now();
    let wall1 = monotonic_nanos();

    let elapsed_ns = (wall1 - wall0).max(1);
    let hz = t1.wrapping_sub(t0).saturating_mul(1_000_000_000) / elapsed_ns;
    TICKS_PER_SEC.store(hz, Ordering::Relaxed);
    hz
}

/// Ticks-per-second estimate from the last `calibrate` call; 0 before it.
#[inline]
pub fn ticks_per_sec() -> u64 {
    TICKS_PER_SEC.load(Ordering::Relaxed)
}

/// Convert a counter delta to nanoseconds. Identity until calibrated.
#[inline]
pub fn ticks_to_nanos(ticks: u64) -> u64 {
    let hz = ticks_per_sec();
    if hz == 0 {
        return ticks;
    }
    ((ticks as u128) * 1_000_000_000 / hz as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_advances() {
        let a = now();
        let mut sum = 0u64;
        for i in 0..1000u64 {
            sum = sum.wrapping_add(i);
        }
        std::hint::black_box(sum);
        let b = now();
        assert!(b > a);
    }

    #[test]
    fn uncalibrated_conversion_is_identity() {
        // Runs before any calibrate() in this process's test binary would
        // matter: conversion must never divide by zero.
        let t = ticks_to_nanos(12345);
        assert!(t == 12345 || ticks_per_sec() > 0);
    }
}
