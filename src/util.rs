// src/util.rs
use std::sync::atomic::{AtomicBool, Ordering};

/// One-way shutdown signal between the thread calling stop and the worker.
pub struct BarrierFlag(AtomicBool);

impl Default for BarrierFlag {
    fn default() -> Self {
        Self(AtomicBool::new(false))
    }
}

impl BarrierFlag {
    #[inline]
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }
    #[inline]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cold]
fn cold() {}

/// Branch-prediction hints for the decoder's hot path: the compiler lays
/// the `cold()` edge out of line.
#[inline(always)]
pub fn likely(b: bool) -> bool {
    if !b {
        cold();
    }
    b
}

#[inline(always)]
pub fn unlikely(b: bool) -> bool {
    if b {
        cold();
    }
    b
}

#[inline]
pub fn spin_wait(mut loops: u32) {
    while loops > 0 {
        std::hint::spin_loop();
        loops -= 1;
    }
}

#[inline]
pub fn pin_to_core_if_set(core_index: Option<usize>) {
    if let Some(idx) = core_index {
        if let Some(cores) = core_affinity::get_core_ids() {
            if let Some(core_id) = cores.into_iter().find(|c| c.id == idx) {
                let _ = core_affinity::set_for_current(core_id);
            }
        }
    }
}

#[inline]
pub fn lock_all_memory_if(cfg: bool) {
    if !cfg {
        return;
    }
    #[cfg(target_os = "linux")]
    unsafe {
        // Best-effort raise RLIMIT_MEMLOCK
        let lim = libc::rlimit {
            rlim_cur: libc::RLIM_INFINITY,
            rlim_max: libc::RLIM_INFINITY,
        };
        let _ = libc::setrlimit(libc::RLIMIT_MEMLOCK, &lim);
        let flags = libc::MCL_CURRENT | libc::MCL_FUTURE;
        let _ = libc::mlockall(flags);
    }
}

#[inline]
pub fn set_realtime_priority_if(priority: Option<i32>) {
    #[cfg(target_os = "linux")]
    if let Some(pri) = priority {
        unsafe {
            let param = libc::sched_param {
                sched_priority: pri,
            };
            let _ = libc::sched_setscheduler(0, libc::SCHED_FIFO, &param);
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = priority;
    }
}
