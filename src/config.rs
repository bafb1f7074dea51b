// src/config.rs
use crate::protocol::MAX_FRAME_LEN;
use crate::writer::{CaptureOptions, WriteMode};
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    pub capture: Capture,
    #[serde(default)]
    pub cpu: Cpu,
    #[serde(default)]
    pub general: General,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Capture {
    pub path: PathBuf,
    pub write_mode: WriteMode, // "mmap" | "direct" | "buffered"
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize, // power of two
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize, // I/O accumulation buffer (DIRECT/BUFFERED)
    #[serde(default = "default_alignment")]
    pub alignment: usize, // DIRECT block size; must divide buffer_size
    #[serde(default = "default_initial_file_size")]
    pub initial_file_size: u64, // starting mapped size (MMAP)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cpu {
    pub producer_core: Option<usize>,
    pub writer_core: Option<usize>,
    #[serde(default)]
    pub rt_priority: Option<i32>, // SCHED_FIFO priority if set (Linux)
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    #[serde(default)]
    pub mlock_all: bool, // mlockall current+future (Linux; best-effort)
    #[serde(default = "default_spin_loops")]
    pub spin_loops_per_yield: u32,
}

impl Default for General {
    fn default() -> Self {
        Self {
            mlock_all: false,
            spin_loops_per_yield: default_spin_loops(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1 << 20
}
fn default_buffer_size() -> usize {
    4 << 20
}
fn default_alignment() -> usize {
    4096
}
fn default_initial_file_size() -> u64 {
    1 << 30
}
fn default_spin_loops() -> u32 {
    64
}

impl CaptureConfig {
    pub fn from_file(p: &Path) -> anyhow::Result<Self> {
        let s = fs::read_to_string(p)?;
        let cfg: CaptureConfig = toml::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let c = &self.capture;
        if c.queue_capacity < 2 || !c.queue_capacity.is_power_of_two() {
            anyhow::bail!("capture.queue_capacity must be a power of two >= 2");
        }
        if c.buffer_size < MAX_FRAME_LEN {
            anyhow::bail!("capture.buffer_size must hold at least one record");
        }
        if !c.alignment.is_power_of_two() {
            anyhow::bail!("capture.alignment must be a power of two");
        }
        if c.buffer_size % c.alignment != 0 {
            anyhow::bail!("capture.alignment must divide capture.buffer_size");
        }
        if c.initial_file_size == 0 {
            anyhow::bail!("capture.initial_file_size must be > 0");
        }
        Ok(())
    }
}

impl Capture {
    pub fn options(&self) -> CaptureOptions {
        CaptureOptions {
            path: self.path.clone(),
            mode: self.write_mode,
            queue_capacity: self.queue_capacity,
            buffer_size: self.buffer_size,
            alignment: self.alignment,
            initial_file_size: self.initial_file_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> CaptureConfig {
        toml::from_str(s).expect("parse")
    }

    #[test]
    fn minimal_config_fills_defaults() {
        let cfg = parse(
            r#"
            [capture]
            path = "out.cap"
            write_mode = "mmap"
            "#,
        );
        cfg.validate().unwrap();
        assert_eq!(cfg.capture.queue_capacity, 1 << 20);
        assert_eq!(cfg.capture.buffer_size, 4 << 20);
        assert_eq!(cfg.capture.alignment, 4096);
        assert_eq!(cfg.capture.initial_file_size, 1 << 30);
        assert!(matches!(cfg.capture.write_mode, WriteMode::Mmap));
        assert_eq!(cfg.general.spin_loops_per_yield, 64);
        assert!(cfg.cpu.producer_core.is_none());
    }

    #[test]
    fn rejects_bad_geometry() {
        let cfg = parse(
            r#"
            [capture]
            path = "out.cap"
            write_mode = "direct"
            queue_capacity = 1000
            "#,
        );
        assert!(cfg.validate().is_err());

        let cfg = parse(
            r#"
            [capture]
            path = "out.cap"
            write_mode = "direct"
            buffer_size = 100000
            alignment = 4096
            "#,
        );
        assert!(cfg.validate().is_err());

        let cfg = parse(
            r#"
            [capture]
            path = "out.cap"
            write_mode = "mmap"
            initial_file_size = 0
            "#,
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn full_config_round_trip() {
        let cfg = parse(
            r#"
            [capture]
            path = "/var/lib/capture/itch.cap"
            write_mode = "buffered"
            queue_capacity = 4096
            buffer_size = 65536
            alignment = 512

            [cpu]
            producer_core = 2
            writer_core = 3
            rt_priority = 50

            [general]
            mlock_all = true
            spin_loops_per_yield = 128
            "#,
        );
        cfg.validate().unwrap();
        let opts = cfg.capture.options();
        assert_eq!(opts.queue_capacity, 4096);
        assert_eq!(opts.buffer_size, 65536);
        assert!(matches!(opts.mode, WriteMode::Buffered));
        assert_eq!(cfg.cpu.writer_core, Some(3));
        assert!(cfg.general.mlock_all);
    }
}
