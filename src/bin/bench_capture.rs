// src/bin/bench_capture.rs
//
// Decode/persist benchmark over pre-generated A/E frames.
// Args: [num_messages] [out_path]

use itch_capture::gen::FrameGen;
use itch_capture::util::pin_to_core_if_set;
use itch_capture::{clock, decode, CaptureOptions, CaptureWriter, WriteMode};
use log::info;
use std::path::PathBuf;

struct Stats {
    latencies: Vec<u64>, // ticks
    total_messages: u64,
    total_bytes: u64,
    start: u64,
    end: u64,
}

impl Stats {
    fn new(capacity: usize) -> Self {
        Self {
            latencies: Vec::with_capacity(capacity),
            total_messages: 0,
            total_bytes: 0,
            start: 0,
            end: 0,
        }
    }

    fn print_summary(&mut self, label: &str) {
        if self.latencies.is_empty() {
            println!("{label}: no data collected");
            return;
        }
        self.latencies.sort_unstable();
        let pct = |p: f64| -> u64 {
            let idx = ((self.latencies.len() as f64) * p) as usize;
            clock::ticks_to_nanos(self.latencies[idx.min(self.latencies.len() - 1)])
        };
        let elapsed_ns = clock::ticks_to_nanos(self.end.wrapping_sub(self.start)).max(1);
        let secs = elapsed_ns as f64 / 1e9;
        let throughput = self.total_messages as f64 / secs;
        let sum: u128 = self.latencies.iter().map(|&t| t as u128).sum();
        let avg = clock::ticks_to_nanos((sum / self.latencies.len() as u128) as u64);

        println!("\n=== {label} ===");
        println!("messages:   {}", self.total_messages);
        println!("elapsed:    {secs:.3} s");
        println!(
            "throughput: {throughput:.0} msg/s ({:.2} M msg/s)",
            throughput / 1e6
        );
        println!(
            "bandwidth:  {:.2} MB/s",
            self.total_bytes as f64 / secs / (1024.0 * 1024.0)
        );
        println!("latency ns: min={} p50={} p90={} p99={} p99.9={} max={} avg={avg}",
            clock::ticks_to_nanos(self.latencies[0]),
            pct(0.50),
            pct(0.90),
            pct(0.99),
            pct(0.999),
            clock::ticks_to_nanos(*self.latencies.last().unwrap()),
        );
    }
}

fn pregenerate(n: usize) -> Vec<Vec<u8>> {
    let mut g = FrameGen::new();
    (0..n)
        .map(|i| {
            if i % 2 == 0 {
                g.add_order("AAPL", b'B', 100, 1_500_000)
            } else {
                g.execute_order(50)
            }
        })
        .collect()
}

fn bench_decode_only(frames: &[Vec<u8>]) {
    let mut stats = Stats::new(frames.len());
    stats.start = clock::now();
    for f in frames {
        let t0 = clock::now();
        let rec = decode(f);
        let t1 = clock::now();
        if let Some(rec) = rec {
            stats.latencies.push(t1.wrapping_sub(t0));
            stats.total_messages += 1;
            stats.total_bytes += rec.wire_len() as u64;
        }
    }
    stats.end = clock::now();
    stats.print_summary("decode only");
}

fn bench_decode_and_log(frames: &[Vec<u8>], path: PathBuf) -> anyhow::Result<()> {
    let mut opts = CaptureOptions::new(path, WriteMode::Buffered);
    opts.queue_capacity = 1 << 20;
    let mut writer = CaptureWriter::new(opts);
    writer.start()?;

    let mut stats = Stats::new(frames.len());
    stats.start = clock::now();
    for f in frames {
        let t0 = clock::now();
        if let Some(rec) = decode(f) {
            while !writer.log(rec) {
                std::thread::yield_now();
            }
            let t1 = clock::now();
            stats.latencies.push(t1.wrapping_sub(t0));
            stats.total_messages += 1;
            stats.total_bytes += rec.wire_len() as u64;
        }
    }
    stats.end = clock::now();

    info!("draining writer, queue depth {}", writer.queue_size());
    writer.stop()?;
    println!("writer persisted {} bytes", writer.total_written());
    stats.print_summary("decode + async writer");
    Ok(())
}

fn bench_decode_pinned(frames: &[Vec<u8>]) {
    pin_to_core_if_set(Some(0));
    let mut stats = Stats::new(frames.len());
    stats.start = clock::now();
    for f in frames {
        let t0 = clock::now();
        let rec = decode(f);
        let t1 = clock::now();
        if rec.is_some() {
            stats.latencies.push(t1.wrapping_sub(t0));
            stats.total_messages += 1;
            stats.total_bytes += f.len() as u64;
        }
    }
    stats.end = clock::now();
    stats.print_summary("decode pinned to core 0");
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let num_messages = args
        .get(1)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(10_000_000);
    let out_path = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("bench_capture.bin"));

    println!("itch-capture benchmark, {num_messages} messages");
    println!("calibrating time source (~1s)...");
    let hz = clock::calibrate();
    println!("counter frequency: ~{} MHz", hz / 1_000_000);

    let frames = pregenerate(num_messages);

    bench_decode_only(&frames);
    bench_decode_and_log(&frames, out_path)?;
    bench_decode_pinned(&frames);
    Ok(())
}
