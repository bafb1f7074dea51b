// src/bin/capture_demo.rs
//
// Small end-to-end tour: decode a handful of frames and print them, then
// run a 1000-message buffered capture. An optional TOML config path
// overrides the sink settings.

use itch_capture::config::CaptureConfig;
use itch_capture::gen::FrameGen;
use itch_capture::protocol::{price_to_f64, symbol, Body};
use itch_capture::util::{lock_all_memory_if, pin_to_core_if_set};
use itch_capture::{decode, CaptureOptions, CaptureWriter, Record, WriteMode};
use log::info;
use std::path::PathBuf;

fn print_record(rec: &Record) {
    match &rec.body {
        Body::AddOrder(m) => println!(
            "ADD   {} {} {} @ ${:.4} (ref {})",
            symbol(&m.stock),
            if m.side == b'B' { "BUY" } else { "SELL" },
            m.shares,
            price_to_f64(m.price),
            m.order_ref,
        ),
        Body::Trade(m) => println!(
            "TRADE {} {} {} @ ${:.4} (match {})",
            symbol(&m.stock),
            if m.side == b'B' { "BUY" } else { "SELL" },
            m.shares,
            price_to_f64(m.price),
            m.match_number,
        ),
        Body::ExecuteOrder(m) => println!(
            "EXEC  ref {} x {} (match {})",
            m.order_ref, m.executed_shares, m.match_number,
        ),
        Body::SystemEvent(m) => println!("SYS   event '{}'", m.event_code as char),
        other => println!("{other:?}"),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .map(|p| CaptureConfig::from_file(&p))
        .transpose()?;

    let (opts, cpu, mlock) = match cfg {
        Some(cfg) => (cfg.capture.options(), cfg.cpu.clone(), cfg.general.mlock_all),
        None => {
            let mut opts = CaptureOptions::new("demo_capture.bin", WriteMode::Buffered);
            opts.queue_capacity = 1 << 16;
            (opts, Default::default(), false)
        }
    };
    lock_all_memory_if(mlock);
    pin_to_core_if_set(cpu.producer_core);

    // Decode and print a few hand-built frames.
    let mut g = FrameGen::new();
    for frame in [
        g.add_order("AAPL", b'B', 100, 1_500_000),
        g.add_order("MSFT", b'S', 50, 3_200_000),
        g.trade("GOOGL", b'B', 25, 1_400_000),
    ] {
        if let Some(rec) = decode(&frame) {
            print_record(&rec);
        }
    }

    // Capture run.
    info!("capturing 1000 messages to {:?}", opts.path);
    let mut writer = CaptureWriter::new(opts);
    writer.start()?;

    for i in 0..1000u32 {
        let frame = if i % 2 == 0 {
            g.add_order("TSLA", b'B', 100 + i, 2_500_000 + i * 100)
        } else {
            g.trade("NVDA", b'S', 50 + i, 5_000_000 + i * 100)
        };
        if let Some(rec) = decode(&frame) {
            while !writer.log(rec) {
                std::thread::yield_now();
            }
        }
    }

    println!("queue depth before stop: {}", writer.queue_size());
    writer.stop()?;
    println!("total bytes written: {}", writer.total_written());
    Ok(())
}
