// src/writer.rs
//
// Asynchronous capture writer. Producers hand decoded records to `log`,
// which only touches the ring; a single worker thread owns the sink (file
// descriptor, mapping, accumulation buffer) and drains the ring into it.
// Three backends share the worker loop:
//
//   MMAP     - file pre-truncated and mapped; records copied at a running
//              offset; size doubles on overflow; shutdown truncates the
//              file to the exact byte count written.
//   DIRECT   - O_DIRECT file; records accumulate in a page-aligned buffer
//              and each flush rounds up to the block alignment, so the
//              final file length is a multiple of the alignment and the
//              tail past the last record is filler.
//   BUFFERED - ordinary file, same accumulation, no rounding.
//
// Worker-side I/O errors abort the worker and are surfaced by `stop`.

use crate::protocol::{Record, MAX_FRAME_LEN};
use crate::ring::MpmcRing;
use crate::util::BarrierFlag;
use anyhow::Context;
use log::{debug, info, warn};
use memmap2::{MmapMut, MmapOptions};
use serde::Deserialize;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    Mmap,
    Direct,
    Buffered,
}

/// Sink and queue geometry, fixed for the writer's lifetime.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub path: PathBuf,
    pub mode: WriteMode,
    /// Ring depth between producers and the worker; power of two.
    pub queue_capacity: usize,
    /// Accumulation buffer for DIRECT/BUFFERED.
    pub buffer_size: usize,
    /// Block size for DIRECT flush rounding; must divide buffer_size.
    pub alignment: usize,
    /// Starting truncation size for MMAP.
    pub initial_file_size: u64,
}

impl CaptureOptions {
    pub fn new(path: impl Into<PathBuf>, mode: WriteMode) -> Self {
        Self {
            path: path.into(),
            mode,
            queue_capacity: 1 << 20,
            buffer_size: 4 << 20,
            alignment: 4096,
            initial_file_size: 1 << 30,
        }
    }
}

pub struct CaptureWriter {
    opts: CaptureOptions,
    queue: Arc<MpmcRing<Record>>,
    total_written: Arc<AtomicU64>,
    shutdown: Arc<BarrierFlag>,
    worker: Option<thread::JoinHandle<anyhow::Result<()>>>,
}

impl CaptureWriter {
    /// Builds the queue only; no file is touched until `start`.
    pub fn new(opts: CaptureOptions) -> Self {
        let queue = Arc::new(MpmcRing::with_capacity(opts.queue_capacity));
        Self {
            opts,
            queue,
            total_written: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(BarrierFlag::default()),
            worker: None,
        }
    }

    /// Open the sink and launch the worker. No effect if already running;
    /// open/truncate/map failures surface here, before any thread exists.
    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        anyhow::ensure!(
            self.opts.buffer_size >= MAX_FRAME_LEN,
            "buffer_size {} cannot hold a full record",
            self.opts.buffer_size
        );
        if self.opts.mode == WriteMode::Direct {
            anyhow::ensure!(
                self.opts.alignment.is_power_of_two()
                    && self.opts.buffer_size % self.opts.alignment == 0,
                "alignment {} must be a power of two dividing buffer_size {}",
                self.opts.alignment,
                self.opts.buffer_size
            );
        }

        let sink = Sink::open(&self.opts)?;
        info!(
            "capture writer started: {:?} mode={:?} queue={}",
            self.opts.path, self.opts.mode, self.opts.queue_capacity
        );

        self.shutdown = Arc::new(BarrierFlag::default());
        let queue = self.queue.clone();
        let shutdown = self.shutdown.clone();
        let total = self.total_written.clone();
        let handle = thread::Builder::new()
            .name("capture-writer".into())
            .spawn(move || worker_loop(queue, shutdown, sink, total))
            .context("spawn capture-writer thread")?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Forward a record into the ring. Never blocks; false means the ring
    /// is full and the caller decides between spinning and dropping.
    #[inline]
    pub fn log(&self, record: Record) -> bool {
        self.queue.push(record).is_ok()
    }

    /// Signal the worker, wait for it to drain everything visible, flush,
    /// sync and close the sink. Returns any I/O error the worker hit.
    pub fn stop(&mut self) -> anyhow::Result<()> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        self.shutdown.raise();
        match handle.join() {
            Ok(result) => {
                info!(
                    "capture writer stopped: {} bytes written",
                    self.total_written.load(Ordering::Relaxed)
                );
                result
            }
            Err(_) => anyhow::bail!("capture-writer thread panicked"),
        }
    }

    /// Record bytes durably appended so far (DIRECT padding not counted).
    #[inline]
    pub fn total_written(&self) -> u64 {
        self.total_written.load(Ordering::Relaxed)
    }

    /// Approximate ring depth.
    #[inline]
    pub fn queue_size(&self) -> usize {
        self.queue.len()
    }
}

impl Drop for CaptureWriter {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("capture writer shutdown failed: {e:?}");
        }
    }
}

fn worker_loop(
    queue: Arc<MpmcRing<Record>>,
    shutdown: Arc<BarrierFlag>,
    mut sink: Sink,
    total: Arc<AtomicU64>,
) -> anyhow::Result<()> {
    while !shutdown.is_raised() {
        match queue.pop() {
            Some(rec) => {
                let n = sink.append(&rec)?;
                total.fetch_add(n as u64, Ordering::Relaxed);
            }
            None => {
                sink.flush()?;
                thread::yield_now();
            }
        }
    }
    // Drain everything enqueued before the signal was observed.
    while let Some(rec) = queue.pop() {
        let n = sink.append(&rec)?;
        total.fetch_add(n as u64, Ordering::Relaxed);
    }
    sink.finish()
}

enum Sink {
    Mmap(MmapSink),
    File(FileSink),
}

impl Sink {
    fn open(opts: &CaptureOptions) -> anyhow::Result<Self> {
        match opts.mode {
            WriteMode::Mmap => Ok(Sink::Mmap(MmapSink::open(
                &opts.path,
                opts.initial_file_size,
            )?)),
            WriteMode::Direct => Ok(Sink::File(FileSink::open(
                &opts.path,
                opts.buffer_size,
                Some(opts.alignment),
            )?)),
            WriteMode::Buffered => Ok(Sink::File(FileSink::open(
                &opts.path,
                opts.buffer_size,
                None,
            )?)),
        }
    }

    #[inline]
    fn append(&mut self, rec: &Record) -> anyhow::Result<usize> {
        match self {
            Sink::Mmap(s) => s.append(rec),
            Sink::File(s) => s.append(rec),
        }
    }

    #[inline]
    fn flush(&mut self) -> anyhow::Result<()> {
        match self {
            Sink::Mmap(_) => Ok(()), // records land in the mapping directly
            Sink::File(s) => s.flush(),
        }
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        match self {
            Sink::Mmap(s) => s.finish(),
            Sink::File(s) => s.finish(),
        }
    }
}

struct MmapSink {
    file: File,
    map: MmapMut,
    mapped_len: usize,
    offset: usize,
}

impl MmapSink {
    fn open(path: &Path, initial_len: u64) -> anyhow::Result<Self> {
        anyhow::ensure!(initial_len > 0, "initial_file_size must be non-zero");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("open {path:?}"))?;
        file.set_len(initial_len)
            .with_context(|| format!("truncate {path:?} to {initial_len}"))?;
        let map = unsafe { MmapOptions::new().len(initial_len as usize).map_mut(&file) }
            .with_context(|| format!("mmap {path:?}"))?;
        advise_sequential(&map);
        Ok(Self {
            file,
            map,
            mapped_len: initial_len as usize,
            offset: 0,
        })
    }

    fn append(&mut self, rec: &Record) -> anyhow::Result<usize> {
        let n = rec.wire_len();
        while self.offset + n > self.mapped_len {
            self.grow()?;
        }
        rec.encode_into(&mut self.map[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }

    /// Sync, double the file via truncation, remap.
    fn grow(&mut self) -> anyhow::Result<()> {
        let new_len = self.mapped_len * 2;
        debug!("mmap sink growing {} -> {}", self.mapped_len, new_len);
        self.map.flush().context("msync before remap")?;
        self.file
            .set_len(new_len as u64)
            .context("truncate for remap")?;
        self.map = unsafe { MmapOptions::new().len(new_len).map_mut(&self.file) }
            .context("remap grown file")?;
        advise_sequential(&self.map);
        self.mapped_len = new_len;
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.map.flush().context("msync on shutdown")?;
        // Cut the pre-allocation back to the bytes actually written.
        self.file
            .set_len(self.offset as u64)
            .context("truncate to written length")?;
        self.file.sync_all().context("sync on shutdown")?;
        Ok(())
    }
}

fn advise_sequential(map: &MmapMut) {
    #[cfg(target_os = "linux")]
    {
        let rc = unsafe {
            libc::madvise(
                map.as_ptr() as *mut libc::c_void,
                map.len(),
                libc::MADV_SEQUENTIAL,
            )
        };
        if rc != 0 {
            warn!("madvise(MADV_SEQUENTIAL) failed: {}", std::io::Error::last_os_error());
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = map;
    }
}

struct FileSink {
    file: File,
    buf: AlignedBuf,
    /// `Some(block)` rounds every flush up to `block` (DIRECT discipline).
    align: Option<usize>,
}

impl FileSink {
    fn open(path: &Path, buffer_size: usize, align: Option<usize>) -> anyhow::Result<Self> {
        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(target_os = "linux")]
        if align.is_some() {
            use std::os::unix::fs::OpenOptionsExt;
            opts.custom_flags(libc::O_DIRECT);
        }
        let file = opts.open(path).with_context(|| format!("open {path:?}"))?;
        // Cache-line alignment is enough when O_DIRECT is not in play.
        let buf = AlignedBuf::new(buffer_size, align.unwrap_or(64))?;
        Ok(Self { file, buf, align })
    }

    fn append(&mut self, rec: &Record) -> anyhow::Result<usize> {
        let n = rec.wire_len();
        if self.buf.len + n > self.buf.cap {
            self.flush()?;
        }
        rec.encode_into(self.buf.tail_mut(n));
        self.buf.len += n;
        Ok(n)
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        if self.buf.len == 0 {
            return Ok(());
        }
        let write_len = match self.align {
            Some(block) => {
                let rounded = (self.buf.len + block - 1) & !(block - 1);
                self.buf.zero_range(self.buf.len, rounded);
                rounded
            }
            None => self.buf.len,
        };
        self.file
            .write_all(&self.buf.as_slice()[..write_len])
            .context("write to sink")?;
        self.buf.len = 0;
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.flush()?;
        self.file.sync_all().context("sync on shutdown")?;
        Ok(())
    }
}

/// Heap buffer with explicit alignment, for O_DIRECT writes.
struct AlignedBuf {
    ptr: NonNull<u8>,
    cap: usize,
    len: usize,
    layout: Layout,
}

unsafe impl Send for AlignedBuf {}

impl AlignedBuf {
    fn new(cap: usize, align: usize) -> anyhow::Result<Self> {
        let layout = Layout::from_size_align(cap, align)
            .with_context(|| format!("buffer layout {cap}/{align}"))?;
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).context("aligned buffer allocation failed")?;
        Ok(Self {
            ptr,
            cap,
            len: 0,
            layout,
        })
    }

    #[inline]
    fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.cap) }
    }

    /// Writable window of `n` bytes past the current fill.
    #[inline]
    fn tail_mut(&mut self, n: usize) -> &mut [u8] {
        debug_assert!(self.len + n <= self.cap);
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(self.len), n) }
    }

    #[inline]
    fn zero_range(&mut self, from: usize, to: usize) {
        debug_assert!(from <= to && to <= self.cap);
        unsafe {
            std::ptr::write_bytes(self.ptr.as_ptr().add(from), 0, to - from);
        }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;
    use crate::gen;
    use crate::protocol::*;

    fn spin_log(w: &CaptureWriter, rec: Record) {
        while !w.log(rec) {
            thread::yield_now();
        }
    }

    /// Walk a capture file record by record using the tag width table and
    /// return the per-record images.
    fn split_records(data: &[u8]) -> Vec<&[u8]> {
        let mut out = Vec::new();
        let mut off = 0;
        while off < data.len() {
            let w = frame_len(data[off]).expect("tag in capture file");
            out.push(&data[off..off + w]);
            off += w;
        }
        out
    }

    #[test]
    fn buffered_persist_and_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.bin");

        let mut opts = CaptureOptions::new(&path, WriteMode::Buffered);
        opts.queue_capacity = 2048;
        let mut writer = CaptureWriter::new(opts);
        writer.start().unwrap();

        let mut expected = Vec::new();
        for i in 0..1000u32 {
            let frame = if i % 2 == 0 {
                gen::add_order_frame(
                    (i % 500) as u16,
                    i as u16,
                    u64::from(i) * 1_000,
                    u64::from(i) + 1_000_000,
                    b'B',
                    100 + i,
                    b"TSLA    ",
                    2_500_000 + i * 100,
                )
            } else {
                gen::trade_frame(
                    (i % 500) as u16,
                    i as u16,
                    u64::from(i) * 1_000,
                    u64::from(i) + 2_000_000,
                    b'S',
                    50 + i,
                    b"NVDA    ",
                    5_000_000 + i * 100,
                    u64::from(i) + 3_000_000,
                )
            };
            let rec = decode(&frame).unwrap();
            let mut img = vec![0u8; rec.wire_len()];
            rec.encode_into(&mut img);
            expected.push(img);
            spin_log(&writer, rec);
        }
        writer.stop().unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.len(), 500 * ADD_ORDER_LEN + 500 * TRADE_LEN); // 40_000
        assert_eq!(writer.total_written(), data.len() as u64);

        let records = split_records(&data);
        assert_eq!(records.len(), 1000);
        for (i, (img, exp)) in records.iter().zip(&expected).enumerate() {
            let want_tag = if i % 2 == 0 { TAG_ADD_ORDER } else { TAG_TRADE };
            assert_eq!(img[0], want_tag, "record {i}");
            assert_eq!(*img, exp.as_slice(), "record {i}");
        }
    }

    #[test]
    fn mmap_grows_and_truncates_to_exact_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.mmap");

        let mut opts = CaptureOptions::new(&path, WriteMode::Mmap);
        opts.queue_capacity = 1024;
        opts.initial_file_size = 4096; // force at least one doubling
        let mut writer = CaptureWriter::new(opts);
        writer.start().unwrap();

        let count = 200u32; // 200 * 36 = 7200 > 4096
        for i in 0..count {
            let frame = gen::add_order_frame(
                1,
                i as u16,
                u64::from(i),
                u64::from(i),
                b'B',
                10,
                b"AAPL    ",
                1_500_000,
            );
            spin_log(&writer, decode(&frame).unwrap());
        }
        writer.stop().unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.len(), count as usize * ADD_ORDER_LEN);
        for img in split_records(&data) {
            assert_eq!(img[0], TAG_ADD_ORDER);
            assert_eq!(img.len(), ADD_ORDER_LEN);
        }
    }

    #[test]
    fn aligned_flush_rounds_up_and_zero_pads() {
        // Exercises the DIRECT flush discipline without O_DIRECT itself,
        // which tmpfs-backed test directories reject at open.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aligned.bin");

        let file = File::create(&path).unwrap();
        let mut sink = FileSink {
            file,
            buf: AlignedBuf::new(4096, 4096).unwrap(),
            align: Some(512),
        };

        let frame = gen::order_delete_frame(3, 4, 99, 777);
        let rec = decode(&frame).unwrap();
        let mut written = 0usize;
        for _ in 0..3 {
            written += sink.append(&rec).unwrap();
        }
        assert_eq!(written, 3 * ORDER_DELETE_LEN);
        sink.finish().unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.len(), 512); // 57 bytes rounded up once
        let mut img = vec![0u8; ORDER_DELETE_LEN];
        rec.encode_into(&mut img);
        for i in 0..3 {
            assert_eq!(&data[i * ORDER_DELETE_LEN..(i + 1) * ORDER_DELETE_LEN], img);
        }
        assert!(data[3 * ORDER_DELETE_LEN..].iter().all(|&b| b == 0));
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idem.bin");

        let mut opts = CaptureOptions::new(&path, WriteMode::Buffered);
        opts.queue_capacity = 64;
        let mut writer = CaptureWriter::new(opts);
        writer.start().unwrap();
        writer.start().unwrap(); // no-op while running

        let frame = gen::system_event_frame(0, 0, 1, b'O');
        spin_log(&writer, decode(&frame).unwrap());

        writer.stop().unwrap();
        writer.stop().unwrap(); // no-op once joined
        assert_eq!(writer.total_written(), SYSTEM_EVENT_LEN as u64);
        assert_eq!(writer.queue_size(), 0);
    }

    #[test]
    fn start_surfaces_open_failure() {
        let mut opts = CaptureOptions::new("/nonexistent-dir/capture.bin", WriteMode::Buffered);
        opts.queue_capacity = 64;
        let mut writer = CaptureWriter::new(opts);
        assert!(writer.start().is_err());
        assert!(writer.stop().is_ok());
    }
}
