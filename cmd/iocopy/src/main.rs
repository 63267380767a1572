//! iocopy - copy a file through the pkit I/O worker
//!
//! Reads the source in batches of positioned reads, then writes each batch
//! back at the same offsets, waiting on one event counter for both.
//!
//! Run: ./target/release/iocopy SRC DST [CHUNK_KB]
//!
//! Logging follows PKIT_LOG_LEVEL; worker settings follow the PKIT_WORKER_*
//! variables.

use pkit::{kdebug, kerror, kinfo, EventCount, IoTask, IoWorker, KitError, KitResult, RuntimeConfig};

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::process::ExitCode;
use std::time::Instant;

/// Reads in flight per batch
const DEPTH: usize = 8;
const DEFAULT_CHUNK_KB: usize = 64;

struct Args {
    src: String,
    dst: String,
    chunk: usize,
}

fn usage() -> ExitCode {
    eprintln!("usage: iocopy SRC DST [CHUNK_KB]");
    ExitCode::from(2)
}

fn parse_args() -> Option<Args> {
    let mut args = std::env::args().skip(1);
    let src = args.next()?;
    let dst = args.next()?;
    let chunk_kb = match args.next() {
        Some(v) => v.parse::<usize>().ok().filter(|&kb| kb > 0)?,
        None => DEFAULT_CHUNK_KB,
    };
    if args.next().is_some() {
        return None;
    }
    Some(Args { src, dst, chunk: chunk_kb.checked_mul(1024)? })
}

/// Wait until `n` completions were posted to `ec`
fn wait_for(ec: &EventCount, n: usize) -> KitResult<()> {
    let mut seen = 0usize;
    while seen < n {
        ec.wait(-1)?;
        seen += ec.reset() as usize;
    }
    Ok(())
}

fn finished(task: &IoTask) -> KitResult<usize> {
    task.result().ok_or(KitError::Invalid)?
}

fn copy(config: &RuntimeConfig, worker: &IoWorker, src: &File, dst: &File, chunk: usize) -> KitResult<u64> {
    let ec = EventCount::new()?;

    // One batch worth of buffers on a binary stack, released on return
    let mut stack = config.binstack()?;
    let arena_len = DEPTH.checked_mul(chunk).ok_or(KitError::NoMemory)?;
    let base = stack.push(arena_len)?;
    // Safety: the pushed bytes are mapped, initialized and untouched until the stack drops
    let arena = unsafe { std::slice::from_raw_parts_mut(base.as_ptr(), arena_len) };
    let mut offset = 0i64;
    let mut total = 0u64;

    loop {
        let reads: Vec<IoTask> = arena
            .chunks_mut(chunk)
            .enumerate()
            .map(|(i, buf)| IoTask::new_read(src.as_raw_fd(), buf, offset + (i * chunk) as i64, Some(&ec)))
            .collect();
        let refs: Vec<&IoTask> = reads.iter().collect();
        // Safety: tasks, buffers and the counter outlive the wait below
        unsafe { worker.submit(&refs)? };
        wait_for(&ec, reads.len())?;

        let mut lens = Vec::with_capacity(DEPTH);
        for task in &reads {
            lens.push(finished(task)?);
        }
        drop(refs);
        drop(reads);

        // Everything past the first short read is beyond end of file
        let filled = lens.iter().position(|&n| n < chunk).map_or(DEPTH, |i| i + 1);
        let mut writes = Vec::with_capacity(filled);
        for (i, (buf, &n)) in arena.chunks(chunk).take(filled).zip(&lens).enumerate() {
            if n > 0 {
                let at = offset + (i * chunk) as i64;
                writes.push((IoTask::new_write(dst.as_raw_fd(), &buf[..n], at, Some(&ec)), n));
            }
        }
        let refs: Vec<&IoTask> = writes.iter().map(|(task, _)| task).collect();
        unsafe { worker.submit(&refs)? };
        wait_for(&ec, writes.len())?;

        for (task, n) in &writes {
            let written = finished(task)?;
            if written != *n {
                kerror!("short write at offset {}: {} of {} bytes", task.offset(), written, n);
                return Err(KitError::Os(libc::EIO));
            }
            total += written as u64;
        }
        kdebug!("batch at offset {} moved {} chunks", offset, writes.len());

        if filled < DEPTH {
            return Ok(total);
        }
        offset += (DEPTH * chunk) as i64;
    }
}

fn main() -> ExitCode {
    let Some(args) = parse_args() else {
        return usage();
    };

    let src = match File::open(&args.src) {
        Ok(f) => f,
        Err(e) => {
            kerror!("open {}: {}", args.src, e);
            return ExitCode::FAILURE;
        }
    };
    let dst = match OpenOptions::new().write(true).create(true).truncate(true).open(&args.dst) {
        Ok(f) => f,
        Err(e) => {
            kerror!("create {}: {}", args.dst, e);
            return ExitCode::FAILURE;
        }
    };

    let config = RuntimeConfig::from_env();
    let worker = match IoWorker::with_config(&config) {
        Ok(w) => w,
        Err(e) => {
            kerror!("starting io worker: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let start = Instant::now();
    let result = copy(&config, &worker, &src, &dst, args.chunk);
    if let Err(e) = worker.free() {
        kerror!("stopping io worker: {}", e);
    }

    match result {
        Ok(total) => {
            let secs = start.elapsed().as_secs_f64();
            kinfo!("copied {} bytes in {:.3}s", total, secs);
            println!("{} -> {}: {} bytes", args.src, args.dst, total);
            ExitCode::SUCCESS
        }
        Err(e) => {
            kerror!("copy {} -> {}: {}", args.src, args.dst, e);
            ExitCode::FAILURE
        }
    }
}
