//! Replay allocation trace files against a fresh heap each and print utilization.
//!
//! ```text
//! RUST_LOG=debug cargo run --example replay -- traces/*.rep
//! ```

use tagheap::trace::{replay, Trace};
use tagheap::{Brk, Heap};

fn main() {
    env_logger::init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("usage: replay <trace file>...");
        std::process::exit(2);
    }

    let mut failed = false;

    for path in &paths {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                eprintln!("{}: {}", path, err);
                failed = true;
                continue;
            }
        };

        let trace = match Trace::parse(&text) {
            Ok(trace) => trace,
            Err(err) => {
                eprintln!("{}: {}", path, err);
                failed = true;
                continue;
            }
        };

        let mut heap = Heap::new(Brk::new());
        if let Err(err) = heap.initialize() {
            eprintln!("{}: {}", path, err);
            failed = true;
            continue;
        }

        match replay(&mut heap, &trace, true) {
            Ok(report) => println!(
                "{:<40} {:>8} ops {:>10} peak {:>10} arena {:>6.1}%",
                path,
                report.ops,
                report.peak_live_bytes,
                report.arena_bytes,
                report.utilization() * 100.0
            ),
            Err(err) => {
                eprintln!("{}: {}", path, err);
                heap.check(true);
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
}
