//! Exercises the allocation facade end to end: `init`, a kept-alive root, a
//! batch of throwaway garbage, a `realloc`, two leak reports around a
//! `force_collect`, and `cleanup`. Point `RUST_LOG=debug` and the
//! `gc_logging` feature at it to see the collector's own narration.

use anyhow::{ensure, Result};
use cairn_gc::GcConfig;
use clap::Parser;

#[derive(Parser)]
#[command(about = "Exercise cairn-gc's allocation facade end to end")]
struct Args {
    /// Number of throwaway allocations to make before reporting leaks.
    #[arg(long, default_value_t = 8)]
    garbage_count: usize,

    /// Size in bytes of each throwaway allocation.
    #[arg(long, default_value_t = 64)]
    garbage_size: usize,

    /// Byte threshold at which a generation triggers a collection. Falls
    /// back to `CAIRN_GC_MAX_ALLOCED_BYTES` / the built-in default when unset.
    #[arg(long)]
    max_alloced_bytes: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = match args.max_alloced_bytes {
        Some(bytes) => GcConfig::default().with_max_alloced_bytes(bytes),
        None => GcConfig::from_env()?,
    };
    cairn_gc::init_with_config(config);

    let kept = cairn_gc::alloc(256, true);
    ensure!(!kept.is_null(), "initial allocation failed");
    std::hint::black_box(&kept);

    for _ in 0..args.garbage_count {
        let throwaway = cairn_gc::alloc(args.garbage_size, false);
        ensure!(!throwaway.is_null(), "garbage allocation failed");
        // Immediately unreachable: nothing keeps this alive past this loop body.
    }

    let grown = cairn_gc::realloc(kept, 4096);
    ensure!(!grown.is_null(), "realloc failed");
    std::hint::black_box(&grown);

    cairn_gc::force_collect();

    println!("still reachable after a forced collection:");
    cairn_gc::print_leaks(std::io::stdout())?;

    cairn_gc::free(grown);
    cairn_gc::force_collect();

    println!("after freeing the root:");
    cairn_gc::print_leaks(std::io::stdout())?;

    cairn_gc::cleanup();
    Ok(())
}
