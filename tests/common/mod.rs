#![allow(dead_code)]

use std::io::Write;

use env_logger::fmt::Color;
use log::Level;

use blockbtree::{BTreeIndex, IndexConfig, MemoryBlockStore};

/// Colored, module-tagged log output; `RUST_LOG` still narrows it.
pub fn init_logger() {
    env_logger::builder()
        .is_test(true)
        .format(|buf, record: &log::Record| {
            let mut style = buf.style();
            let color = match record.level() {
                Level::Error => Color::Red,
                Level::Warn => Color::Yellow,
                Level::Info => Color::Green,
                Level::Debug => Color::Cyan,
                Level::Trace => Color::White,
            };
            style.set_color(color);
            writeln!(
                buf,
                "[{} {:>30}:{:^4}] - {}",
                style.value(record.level()),
                record.module_path().unwrap_or(""),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Debug)
        .parse_env("RUST_LOG")
        .try_init()
        .unwrap_or(());
}

/// 128-byte blocks with 8-byte keys and values: 5 slots per node.
pub const SMALL_BLOCK: usize = 128;

pub fn small_index(blocks: u64) -> BTreeIndex<MemoryBlockStore> {
    let store = MemoryBlockStore::new(SMALL_BLOCK, blocks);
    BTreeIndex::create(store, IndexConfig::new(8, 8)).unwrap()
}

pub fn key(k: u64) -> [u8; 8] {
    k.to_be_bytes()
}
