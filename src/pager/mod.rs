//! pager - слой управления страницами индекса, модульная разбивка.
//!
//! Подмодули:
//! - core.rs   - структура Pager, open(), флаг data_fsync, раскладка сегментов.
//! - io.rs     - ensure_allocated/read/write низкоуровневые операции.
//! - alloc.rs  - аллокация страниц/сегментов.
//!
//! Pager не знает о блокировках: сериализация доступа к страницам - забота buffer::BufferPool.

pub use crate::consts::{DATA_SEG_EXT, DATA_SEG_PREFIX, SEGMENT_SIZE};

pub mod core;
pub mod io;
pub mod alloc;

pub use core::Pager;
