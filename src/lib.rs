#![allow(non_snake_case)]

// Базовые модули
pub mod consts;
pub mod meta;
pub mod metrics;
pub mod config;
pub mod lock;
pub mod xact;

// Хранилище (папки с mod.rs)
pub mod page;   // src/page/{mod,common,checksum,gist,tuple}.rs
pub mod wal;    // src/wal/{mod,encode,reader,record,writer,replay}.rs
pub mod pager;  // src/pager/{mod,core,io,alloc}.rs
pub mod buffer; // src/buffer/mod.rs
pub mod free;   // src/free/mod.rs

// Индекс и его обслуживание
pub mod index;  // src/index/{mod,core,open,pages}.rs
pub mod vacuum; // src/vacuum/{mod,blockset,scan,leaf,internal,delete,driver}.rs

// Удобные реэкспорты
pub use buffer::{BufferPool, PageGuard};
pub use config::{ConfigBuilder, GistConfig};
pub use free::FreeSpaceMap;
pub use index::GistIndex;
pub use meta::{read_meta, validate_page_size, MetaHeader};
pub use page::{GistTuple, PageKind, TupleId};
pub use vacuum::{BlockSet, BulkDeleteResult, IndexVacuumInfo};
pub use wal::Wal;
pub use xact::{TransactionIds, XidCounter};
