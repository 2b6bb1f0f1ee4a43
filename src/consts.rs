//! Общие константы форматов (meta, data segments, WAL, free-space map, блоки).

// -------- Meta --------
pub const META_MAGIC: &[u8; 8] = b"QGISTMET";
pub const META_FILE: &str = "meta";
pub const META_VERSION: u32 = 1;

// -------- Meta flags --------
/// Индекс без WAL: LSN страниц берутся из монотонного счётчика-заглушки.
pub const META_FLAG_UNLOGGED: u32 = 0x1;

// -------- Data segments --------
pub const DATA_SEG_PREFIX: &str = "gist-";
pub const DATA_SEG_EXT: &str = "qgseg";
pub const SEGMENT_SIZE: u64 = 32 * 1024 * 1024;

// -------- Blocks --------
/// Корень дерева всегда лежит в блоке 0 и никогда не удаляется.
pub const ROOT_BLOCK: u64 = 0;
/// "Нет страницы" (пустой rightlink и т.п.).
pub const NO_PAGE: u64 = u64::MAX;

// -------- Free-space map --------
pub const FSM_FILE: &str = "fsm";
pub const FSM_MAGIC: &[u8; 8] = b"QGFSM001";
pub const FSM_VERSION: u32 = 1;
pub const FSM_HDR_SIZE: u64 = 16;

// -------- Process lock --------
pub const LOCK_FILE: &str = "LOCK";

// -------- Transactions --------
/// Первый "нормальный" xid; всё, что меньше, зарезервировано.
pub const FIRST_NORMAL_XID: u64 = 3;

// -------- WAL (re-export для внешнего кода) --------
pub use crate::wal::{WAL_FILE, WAL_HDR_SIZE, WAL_MAGIC};
