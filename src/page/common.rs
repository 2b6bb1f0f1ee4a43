//! page/common - общие константы/offset’ы GiST-страницы, слотов, кортежей и трейлера checksum.

// ---------- Общий префикс ----------

/// 4-байтовая магия инициализированной страницы. Страница без магии (нули) - "новая".
pub const PAGE_MAGIC: &[u8; 4] = b"QGPG";

/// Версия формата страниц.
pub const PAGE_VERSION: u16 = 1;

/// Фиксированная длина трейлера checksum.
pub const TRAILER_LEN: usize = 16;

// ---------- Заголовок (64 байта) ----------
/// Смещение MAGIC (4 байта).
pub const OFF_MAGIC: usize = 0;
/// Смещение version (u16).
pub const OFF_VERSION: usize = 4;
/// flags (u16): LEAF / DELETED / TUPLES_DELETED / FOLLOW_RIGHT.
pub const OFF_FLAGS: usize = 6;
/// page_id (u64): собственный номер блока.
pub const OFF_PAGE_ID: usize = 8;
/// lsn (u64): LSN последней записи WAL, изменившей страницу.
pub const OFF_LSN: usize = 16;
/// nsn (u64): split-sequence-number, LSN последнего split'а этой страницы.
pub const OFF_NSN: usize = 24;
/// rightlink (u64): правый сосед после split'а или NO_PAGE.
pub const OFF_RIGHTLINK: usize = 32;
/// delete_xid (u64): граница xid для удалённой страницы (0 у живых).
pub const OFF_DELETE_XID: usize = 40;
/// nslots (u32): число слотов.
pub const OFF_NSLOTS: usize = 48;
/// upper (u32): начало области кортежей (растёт вниз от трейлера).
pub const OFF_UPPER: usize = 52;

/// Размер заголовка GiST-страницы.
pub const GIST_HDR_SIZE: usize = 64;

// ---------- Флаги страницы ----------
pub const F_LEAF: u16 = 0x1;
pub const F_DELETED: u16 = 0x2;
pub const F_TUPLES_DELETED: u16 = 0x4;
pub const F_FOLLOW_RIGHT: u16 = 0x8;

// ---------- Слоты ----------
/// Слот: [off u32][len u32].
pub const SLOT_SIZE: usize = 8;

// ---------- Кортеж ----------
/// [flags u8][reserved u8][page_id u64][slot u16][key_len u16][key ...]
pub const TUPLE_HDR_SIZE: usize = 14;
pub const TUP_OFF_FLAGS: usize = 0;
pub const TUP_OFF_PAGE_ID: usize = 2;
pub const TUP_OFF_SLOT: usize = 10;
pub const TUP_OFF_KEY_LEN: usize = 12;

/// Маркер "невалидного" внутреннего кортежа, оставленного незавершённым split'ом
/// при crash recovery старого формата. Vacuum только сообщает о нём.
pub const T_INVALID: u8 = 0x1;
