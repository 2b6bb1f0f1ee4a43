//! WAL (QGWAL001) - журнал структурных изменений индекса.
//!
//! Разделение:
//! - writer.rs   - запись WAL (Wal), выдача LSN, fsync, режим unlogged.
//! - encode.rs   - кодирование кадров (заголовок + CRC + запись).
//! - reader.rs   - последовательное чтение кадров WAL с проверкой CRC.
//! - record.rs   - payload'ы GiST-записей (GIST_UPDATE, GIST_PAGE_DELETE).
//! - replay.rs   - реплей WAL (wal_replay_if_any), CRC/LSN-гейтинг и усечение.
//!
//! Формат файла: [MAGIC8 "QGWAL001"][reserved u64] + кадры.
//! Кадр: [type u8][flags u8][reserved u16][lsn u64][page_id u64][len u32][crc32c u32] + payload.
//! CRC32C считается по header[0..24) + payload.

use anyhow::Result;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

// -------------------- Публичные константы WAL --------------------

pub const WAL_FILE: &str = "wal-000001.log";
pub const WAL_MAGIC: &[u8; 8] = b"QGWAL001";
pub const WAL_HDR_SIZE: usize = 16; // magic8 + reserved u64

// Record header: 28 bytes (включая поле CRC на смещении 24..28)
pub const WAL_REC_HDR_SIZE: usize = 28;

// Offsets внутри заголовка записи
pub const WAL_REC_OFF_TYPE: usize = 0;
pub const WAL_REC_OFF_FLAGS: usize = 1;
pub const WAL_REC_OFF_RESERVED: usize = 2;
pub const WAL_REC_OFF_LSN: usize = 4;
pub const WAL_REC_OFF_PAGE_ID: usize = 12;
pub const WAL_REC_OFF_LEN: usize = 20;
pub const WAL_REC_OFF_CRC32: usize = 24;

// Типы записей
/// Полный образ страницы (построение дерева, split, init корня).
pub const WAL_REC_PAGE_IMAGE: u8 = 2;
/// Удаление набора слотов на одной странице; payload - позиции слотов.
pub const WAL_REC_GIST_UPDATE: u8 = 10;
/// Двухфазный unlink: лист помечен удалённым + downlink снят в родителе; page_id = лист.
pub const WAL_REC_GIST_PAGE_DELETE: u8 = 11;

// -------------------- Общие утилиты --------------------

/// Инкрементальный CRC32C по двум срезам без аллокаций.
#[inline]
pub fn crc32c_of_parts(head_without_crc: &[u8], payload: &[u8]) -> u32 {
    let c = crc32c::crc32c_append(0, head_without_crc);
    crc32c::crc32c_append(c, payload)
}

/// Записать заголовок файла WAL.
pub fn write_wal_file_header(f: &mut File) -> Result<()> {
    f.seek(SeekFrom::Start(0))?;
    f.write_all(WAL_MAGIC)?;
    f.write_all(&[0u8; WAL_HDR_SIZE - 8])?;
    Ok(())
}

/// Построить путь к WAL-файлу для корня индекса.
pub fn wal_path(root: &Path) -> PathBuf {
    root.join(WAL_FILE)
}

// -------------------- Подмодули и re-export --------------------

pub mod encode;
pub mod reader;
pub mod record;
pub mod replay;
pub mod writer;

pub use record::{GistPageDelete, GistUpdate};
pub use replay::wal_replay_if_any;
pub use writer::Wal;
