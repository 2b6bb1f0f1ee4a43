//! wal/reader - последовательное чтение кадров WAL с проверкой CRC.
//!
//! - Валидирует CRC32C по header[0..crc) + payload.
//! - Толерантен к частичному хвосту (возвращает Ok(None)).
//!
//! Использование:
//!   let len = file.metadata()?.len();
//!   let mut pos = WAL_HDR_SIZE as u64;
//!   while let Some((rec, next)) = read_next_record(&mut file, pos, len)? {
//!       /* обработка rec */
//!       pos = next;
//!   }

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::io::{Read, Seek, SeekFrom};

use super::{
    crc32c_of_parts, WAL_REC_HDR_SIZE, WAL_REC_OFF_CRC32, WAL_REC_OFF_FLAGS, WAL_REC_OFF_LEN,
    WAL_REC_OFF_LSN, WAL_REC_OFF_PAGE_ID, WAL_REC_OFF_TYPE,
};

/// Одна запись WAL, считанная с диска.
#[derive(Debug)]
pub struct WalRecord {
    pub rec_type: u8,
    pub flags: u8,
    pub lsn: u64,
    pub page_id: u64,
    pub payload: Vec<u8>,
    /// Позиция начала заголовка записи.
    pub pos: u64,
}

/// Считать следующую запись с позиции pos. file_len - текущая длина файла.
///
/// - Ok(Some((rec, next_pos))) - запись прочитана и валидна;
/// - Ok(None) - EOF или частичный хвост (заголовок/payload не умещаются в file_len);
/// - Err - CRC mismatch или I/O ошибка.
pub fn read_next_record(
    f: &mut std::fs::File,
    pos: u64,
    file_len: u64,
) -> Result<Option<(WalRecord, u64)>> {
    if pos + (WAL_REC_HDR_SIZE as u64) > file_len {
        return Ok(None);
    }

    f.seek(SeekFrom::Start(pos))?;
    let mut rhdr = [0u8; WAL_REC_HDR_SIZE];
    if let Err(e) = f.read_exact(&mut rhdr) {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Ok(None);
        }
        return Err(anyhow!("wal read header: {}", e));
    }

    let payload_len = LittleEndian::read_u32(&rhdr[WAL_REC_OFF_LEN..WAL_REC_OFF_LEN + 4]) as usize;
    let next_pos = pos + WAL_REC_HDR_SIZE as u64 + payload_len as u64;
    if next_pos > file_len {
        return Ok(None);
    }

    let mut payload = vec![0u8; payload_len];
    if let Err(e) = f.read_exact(&mut payload) {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Ok(None);
        }
        return Err(anyhow!("wal read payload: {}", e));
    }

    let stored_crc = LittleEndian::read_u32(&rhdr[WAL_REC_OFF_CRC32..WAL_REC_OFF_CRC32 + 4]);
    let calc_crc = crc32c_of_parts(&rhdr[..WAL_REC_OFF_CRC32], &payload);
    if stored_crc != calc_crc {
        return Err(anyhow!(
            "WAL CRC mismatch at pos {} (stored={}, calc={})",
            pos,
            stored_crc,
            calc_crc
        ));
    }

    let rec = WalRecord {
        rec_type: rhdr[WAL_REC_OFF_TYPE],
        flags: rhdr[WAL_REC_OFF_FLAGS],
        lsn: LittleEndian::read_u64(&rhdr[WAL_REC_OFF_LSN..WAL_REC_OFF_LSN + 8]),
        page_id: LittleEndian::read_u64(&rhdr[WAL_REC_OFF_PAGE_ID..WAL_REC_OFF_PAGE_ID + 8]),
        payload,
        pos,
    };
    Ok(Some((rec, next_pos)))
}
