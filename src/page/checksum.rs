//! page/checksum - 16-байтовый трейлер страницы.
//!
//! Режим: CRC32C (Castagnoli).
//! - trailer[0..4] - CRC32C (LE) по всей странице с занулённым трейлером;
//! - trailer[4..16] - нули;
//! - stored == 0 считается допустимым (страница ещё ни разу не записывалась pager'ом);
//! - ENV QG_PAGE_CHECKSUM=0|false|off|no - выключает расчёт/проверку (бенчи/разработка).

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::sync::OnceLock;

use super::common::TRAILER_LEN;

fn page_checksum_disabled() -> bool {
    static DISABLED: OnceLock<bool> = OnceLock::new();
    *DISABLED.get_or_init(|| {
        if let Ok(v) = std::env::var("QG_PAGE_CHECKSUM") {
            let s = v.trim().to_ascii_lowercase();
            return s == "0" || s == "false" || s == "off" || s == "no";
        }
        false
    })
}

fn compute_crc32c(page: &[u8]) -> u32 {
    let ps = page.len();
    let c = crc32c::crc32c(&page[..ps - TRAILER_LEN]);
    crc32c::crc32c_append(c, &[0u8; TRAILER_LEN])
}

/// Обновить трейлер чексуммы страницы.
pub fn page_update_checksum(page: &mut [u8]) -> Result<()> {
    if page.len() < TRAILER_LEN {
        return Err(anyhow!("page buffer too small for checksum"));
    }
    let ps = page.len();
    for b in &mut page[ps - TRAILER_LEN..ps] {
        *b = 0;
    }
    if page_checksum_disabled() {
        return Ok(());
    }
    let crc = compute_crc32c(page);
    LittleEndian::write_u32(&mut page[ps - TRAILER_LEN..ps - TRAILER_LEN + 4], crc);
    Ok(())
}

/// CRC из трейлера (LE).
#[inline]
pub fn page_trailer_crc32_le(page: &[u8]) -> u32 {
    let ps = page.len();
    LittleEndian::read_u32(&page[ps - TRAILER_LEN..ps - TRAILER_LEN + 4])
}

/// Проверить трейлер. Нулевой CRC допускается (страница не записывалась).
pub fn page_verify_checksum(page: &[u8]) -> Result<bool> {
    if page.len() < TRAILER_LEN {
        return Err(anyhow!("page buffer too small for checksum"));
    }
    if page_checksum_disabled() {
        return Ok(true);
    }
    let stored = page_trailer_crc32_le(page);
    if stored == 0 {
        return Ok(true);
    }
    Ok(stored == compute_crc32c(page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_detects_bit_flip() {
        let mut page = vec![0u8; 4096];
        page[100] = 7;
        page_update_checksum(&mut page).unwrap();
        assert!(page_verify_checksum(&page).unwrap());
        page[101] ^= 0x40;
        assert!(!page_verify_checksum(&page).unwrap());
    }

    #[test]
    fn zero_trailer_is_accepted() {
        let page = vec![0u8; 4096];
        assert!(page_verify_checksum(&page).unwrap());
    }
}
