//! pager/io - низкоуровневые операции ввода/вывода страниц:
//! - ensure_allocated: гарантирует, что страница физически аллоцирована
//! - read_page: чтение + проверка трейлера CRC32C
//! - write_page_raw: штамп трейлера + запись + (опциональный) fsync данных сегмента
//!
//! Политика чтения:
//! - page_id >= next_page_id - ошибка (блок за концом индекса);
//! - сегмент короче нужного (страница аллоцирована, но ни разу не записана) - нули,
//!   т.е. "новая" страница.

use anyhow::{anyhow, Context, Result};
use std::io::{Read, Seek, SeekFrom, Write};

use crate::page::{page_update_checksum, page_verify_checksum};

use super::core::Pager;

impl Pager {
    /// Гарантировать, что page_id физически аллоцирован на диске.
    ///
    /// - Если page_id >= meta.next_page_id - выделяем до неё включительно (allocate_pages).
    /// - Иначе убеждаемся, что соответствующий сегмент имеет достаточную длину.
    pub fn ensure_allocated(&mut self, page_id: u64) -> Result<()> {
        if page_id >= self.meta.next_page_id {
            let to_alloc = page_id + 1 - self.meta.next_page_id;
            self.allocate_pages(to_alloc)?;
            return Ok(());
        }

        let (seg_no, off) = self.locate(page_id);
        let f = self.open_seg_rw(seg_no, true)?;
        let need_len = off + (self.meta.page_size as u64);
        let cur_len = f.metadata()?.len();
        if cur_len < need_len {
            f.set_len(need_len)?;
            if self.data_fsync {
                let _ = f.sync_all();
            }
        }
        Ok(())
    }

    /// Прочитать страницу в буфер с проверкой CRC32C.
    pub fn read_page(&self, page_id: u64, buf: &mut [u8]) -> Result<()> {
        let ps = self.meta.page_size as usize;
        if buf.len() != ps {
            return Err(anyhow!(
                "buffer size {} != page_size {}",
                buf.len(),
                self.meta.page_size
            ));
        }
        if page_id >= self.meta.next_page_id {
            return Err(anyhow!(
                "block {} beyond end of index (nblocks={})",
                page_id,
                self.meta.next_page_id
            ));
        }

        let (seg_no, off) = self.locate(page_id);
        let seg_path = self.seg_path(seg_no);
        let seg_len = std::fs::metadata(&seg_path).map(|m| m.len()).unwrap_or(0);
        if seg_len < off + ps as u64 {
            buf.fill(0);
            return Ok(());
        }

        let mut f = self.open_seg_rw(seg_no, false)?;
        f.seek(SeekFrom::Start(off))?;
        f.read_exact(buf)
            .with_context(|| format!("read block {} from {}", page_id, seg_path.display()))?;

        if !page_verify_checksum(buf)? {
            return Err(anyhow!("page {} checksum mismatch", page_id));
        }
        Ok(())
    }

    /// Записать страницу в сегмент. Трейлер CRC штампуется на копии, буфер вызывающего не меняется.
    /// fsync данных выполняется только если self.data_fsync == true.
    pub fn write_page_raw(&mut self, page_id: u64, buf: &[u8]) -> Result<()> {
        let ps = self.meta.page_size as usize;
        if buf.len() != ps {
            return Err(anyhow!(
                "buffer size {} != page_size {}",
                buf.len(),
                self.meta.page_size
            ));
        }

        self.ensure_allocated(page_id)?;

        let mut out = buf.to_vec();
        page_update_checksum(&mut out)?;

        let (seg_no, off) = self.locate(page_id);
        let mut f = self.open_seg_rw(seg_no, false)?;
        f.seek(SeekFrom::Start(off))?;
        f.write_all(&out)
            .with_context(|| format!("write block {}", page_id))?;
        if self.data_fsync {
            let _ = f.sync_all();
        }
        Ok(())
    }
}
