//! pager/alloc - аллокация страниц и подготовка сегментов.
//!
//! - allocate_pages не перезаписывает meta на каждую аллокацию: next_page_id обновляется
//!   только в памяти; meta пишется при checkpoint/close (clean_shutdown=true).
//! - Расширение сегмента (set_len) даёт нулевые, т.е. "новые", страницы.
//! - Переиспользование блоков из free-space map - уровнем выше (GistIndex::allocate_page):
//!   pager не знает о видимости удалённых страниц.

use anyhow::Result;
use std::collections::BTreeMap;

use super::core::Pager;

impl Pager {
    /// Аллокация последовательности новых страниц. Возвращает начальный page_id.
    pub fn allocate_pages(&mut self, count: u64) -> Result<u64> {
        let start = self.meta.next_page_id;
        let end = start + count;

        // Находим максимальную требуемую длину для каждого сегмента.
        let mut seg_max_len: BTreeMap<u64, u64> = BTreeMap::new();
        for pid in start..end {
            let (seg_no, off) = self.locate(pid);
            let need = off + (self.meta.page_size as u64);
            seg_max_len
                .entry(seg_no)
                .and_modify(|v| *v = (*v).max(need))
                .or_insert(need);
        }

        for (seg_no, need_len) in seg_max_len {
            let f = self.open_seg_rw(seg_no, true)?;
            let cur_len = f.metadata()?.len();
            if cur_len < need_len {
                f.set_len(need_len)?;
                if self.data_fsync {
                    let _ = f.sync_all();
                }
            }
        }

        self.meta.next_page_id = end;
        Ok(start)
    }
}
