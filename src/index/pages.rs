//! index/pages - выделение страниц и журналирование изменений.
//!
//! Все мутации страниц идут по схеме "подготовить образ -> WAL -> установить образ":
//! образ строится на копии, LSN кадра штампуется в образ, и только затем образ заменяет
//! страницу под уже взятой блокировкой. Ошибка append'а оставляет страницу нетронутой.

use anyhow::Result;
use log::debug;

use crate::buffer::PageGuard;
use crate::metrics::record_fsm_page_reused;
use crate::page::{gist_header_read, gist_page_is_new, gist_set_lsn};
use crate::wal::{GistPageDelete, GistUpdate};

use super::core::GistIndex;

impl GistIndex {
    /// Страница переиспользуема: новая, или удалена раньше любой активной транзакции.
    pub fn page_is_recyclable(&self, page: &[u8]) -> Result<bool> {
        if gist_page_is_new(page) {
            return Ok(true);
        }
        let h = gist_header_read(page)?;
        Ok(h.is_deleted() && h.delete_xid < self.xids.oldest_active_xid())
    }

    /// Взять блок для новой страницы: сначала из FSM (с перепроверкой под блокировкой),
    /// иначе расширить индекс. Возвращает захваченный блок; вызывающий инициализирует его
    /// и журналирует образ (log_page_image).
    pub fn allocate_page(&self) -> Result<PageGuard<'_>> {
        loop {
            let candidate = self.fsm()?.pop()?;
            let Some(blk) = candidate else { break };
            if blk >= self.buffers.nblocks()? {
                continue;
            }
            let g = self.buffers.read_exclusive(blk)?;
            if self.page_is_recyclable(g.page())? {
                record_fsm_page_reused();
                debug!("allocate_page: reusing block {} from FSM", blk);
                return Ok(g);
            }
            debug!("allocate_page: FSM block {} is not recyclable, dropped", blk);
        }
        self.buffers.extend()
    }

    /// Заменить страницу подготовленным образом, записав в WAL полный образ.
    pub fn log_page_image(&self, guard: &mut PageGuard<'_>, mut image: Vec<u8>) -> Result<u64> {
        let lsn = self.wal.append_page_image(guard.blkno(), &mut image)?;
        guard.install(image)?;
        Ok(lsn)
    }

    /// Удаление набора слотов на странице: одна запись GIST_UPDATE.
    /// image - страница уже после удаления; deleted - позиции до удаления.
    pub fn log_update(
        &self,
        guard: &mut PageGuard<'_>,
        mut image: Vec<u8>,
        deleted: &[usize],
    ) -> Result<u64> {
        let rec = GistUpdate {
            deleted: deleted.iter().map(|&p| p as u32).collect(),
        };
        let lsn = self.wal.append_gist_update(guard.blkno(), &rec)?;
        gist_set_lsn(&mut image, lsn)?;
        guard.install(image)?;
        Ok(lsn)
    }

    /// Unlink листа: одна запись GIST_PAGE_DELETE покрывает обе страницы,
    /// обе получают её LSN.
    pub fn log_page_delete(
        &self,
        leaf: &mut PageGuard<'_>,
        mut leaf_image: Vec<u8>,
        parent: &mut PageGuard<'_>,
        mut parent_image: Vec<u8>,
        downlink: usize,
        delete_xid: u64,
    ) -> Result<u64> {
        let rec = GistPageDelete {
            parent: parent.blkno(),
            downlink: downlink as u32,
            delete_xid,
        };
        let lsn = self.wal.append_gist_page_delete(leaf.blkno(), &rec)?;
        gist_set_lsn(&mut leaf_image, lsn)?;
        gist_set_lsn(&mut parent_image, lsn)?;
        leaf.install(leaf_image)?;
        parent.install(parent_image)?;
        Ok(lsn)
    }
}
