//! vacuum/leaf - обработка листа и страниц без содержимого (новых/удалённых).

use anyhow::Result;
use log::debug;

use crate::buffer::PageGuard;
use crate::index::GistIndex;
use crate::metrics::record_vacuum_tuples_removed;
use crate::page::{gist_header_read, gist_mark_tuples_deleted, gist_multi_delete, gist_tuples};

use super::scan::DeadTupleCallback;
use super::ScanState;

impl GistIndex {
    /// Новая или удалённая страница: переиспользуемую - в FSM. Счётчики только при первичном
    /// визите (повторный визит пришёл по rightlink'у и страницу уже посчитали).
    pub(crate) fn vacuum_dead_page(
        &self,
        state: &mut ScanState,
        g: &PageGuard<'_>,
        orig_blkno: u64,
    ) -> Result<()> {
        let blkno = g.blkno();
        if blkno != orig_blkno {
            return Ok(());
        }
        if self.page_is_recyclable(g.page())? {
            self.fsm()?.record_free(blkno)?;
            state.freed += 1;
            state.stats.pages_free += 1;
            state.stats.pages_deleted += 1;
            debug!("vacuum: block {} is recyclable, recorded in FSM", blkno);
        } else {
            // Удалена, но кто-то ещё может держать на неё ссылку.
            state.stats.pages_deleted += 1;
        }
        Ok(())
    }

    /// Лист: удалить мёртвые кортежи одной компактацией и одной записью WAL.
    /// Возвращает блок для повторного визита, если лист был расщеплён в уже пройденный блок.
    pub(crate) fn vacuum_leaf(
        &self,
        state: &mut ScanState,
        g: &mut PageGuard<'_>,
        orig_blkno: u64,
        callback: &mut DeadTupleCallback<'_>,
    ) -> Result<Option<u64>> {
        let h = gist_header_read(g.page())?;

        // Правая половина могла уехать в блок, который мы уже прошли.
        let revisit = if (h.follow_right() || state.start_lsn < h.nsn)
            && h.has_rightlink()
            && h.rightlink < orig_blkno
        {
            Some(h.rightlink)
        } else {
            None
        };

        let tuples = gist_tuples(g.page())?;
        let mut todelete: Vec<usize> = Vec::new();
        if let Some(is_dead) = callback.as_deref_mut() {
            for (pos, t) in tuples.iter().enumerate() {
                if is_dead(&t.tid) {
                    todelete.push(pos);
                }
            }
        }

        if !todelete.is_empty() {
            let mut image = g.page().to_vec();
            gist_multi_delete(&mut image, &todelete)?;
            gist_mark_tuples_deleted(&mut image)?;
            self.log_update(g, image, &todelete)?;
            state.stats.tuples_removed += todelete.len() as f64;
            record_vacuum_tuples_removed(todelete.len());
            debug!("vacuum: block {}: removed {} tuple(s)", g.blkno(), todelete.len());
        }

        let remaining = tuples.len() - todelete.len();
        if remaining == 0 {
            state.empty_leaves.insert(g.blkno());
        } else {
            state.stats.num_index_tuples += remaining as f64;
        }
        Ok(revisit)
    }
}
