//! vacuum/scan - физический обход индекса.
//!
//! Блоки обходятся по возрастанию от корня. Внешний цикл перечитывает длину индекса под
//! extension-lock'ом; внутренний идёт по блокам без него. Страницы, добавленные split'ами во
//! время прохода, попадают в следующую итерацию внешнего цикла; split в уже пройденный блок
//! (переиспользованный из FSM) ловится повторным визитом по rightlink'у (leaf.rs).

use anyhow::{Context, Result};
use log::debug;
use std::time::Duration;

use crate::consts::ROOT_BLOCK;
use crate::index::GistIndex;
use crate::metrics::record_vacuum_page_scanned;
use crate::page::{gist_page_kind, PageKind, TupleId};

use super::{IndexVacuumInfo, ScanState};

pub(crate) type DeadTupleCallback<'c> = Option<&'c mut dyn FnMut(&TupleId) -> bool>;

impl GistIndex {
    /// Точка задержки: троттлинг по конфигу + внешний хук. Вызывается без блокировок страниц.
    pub(crate) fn vacuum_delay_point(&self, info: &mut IndexVacuumInfo<'_>, state: &mut ScanState) {
        info.call_delay_hook();
        if self.cfg.vacuum_cost_delay_ms == 0 {
            return;
        }
        state.since_sleep += 1;
        if state.since_sleep >= self.cfg.vacuum_cost_limit {
            state.since_sleep = 0;
            std::thread::sleep(Duration::from_millis(self.cfg.vacuum_cost_delay_ms));
        }
    }

    /// Обойти все блоки индекса. Возвращает число блоков на момент последней проверки длины.
    pub(crate) fn scan_all_pages(
        &self,
        info: &mut IndexVacuumInfo<'_>,
        state: &mut ScanState,
        callback: &mut DeadTupleCallback<'_>,
    ) -> Result<u64> {
        let mut blkno = ROOT_BLOCK;
        let num_pages = loop {
            let num_pages = {
                let _ext = self.buffers.lock_extension()?;
                self.buffers.nblocks()?
            };
            if blkno >= num_pages {
                break num_pages;
            }
            while blkno < num_pages {
                self.vacuum_page(info, state, callback, blkno)?;
                blkno += 1;
            }
        };
        debug!("vacuum scan: {} block(s) visited on {}", num_pages, self.name);
        Ok(num_pages)
    }

    /// Визит блока и всех повторных визитов, которые он породил. Работает по явному списку,
    /// а не рекурсией: цепочка split'ов может быть произвольной длины.
    fn vacuum_page(
        &self,
        info: &mut IndexVacuumInfo<'_>,
        state: &mut ScanState,
        callback: &mut DeadTupleCallback<'_>,
        orig_blkno: u64,
    ) -> Result<()> {
        let mut pending = vec![orig_blkno];
        while let Some(blkno) = pending.pop() {
            self.vacuum_delay_point(info, state);
            record_vacuum_page_scanned(blkno != orig_blkno);

            let mut g = self
                .buffers
                .read_exclusive(blkno)
                .with_context(|| format!("vacuum: lock block {}", blkno))?;
            let revisit = match gist_page_kind(g.page())
                .with_context(|| format!("vacuum: block {}", blkno))?
            {
                PageKind::Uninit | PageKind::Deleted => {
                    self.vacuum_dead_page(state, &g, orig_blkno)?;
                    None
                }
                PageKind::Leaf => self.vacuum_leaf(state, &mut g, orig_blkno, callback)?,
                PageKind::Internal => {
                    self.vacuum_internal(state, &g)?;
                    None
                }
            };
            drop(g);

            if let Some(next) = revisit {
                debug!("vacuum: revisit block {} (split of block {})", next, blkno);
                pending.push(next);
            }
        }
        Ok(())
    }
}
