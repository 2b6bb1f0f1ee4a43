//! vacuum/driver - точки входа: bulk_delete и vacuum_cleanup.

use anyhow::{Context, Result};
use log::info;

use crate::index::GistIndex;
use crate::metrics::record_vacuum_pass;
use crate::page::TupleId;

use super::scan::DeadTupleCallback;
use super::{BulkDeleteResult, IndexVacuumInfo, ScanState};

impl GistIndex {
    /// Удалить из индекса все кортежи, для которых `is_dead` вернул true, и отцепить
    /// опустевшие листья. Статистика предыдущего вызова той же сессии передаётся обратно:
    /// tuples_removed и pages_newly_deleted копятся, остальные счётчики считаются заново.
    pub fn bulk_delete<F>(
        &self,
        info: &mut IndexVacuumInfo<'_>,
        stats: Option<BulkDeleteResult>,
        mut is_dead: F,
    ) -> Result<BulkDeleteResult>
    where
        F: FnMut(&TupleId) -> bool,
    {
        let mut callback: DeadTupleCallback<'_> = Some(&mut is_dead);
        let mut stats = self.vacuum_scan(info, stats.unwrap_or_default(), &mut callback)?;
        clamp_to_heap(info, &mut stats);
        Ok(stats)
    }

    /// Финальная фаза vacuum'а. Если bulk_delete уже отработал в этой сессии (передана его
    /// статистика), ничего не сканирует. Иначе делает проход без callback'а: только
    /// статистика, поиск невалидных кортежей и возврат пустых страниц.
    /// В режиме analyze_only возвращает статистику как есть.
    pub fn vacuum_cleanup(
        &self,
        info: &mut IndexVacuumInfo<'_>,
        stats: Option<BulkDeleteResult>,
    ) -> Result<Option<BulkDeleteResult>> {
        if info.analyze_only {
            return Ok(stats);
        }
        let mut stats = match stats {
            Some(s) => s,
            None => {
                let mut callback: DeadTupleCallback<'_> = None;
                self.vacuum_scan(info, BulkDeleteResult::default(), &mut callback)?
            }
        };
        clamp_to_heap(info, &mut stats);
        Ok(Some(stats))
    }

    fn vacuum_scan(
        &self,
        info: &mut IndexVacuumInfo<'_>,
        stats: BulkDeleteResult,
        callback: &mut DeadTupleCallback<'_>,
    ) -> Result<BulkDeleteResult> {
        record_vacuum_pass();
        let start_lsn = self
            .wal
            .insert_lsn()
            .with_context(|| format!("vacuum {}: read insert LSN", self.name))?;
        let mut state = ScanState::new(stats, start_lsn);

        let num_pages = self.scan_all_pages(info, &mut state, callback)?;

        if state.freed > 0 {
            let n = self.fsm()?.vacuum()?;
            info!("vacuum {}: free-space map compacted to {} page(s)", self.name, n);
        }
        state.stats.num_pages = num_pages;

        self.delete_empty_pages(info, &mut state)
            .with_context(|| format!("vacuum {}: reclaim empty leaves", self.name))?;

        let s = &state.stats;
        info!(
            "vacuum {}: pages={} deleted={} newly_deleted={} free={} tuples_removed={} live_tuples={}",
            self.name,
            s.num_pages,
            s.pages_deleted,
            s.pages_newly_deleted,
            s.pages_free,
            s.tuples_removed,
            s.num_index_tuples
        );
        Ok(state.stats)
    }
}

/// Живых кортежей в индексе не может быть больше, чем строк в куче, если это число точное.
fn clamp_to_heap(info: &IndexVacuumInfo<'_>, stats: &mut BulkDeleteResult) {
    if !info.estimated_count && stats.num_index_tuples > info.num_heap_tuples {
        stats.num_index_tuples = info.num_heap_tuples;
    }
}
