//! vacuum/internal - внутренняя страница: только диагностика и учёт для reclaim-прохода.

use anyhow::Result;
use log::warn;

use crate::buffer::PageGuard;
use crate::index::GistIndex;
use crate::metrics::record_vacuum_invalid_tuple;
use crate::page::gist_tuples;

use super::ScanState;

impl GistIndex {
    pub(crate) fn vacuum_internal(&self, state: &mut ScanState, g: &PageGuard<'_>) -> Result<()> {
        for (pos, t) in gist_tuples(g.page())?.iter().enumerate() {
            if t.invalid {
                record_vacuum_invalid_tuple();
                warn!(
                    "index \"{}\" contains an inner tuple marked as invalid (block {}, slot {}); \
                     it was left by an incomplete page split during crash recovery, please REINDEX it",
                    self.name,
                    g.blkno(),
                    pos
                );
            }
        }
        state.internal_pages.insert(g.blkno());
        Ok(())
    }
}
