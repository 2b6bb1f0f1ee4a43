//! vacuum/delete - reclaim-проход: отцепить опустевшие листья от родителей.
//!
//! Для каждой внутренней страницы, записанной проходом (по возрастанию):
//! 1) захватить родителя, убедиться, что он всё ещё внутренний;
//! 2) отобрать детей из множества пустых листьев, но не больше (nslots - 1):
//!    последний downlink родителя никогда не снимается;
//! 3) отпустить родителя до захвата любого листа (порядок захвата: лист, затем родитель,
//!    как у вставки, поднимающейся от листа к корню);
//! 4) для каждого отобранного листа: захватить лист, перепроверить его, захватить родителя,
//!    взять границу xid и попытаться сделать двухфазный unlink.
//! Любое расхождение - пропуск; следующий проход попробует снова.

use anyhow::{Context, Result};
use log::debug;

use crate::buffer::PageGuard;
use crate::index::GistIndex;
use crate::metrics::{record_vacuum_leaf_unlinked, record_vacuum_unlink_skipped};
use crate::page::{
    gist_delete_tuple, gist_header_read, gist_page_is_new, gist_set_deleted, gist_tuple_at,
    PageKind,
};

use super::{IndexVacuumInfo, ScanState};

impl GistIndex {
    pub(crate) fn delete_empty_pages(
        &self,
        info: &mut IndexVacuumInfo<'_>,
        state: &mut ScanState,
    ) -> Result<()> {
        if state.empty_leaves.is_empty() {
            return Ok(());
        }

        let parents: Vec<u64> = state.internal_pages.iter().collect();
        for parent_blk in parents {
            let (staged, parent_lsn) = {
                let g = self
                    .buffers
                    .read_exclusive(parent_blk)
                    .with_context(|| format!("reclaim: lock parent {}", parent_blk))?;
                if gist_page_is_new(g.page()) {
                    continue;
                }
                let h = gist_header_read(g.page())?;
                if h.kind() != PageKind::Internal {
                    debug!("reclaim: block {} is no longer internal, skipped", parent_blk);
                    continue;
                }
                let nslots = h.nslots as usize;
                let mut staged: Vec<(u64, usize)> = Vec::new();
                for pos in 0..nslots {
                    if staged.len() >= nslots.saturating_sub(1) {
                        break;
                    }
                    let child = gist_tuple_at(g.page(), pos)?.child();
                    if state.empty_leaves.contains(child) {
                        staged.push((child, pos));
                    }
                }
                (staged, h.lsn)
            };
            if staged.is_empty() {
                continue;
            }

            let mut deleted = 0usize;
            for (leaf_blk, pos) in staged {
                self.vacuum_delay_point(info, state);

                let mut leaf = self
                    .buffers
                    .read_exclusive(leaf_blk)
                    .with_context(|| format!("reclaim: lock leaf {}", leaf_blk))?;
                if !leaf_still_deletable(&leaf, parent_lsn)? {
                    debug!("reclaim: leaf {} changed since the scan, skipped", leaf_blk);
                    record_vacuum_unlink_skipped();
                    continue;
                }
                let mut parent = self
                    .buffers
                    .read_exclusive(parent_blk)
                    .with_context(|| format!("reclaim: relock parent {}", parent_blk))?;

                let delete_xid = self.xids.next_xid();
                if self.unlink_empty_leaf(state, &mut parent, pos - deleted, &mut leaf, delete_xid)? {
                    deleted += 1;
                } else {
                    record_vacuum_unlink_skipped();
                }
                drop(parent);
                drop(leaf);
            }
        }
        Ok(())
    }

    /// Двухфазный unlink: пометить лист удалённым с границей xid и снять downlink в родителе,
    /// одной записью WAL. Все предусловия перепроверяются здесь же; нарушение - false, не ошибка.
    pub fn unlink_empty_leaf_pages(
        &self,
        parent: &mut PageGuard<'_>,
        downlink: usize,
        leaf: &mut PageGuard<'_>,
        delete_xid: u64,
    ) -> Result<bool> {
        if gist_page_is_new(leaf.page()) || gist_page_is_new(parent.page()) {
            return Ok(false);
        }
        let lh = gist_header_read(leaf.page())?;
        if lh.kind() != PageKind::Leaf || lh.follow_right() || lh.nslots != 0 {
            return Ok(false);
        }
        let ph = gist_header_read(parent.page())?;
        if ph.kind() != PageKind::Internal {
            return Ok(false);
        }
        let nslots = ph.nslots as usize;
        if downlink >= nslots || nslots <= 1 {
            return Ok(false);
        }
        if gist_tuple_at(parent.page(), downlink)?.child() != leaf.blkno() {
            return Ok(false);
        }

        // Оба образа готовы до записи в WAL.
        let mut leaf_image = leaf.page().to_vec();
        gist_set_deleted(&mut leaf_image, delete_xid)?;
        let mut parent_image = parent.page().to_vec();
        gist_delete_tuple(&mut parent_image, downlink)?;

        let lsn = self.log_page_delete(leaf, leaf_image, parent, parent_image, downlink, delete_xid)?;
        debug!(
            "unlink: leaf {} removed from parent {} (slot {}), delete_xid={}, lsn={}",
            leaf.blkno(),
            parent.blkno(),
            downlink,
            delete_xid,
            lsn
        );
        Ok(true)
    }

    fn unlink_empty_leaf(
        &self,
        state: &mut ScanState,
        parent: &mut PageGuard<'_>,
        downlink: usize,
        leaf: &mut PageGuard<'_>,
        delete_xid: u64,
    ) -> Result<bool> {
        let done = self.unlink_empty_leaf_pages(parent, downlink, leaf, delete_xid)?;
        if done {
            state.stats.pages_deleted += 1;
            state.stats.pages_newly_deleted += 1;
            record_vacuum_leaf_unlinked();
        }
        Ok(done)
    }
}

/// Лист всё ещё пустой, не в середине split'а и не расщеплялся после снимка родителя.
fn leaf_still_deletable(leaf: &PageGuard<'_>, parent_lsn: u64) -> Result<bool> {
    if gist_page_is_new(leaf.page()) {
        return Ok(false);
    }
    let h = gist_header_read(leaf.page())?;
    Ok(h.kind() == PageKind::Leaf && h.nslots == 0 && !h.follow_right() && h.nsn <= parent_lsn)
}
