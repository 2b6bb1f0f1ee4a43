mod common;

use std::collections::HashSet;

use anyhow::Result;

use QuiverGist::meta::read_meta;
use QuiverGist::page::gist_page_lsn;
use QuiverGist::{GistIndex, IndexVacuumInfo, PageKind, TransactionIds, TupleId};

use common::*;

/// Отцепить пустой лист, сбросить на диск только выбранные страницы и "упасть"
/// (drop без close). После реплея обе страницы согласованы.
fn crash_after_unlink(prefix: &str, flush: &[bool; 2]) -> Result<()> {
    let (root, xids, idx) = fresh_index(prefix)?;
    let blocks = build_tree(&idx, &[vec![], tids(0..3)])?;
    let leaf_blk = blocks[0];
    idx.checkpoint()?;

    let bound = xids.next_xid();
    let mut info = IndexVacuumInfo::default();
    let st = idx.vacuum_cleanup(&mut info, None)?.unwrap_or_default();
    assert_eq!(st.pages_newly_deleted, 1);

    if flush[0] {
        idx.buffers().flush_page(leaf_blk)?;
    }
    if flush[1] {
        idx.buffers().flush_page(0)?;
    }
    drop(idx);
    assert!(!read_meta(&root)?.clean_shutdown);

    let idx = reopen(&root, &xids)?;
    let leaf = page_copy(&idx, leaf_blk)?;
    let parent = page_copy(&idx, 0)?;
    let h = header_of(&idx, leaf_blk)?;
    assert_eq!(h.kind(), PageKind::Deleted);
    assert_eq!(h.delete_xid, bound);
    assert_eq!(children(&idx, 0)?, vec![blocks[1]]);
    assert_eq!(gist_page_lsn(&leaf), gist_page_lsn(&parent));
    assert_eq!(leaf_rows(&idx, blocks[1])?, tids(0..3));
    idx.close()
}

#[test]
fn crash_with_only_leaf_written() -> Result<()> {
    crash_after_unlink("crash-leaf", &[true, false])
}

#[test]
fn crash_with_only_parent_written() -> Result<()> {
    crash_after_unlink("crash-parent", &[false, true])
}

#[test]
fn crash_with_neither_page_written() -> Result<()> {
    crash_after_unlink("crash-none", &[false, false])
}

#[test]
fn removed_tuples_survive_crash() -> Result<()> {
    let (root, xids, idx) = fresh_index("crash-tuples")?;
    let blocks = build_tree(&idx, &[tids(0..8), tids(8..16)])?;

    let dead: HashSet<TupleId> = [1u64, 2, 5, 9, 15].into_iter().map(tid).collect();
    let mut info = IndexVacuumInfo::default();
    idx.bulk_delete(&mut info, None, |t| dead.contains(t))?;
    // Вторая страница успела записаться, первая - нет.
    idx.buffers().flush_page(blocks[1])?;
    drop(idx);

    let idx = reopen(&root, &xids)?;
    let rows = all_leaf_rows(&idx)?;
    assert_eq!(rows.len(), 11);
    assert!(rows.iter().all(|t| !dead.contains(t)));
    assert_eq!(leaf_rows(&idx, blocks[0])?.len(), 5);
    idx.close()
}

#[test]
fn next_xid_survives_clean_and_unclean_close() -> Result<()> {
    let (root, xids, idx) = fresh_index("crash-xid")?;
    build_tree(&idx, &[vec![], tids(0..2)])?;
    xids.advance(40);
    let bound = xids.next_xid();

    let mut info = IndexVacuumInfo::default();
    idx.vacuum_cleanup(&mut info, None)?;
    drop(idx);

    // Без внешнего сервиса счётчик продолжает с сохранённого next_xid.
    let idx = GistIndex::open_with_config(&root, test_cfg())?;
    assert!(idx.transaction_ids().next_xid() >= bound);
    idx.close()?;
    assert!(read_meta(&root)?.next_xid >= bound);
    Ok(())
}

#[test]
fn unlogged_index_vacuums_without_wal() -> Result<()> {
    let root = unique_root("unlogged");
    GistIndex::init_unlogged(&root, PAGE_SIZE)?;
    let idx = GistIndex::open_with_config(&root, test_cfg())?;
    assert!(!idx.is_logged());
    build_tree(&idx, &[tids(0..4), tids(4..8)])?;

    let mut info = IndexVacuumInfo::default();
    let st = idx.bulk_delete(&mut info, None, |t| t.slot < 4)?;
    assert_eq!(st.tuples_removed, 4.0);
    assert_eq!(st.pages_newly_deleted, 1);
    idx.close()?;

    let idx = GistIndex::open_with_config(&root, test_cfg())?;
    assert_eq!(all_leaf_rows(&idx)?, tids(4..8));
    idx.close()
}
