mod common;

use anyhow::Result;

use QuiverGist::page::{gist_add_tuple, gist_page_lsn};
use QuiverGist::{GistTuple, IndexVacuumInfo, PageKind, TransactionIds};

use common::*;

#[test]
fn unlink_marks_leaf_and_drops_downlink_under_one_lsn() -> Result<()> {
    let (_root, xids, idx) = fresh_index("unlink-ok")?;
    let blocks = build_tree(&idx, &[vec![], tids(0..3), tids(3..6)])?;
    let leaf_blk = blocks[0];

    let active = xids.begin();
    let bound = xids.next_xid();
    {
        let mut leaf = idx.buffers().read_exclusive(leaf_blk)?;
        let mut parent = idx.buffers().read_exclusive(0)?;
        assert!(idx.unlink_empty_leaf_pages(&mut parent, 0, &mut leaf, bound)?);
    }
    xids.finish(active);

    let leaf = page_copy(&idx, leaf_blk)?;
    let parent = page_copy(&idx, 0)?;
    assert_eq!(gist_page_lsn(&leaf), gist_page_lsn(&parent));
    let h = header_of(&idx, leaf_blk)?;
    assert_eq!(h.kind(), PageKind::Deleted);
    assert!(h.delete_xid > active);
    assert_eq!(children(&idx, 0)?, blocks[1..].to_vec());
    idx.close()
}

#[test]
fn unlink_refuses_when_preconditions_do_not_hold() -> Result<()> {
    let (_root, xids, idx) = fresh_index("unlink-refused")?;
    let blocks = build_tree(&idx, &[vec![], tids(0..3)])?;
    let (empty, full) = (blocks[0], blocks[1]);
    let bound = xids.next_xid();

    let mut parent = idx.buffers().read_exclusive(0)?;
    {
        // Лист не пуст.
        let mut leaf = idx.buffers().read_exclusive(full)?;
        assert!(!idx.unlink_empty_leaf_pages(&mut parent, 1, &mut leaf, bound)?);
    }
    {
        let mut leaf = idx.buffers().read_exclusive(empty)?;
        // Слот указывает на другой блок.
        assert!(!idx.unlink_empty_leaf_pages(&mut parent, 1, &mut leaf, bound)?);
        // Слот за концом родителя.
        assert!(!idx.unlink_empty_leaf_pages(&mut parent, 7, &mut leaf, bound)?);
    }
    {
        // "Родитель" - сам лист.
        let mut leaf = idx.buffers().read_exclusive(empty)?;
        let mut not_parent = idx.buffers().read_exclusive(full)?;
        assert!(!idx.unlink_empty_leaf_pages(&mut not_parent, 0, &mut leaf, bound)?);
    }
    drop(parent);

    assert_eq!(kind_of(&idx, empty)?, PageKind::Leaf);
    assert_eq!(children(&idx, 0)?, blocks);
    idx.close()
}

#[test]
fn last_downlink_is_never_removed() -> Result<()> {
    let (_root, xids, idx) = fresh_index("unlink-last")?;
    let blocks = build_tree(&idx, &[vec![]])?;
    {
        let mut leaf = idx.buffers().read_exclusive(blocks[0])?;
        let mut parent = idx.buffers().read_exclusive(0)?;
        assert!(!idx.unlink_empty_leaf_pages(&mut parent, 0, &mut leaf, xids.next_xid())?);
    }

    let mut info = IndexVacuumInfo::default();
    let st = idx.vacuum_cleanup(&mut info, None)?.unwrap_or_default();
    assert_eq!(st.pages_deleted, 0);
    assert_eq!(children(&idx, 0)?, blocks);
    idx.close()
}

#[test]
fn several_empty_children_keep_one_downlink() -> Result<()> {
    let (_root, _xids, idx) = fresh_index("unlink-all-but-one")?;
    let blocks = build_tree(&idx, &[vec![], vec![], vec![], vec![]])?;

    let mut info = IndexVacuumInfo::default();
    let st = idx.vacuum_cleanup(&mut info, None)?.unwrap_or_default();
    assert_eq!(st.pages_newly_deleted, 3);

    // Отобраны первые три по порядку слотов; позиции сдвигаются после каждого unlink'а.
    assert_eq!(children(&idx, 0)?, vec![blocks[3]]);
    for &b in &blocks[..3] {
        assert_eq!(kind_of(&idx, b)?, PageKind::Deleted);
    }
    idx.close()
}

#[test]
fn deleted_leaf_is_counted_but_not_freed_while_a_reader_may_hold_it() -> Result<()> {
    let (_root, xids, idx) = fresh_index("unlink-horizon")?;
    build_tree(&idx, &[vec![], tids(0..2)])?;

    let reader = xids.begin();
    let mut info = IndexVacuumInfo::default();
    let first = idx.vacuum_cleanup(&mut info, None)?.unwrap_or_default();
    assert_eq!(first.pages_newly_deleted, 1);

    let mut info = IndexVacuumInfo::default();
    let second = idx.vacuum_cleanup(&mut info, None)?.unwrap_or_default();
    assert_eq!(second.pages_deleted, 1);
    assert_eq!(second.pages_newly_deleted, 0);
    assert_eq!(second.pages_free, 0);

    xids.finish(reader);
    xids.advance(1);
    let mut info = IndexVacuumInfo::default();
    let third = idx.vacuum_cleanup(&mut info, None)?.unwrap_or_default();
    assert_eq!(third.pages_deleted, 1);
    assert_eq!(third.pages_free, 1);
    idx.close()
}

#[test]
fn staged_leaf_refilled_before_unlink_stays_linked() -> Result<()> {
    let (_root, _xids, idx) = fresh_index("reclaim-refill")?;
    let blocks = build_tree(&idx, &[vec![], tids(0..3)])?;
    let empty = blocks[0];

    // Хуки: корень, два листа, затем reclaim перед захватом отобранного листа.
    let mut calls = 0u64;
    let st = {
        let idx_ref = &idx;
        let mut info = IndexVacuumInfo::default().with_delay_hook(move || {
            calls += 1;
            if calls == 4 {
                let mut g = idx_ref.buffers().read_exclusive(empty).expect("lock leaf");
                let mut image = g.page().to_vec();
                gist_add_tuple(&mut image, &GistTuple::leaf(tid(50), "late")).expect("add");
                idx_ref.log_page_image(&mut g, image).expect("log");
            }
        });
        idx.vacuum_cleanup(&mut info, None)?.unwrap_or_default()
    };

    assert_eq!(st.pages_newly_deleted, 0);
    assert_eq!(kind_of(&idx, empty)?, PageKind::Leaf);
    assert_eq!(leaf_rows(&idx, empty)?, vec![tid(50)]);
    assert_eq!(children(&idx, 0)?, blocks);
    idx.close()
}

#[test]
fn staged_leaf_split_after_parent_snapshot_stays_linked() -> Result<()> {
    let (_root, _xids, idx) = fresh_index("reclaim-split")?;
    let blocks = build_tree(&idx, &[vec![], tids(0..3)])?;
    let empty = blocks[0];

    let mut calls = 0u64;
    let st = {
        let idx_ref = &idx;
        let mut info = IndexVacuumInfo::default().with_delay_hook(move || {
            calls += 1;
            if calls == 4 {
                split_leaf(idx_ref, empty, Some(0)).expect("split");
            }
        });
        idx.vacuum_cleanup(&mut info, None)?.unwrap_or_default()
    };

    // Лист всё ещё пуст и без FOLLOW_RIGHT, но его NSN новее снимка родителя.
    let h = header_of(&idx, empty)?;
    assert_eq!(h.kind(), PageKind::Leaf);
    assert_eq!(h.nslots, 0);
    assert!(!h.follow_right());
    assert_eq!(st.pages_newly_deleted, 0);
    assert!(children(&idx, 0)?.contains(&empty));
    idx.close()
}
