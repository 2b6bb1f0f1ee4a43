#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use QuiverGist::page::{
    gist_add_tuple, gist_header_read, gist_header_write, gist_init, gist_page_kind,
    gist_set_follow_right, gist_tuples, GistHeader, F_FOLLOW_RIGHT, F_LEAF,
};
use QuiverGist::{ConfigBuilder, GistConfig, GistIndex, GistTuple, PageKind, TupleId, XidCounter};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub const PAGE_SIZE: u32 = 4096;

pub fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("qgtest-{prefix}-{pid}-{t}-{id}"))
}

pub fn test_cfg() -> GistConfig {
    ConfigBuilder::from_default().wal_fsync(false).build()
}

/// Новый журналируемый индекс и его xid-счётчик (тест двигает горизонт сам).
pub fn fresh_index(prefix: &str) -> Result<(PathBuf, Arc<XidCounter>, GistIndex)> {
    let root = unique_root(prefix);
    GistIndex::init(&root, PAGE_SIZE)?;
    let xids = Arc::new(XidCounter::new());
    let idx = GistIndex::open_with_xids(&root, test_cfg(), xids.clone())?;
    Ok((root, xids, idx))
}

pub fn reopen(root: &Path, xids: &Arc<XidCounter>) -> Result<GistIndex> {
    GistIndex::open_with_xids(root, test_cfg(), xids.clone())
}

/// Адрес строки кучи по порядковому номеру.
pub fn tid(n: u64) -> TupleId {
    TupleId::new(1000 + n / 100, (n % 100) as u16)
}

pub fn tids(range: std::ops::Range<u64>) -> Vec<TupleId> {
    range.map(tid).collect()
}

/// Новый лист с заданными кортежами; возвращает его блок.
pub fn new_leaf(idx: &GistIndex, rows: &[TupleId]) -> Result<u64> {
    let mut g = idx.allocate_page()?;
    let blk = g.blkno();
    let mut image = vec![0u8; idx.page_size()];
    gist_init(&mut image, blk, F_LEAF)?;
    for (i, t) in rows.iter().enumerate() {
        gist_add_tuple(&mut image, &GistTuple::leaf(*t, format!("key-{}", i)))?;
    }
    idx.log_page_image(&mut g, image)?;
    Ok(blk)
}

/// Переписать корень внутренней страницей с downlink'ами на children.
pub fn set_root_children(idx: &GistIndex, children: &[u64]) -> Result<()> {
    let mut g = idx.buffers().read_exclusive(0)?;
    let mut image = vec![0u8; idx.page_size()];
    gist_init(&mut image, 0, 0)?;
    for &c in children {
        gist_add_tuple(&mut image, &GistTuple::downlink(c, "bbox"))?;
    }
    idx.log_page_image(&mut g, image)?;
    Ok(())
}

/// Двухуровневое дерево: корень (блок 0) и по листу на каждый набор строк.
pub fn build_tree(idx: &GistIndex, leaves: &[Vec<TupleId>]) -> Result<Vec<u64>> {
    let mut blocks = Vec::with_capacity(leaves.len());
    for rows in leaves {
        blocks.push(new_leaf(idx, rows)?);
    }
    set_root_children(idx, &blocks)?;
    Ok(blocks)
}

pub fn page_copy(idx: &GistIndex, blk: u64) -> Result<Vec<u8>> {
    let g = idx.buffers().read_exclusive(blk)?;
    Ok(g.page().to_vec())
}

pub fn kind_of(idx: &GistIndex, blk: u64) -> Result<PageKind> {
    gist_page_kind(&page_copy(idx, blk)?)
}

pub fn header_of(idx: &GistIndex, blk: u64) -> Result<GistHeader> {
    gist_header_read(&page_copy(idx, blk)?)
}

pub fn children(idx: &GistIndex, parent: u64) -> Result<Vec<u64>> {
    Ok(gist_tuples(&page_copy(idx, parent)?)?
        .iter()
        .map(|t| t.child())
        .collect())
}

pub fn leaf_rows(idx: &GistIndex, blk: u64) -> Result<Vec<TupleId>> {
    Ok(gist_tuples(&page_copy(idx, blk)?)?
        .iter()
        .map(|t| t.tid)
        .collect())
}

/// Все строки, на которые ссылаются живые листья индекса.
pub fn all_leaf_rows(idx: &GistIndex) -> Result<Vec<TupleId>> {
    let mut out = Vec::new();
    for blk in 0..idx.nblocks()? {
        if kind_of(idx, blk)? == PageKind::Leaf {
            out.extend(leaf_rows(idx, blk)?);
        }
    }
    Ok(out)
}

/// Split листа так, как это делает вставка: правая половина уезжает на новую страницу
/// (из FSM, если там есть переиспользуемая), левая получает rightlink, NSN = LSN split'а
/// и FOLLOW_RIGHT. С parent downlink на правую страницу вставляется сразу и FOLLOW_RIGHT
/// снимается; без него страница остаётся в середине split'а.
pub fn split_leaf(idx: &GistIndex, blk: u64, parent: Option<u64>) -> Result<u64> {
    let mut left = idx.buffers().read_exclusive(blk)?;
    let mut right = idx.allocate_page()?;
    let right_blk = right.blkno();

    let lh = gist_header_read(left.page())?;
    let rows = gist_tuples(left.page())?;
    let (keep, moved) = rows.split_at(rows.len() / 2);
    let ps = idx.page_size();

    let mut rimg = vec![0u8; ps];
    gist_init(&mut rimg, right_blk, F_LEAF)?;
    for t in moved {
        gist_add_tuple(&mut rimg, t)?;
    }
    let mut rh = gist_header_read(&rimg)?;
    rh.rightlink = lh.rightlink;
    gist_header_write(&mut rimg, &rh)?;
    let split_lsn = idx.log_page_image(&mut right, rimg)?;

    let mut limg = vec![0u8; ps];
    gist_init(&mut limg, blk, F_LEAF | F_FOLLOW_RIGHT)?;
    for t in keep {
        gist_add_tuple(&mut limg, t)?;
    }
    let mut nh = gist_header_read(&limg)?;
    nh.rightlink = right_blk;
    nh.nsn = split_lsn;
    gist_header_write(&mut limg, &nh)?;
    idx.log_page_image(&mut left, limg)?;

    if let Some(p) = parent {
        let mut pg = idx.buffers().read_exclusive(p)?;
        let mut pimg = pg.page().to_vec();
        gist_add_tuple(&mut pimg, &GistTuple::downlink(right_blk, "bbox"))?;
        idx.log_page_image(&mut pg, pimg)?;

        let mut limg = left.page().to_vec();
        gist_set_follow_right(&mut limg, false)?;
        idx.log_page_image(&mut left, limg)?;
    }
    Ok(right_blk)
}
