use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

use QuiverGist::free::FreeSpaceMap;
use QuiverGist::lock::{try_acquire_lock, LockMode};
use QuiverGist::meta::read_meta;
use QuiverGist::page::{gist_page_kind, gist_tuples, PageKind};
use QuiverGist::pager::Pager;

#[derive(Debug, Default, Serialize)]
struct Census {
    pages: u64,
    leaf: u64,
    internal: u64,
    deleted: u64,
    uninit: u64,
    leaf_tuples: u64,
    invalid_inner_tuples: u64,
    fsm_pages: u64,
}

/// Статус по состоянию на диске. После нечистого закрытия страницы могут отставать
/// от WAL до следующего открытия writer'ом (реплей).
pub fn exec(path: PathBuf, json: bool) -> Result<()> {
    let _lock = try_acquire_lock(&path, LockMode::Shared)?;
    let m = read_meta(&path)?;
    let pager = Pager::open(&path)?;

    let mut c = Census {
        pages: pager.nblocks(),
        ..Census::default()
    };
    let mut buf = vec![0u8; pager.page_size()];
    for blk in 0..pager.nblocks() {
        pager
            .read_page(blk, &mut buf)
            .with_context(|| format!("status: read block {}", blk))?;
        match gist_page_kind(&buf)? {
            PageKind::Uninit => c.uninit += 1,
            PageKind::Deleted => c.deleted += 1,
            PageKind::Leaf => {
                c.leaf += 1;
                c.leaf_tuples += gist_tuples(&buf)?.len() as u64;
            }
            PageKind::Internal => {
                c.internal += 1;
                c.invalid_inner_tuples +=
                    gist_tuples(&buf)?.iter().filter(|t| t.invalid).count() as u64;
            }
        }
    }
    c.fsm_pages = FreeSpaceMap::open(&path)?.count()?;

    if json {
        let out = serde_json::json!({
            "meta": {
                "version": m.version,
                "page_size": m.page_size,
                "unlogged": m.unlogged(),
                "next_page_id": m.next_page_id,
                "last_lsn": m.last_lsn,
                "next_xid": m.next_xid,
                "clean_shutdown": m.clean_shutdown,
            },
            "pages": c,
        });
        println!("{}", serde_json::to_string(&out)?);
        return Ok(());
    }

    println!("Index: {}", path.display());
    println!("  page_size      = {}", m.page_size);
    println!("  unlogged       = {}", m.unlogged());
    println!("  last_lsn       = {}", m.last_lsn);
    println!("  next_xid       = {}", m.next_xid);
    println!("  clean_shutdown = {}", m.clean_shutdown);
    println!("Pages: {} (leaf={}, internal={}, deleted={}, uninit={})",
        c.pages, c.leaf, c.internal, c.deleted, c.uninit);
    println!("  leaf tuples          = {}", c.leaf_tuples);
    println!("  invalid inner tuples = {}", c.invalid_inner_tuples);
    println!("  fsm pages            = {}", c.fsm_pages);
    if c.invalid_inner_tuples > 0 {
        println!("  hint: index has invalid inner tuples, REINDEX it");
    }
    Ok(())
}
