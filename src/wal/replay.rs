//! wal/replay - восстановление страниц после нечистого завершения.
//!
//! - Реплей только если meta.clean_shutdown == false; при чистом завершении WAL усекается.
//! - LSN-гейтинг по каждой странице: запись применяется, только если page_lsn < rec_lsn.
//! - GIST_PAGE_DELETE затрагивает две страницы (лист и родитель); каждая гейтится отдельно,
//!   поэтому краш между записью листа и родителя на диск восстанавливается до согласованного
//!   состояния.
//! - CRC mismatch / частичный хвост - конец журнала (запись не успела дописаться).
//! - Неизвестные типы кадров игнорируются.

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::meta::read_meta;
use crate::page::{
    gist_delete_tuple, gist_mark_tuples_deleted, gist_multi_delete, gist_page_is_new,
    gist_page_lsn, gist_set_deleted, gist_set_lsn,
};
use crate::pager::Pager;

use super::reader::{read_next_record, WalRecord};
use super::record::{GistPageDelete, GistUpdate};
use super::{
    wal_path, write_wal_file_header, WAL_HDR_SIZE, WAL_MAGIC, WAL_REC_GIST_PAGE_DELETE,
    WAL_REC_GIST_UPDATE, WAL_REC_PAGE_IMAGE,
};

/// Прочитать текущую страницу; None, если блок ещё не аллоцирован.
fn read_current(pager: &Pager, page_id: u64) -> Result<Option<Vec<u8>>> {
    if page_id >= pager.nblocks() {
        return Ok(None);
    }
    let mut cur = vec![0u8; pager.page_size()];
    pager.read_page(page_id, &mut cur)?;
    Ok(Some(cur))
}

/// Применить изменение к странице, если её LSN старше записи. Возвращает true, если применено.
fn redo_page<F>(pager: &mut Pager, page_id: u64, lsn: u64, apply: F) -> Result<bool>
where
    F: FnOnce(&mut [u8]) -> Result<()>,
{
    let mut page = match read_current(pager, page_id)? {
        Some(p) => p,
        None => return Err(anyhow!("redo of block {} that was never imaged", page_id)),
    };
    if gist_page_is_new(&page) {
        return Err(anyhow!("redo of uninitialized block {} at lsn {}", page_id, lsn));
    }
    let cur_lsn = gist_page_lsn(&page);
    if cur_lsn >= lsn {
        debug!("replay: skip block {} (page_lsn {} >= rec_lsn {})", page_id, cur_lsn, lsn);
        return Ok(false);
    }
    apply(&mut page)?;
    gist_set_lsn(&mut page, lsn)?;
    pager.write_page_raw(page_id, &page)?;
    Ok(true)
}

fn apply_record(pager: &mut Pager, rec: &WalRecord, next_xid: &mut u64) -> Result<usize> {
    match rec.rec_type {
        WAL_REC_PAGE_IMAGE => {
            if rec.payload.len() != pager.page_size() {
                return Err(anyhow!(
                    "PAGE_IMAGE for block {} has {} bytes, page_size {}",
                    rec.page_id,
                    rec.payload.len(),
                    pager.page_size()
                ));
            }
            if let Some(cur) = read_current(pager, rec.page_id)? {
                if !gist_page_is_new(&cur) && gist_page_lsn(&cur) >= rec.lsn {
                    return Ok(0);
                }
            }
            pager.write_page_raw(rec.page_id, &rec.payload)?;
            Ok(1)
        }
        WAL_REC_GIST_UPDATE => {
            let upd = GistUpdate::decode(&rec.payload)?;
            let done = redo_page(pager, rec.page_id, rec.lsn, |page| {
                gist_multi_delete(page, &upd.positions())?;
                gist_mark_tuples_deleted(page)
            })?;
            Ok(done as usize)
        }
        WAL_REC_GIST_PAGE_DELETE => {
            let del = GistPageDelete::decode(&rec.payload)?;
            // meta.next_xid мог не успеть сохраниться: граница не должна уйти назад.
            *next_xid = (*next_xid).max(del.delete_xid);
            let leaf = redo_page(pager, rec.page_id, rec.lsn, |page| {
                gist_set_deleted(page, del.delete_xid)
            })?;
            let parent = redo_page(pager, del.parent, rec.lsn, |page| {
                gist_delete_tuple(page, del.downlink as usize)
            })?;
            Ok(leaf as usize + parent as usize)
        }
        other => {
            debug!("replay: skip unknown record type {}", other);
            Ok(0)
        }
    }
}

/// Реплей WAL, если индекс был закрыт нечисто. Возвращает максимальный LSN в журнале
/// (или meta.last_lsn, если журнал пуст).
pub fn wal_replay_if_any(root: &Path) -> Result<u64> {
    let meta = read_meta(root)?;
    let path = wal_path(root);
    if meta.unlogged() || !path.exists() {
        debug!("wal_replay_if_any: no WAL at {}, nothing to do", path.display());
        return Ok(meta.last_lsn);
    }

    let mut f = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("open wal {}", path.display()))?;

    if f.metadata()?.len() < WAL_HDR_SIZE as u64 {
        write_wal_file_header(&mut f)?;
        f.sync_all()?;
        return Ok(meta.last_lsn);
    }
    let mut magic = [0u8; 8];
    f.seek(SeekFrom::Start(0))?;
    f.read_exact(&mut magic)?;
    if &magic != WAL_MAGIC {
        return Err(anyhow!("bad WAL magic in {}", path.display()));
    }

    if meta.clean_shutdown {
        if f.metadata()?.len() > WAL_HDR_SIZE as u64 {
            debug!("wal_replay_if_any: clean shutdown -> truncate WAL to header");
            f.set_len(WAL_HDR_SIZE as u64)?;
            f.sync_all()?;
        }
        return Ok(meta.last_lsn);
    }

    debug!("wal_replay_if_any: unclean shutdown -> replay {}", path.display());
    let mut pager = Pager::open(root)?;
    let len = f.metadata()?.len();
    let mut pos = WAL_HDR_SIZE as u64;
    let mut applied = 0usize;
    let mut records = 0usize;
    let mut max_lsn = meta.last_lsn;
    let mut next_xid = meta.next_xid;

    loop {
        let (rec, next) = match read_next_record(&mut f, pos, len) {
            Ok(Some(x)) => x,
            Ok(None) => break,
            Err(e) => {
                warn!("wal_replay_if_any: stop at off={}: {}", pos, e);
                break;
            }
        };
        records += 1;
        max_lsn = max_lsn.max(rec.lsn);
        applied += apply_record(&mut pager, &rec, &mut next_xid)
            .with_context(|| format!("replay record lsn={} at off={}", rec.lsn, rec.pos))?;
        pos = next;
    }

    info!(
        "WAL replay: {} record(s) read, {} page change(s) applied, last_lsn={}",
        records, applied, max_lsn
    );

    // Страницы на диске, meta обновлена - журнал больше не нужен.
    pager.sync_meta(max_lsn, next_xid, meta.clean_shutdown)?;
    f.set_len(WAL_HDR_SIZE as u64)?;
    f.sync_all()?;
    Ok(max_lsn)
}
