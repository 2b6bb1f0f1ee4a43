//! page/gist - заголовок GiST-страницы: init/read/write, вид страницы, LSN/NSN, пометка удаления.
//!
//! Страница всегда ровно одного вида: Uninit (нули, магии нет), Leaf, Internal или Deleted.
//! Удалённая страница не несёт живых слотов (gist_set_deleted обнуляет слотовую директорию).

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};

use crate::consts::NO_PAGE;

use super::common::{
    F_DELETED, F_FOLLOW_RIGHT, F_LEAF, F_TUPLES_DELETED, GIST_HDR_SIZE, OFF_DELETE_XID,
    OFF_FLAGS, OFF_LSN, OFF_MAGIC, OFF_NSLOTS, OFF_NSN, OFF_PAGE_ID, OFF_RIGHTLINK, OFF_UPPER,
    OFF_VERSION, PAGE_MAGIC, PAGE_VERSION, TRAILER_LEN,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Uninit,
    Leaf,
    Internal,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GistHeader {
    pub flags: u16,
    pub page_id: u64,
    pub lsn: u64,
    pub nsn: u64,
    pub rightlink: u64,
    pub delete_xid: u64,
    pub nslots: u32,
    pub upper: u32,
}

impl GistHeader {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.flags & F_LEAF != 0
    }
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.flags & F_DELETED != 0
    }
    /// Страница в середине split'а: правый сосед уже есть, downlink в родителе ещё нет.
    #[inline]
    pub fn follow_right(&self) -> bool {
        self.flags & F_FOLLOW_RIGHT != 0
    }
    #[inline]
    pub fn has_rightlink(&self) -> bool {
        self.rightlink != NO_PAGE
    }
    pub fn kind(&self) -> PageKind {
        if self.is_deleted() {
            PageKind::Deleted
        } else if self.is_leaf() {
            PageKind::Leaf
        } else {
            PageKind::Internal
        }
    }
}

fn check_len(page: &[u8]) -> Result<()> {
    if page.len() < GIST_HDR_SIZE + TRAILER_LEN {
        return Err(anyhow!("page buffer too small: {} bytes", page.len()));
    }
    Ok(())
}

/// Страница ещё не инициализирована (в заголовке нет магии и он весь нулевой).
pub fn gist_page_is_new(page: &[u8]) -> bool {
    page.len() >= GIST_HDR_SIZE && page[..GIST_HDR_SIZE].iter().all(|&b| b == 0)
}

/// Инициализировать пустую страницу заданного вида (flags: F_LEAF или 0 для внутренней).
pub fn gist_init(page: &mut [u8], page_id: u64, flags: u16) -> Result<()> {
    check_len(page)?;
    if page.len() > u32::MAX as usize {
        return Err(anyhow!("page too large: {} bytes", page.len()));
    }
    page.fill(0);
    let h = GistHeader {
        flags,
        page_id,
        lsn: 0,
        nsn: 0,
        rightlink: NO_PAGE,
        delete_xid: 0,
        nslots: 0,
        upper: (page.len() - TRAILER_LEN) as u32,
    };
    gist_header_write(page, &h)
}

pub fn gist_header_read(page: &[u8]) -> Result<GistHeader> {
    check_len(page)?;
    if &page[OFF_MAGIC..OFF_MAGIC + 4] != PAGE_MAGIC {
        return Err(anyhow!("bad GiST page magic"));
    }
    let ver = LittleEndian::read_u16(&page[OFF_VERSION..OFF_VERSION + 2]);
    if ver != PAGE_VERSION {
        return Err(anyhow!("unsupported GiST page version {}", ver));
    }
    Ok(GistHeader {
        flags: LittleEndian::read_u16(&page[OFF_FLAGS..OFF_FLAGS + 2]),
        page_id: LittleEndian::read_u64(&page[OFF_PAGE_ID..OFF_PAGE_ID + 8]),
        lsn: LittleEndian::read_u64(&page[OFF_LSN..OFF_LSN + 8]),
        nsn: LittleEndian::read_u64(&page[OFF_NSN..OFF_NSN + 8]),
        rightlink: LittleEndian::read_u64(&page[OFF_RIGHTLINK..OFF_RIGHTLINK + 8]),
        delete_xid: LittleEndian::read_u64(&page[OFF_DELETE_XID..OFF_DELETE_XID + 8]),
        nslots: LittleEndian::read_u32(&page[OFF_NSLOTS..OFF_NSLOTS + 4]),
        upper: LittleEndian::read_u32(&page[OFF_UPPER..OFF_UPPER + 4]),
    })
}

pub fn gist_header_write(page: &mut [u8], h: &GistHeader) -> Result<()> {
    check_len(page)?;
    page[OFF_MAGIC..OFF_MAGIC + 4].copy_from_slice(PAGE_MAGIC);
    LittleEndian::write_u16(&mut page[OFF_VERSION..OFF_VERSION + 2], PAGE_VERSION);
    LittleEndian::write_u16(&mut page[OFF_FLAGS..OFF_FLAGS + 2], h.flags);
    LittleEndian::write_u64(&mut page[OFF_PAGE_ID..OFF_PAGE_ID + 8], h.page_id);
    LittleEndian::write_u64(&mut page[OFF_LSN..OFF_LSN + 8], h.lsn);
    LittleEndian::write_u64(&mut page[OFF_NSN..OFF_NSN + 8], h.nsn);
    LittleEndian::write_u64(&mut page[OFF_RIGHTLINK..OFF_RIGHTLINK + 8], h.rightlink);
    LittleEndian::write_u64(&mut page[OFF_DELETE_XID..OFF_DELETE_XID + 8], h.delete_xid);
    LittleEndian::write_u32(&mut page[OFF_NSLOTS..OFF_NSLOTS + 4], h.nslots);
    LittleEndian::write_u32(&mut page[OFF_UPPER..OFF_UPPER + 4], h.upper);
    Ok(())
}

/// Вид страницы. Ненулевой заголовок без магии - повреждение (ошибка).
pub fn gist_page_kind(page: &[u8]) -> Result<PageKind> {
    if gist_page_is_new(page) {
        return Ok(PageKind::Uninit);
    }
    Ok(gist_header_read(page)?.kind())
}

/// LSN страницы; 0 для новой.
pub fn gist_page_lsn(page: &[u8]) -> u64 {
    if page.len() < GIST_HDR_SIZE || &page[OFF_MAGIC..OFF_MAGIC + 4] != PAGE_MAGIC {
        return 0;
    }
    LittleEndian::read_u64(&page[OFF_LSN..OFF_LSN + 8])
}

pub fn gist_set_lsn(page: &mut [u8], lsn: u64) -> Result<()> {
    check_len(page)?;
    if &page[OFF_MAGIC..OFF_MAGIC + 4] != PAGE_MAGIC {
        return Err(anyhow!("gist_set_lsn: page is not initialized"));
    }
    LittleEndian::write_u64(&mut page[OFF_LSN..OFF_LSN + 8], lsn);
    Ok(())
}

/// Отметить, что со страницы удалялись кортежи (сканы, видевшие старую версию, перечитают её).
pub fn gist_mark_tuples_deleted(page: &mut [u8]) -> Result<()> {
    let mut h = gist_header_read(page)?;
    h.flags |= F_TUPLES_DELETED;
    gist_header_write(page, &h)
}

pub fn gist_set_follow_right(page: &mut [u8], on: bool) -> Result<()> {
    let mut h = gist_header_read(page)?;
    if on {
        h.flags |= F_FOLLOW_RIGHT;
    } else {
        h.flags &= !F_FOLLOW_RIGHT;
    }
    gist_header_write(page, &h)
}

/// Пометить лист удалённым с границей xid. Слоты сбрасываются: у удалённой страницы их нет.
pub fn gist_set_deleted(page: &mut [u8], delete_xid: u64) -> Result<()> {
    let mut h = gist_header_read(page)?;
    let ps = page.len();
    h.flags |= F_DELETED;
    h.delete_xid = delete_xid;
    h.nslots = 0;
    h.upper = (ps - TRAILER_LEN) as u32;
    page[GIST_HDR_SIZE..ps - TRAILER_LEN].fill(0);
    gist_header_write(page, &h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_page_is_uninit() {
        let page = vec![0u8; 4096];
        assert!(gist_page_is_new(&page));
        assert_eq!(gist_page_kind(&page).unwrap(), PageKind::Uninit);
        assert_eq!(gist_page_lsn(&page), 0);
    }

    #[test]
    fn init_and_flags() {
        let mut page = vec![0u8; 4096];
        gist_init(&mut page, 9, F_LEAF).unwrap();
        assert_eq!(gist_page_kind(&page).unwrap(), PageKind::Leaf);
        let h = gist_header_read(&page).unwrap();
        assert_eq!(h.page_id, 9);
        assert!(!h.has_rightlink());

        gist_set_follow_right(&mut page, true).unwrap();
        assert!(gist_header_read(&page).unwrap().follow_right());
        gist_set_follow_right(&mut page, false).unwrap();
        assert!(!gist_header_read(&page).unwrap().follow_right());

        gist_set_lsn(&mut page, 55).unwrap();
        assert_eq!(gist_page_lsn(&page), 55);

        gist_set_deleted(&mut page, 1234).unwrap();
        let h = gist_header_read(&page).unwrap();
        assert_eq!(h.kind(), PageKind::Deleted);
        assert_eq!(h.delete_xid, 1234);
        assert_eq!(h.nslots, 0);
    }

    #[test]
    fn garbage_header_is_an_error() {
        let mut page = vec![0u8; 4096];
        page[0] = b'X';
        assert!(gist_page_kind(&page).is_err());
    }
}
