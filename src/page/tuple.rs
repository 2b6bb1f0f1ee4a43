//! page/tuple - слотовая директория GiST-страницы и кортежи.
//!
//! Раскладка:
//! [header 64][slot0][slot1]...  ->  свободно  <-  ...[tupleN]...[tuple0][trailer 16]
//! Слот = [off u32][len u32]. Позиции слотов 0-based и плотные: удаление сдвигает хвост.
//!
//! Кортеж = [flags u8][reserved u8][page_id u64][slot u16][key_len u16][key ...]
//! - на листе (page_id, slot) - адрес строки кучи (TupleId);
//! - на внутренней странице page_id - downlink на дочерний блок.

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

use super::common::{
    GIST_HDR_SIZE, SLOT_SIZE, TRAILER_LEN, TUPLE_HDR_SIZE, TUP_OFF_FLAGS, TUP_OFF_KEY_LEN,
    TUP_OFF_PAGE_ID, TUP_OFF_SLOT, T_INVALID,
};
use super::gist::{gist_header_read, gist_header_write};

/// Адрес строки кучи, на которую указывает листовой кортеж.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TupleId {
    pub page_id: u64,
    pub slot: u16,
}

impl TupleId {
    pub fn new(page_id: u64, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

impl fmt::Display for TupleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.page_id, self.slot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GistTuple {
    pub tid: TupleId,
    pub key: Vec<u8>,
    pub invalid: bool,
}

impl GistTuple {
    /// Листовой кортеж: ключ + адрес строки кучи.
    pub fn leaf(tid: TupleId, key: impl Into<Vec<u8>>) -> Self {
        Self {
            tid,
            key: key.into(),
            invalid: false,
        }
    }

    /// Внутренний кортеж: ключ + downlink на дочерний блок.
    pub fn downlink(child: u64, key: impl Into<Vec<u8>>) -> Self {
        Self {
            tid: TupleId::new(child, 0),
            key: key.into(),
            invalid: false,
        }
    }

    #[inline]
    pub fn child(&self) -> u64 {
        self.tid.page_id
    }

    pub fn encoded_len(&self) -> usize {
        TUPLE_HDR_SIZE + self.key.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.key.len() > u16::MAX as usize {
            return Err(anyhow!("tuple key too long: {} bytes", self.key.len()));
        }
        let mut out = vec![0u8; self.encoded_len()];
        out[TUP_OFF_FLAGS] = if self.invalid { T_INVALID } else { 0 };
        LittleEndian::write_u64(&mut out[TUP_OFF_PAGE_ID..TUP_OFF_PAGE_ID + 8], self.tid.page_id);
        LittleEndian::write_u16(&mut out[TUP_OFF_SLOT..TUP_OFF_SLOT + 2], self.tid.slot);
        LittleEndian::write_u16(
            &mut out[TUP_OFF_KEY_LEN..TUP_OFF_KEY_LEN + 2],
            self.key.len() as u16,
        );
        out[TUPLE_HDR_SIZE..].copy_from_slice(&self.key);
        Ok(out)
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < TUPLE_HDR_SIZE {
            return Err(anyhow!("tuple too short: {} bytes", buf.len()));
        }
        let klen = LittleEndian::read_u16(&buf[TUP_OFF_KEY_LEN..TUP_OFF_KEY_LEN + 2]) as usize;
        if TUPLE_HDR_SIZE + klen > buf.len() {
            return Err(anyhow!("tuple key overflows slot ({} > {})", klen, buf.len()));
        }
        Ok(Self {
            tid: TupleId::new(
                LittleEndian::read_u64(&buf[TUP_OFF_PAGE_ID..TUP_OFF_PAGE_ID + 8]),
                LittleEndian::read_u16(&buf[TUP_OFF_SLOT..TUP_OFF_SLOT + 2]),
            ),
            key: buf[TUPLE_HDR_SIZE..TUPLE_HDR_SIZE + klen].to_vec(),
            invalid: buf[TUP_OFF_FLAGS] & T_INVALID != 0,
        })
    }
}

#[inline]
fn slot_pos(i: usize) -> usize {
    GIST_HDR_SIZE + i * SLOT_SIZE
}

fn read_slot(page: &[u8], i: usize) -> Result<(usize, usize)> {
    let p = slot_pos(i);
    let off = LittleEndian::read_u32(&page[p..p + 4]) as usize;
    let len = LittleEndian::read_u32(&page[p + 4..p + 8]) as usize;
    if off < GIST_HDR_SIZE || off + len > page.len() - TRAILER_LEN {
        return Err(anyhow!("slot {} out of bounds (off={}, len={})", i, off, len));
    }
    Ok((off, len))
}

/// Число слотов (0 для удалённой страницы).
pub fn gist_nslots(page: &[u8]) -> Result<usize> {
    Ok(gist_header_read(page)?.nslots as usize)
}

pub fn gist_tuple_at(page: &[u8], i: usize) -> Result<GistTuple> {
    let n = gist_nslots(page)?;
    if i >= n {
        return Err(anyhow!("slot {} out of range (nslots={})", i, n));
    }
    let (off, len) = read_slot(page, i)?;
    GistTuple::decode(&page[off..off + len])
}

/// Все кортежи страницы в порядке слотов.
pub fn gist_tuples(page: &[u8]) -> Result<Vec<GistTuple>> {
    let n = gist_nslots(page)?;
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let (off, len) = read_slot(page, i)?;
        out.push(GistTuple::decode(&page[off..off + len])?);
    }
    Ok(out)
}

/// Свободное место между слотовой директорией и областью кортежей.
pub fn gist_free_space(page: &[u8]) -> Result<usize> {
    let h = gist_header_read(page)?;
    let lower = slot_pos(h.nslots as usize);
    Ok((h.upper as usize).saturating_sub(lower))
}

/// Добавить кортеж в конец; возвращает позицию слота.
pub fn gist_add_tuple(page: &mut [u8], t: &GistTuple) -> Result<usize> {
    let mut h = gist_header_read(page)?;
    if h.is_deleted() {
        return Err(anyhow!("cannot add tuple to deleted page {}", h.page_id));
    }
    let bytes = t.encode()?;
    let free = gist_free_space(page)?;
    if bytes.len() + SLOT_SIZE > free {
        return Err(anyhow!(
            "page {} full: need {} bytes, free {}",
            h.page_id,
            bytes.len() + SLOT_SIZE,
            free
        ));
    }
    let off = h.upper as usize - bytes.len();
    page[off..off + bytes.len()].copy_from_slice(&bytes);
    let i = h.nslots as usize;
    let p = slot_pos(i);
    LittleEndian::write_u32(&mut page[p..p + 4], off as u32);
    LittleEndian::write_u32(&mut page[p + 4..p + 8], bytes.len() as u32);
    h.nslots += 1;
    h.upper = off as u32;
    gist_header_write(page, &h)?;
    Ok(i)
}

/// Удалить набор слотов одной операцией. Страница пересобирается (заголовок сохраняется),
/// оставшиеся кортежи сохраняют относительный порядок.
pub fn gist_multi_delete(page: &mut [u8], positions: &[usize]) -> Result<()> {
    if positions.is_empty() {
        return Ok(());
    }
    let mut h = gist_header_read(page)?;
    let n = h.nslots as usize;
    let mut drop = vec![false; n];
    for &p in positions {
        if p >= n {
            return Err(anyhow!("delete of slot {} out of range (nslots={})", p, n));
        }
        drop[p] = true;
    }
    let keep: Vec<GistTuple> = gist_tuples(page)?
        .into_iter()
        .zip(drop)
        .filter_map(|(t, d)| if d { None } else { Some(t) })
        .collect();

    let ps = page.len();
    page[GIST_HDR_SIZE..ps - TRAILER_LEN].fill(0);
    h.nslots = 0;
    h.upper = (ps - TRAILER_LEN) as u32;
    gist_header_write(page, &h)?;
    for t in &keep {
        gist_add_tuple(page, t)?;
    }
    Ok(())
}

#[inline]
pub fn gist_delete_tuple(page: &mut [u8], position: usize) -> Result<()> {
    gist_multi_delete(page, &[position])
}
