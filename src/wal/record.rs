//! wal/record - payload'ы GiST-записей WAL.
//!
//! GIST_UPDATE (page_id = страница):
//!   [n u32][pos u32]*n - позиции удалённых слотов (по состоянию страницы до удаления)
//!
//! GIST_PAGE_DELETE (page_id = лист):
//!   [parent u64][downlink u32][delete_xid u64]

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GistUpdate {
    pub deleted: Vec<u32>,
}

impl GistUpdate {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; 4 + 4 * self.deleted.len()];
        LittleEndian::write_u32(&mut out[0..4], self.deleted.len() as u32);
        for (i, &p) in self.deleted.iter().enumerate() {
            let o = 4 + 4 * i;
            LittleEndian::write_u32(&mut out[o..o + 4], p);
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(anyhow!("GIST_UPDATE payload too short"));
        }
        let n = LittleEndian::read_u32(&buf[0..4]) as usize;
        if buf.len() != 4 + 4 * n {
            return Err(anyhow!(
                "GIST_UPDATE payload length {} does not match count {}",
                buf.len(),
                n
            ));
        }
        let deleted = (0..n)
            .map(|i| LittleEndian::read_u32(&buf[4 + 4 * i..8 + 4 * i]))
            .collect();
        Ok(Self { deleted })
    }

    pub fn positions(&self) -> Vec<usize> {
        self.deleted.iter().map(|&p| p as usize).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GistPageDelete {
    pub parent: u64,
    pub downlink: u32,
    pub delete_xid: u64,
}

impl GistPageDelete {
    pub const ENCODED_LEN: usize = 20;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; Self::ENCODED_LEN];
        LittleEndian::write_u64(&mut out[0..8], self.parent);
        LittleEndian::write_u32(&mut out[8..12], self.downlink);
        LittleEndian::write_u64(&mut out[12..20], self.delete_xid);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != Self::ENCODED_LEN {
            return Err(anyhow!("GIST_PAGE_DELETE payload must be {} bytes", Self::ENCODED_LEN));
        }
        Ok(Self {
            parent: LittleEndian::read_u64(&buf[0..8]),
            downlink: LittleEndian::read_u32(&buf[8..12]),
            delete_xid: LittleEndian::read_u64(&buf[12..20]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_rejects_bad_length() {
        let mut buf = GistUpdate { deleted: vec![1, 4] }.encode();
        assert_eq!(GistUpdate::decode(&buf).unwrap().positions(), vec![1, 4]);
        buf.pop();
        assert!(GistUpdate::decode(&buf).is_err());
    }

    #[test]
    fn page_delete_layout() {
        let rec = GistPageDelete {
            parent: 7,
            downlink: 2,
            delete_xid: 1000,
        };
        let buf = rec.encode();
        assert_eq!(buf.len(), GistPageDelete::ENCODED_LEN);
        assert_eq!(LittleEndian::read_u64(&buf[0..8]), 7);
        assert_eq!(GistPageDelete::decode(&buf).unwrap(), rec);
    }
}
