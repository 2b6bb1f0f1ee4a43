// src/meta.rs - QuiverGist index meta (v1)
//
// Формат <root>/meta (LE):
// MAGIC8 = "QGISTMET"
// u32 version         = 1
// u32 page_size       (4 KiB..=1 MiB, power of two)
// u32 flags           (bit0 = UNLOGGED)
// u64 next_page_id
// u64 last_lsn
// u64 next_xid        (следующий xid на момент checkpoint/close)
// u8  clean_shutdown  (1=clean, 0=unclean)
//
// Политика:
// - Атомарная запись: tmp+rename, затем fsync родительского каталога (best‑effort на Windows).
// - validate_page_size: 4096..=1MiB, степень двойки.
// - clean_shutdown=false на время работы writer'а; при следующем open это сигнал к WAL replay.

use anyhow::{anyhow, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{self, OpenOptions};
#[cfg(unix)]
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::consts::{FIRST_NORMAL_XID, META_FILE, META_FLAG_UNLOGGED, META_MAGIC, META_VERSION};

#[derive(Debug, Clone)]
pub struct MetaHeader {
    pub version: u32,
    pub page_size: u32,
    pub flags: u32,
    pub next_page_id: u64,
    pub last_lsn: u64,
    pub next_xid: u64,
    pub clean_shutdown: bool,
}

impl Default for MetaHeader {
    fn default() -> Self {
        Self {
            version: META_VERSION,
            page_size: 8192,
            flags: 0,
            next_page_id: 0,
            last_lsn: 0,
            next_xid: FIRST_NORMAL_XID,
            clean_shutdown: true,
        }
    }
}

impl MetaHeader {
    #[inline]
    pub fn unlogged(&self) -> bool {
        self.flags & META_FLAG_UNLOGGED != 0
    }
}

#[inline]
fn meta_path(root: &Path) -> PathBuf {
    root.join(META_FILE)
}

#[cfg(unix)]
fn fsync_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }
    }
    Ok(())
}
#[cfg(not(unix))]
fn fsync_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Проверка корректности размера страницы (2^n, 4 KiB .. 1 MiB).
pub fn validate_page_size(page_size: u32) -> Result<()> {
    const MAX: u32 = 1 << 20; // 1 MiB
    if page_size < 4096 || page_size > MAX || (page_size & (page_size - 1)) != 0 {
        return Err(anyhow!(
            "page_size must be a power of two in [4096 .. 1048576], got {}",
            page_size
        ));
    }
    Ok(())
}

/// Создать новый meta. Ошибка, если уже существует.
pub fn write_meta_new(root: &Path, h: &MetaHeader) -> Result<()> {
    let path = meta_path(root);
    if path.exists() {
        return Err(anyhow!("meta already exists at {}", path.display()));
    }
    write_meta_overwrite(root, h)
}

/// Перезаписать meta через tmp+rename.
pub fn write_meta_overwrite(root: &Path, h: &MetaHeader) -> Result<()> {
    validate_page_size(h.page_size)?;

    let path = meta_path(root);
    let tmp = root.join(format!("{}.tmp", META_FILE));
    let _ = fs::remove_file(&tmp);

    let mut f = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)
        .with_context(|| format!("open meta tmp {}", tmp.display()))?;

    write_meta_contents(&mut f, h)?;
    f.sync_all()?;

    fs::rename(&tmp, &path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    let _ = fsync_dir(&path);
    Ok(())
}

fn write_meta_contents(f: &mut std::fs::File, h: &MetaHeader) -> Result<()> {
    f.seek(SeekFrom::Start(0))?;
    f.write_all(META_MAGIC)?;
    f.write_u32::<LittleEndian>(h.version)?;
    f.write_u32::<LittleEndian>(h.page_size)?;
    f.write_u32::<LittleEndian>(h.flags)?;
    f.write_u64::<LittleEndian>(h.next_page_id)?;
    f.write_u64::<LittleEndian>(h.last_lsn)?;
    f.write_u64::<LittleEndian>(h.next_xid)?;
    f.write_u8(if h.clean_shutdown { 1 } else { 0 })?;
    Ok(())
}

/// Прочитать meta.
pub fn read_meta(root: &Path) -> Result<MetaHeader> {
    let path = meta_path(root);
    let mut f = OpenOptions::new()
        .read(true)
        .open(&path)
        .with_context(|| format!("open meta {}", path.display()))?;

    let mut magic = [0u8; 8];
    f.read_exact(&mut magic)?;
    if &magic != META_MAGIC {
        return Err(anyhow!("bad meta magic at {}", path.display()));
    }

    let version = f.read_u32::<LittleEndian>()?;
    if version != META_VERSION {
        return Err(anyhow!(
            "unsupported meta version {} at {} (expected {})",
            version,
            path.display(),
            META_VERSION
        ));
    }

    let page_size = f.read_u32::<LittleEndian>()?;
    let flags = f.read_u32::<LittleEndian>()?;
    let next_page_id = f.read_u64::<LittleEndian>()?;
    let last_lsn = f.read_u64::<LittleEndian>()?;
    let next_xid = f.read_u64::<LittleEndian>()?;
    let clean_shutdown = f.read_u8()? != 0;

    Ok(MetaHeader {
        version,
        page_size,
        flags,
        next_page_id,
        last_lsn,
        next_xid,
        clean_shutdown,
    })
}

/// Пометить meta.clean_shutdown (только при изменении).
pub fn set_clean_shutdown(root: &Path, clean: bool) -> Result<()> {
    let mut m = read_meta(root)?;
    if m.clean_shutdown != clean {
        m.clean_shutdown = clean;
        write_meta_overwrite(root, &m)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_roundtrip_and_clean_flag() {
        let root = std::env::temp_dir().join(format!("qg-meta-{}", nanos_for_test()));
        fs::create_dir_all(&root).unwrap();

        let m0 = MetaHeader {
            page_size: 16384,
            flags: META_FLAG_UNLOGGED,
            next_page_id: 42,
            last_lsn: 77,
            next_xid: 500,
            clean_shutdown: false,
            ..MetaHeader::default()
        };
        write_meta_new(&root, &m0).unwrap();
        assert!(write_meta_new(&root, &m0).is_err(), "second create must fail");

        let m1 = read_meta(&root).unwrap();
        assert_eq!(m1.page_size, 16384);
        assert!(m1.unlogged());
        assert_eq!(m1.next_page_id, 42);
        assert_eq!(m1.last_lsn, 77);
        assert_eq!(m1.next_xid, 500);
        assert!(!m1.clean_shutdown);

        set_clean_shutdown(&root, true).unwrap();
        assert!(read_meta(&root).unwrap().clean_shutdown);
    }

    #[test]
    fn page_size_validation() {
        assert!(validate_page_size(8192).is_ok());
        assert!(validate_page_size(1000).is_err());
        assert!(validate_page_size(2048).is_err());
        assert!(validate_page_size(3 * 4096).is_err());
    }

    fn nanos_for_test() -> u128 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    }
}
