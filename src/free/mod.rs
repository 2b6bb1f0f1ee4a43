//! free - free-space map индекса (файл `<root>/fsm`).
//!
//! Формат (LE):
//! - Header (16 B):
//!   [magic8="QGFSM001"][ver u32=1][reserved u32=0]
//! - Tail:
//!   последовательность u64 page_id (LE), по одному на запись.
//!
//! Политика:
//! - Источник истины для количества - длина файла: (len - HDR) / 8.
//! - record_free/pop обновляют длину и fsync'ят файл (best-effort).
//! - Дубликаты допустимы до vacuum(): vacuum сортирует и убирает повторы, после него pop
//!   выдаёт блоки по возрастанию номера.
//! - FSM - подсказка, а не истина: потребитель (GistIndex::allocate_page) обязан перепроверить
//!   страницу под блокировкой.
//!
//! Вызовы должны выполняться под внешней синхронизацией (GistIndex держит FSM под Mutex).

use anyhow::{anyhow, Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::consts::{FSM_FILE, FSM_HDR_SIZE, FSM_MAGIC, FSM_VERSION};
use crate::metrics::record_fsm_page_recorded;

pub struct FreeSpaceMap {
    path: PathBuf,
}

fn write_header(f: &mut std::fs::File) -> Result<()> {
    f.seek(SeekFrom::Start(0))?;
    f.write_all(FSM_MAGIC)?;
    let mut buf4 = [0u8; 4];
    LittleEndian::write_u32(&mut buf4, FSM_VERSION);
    f.write_all(&buf4)?;
    LittleEndian::write_u32(&mut buf4, 0);
    f.write_all(&buf4)?;
    Ok(())
}

impl FreeSpaceMap {
    /// Создать новую пустую FSM. Ошибка, если уже существует.
    pub fn create(root: &Path) -> Result<Self> {
        let path = root.join(FSM_FILE);
        if path.exists() {
            return Err(anyhow!("free-space map already exists at {}", path.display()));
        }
        let mut f = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("create fsm {}", path.display()))?;
        write_header(&mut f)?;
        let _ = f.sync_all();
        Ok(Self { path })
    }

    /// Открыть существующую FSM и проверить заголовок.
    pub fn open(root: &Path) -> Result<Self> {
        let path = root.join(FSM_FILE);
        let mut f = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("open fsm {}", path.display()))?;

        let mut magic = [0u8; 8];
        f.read_exact(&mut magic)?;
        if &magic != FSM_MAGIC {
            return Err(anyhow!("bad FSM magic in {}", path.display()));
        }
        let mut buf4 = [0u8; 4];
        f.read_exact(&mut buf4)?;
        let ver = LittleEndian::read_u32(&buf4);
        if ver != FSM_VERSION {
            return Err(anyhow!("unsupported FSM version {} in {}", ver, path.display()));
        }
        Ok(Self { path })
    }

    pub fn open_or_create(root: &Path) -> Result<Self> {
        if root.join(FSM_FILE).exists() {
            Self::open(root)
        } else {
            Self::create(root)
        }
    }

    fn open_rw(&self) -> Result<std::fs::File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .with_context(|| format!("open fsm {}", self.path.display()))
    }

    /// Текущее число записей (с возможными дубликатами до vacuum()).
    pub fn count(&self) -> Result<u64> {
        let len = std::fs::metadata(&self.path)?.len();
        if len < FSM_HDR_SIZE {
            return Err(anyhow!("fsm file too small (< header): {}", self.path.display()));
        }
        Ok((len - FSM_HDR_SIZE) / 8)
    }

    /// Записать блок как переиспользуемый.
    pub fn record_free(&self, page_id: u64) -> Result<()> {
        let mut f = self.open_rw()?;
        f.seek(SeekFrom::End(0))?;
        let mut buf8 = [0u8; 8];
        LittleEndian::write_u64(&mut buf8, page_id);
        f.write_all(&buf8)?;
        let _ = f.sync_all();
        record_fsm_page_recorded();
        Ok(())
    }

    /// Вытянуть последний записанный блок. None, если FSM пуста.
    pub fn pop(&self) -> Result<Option<u64>> {
        let mut f = self.open_rw()?;
        let len = f.metadata()?.len();
        if len < FSM_HDR_SIZE {
            return Err(anyhow!("fsm file too small (< header): {}", self.path.display()));
        }
        if len == FSM_HDR_SIZE {
            return Ok(None);
        }
        let last_off = len - 8;
        f.seek(SeekFrom::Start(last_off))?;
        let mut buf8 = [0u8; 8];
        f.read_exact(&mut buf8)?;
        let page_id = LittleEndian::read_u64(&buf8);

        f.set_len(last_off)?;
        let _ = f.sync_all();
        Ok(Some(page_id))
    }

    /// Все записанные блоки в порядке файла.
    pub fn pages(&self) -> Result<Vec<u64>> {
        let mut f = self.open_rw()?;
        let len = f.metadata()?.len();
        if len < FSM_HDR_SIZE {
            return Err(anyhow!("fsm file too small (< header): {}", self.path.display()));
        }
        let mut tail = vec![0u8; (len - FSM_HDR_SIZE) as usize / 8 * 8];
        f.seek(SeekFrom::Start(FSM_HDR_SIZE))?;
        f.read_exact(&mut tail)?;
        Ok(tail.chunks_exact(8).map(LittleEndian::read_u64).collect())
    }

    /// Обслуживание FSM: убрать дубликаты и упорядочить так, чтобы pop выдавал младшие блоки первыми.
    /// Возвращает число уникальных блоков.
    pub fn vacuum(&self) -> Result<usize> {
        let mut pages = self.pages()?;
        pages.sort_unstable_by(|a, b| b.cmp(a));
        pages.dedup();

        let mut f = self.open_rw()?;
        f.set_len(FSM_HDR_SIZE)?;
        f.seek(SeekFrom::Start(FSM_HDR_SIZE))?;
        let mut tail = vec![0u8; pages.len() * 8];
        for (i, &p) in pages.iter().enumerate() {
            LittleEndian::write_u64(&mut tail[i * 8..i * 8 + 8], p);
        }
        f.write_all(&tail)?;
        let _ = f.sync_all();
        Ok(pages.len())
    }

    /// Путь к файлу FSM (для диагностики).
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vacuum_dedups_and_orders_low_first() {
        let root = std::env::temp_dir().join(format!(
            "qg-fsm-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&root).unwrap();
        let fsm = FreeSpaceMap::create(&root).unwrap();
        assert!(FreeSpaceMap::create(&root).is_err());
        for p in [9u64, 3, 9, 5] {
            fsm.record_free(p).unwrap();
        }
        assert_eq!(fsm.count().unwrap(), 4);
        assert_eq!(fsm.vacuum().unwrap(), 3);

        let fsm = FreeSpaceMap::open(&root).unwrap();
        assert_eq!(fsm.pop().unwrap(), Some(3));
        assert_eq!(fsm.pop().unwrap(), Some(5));
        assert_eq!(fsm.pop().unwrap(), Some(9));
        assert_eq!(fsm.pop().unwrap(), None);
    }
}
