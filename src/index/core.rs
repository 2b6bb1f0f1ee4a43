//! index/core - структура GistIndex, init(), checkpoint и закрытие.
//!
//! - init() создаёт каталог индекса: meta, fsm, WAL и корень (блок 0) - пустой лист.
//! - close() сбрасывает грязные страницы, сохраняет meta с clean_shutdown=true, усекает WAL.
//! - Drop без close() - нечистое завершение: грязные страницы теряются, следующий open
//!   восстановит их реплеем WAL.

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::buffer::BufferPool;
use crate::config::GistConfig;
use crate::consts::{META_FLAG_UNLOGGED, ROOT_BLOCK};
use crate::free::FreeSpaceMap;
use crate::lock::LockGuard;
use crate::meta::{validate_page_size, write_meta_new, MetaHeader};
use crate::page::{gist_init, F_LEAF};
use crate::wal::{wal_path, write_wal_file_header, Wal};
use crate::xact::TransactionIds;

pub struct GistIndex {
    pub(crate) root: PathBuf,
    pub(crate) name: String,
    pub(crate) cfg: GistConfig,
    pub(crate) buffers: BufferPool,
    pub(crate) wal: Arc<Wal>,
    pub(crate) fsm: Mutex<FreeSpaceMap>,
    pub(crate) xids: Arc<dyn TransactionIds>,
    pub(crate) logged: bool,
    pub(crate) closed: bool,
    pub(crate) _lock: LockGuard,
}

impl GistIndex {
    /// Создать новый журналируемый индекс в каталоге root.
    pub fn init(root: &Path, page_size: u32) -> Result<()> {
        Self::init_with_flags(root, page_size, 0)
    }

    /// Создать индекс без WAL: LSN страниц - монотонная заглушка, реплея нет.
    pub fn init_unlogged(root: &Path, page_size: u32) -> Result<()> {
        Self::init_with_flags(root, page_size, META_FLAG_UNLOGGED)
    }

    fn init_with_flags(root: &Path, page_size: u32, flags: u32) -> Result<()> {
        validate_page_size(page_size)?;
        std::fs::create_dir_all(root)
            .with_context(|| format!("create index dir {}", root.display()))?;

        let meta = MetaHeader {
            page_size,
            flags,
            ..MetaHeader::default()
        };
        write_meta_new(root, &meta)?;
        FreeSpaceMap::create(root)?;
        if !meta.unlogged() {
            let path = wal_path(root);
            let mut f = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)
                .with_context(|| format!("create wal {}", path.display()))?;
            write_wal_file_header(&mut f)?;
            f.sync_all()?;
        }

        let idx = Self::open_with_config(root, GistConfig::from_env())?;
        {
            let mut g = idx.buffers.extend()?;
            if g.blkno() != ROOT_BLOCK {
                return Err(anyhow!("fresh index allocated root at block {}", g.blkno()));
            }
            let mut image = vec![0u8; idx.buffers.page_size()];
            gist_init(&mut image, ROOT_BLOCK, F_LEAF)?;
            idx.log_page_image(&mut g, image)?;
        }
        idx.close()?;
        info!(
            "init: created {} index at {} (page_size={})",
            if flags & META_FLAG_UNLOGGED != 0 { "unlogged" } else { "logged" },
            root.display(),
            page_size
        );
        Ok(())
    }

    // ---------------- accessors ----------------

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Имя индекса для диагностики (имя каталога).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &GistConfig {
        &self.cfg
    }

    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    pub fn wal(&self) -> &Arc<Wal> {
        &self.wal
    }

    pub fn is_logged(&self) -> bool {
        self.logged
    }

    pub fn transaction_ids(&self) -> &Arc<dyn TransactionIds> {
        &self.xids
    }

    pub fn page_size(&self) -> usize {
        self.buffers.page_size()
    }

    pub fn nblocks(&self) -> Result<u64> {
        self.buffers.nblocks()
    }

    pub(crate) fn fsm(&self) -> Result<MutexGuard<'_, FreeSpaceMap>> {
        self.fsm
            .lock()
            .map_err(|_| anyhow!("free-space map mutex poisoned"))
    }

    /// Снимок блоков, записанных в FSM (для диагностики/CLI).
    pub fn free_pages(&self) -> Result<Vec<u64>> {
        self.fsm()?.pages()
    }

    // ---------------- durability ----------------

    /// Сбросить все грязные страницы и meta; WAL после этого не нужен и усекается.
    /// Вызывать, когда никто не держит блокировок страниц (между операциями).
    pub fn checkpoint(&self) -> Result<()> {
        let written = self.buffers.flush_all()?;
        let lsn = self.wal.insert_lsn()?;
        self.buffers
            .sync_meta(lsn, self.xids.next_xid(), false)?;
        self.wal.truncate_to_header()?;
        debug!("checkpoint: {} page(s) written, lsn={}", written, lsn);
        Ok(())
    }

    /// Чистое закрытие.
    pub fn close(mut self) -> Result<()> {
        self.buffers.flush_all()?;
        let lsn = self.wal.insert_lsn()?;
        self.buffers.sync_meta(lsn, self.xids.next_xid(), true)?;
        self.wal.truncate_to_header()?;
        self.closed = true;
        debug!("close: {} closed cleanly at lsn={}", self.root.display(), lsn);
        Ok(())
    }
}

impl Drop for GistIndex {
    fn drop(&mut self) {
        if !self.closed {
            debug!(
                "drop without close: {} left for WAL replay on next open",
                self.root.display()
            );
        }
    }
}
