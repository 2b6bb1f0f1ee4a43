//! index/open - открытие GistIndex с конфигом и блокировкой каталога.
//!
//! Порядок:
//! 1) эксклюзивный LOCK (второй writer получает ошибку, а не ждёт);
//! 2) реплей WAL, если прошлое завершение было нечистым;
//! 3) meta.clean_shutdown=false на время работы;
//! 4) pager + WAL на дозапись (или заглушка для unlogged) + FSM.

use anyhow::Result;
use log::info;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::buffer::BufferPool;
use crate::config::GistConfig;
use crate::free::FreeSpaceMap;
use crate::lock::{try_acquire_lock, LockMode};
use crate::meta::{read_meta, set_clean_shutdown};
use crate::pager::Pager;
use crate::wal::{wal_replay_if_any, Wal};
use crate::xact::{TransactionIds, XidCounter};

use super::core::GistIndex;

impl GistIndex {
    pub fn open(root: &Path) -> Result<Self> {
        Self::open_with_config(root, GistConfig::from_env())
    }

    /// Открыть с xid-счётчиком по умолчанию (продолжает meta.next_xid).
    pub fn open_with_config(root: &Path, cfg: GistConfig) -> Result<Self> {
        Self::open_inner(root, cfg, None)
    }

    /// Открыть с внешним сервисом идентификаторов транзакций.
    pub fn open_with_xids(
        root: &Path,
        cfg: GistConfig,
        xids: Arc<dyn TransactionIds>,
    ) -> Result<Self> {
        Self::open_inner(root, cfg, Some(xids))
    }

    fn open_inner(
        root: &Path,
        cfg: GistConfig,
        xids: Option<Arc<dyn TransactionIds>>,
    ) -> Result<Self> {
        let lock = try_acquire_lock(root, LockMode::Exclusive)?;

        let last_lsn = wal_replay_if_any(root)?;
        set_clean_shutdown(root, false)?;

        let meta = read_meta(root)?;
        let logged = !meta.unlogged();

        let mut pager = Pager::open(root)?;
        pager.set_data_fsync(cfg.data_fsync);

        let wal = Arc::new(if logged {
            Wal::open_for_append(root, last_lsn, cfg.wal_fsync)?
        } else {
            Wal::unlogged(root, last_lsn)
        });
        let fsm = FreeSpaceMap::open_or_create(root)?;
        let xids = xids.unwrap_or_else(|| Arc::new(XidCounter::starting_at(meta.next_xid)));

        let name = root
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());

        info!(
            "open: {} (nblocks={}, last_lsn={}, {}) {}",
            root.display(),
            pager.nblocks(),
            last_lsn,
            if logged { "logged" } else { "unlogged" },
            cfg
        );

        Ok(Self {
            root: root.to_path_buf(),
            name,
            cfg,
            buffers: BufferPool::new(pager, wal.clone()),
            wal,
            fsm: Mutex::new(fsm),
            xids,
            logged,
            closed: false,
            _lock: lock,
        })
    }
}
