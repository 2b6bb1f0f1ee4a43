//! buffer - минимальный buffer pool с эксклюзивными блокировками страниц.
//!
//! Модель:
//! - Один фрейм на блок; фрейм хранит последнюю отпущенную версию страницы и флаг dirty.
//! - read_exclusive(blk) захватывает блок (ожидая текущего владельца) и отдаёт PageGuard
//!   с рабочей копией. Изменения публикуются во фрейм при drop guard'а, если вызван mark_dirty().
//! - Повторный захват тем же потоком - ошибка (блокировки нереентерабельны).
//! - Запись на диск только через flush_page/flush_all, WAL-before-data: перед записью страницы
//!   WAL сбрасывается до её LSN. Без flush грязные страницы живут только в памяти;
//!   после краша их восстанавливает реплей WAL.
//! - Длина индекса (nblocks) меняется только под extension-lock.
//!
//! Порядок мьютексов: frame.state -> pager. frames-map держится только на время lookup.

use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use crate::page::gist_page_lsn;
use crate::pager::Pager;
use crate::wal::Wal;

struct FrameState {
    data: Vec<u8>,
    loaded: bool,
    dirty: bool,
    owner: Option<ThreadId>,
}

struct Frame {
    state: Mutex<FrameState>,
    released: Condvar,
}

pub struct BufferPool {
    pager: Mutex<Pager>,
    frames: Mutex<HashMap<u64, Arc<Frame>>>,
    extension: Mutex<()>,
    wal: Arc<Wal>,
    page_size: usize,
}

fn poisoned<T>(what: &str) -> impl FnOnce(T) -> anyhow::Error + '_ {
    move |_| anyhow!("{} mutex poisoned", what)
}

impl BufferPool {
    pub fn new(pager: Pager, wal: Arc<Wal>) -> Self {
        let page_size = pager.page_size();
        Self {
            pager: Mutex::new(pager),
            frames: Mutex::new(HashMap::new()),
            extension: Mutex::new(()),
            wal,
            page_size,
        }
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn wal(&self) -> &Arc<Wal> {
        &self.wal
    }

    fn pager(&self) -> Result<MutexGuard<'_, Pager>> {
        self.pager.lock().map_err(poisoned("pager"))
    }

    /// Текущее число блоков индекса.
    pub fn nblocks(&self) -> Result<u64> {
        Ok(self.pager()?.nblocks())
    }

    /// Extension-lock: пока он держится, nblocks не меняется.
    /// Нельзя вызывать extend() под этим guard'ом.
    pub fn lock_extension(&self) -> Result<MutexGuard<'_, ()>> {
        self.extension.lock().map_err(poisoned("extension"))
    }

    /// Добавить новый (нулевой, "новый") блок в конец индекса и вернуть его захваченным.
    /// Блок захватывается до снятия extension-lock: никто не видит его новым и свободным.
    pub fn extend(&self) -> Result<PageGuard<'_>> {
        let _ext = self.lock_extension()?;
        let blk = self.pager()?.allocate_pages(1)?;
        debug!("buffer: extended index with block {}", blk);
        self.read_exclusive(blk)
    }

    fn frame(&self, blkno: u64) -> Result<Arc<Frame>> {
        let mut frames = self.frames.lock().map_err(poisoned("frames"))?;
        Ok(frames
            .entry(blkno)
            .or_insert_with(|| {
                Arc::new(Frame {
                    state: Mutex::new(FrameState {
                        data: Vec::new(),
                        loaded: false,
                        dirty: false,
                        owner: None,
                    }),
                    released: Condvar::new(),
                })
            })
            .clone())
    }

    /// Захватить блок эксклюзивно. Ждёт текущего владельца; ошибка при повторном захвате
    /// тем же потоком или при блоке за концом индекса.
    pub fn read_exclusive(&self, blkno: u64) -> Result<PageGuard<'_>> {
        let nblocks = self.nblocks()?;
        if blkno >= nblocks {
            bail!("block {} beyond end of index (nblocks={})", blkno, nblocks);
        }
        let me = thread::current().id();
        let frame = self.frame(blkno)?;
        let data = {
            let mut st = frame.state.lock().map_err(poisoned("frame"))?;
            if st.owner == Some(me) {
                bail!("block {} is already locked by this thread", blkno);
            }
            while st.owner.is_some() {
                st = frame.released.wait(st).map_err(poisoned("frame"))?;
            }
            if !st.loaded {
                let mut buf = vec![0u8; self.page_size];
                self.pager()?
                    .read_page(blkno, &mut buf)
                    .with_context(|| format!("read block {}", blkno))?;
                st.data = buf;
                st.loaded = true;
            }
            st.owner = Some(me);
            st.data.clone()
        };
        Ok(PageGuard {
            frame,
            blkno,
            data,
            dirty: false,
            _pool: std::marker::PhantomData,
        })
    }

    fn flush_frame(&self, blkno: u64, frame: &Frame) -> Result<bool> {
        let mut st = frame.state.lock().map_err(poisoned("frame"))?;
        if !st.dirty {
            return Ok(false);
        }
        self.wal.flush(gist_page_lsn(&st.data))?;
        self.pager()?
            .write_page_raw(blkno, &st.data)
            .with_context(|| format!("write back block {}", blkno))?;
        st.dirty = false;
        Ok(true)
    }

    /// Записать последнюю отпущенную версию блока на диск (WAL сбрасывается первым).
    pub fn flush_page(&self, blkno: u64) -> Result<bool> {
        let frame = {
            let frames = self.frames.lock().map_err(poisoned("frames"))?;
            frames.get(&blkno).cloned()
        };
        match frame {
            Some(f) => self.flush_frame(blkno, &f),
            None => Ok(false),
        }
    }

    /// Записать все грязные страницы по возрастанию номера блока. Возвращает число записанных.
    pub fn flush_all(&self) -> Result<usize> {
        let mut frames: Vec<(u64, Arc<Frame>)> = {
            let map = self.frames.lock().map_err(poisoned("frames"))?;
            map.iter().map(|(b, f)| (*b, f.clone())).collect()
        };
        frames.sort_by_key(|(b, _)| *b);
        let mut n = 0;
        for (blk, f) in frames {
            if self.flush_frame(blk, &f)? {
                n += 1;
            }
        }
        Ok(n)
    }

    /// Сохранить meta (next_page_id, last_lsn, next_xid, clean_shutdown).
    pub fn sync_meta(&self, last_lsn: u64, next_xid: u64, clean_shutdown: bool) -> Result<()> {
        self.pager()?.sync_meta(last_lsn, next_xid, clean_shutdown)
    }
}

/// Эксклюзивно захваченная страница. Блокировка снимается при drop.
pub struct PageGuard<'a> {
    frame: Arc<Frame>,
    blkno: u64,
    data: Vec<u8>,
    dirty: bool,
    _pool: std::marker::PhantomData<&'a BufferPool>,
}

impl<'a> PageGuard<'a> {
    #[inline]
    pub fn blkno(&self) -> u64 {
        self.blkno
    }

    #[inline]
    pub fn page(&self) -> &[u8] {
        &self.data
    }

    /// Рабочая копия. Изменения публикуются только после mark_dirty().
    #[inline]
    pub fn page_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Заменить содержимое страницы целиком (подготовленный заранее образ).
    pub fn install(&mut self, image: Vec<u8>) -> Result<()> {
        if image.len() != self.data.len() {
            bail!(
                "page image for block {} has {} bytes, expected {}",
                self.blkno,
                image.len(),
                self.data.len()
            );
        }
        self.data = image;
        self.dirty = true;
        Ok(())
    }

    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        let mut st = self
            .frame
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if self.dirty {
            st.data = std::mem::take(&mut self.data);
            st.dirty = true;
        }
        st.owner = None;
        self.frame.released.notify_all();
    }
}
