//! wal/writer - запись WAL и выдача LSN.
//!
//! - LSN монотонный, выдаётся под мьютексом вместе с записью кадра: порядок LSN == порядок в файле.
//! - wal_fsync=true: fsync после каждого кадра (flushed_lsn = last_lsn).
//! - Unlogged-индекс: файла нет, append возвращает очередной LSN-заглушку без записи.
//! - Кадр дописывается целиком или никак: при ошибке write/fsync файл усекается до прежней
//!   длины, а LSN не расходуется.

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::metrics::{record_wal_append, record_wal_fsync, record_wal_truncation};
use crate::page::gist_set_lsn;

use super::encode;
use super::record::{GistPageDelete, GistUpdate};
use super::{
    wal_path, write_wal_file_header, WAL_HDR_SIZE, WAL_MAGIC, WAL_REC_GIST_PAGE_DELETE,
    WAL_REC_GIST_UPDATE, WAL_REC_PAGE_IMAGE,
};

struct WalState {
    file: Option<File>,
    last_lsn: u64,
    flushed_lsn: u64,
}

/// Файл WAL с точки зрения дозаписи.
pub(crate) trait WalSink: Write + Seek {
    fn sync(&mut self) -> std::io::Result<()>;
    fn truncate(&mut self, len: u64) -> std::io::Result<()>;
}

impl WalSink for File {
    fn sync(&mut self) -> std::io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)
    }
}

/// Дописать кадр в конец sink'а (и fsync'нуть при fsync=true). При любой ошибке хвост
/// кадра отрезается, курсор возвращается в конец.
pub(crate) fn append_frame<S: WalSink>(
    sink: &mut S,
    fsync: bool,
    rec_type: u8,
    lsn: u64,
    page_id: u64,
    payload: &[u8],
) -> Result<usize> {
    let start = sink.seek(SeekFrom::End(0))?;
    let written = encode::write_record(sink, rec_type, lsn, page_id, payload).and_then(|n| {
        if fsync {
            sink.sync().context("fsync WAL frame")?;
        }
        Ok(n)
    });
    match written {
        Ok(n) => Ok(n),
        Err(e) => {
            warn!("wal: frame lsn={} failed, cutting log back to {} bytes", lsn, start);
            let rolled_back = sink
                .truncate(start)
                .and_then(|_| sink.seek(SeekFrom::Start(start)));
            match rolled_back {
                Ok(_) => Err(e),
                Err(re) => Err(e.context(format!("truncate WAL back to {}: {}", start, re))),
            }
        }
    }
}

pub struct Wal {
    path: PathBuf,
    fsync: bool,
    state: Mutex<WalState>,
}

impl Wal {
    /// Открыть (или создать) WAL на дозапись. start_lsn - последний уже выданный LSN.
    pub fn open_for_append(root: &Path, start_lsn: u64, fsync: bool) -> Result<Self> {
        let path = wal_path(root);
        let mut f = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("open wal {}", path.display()))?;

        let len = f.metadata()?.len();
        if len < WAL_HDR_SIZE as u64 {
            write_wal_file_header(&mut f)?;
            f.sync_all()?;
        } else {
            let mut magic = [0u8; 8];
            f.seek(SeekFrom::Start(0))?;
            std::io::Read::read_exact(&mut f, &mut magic)?;
            if &magic != WAL_MAGIC {
                return Err(anyhow!("bad WAL magic in {}", path.display()));
            }
        }
        f.seek(SeekFrom::End(0))?;

        Ok(Self {
            path,
            fsync,
            state: Mutex::new(WalState {
                file: Some(f),
                last_lsn: start_lsn,
                flushed_lsn: start_lsn,
            }),
        })
    }

    /// WAL-заглушка для unlogged-индекса.
    pub fn unlogged(root: &Path, start_lsn: u64) -> Self {
        Self {
            path: wal_path(root),
            fsync: false,
            state: Mutex::new(WalState {
                file: None,
                last_lsn: start_lsn,
                flushed_lsn: start_lsn,
            }),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, WalState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("wal state mutex poisoned"))
    }

    pub fn is_logged(&self) -> Result<bool> {
        Ok(self.state()?.file.is_some())
    }

    /// Последний выданный LSN.
    pub fn insert_lsn(&self) -> Result<u64> {
        Ok(self.state()?.last_lsn)
    }

    fn write_locked(
        &self,
        st: &mut WalState,
        rec_type: u8,
        lsn: u64,
        page_id: u64,
        payload: &[u8],
    ) -> Result<()> {
        if let Some(f) = st.file.as_mut() {
            let n = append_frame(f, self.fsync, rec_type, lsn, page_id, payload)
                .with_context(|| format!("append WAL record type {} to {}", rec_type, self.path.display()))?;
            record_wal_append(n);
            if self.fsync {
                record_wal_fsync();
                st.flushed_lsn = lsn;
            }
        } else {
            st.flushed_lsn = lsn;
        }
        st.last_lsn = lsn;
        Ok(())
    }

    /// Дописать кадр, вернуть его LSN.
    pub fn append(&self, rec_type: u8, page_id: u64, payload: &[u8]) -> Result<u64> {
        let mut st = self.state()?;
        let lsn = st.last_lsn + 1;
        self.write_locked(&mut st, rec_type, lsn, page_id, payload)?;
        Ok(lsn)
    }

    /// Полный образ страницы. LSN штампуется в page до записи кадра.
    pub fn append_page_image(&self, page_id: u64, page: &mut [u8]) -> Result<u64> {
        let mut st = self.state()?;
        let lsn = st.last_lsn + 1;
        gist_set_lsn(page, lsn)?;
        self.write_locked(&mut st, WAL_REC_PAGE_IMAGE, lsn, page_id, page)?;
        Ok(lsn)
    }

    pub fn append_gist_update(&self, page_id: u64, rec: &GistUpdate) -> Result<u64> {
        self.append(WAL_REC_GIST_UPDATE, page_id, &rec.encode())
    }

    pub fn append_gist_page_delete(&self, leaf: u64, rec: &GistPageDelete) -> Result<u64> {
        self.append(WAL_REC_GIST_PAGE_DELETE, leaf, &rec.encode())
    }

    /// Гарантировать durability WAL до upto_lsn включительно (WAL-before-data).
    pub fn flush(&self, upto_lsn: u64) -> Result<()> {
        let mut st = self.state()?;
        if st.flushed_lsn >= upto_lsn {
            return Ok(());
        }
        let target = st.last_lsn;
        if let Some(f) = st.file.as_mut() {
            f.sync_data()?;
            record_wal_fsync();
        }
        st.flushed_lsn = target;
        Ok(())
    }

    /// Усечь WAL до заголовка (после checkpoint, когда все страницы на диске).
    pub fn truncate_to_header(&self) -> Result<()> {
        let mut st = self.state()?;
        if let Some(f) = st.file.as_mut() {
            f.set_len(WAL_HDR_SIZE as u64)?;
            f.seek(SeekFrom::End(0))?;
            f.sync_all()?;
            record_wal_truncation();
            debug!("wal: truncated {} to header", self.path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::reader::read_next_record;

    fn tmp_root(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "qg-wal-{}-{}",
            tag,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&root).unwrap();
        root
    }

    #[test]
    fn lsns_are_monotonic_and_readable() {
        let root = tmp_root("append");
        let wal = Wal::open_for_append(&root, 10, true).unwrap();
        let a = wal
            .append_gist_update(4, &GistUpdate { deleted: vec![0, 2] })
            .unwrap();
        let b = wal
            .append_gist_page_delete(
                5,
                &GistPageDelete {
                    parent: 1,
                    downlink: 0,
                    delete_xid: 9,
                },
            )
            .unwrap();
        assert_eq!((a, b), (11, 12));
        assert_eq!(wal.insert_lsn().unwrap(), 12);

        let mut f = File::open(wal_path(&root)).unwrap();
        let len = f.metadata().unwrap().len();
        let (r1, next) = read_next_record(&mut f, WAL_HDR_SIZE as u64, len)
            .unwrap()
            .unwrap();
        assert_eq!(r1.rec_type, WAL_REC_GIST_UPDATE);
        assert_eq!(r1.page_id, 4);
        let (r2, end) = read_next_record(&mut f, next, len).unwrap().unwrap();
        assert_eq!(r2.lsn, 12);
        assert!(read_next_record(&mut f, end, len).unwrap().is_none());

        wal.truncate_to_header().unwrap();
        assert_eq!(
            std::fs::metadata(wal_path(&root)).unwrap().len(),
            WAL_HDR_SIZE as u64
        );
    }

    /// Sink в памяти: обрывает запись после `write_budget` байт или роняет fsync.
    struct FlakySink {
        buf: std::io::Cursor<Vec<u8>>,
        write_budget: Option<usize>,
        fail_sync: bool,
    }

    impl FlakySink {
        fn new() -> Self {
            Self {
                buf: std::io::Cursor::new(Vec::new()),
                write_budget: None,
                fail_sync: false,
            }
        }

        fn bytes(&self) -> &[u8] {
            self.buf.get_ref()
        }
    }

    impl Write for FlakySink {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            let n = match self.write_budget {
                Some(0) => return Err(std::io::Error::new(std::io::ErrorKind::Other, "no space left")),
                Some(left) => left.min(data.len()),
                None => data.len(),
            };
            if let Some(left) = self.write_budget.as_mut() {
                *left -= n;
            }
            self.buf.write(&data[..n])
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Seek for FlakySink {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.buf.seek(pos)
        }
    }

    impl WalSink for FlakySink {
        fn sync(&mut self) -> std::io::Result<()> {
            if self.fail_sync {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "fsync failed"));
            }
            Ok(())
        }

        fn truncate(&mut self, len: u64) -> std::io::Result<()> {
            self.buf.get_mut().truncate(len as usize);
            Ok(())
        }
    }

    #[test]
    fn torn_frame_is_cut_and_next_append_lands_on_clean_tail() {
        let mut clean = FlakySink::new();
        append_frame(&mut clean, true, WAL_REC_GIST_UPDATE, 1, 3, b"first").unwrap();
        append_frame(&mut clean, true, WAL_REC_GIST_UPDATE, 2, 3, b"second").unwrap();

        let mut sink = FlakySink::new();
        append_frame(&mut sink, true, WAL_REC_GIST_UPDATE, 1, 3, b"first").unwrap();
        let after_first = sink.bytes().len();

        sink.write_budget = Some(7);
        assert!(append_frame(&mut sink, true, WAL_REC_GIST_UPDATE, 2, 3, b"second").is_err());
        assert_eq!(sink.bytes().len(), after_first);

        sink.write_budget = None;
        append_frame(&mut sink, true, WAL_REC_GIST_UPDATE, 2, 3, b"second").unwrap();
        assert_eq!(sink.bytes(), clean.bytes());
    }

    #[test]
    fn failed_fsync_takes_the_frame_back() {
        let mut sink = FlakySink::new();
        append_frame(&mut sink, true, WAL_REC_GIST_UPDATE, 1, 3, b"first").unwrap();
        let after_first = sink.bytes().len();

        sink.fail_sync = true;
        assert!(append_frame(&mut sink, true, WAL_REC_GIST_UPDATE, 2, 3, b"second").is_err());
        assert_eq!(sink.bytes().len(), after_first);

        // Без fsync sync не вызывается вовсе.
        append_frame(&mut sink, false, WAL_REC_GIST_UPDATE, 2, 3, b"second").unwrap();
        assert!(sink.bytes().len() > after_first);
    }

    #[test]
    fn unlogged_hands_out_placeholder_lsns() {
        let root = tmp_root("unlogged");
        let wal = Wal::unlogged(&root, 0);
        assert!(!wal.is_logged().unwrap());
        assert_eq!(wal.append(WAL_REC_GIST_UPDATE, 1, &[]).unwrap(), 1);
        assert_eq!(wal.append(WAL_REC_GIST_UPDATE, 1, &[]).unwrap(), 2);
        assert!(!wal_path(&root).exists());
    }
}
