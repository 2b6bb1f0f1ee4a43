//! xact - сервис идентификаторов транзакций, нужный vacuum'у.
//!
//! Vacuum использует только две величины:
//! - next_xid(): граница для удалённого листа - любой, кто ещё может держать ссылку на
//!   страницу, начался раньше этого xid;
//! - oldest_active_xid(): горизонт; удалённая страница с delete_xid < горизонта переиспользуема.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::consts::FIRST_NORMAL_XID;

pub trait TransactionIds: Send + Sync {
    /// Следующий ещё не выданный xid.
    fn next_xid(&self) -> u64;
    /// Самый старый xid, который ещё может видеть старые версии страниц.
    /// При отсутствии активных транзакций равен next_xid().
    fn oldest_active_xid(&self) -> u64;
}

/// Процессный счётчик xid с реестром активных транзакций.
#[derive(Debug)]
pub struct XidCounter {
    next: AtomicU64,
    active: Mutex<BTreeSet<u64>>,
}

impl Default for XidCounter {
    fn default() -> Self {
        Self::starting_at(FIRST_NORMAL_XID)
    }
}

impl XidCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first.max(FIRST_NORMAL_XID)),
            active: Mutex::new(BTreeSet::new()),
        }
    }

    /// Начать транзакцию: выдать xid и зарегистрировать её активной.
    pub fn begin(&self) -> u64 {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        let xid = self.next.fetch_add(1, Ordering::SeqCst);
        active.insert(xid);
        xid
    }

    pub fn finish(&self, xid: u64) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&xid);
    }

    /// Продвинуть счётчик на n xid (транзакции, завершившиеся без регистрации).
    pub fn advance(&self, n: u64) -> u64 {
        self.next.fetch_add(n, Ordering::SeqCst) + n
    }
}

impl TransactionIds for XidCounter {
    fn next_xid(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    fn oldest_active_xid(&self) -> u64 {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.iter().next() {
            Some(&x) => x,
            None => self.next.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizon_follows_oldest_running() {
        let x = XidCounter::new();
        assert_eq!(x.next_xid(), FIRST_NORMAL_XID);
        let a = x.begin();
        let b = x.begin();
        assert_eq!(x.oldest_active_xid(), a);
        x.finish(a);
        assert_eq!(x.oldest_active_xid(), b);
        x.finish(b);
        assert_eq!(x.oldest_active_xid(), x.next_xid());
        assert_eq!(x.advance(10), b + 11);
    }
}
