//! vacuum - обслуживание GiST-индекса: удаление мёртвых кортежей и возврат пустых страниц.
//!
//! Разделение:
//! - blockset.rs - BlockSet (внутренние страницы / опустевшие листья за один проход).
//! - driver.rs   - bulk_delete / vacuum_cleanup: сброс статистики, проход, reclaim, FSM.
//! - scan.rs     - обход всех блоков по возрастанию, повторные визиты по rightlink'ам.
//! - leaf.rs     - обработка листа и мёртвых/новых страниц.
//! - internal.rs - обработка внутренней страницы (маркеры невалидных кортежей).
//! - delete.rs   - reclaim-проход и двухфазный unlink пустого листа.
//!
//! Проход работает параллельно с вставками и split'ами других сессий: страницы
//! захватываются по одной (максимум две в reclaim: лист, затем родитель), все проверки
//! повторяются после каждого захвата.

use serde::Serialize;

pub mod blockset;
pub mod delete;
pub mod driver;
pub mod internal;
pub mod leaf;
pub mod scan;

pub use blockset::BlockSet;

/// Накопительная статистика vacuum'а; возвращается вызывающему и передаётся обратно
/// в следующий вызов той же сессии.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkDeleteResult {
    /// Число блоков индекса в конце прохода.
    pub num_pages: u64,
    /// Удалённые страницы (и ещё не переиспользуемые, и уже свободные).
    pub pages_deleted: u64,
    /// Страницы, отцепленные этой сессией vacuum'а; копится между вызовами, как tuples_removed.
    pub pages_newly_deleted: u64,
    /// Страницы, записанные в FSM.
    pub pages_free: u64,
    /// Удалённые кортежи; копится между вызовами.
    pub tuples_removed: f64,
    /// Оценка живых кортежей индекса.
    pub num_index_tuples: f64,
    /// num_index_tuples - оценка, а не точный счёт.
    pub estimated_count: bool,
}

/// Параметры вызова vacuum'а.
pub struct IndexVacuumInfo<'a> {
    /// Только ANALYZE: cleanup ничего не делает.
    pub analyze_only: bool,
    /// Число строк кучи, которое видел вызывающий.
    pub num_heap_tuples: f64,
    /// num_heap_tuples - оценка; тогда счётчик кортежей индекса не подрезается.
    pub estimated_count: bool,
    delay: Option<Box<dyn FnMut() + 'a>>,
}

impl Default for IndexVacuumInfo<'_> {
    fn default() -> Self {
        Self {
            analyze_only: false,
            num_heap_tuples: 0.0,
            estimated_count: true,
            delay: None,
        }
    }
}

impl<'a> IndexVacuumInfo<'a> {
    /// Точное число строк кучи.
    pub fn exact(num_heap_tuples: f64) -> Self {
        Self {
            num_heap_tuples,
            estimated_count: false,
            ..Self::default()
        }
    }

    pub fn analyze_only() -> Self {
        Self {
            analyze_only: true,
            ..Self::default()
        }
    }

    /// Хук точки задержки: вызывается между визитами страниц, без удержания блокировок.
    pub fn with_delay_hook<F>(mut self, hook: F) -> Self
    where
        F: FnMut() + 'a,
    {
        self.delay = Some(Box::new(hook));
        self
    }

    pub(crate) fn call_delay_hook(&mut self) {
        if let Some(hook) = self.delay.as_mut() {
            hook();
        }
    }
}

/// Контекст одного прохода.
pub(crate) struct ScanState {
    pub stats: BulkDeleteResult,
    /// Последний выданный LSN на старте прохода; split с NSN больше него - конкурентный.
    pub start_lsn: u64,
    /// Страниц записано в FSM этим проходом.
    pub freed: u64,
    pub internal_pages: BlockSet,
    pub empty_leaves: BlockSet,
    /// Страниц с последней паузы (троттлинг по GistConfig).
    pub since_sleep: u64,
}

impl ScanState {
    pub fn new(mut stats: BulkDeleteResult, start_lsn: u64) -> Self {
        stats.estimated_count = false;
        stats.num_index_tuples = 0.0;
        stats.pages_deleted = 0;
        stats.pages_free = 0;
        Self {
            stats,
            start_lsn,
            freed: 0,
            internal_pages: BlockSet::new(),
            empty_leaves: BlockSet::new(),
            since_sleep: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pass_resets_per_pass_counters_only() {
        let prev = BulkDeleteResult {
            num_pages: 9,
            pages_deleted: 2,
            pages_newly_deleted: 1,
            pages_free: 1,
            tuples_removed: 40.0,
            num_index_tuples: 100.0,
            estimated_count: true,
        };
        let st = ScanState::new(prev, 17);
        assert_eq!(st.stats.tuples_removed, 40.0);
        assert_eq!(st.stats.num_index_tuples, 0.0);
        assert_eq!(st.stats.pages_deleted, 0);
        assert_eq!(st.stats.pages_newly_deleted, 1);
        assert_eq!(st.stats.pages_free, 0);
        assert!(!st.stats.estimated_count);
        assert!(st.empty_leaves.is_empty());
    }

    #[test]
    fn delay_hook_is_invoked() {
        let mut n = 0;
        {
            let mut info = IndexVacuumInfo::exact(10.0).with_delay_hook(|| n += 1);
            info.call_delay_hook();
            info.call_delay_hook();
        }
        assert_eq!(n, 2);
    }
}
