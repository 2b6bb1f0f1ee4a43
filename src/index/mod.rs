//! index - GistIndex: жизненный цикл индекса и сервисы, на которые опирается vacuum.
//!
//! Разделение:
//! - core.rs  - структура GistIndex, init(), checkpoint(), close()/Drop.
//! - open.rs  - open()/open_with_config(): блокировка, реплей WAL, сборка пула.
//! - pages.rs - allocate_page (потребитель FSM), журналирование изменений страниц.

pub mod core;
pub mod open;
pub mod pages;

pub use core::GistIndex;
