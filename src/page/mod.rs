//! page - on-disk GiST page + fixed checksum trailer.
//!
//! Разделение по подмодулям:
//! - common.rs   - константы/offset’ы заголовка, флаги, слоты, раскладка кортежа.
//! - checksum.rs - трейлер CRC32C.
//! - gist.rs     - заголовок: init/read/write, вид страницы, LSN, FOLLOW_RIGHT, delete-mark.
//! - tuple.rs    - TupleId/GistTuple, слотовая директория, multi-delete.

pub mod common;
pub mod checksum;
pub mod gist;
pub mod tuple;

// ---------------- re-exports (внешний API модуля page) ----------------

pub use common::{
    F_DELETED, F_FOLLOW_RIGHT, F_LEAF, F_TUPLES_DELETED, GIST_HDR_SIZE, PAGE_MAGIC, PAGE_VERSION,
    TRAILER_LEN,
};

pub use checksum::{page_trailer_crc32_le, page_update_checksum, page_verify_checksum};

pub use gist::{
    gist_header_read, gist_header_write, gist_init, gist_mark_tuples_deleted, gist_page_is_new,
    gist_page_kind, gist_page_lsn, gist_set_deleted, gist_set_follow_right, gist_set_lsn,
    GistHeader, PageKind,
};

pub use tuple::{
    gist_add_tuple, gist_delete_tuple, gist_free_space, gist_multi_delete, gist_nslots,
    gist_tuple_at, gist_tuples, GistTuple, TupleId,
};
