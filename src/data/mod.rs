//! Downstream persistence and scheduling (spec §4.6-4.7, §4.7 maintenance —
//! Components F, G, I). `store` owns the Postgres pool and every table the
//! rest of this module touches; `writer` and `etl` each borrow it rather
//! than opening their own connections.

pub mod etl;
pub mod maintenance;
pub mod store;
pub mod writer;

pub use store::RelationalStore;
pub use writer::BulkWriter;
