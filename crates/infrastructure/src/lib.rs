//! 基础设施层实现。
//!
//! 提供基于 PostgreSQL 的仓储适配器与数据库迁移，实现应用层定义的存储接口。

pub mod migrations;
pub mod repository;

pub use migrations::MIGRATOR;
pub use repository::{
    create_pg_pool, PgConnectionRepository, PgMessageRepository, PgRoomMemberRepository,
    PgRoomRepository, PgStorage,
};
