//! Persistence implementations

pub mod memory;
#[cfg(feature = "postgres")]
pub mod database;
#[cfg(feature = "postgres")]
pub mod routing_store;
#[cfg(feature = "postgres")]
pub mod forward_store;
#[cfg(feature = "postgres")]
pub mod transfer_store;
#[cfg(feature = "postgres")]
pub mod call_store;

pub use memory::{
    MemoryCallStore, MemoryForwardStore, MemoryNumberStore, MemoryRoutingStore,
    MemoryTransferLogStore,
};

#[cfg(feature = "postgres")]
pub use call_store::PgCallStore;
#[cfg(feature = "postgres")]
pub use database::{create_pool, run_migrations, DatabaseConfig};
#[cfg(feature = "postgres")]
pub use forward_store::PgForwardStore;
#[cfg(feature = "postgres")]
pub use routing_store::{PgNumberStore, PgRoutingStore};
#[cfg(feature = "postgres")]
pub use transfer_store::PgTransferLogStore;
