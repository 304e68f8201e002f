pub mod acl;
pub mod clock;
pub mod config;
pub mod core_bridge;
pub mod db;
pub mod demo;
pub mod error;
pub mod hooks;
pub mod identity;
pub mod janitor;
pub mod model;
pub mod names;
pub mod plugin;
pub mod seed;
pub mod store;

pub use error::StoreError;
pub use janitor::{Janitor, SweepPolicy, SweepReport};
pub use store::Store;
