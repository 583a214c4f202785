mod lock;
mod record;
mod store;

pub use lock::NameLock;
pub use record::{BackendHandle, TunnelRecord};
pub use store::{TunnelStore, validate_name};
pub(crate) use store::write_atomic;
