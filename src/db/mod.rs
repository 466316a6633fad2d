mod connection;
mod memory;
mod postgres;
mod storage;

pub use connection::*;
pub use memory::*;
pub use postgres::*;
pub use storage::*;
