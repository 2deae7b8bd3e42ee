pub mod address;
pub mod amount;
pub mod errors;
pub mod kv_file;
pub mod model;
pub mod network;
pub mod traits;

pub use address::{normalize_address, parse_address};
pub use amount::{kas_to_sompi, sompi_to_kas};
pub use errors::{ErrorKind, KernelResult, ResultExt};
pub use network::Network;
