pub mod board;
pub mod mock;
pub mod utils;

#[cfg(feature = "backend_nmcli")]
pub mod nmcli;
