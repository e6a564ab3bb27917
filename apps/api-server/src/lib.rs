pub mod ai;
pub mod config;
pub mod ctx;
mod error;
pub mod routes;
pub mod standalone;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_utils;

pub use ai::AIHandler;
pub use config::Config;
pub use ctx::Ctx;
