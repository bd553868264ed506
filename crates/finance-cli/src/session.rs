#[cfg(test)]
mod mock_provider;
#[allow(clippy::module_inception)]
pub mod session;

pub use session::Session;
