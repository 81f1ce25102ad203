/// ledgerlock library crate: credential stores, envelope encryption and the
/// request gateway for an ExpenseOwl client.
///
/// Modules are public so `tests/` integration tests and the binary can reach
/// them via `use ledgerlock::...`.
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod preferences;
pub mod session;
pub mod storage;
pub mod transport;
