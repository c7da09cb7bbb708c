pub mod client;
pub mod memory;
pub mod wallet;

pub use client::LedgerClient;
pub use memory::InMemoryLedger;
pub use wallet::ConfiguredAccount;
