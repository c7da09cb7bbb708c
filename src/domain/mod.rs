//! Ledger-independent domain types.

pub mod address;
pub mod cart;
pub mod event;
pub mod product;
pub mod role;
pub mod units;

pub use address::Address;
pub use cart::{Cart, CartError, CartLine};
pub use event::{EventKind, HistoryOrder, TransactionEvent};
pub use product::{
    compute_total_fee, compute_transport_fee, Actors, FeeComponents, LifecycleStage, Location,
    Product,
};
pub use role::Role;
pub use units::{UnitError, Wei};
