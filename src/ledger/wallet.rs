use crate::domain::Address;
use crate::ports::Signer;

/// An account the ledger gateway holds unlocked. We only ever know its
/// address; signing happens on the other side.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredAccount {
    address: Option<Address>,
}

impl ConfiguredAccount {
    pub fn new(address: Option<Address>) -> Self {
        Self { address }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }
}

impl Signer for ConfiguredAccount {
    fn account(&self) -> Option<Address> {
        self.address.clone()
    }
}
