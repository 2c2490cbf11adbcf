//! Logic modules
//!
//! Stateless protocol adapters a wallet dispatches its batch steps into. A
//! module never holds balances of its own: it receives a [`ModuleContext`]
//! scoped to the calling wallet and moves that wallet's assets through it.

mod lending;
mod swap;
mod transfer;

pub use lending::{ILendingModule, LendingModule};
pub use swap::{ISwapModule, SwapModule};
pub use transfer::{ITransferModule, TransferModule};

use crate::environment::World;
use crate::events::WalletEvent;
use crate::{Error, Result};
use alloy::primitives::{Address, Bytes, U256};
use std::collections::HashSet;

/// Amount of an asset a step brought back into the wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Realized {
    pub asset: Address,
    pub amount: U256,
}

/// What a single step returns to the dispatcher
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub output: Bytes,
    /// Set when the step realized an inflow the protocol fee applies to
    pub realized: Option<Realized>,
}

impl StepOutcome {
    pub fn new(output: impl Into<Bytes>) -> Self {
        Self {
            output: output.into(),
            realized: None,
        }
    }

    pub fn with_realized(mut self, asset: Address, amount: U256) -> Self {
        self.realized = Some(Realized { asset, amount });
        self
    }
}

/// Capability handed to a module for one batch
///
/// Everything a module touches goes through `world`, which is the batch's
/// journaled view, so a failing later step reverts it.
pub struct ModuleContext<'a> {
    wallet: Address,
    owner: Address,
    sender: Address,
    value: U256,
    not_allowed: &'a HashSet<Address>,
    pub world: &'a mut World,
    events: Vec<WalletEvent>,
}

impl<'a> ModuleContext<'a> {
    pub fn new(
        wallet: Address,
        owner: Address,
        sender: Address,
        value: U256,
        not_allowed: &'a HashSet<Address>,
        world: &'a mut World,
    ) -> Self {
        Self {
            wallet,
            owner,
            sender,
            value,
            not_allowed,
            world,
            events: Vec::new(),
        }
    }

    /// The wallet whose assets the step operates on
    pub fn wallet(&self) -> Address {
        self.wallet
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Effective caller of the batch
    pub fn sender(&self) -> Address {
        self.sender
    }

    /// Native value attached to the batch and not yet consumed by a step
    pub fn unclaimed_value(&self) -> U256 {
        self.value
    }

    /// Consume `amount` of the attached native value
    pub fn claim_value(&mut self, amount: U256) -> Result<()> {
        self.value = self.value.checked_sub(amount).ok_or_else(|| {
            Error::ExternalCallFailed(format!(
                "native amount {} exceeds attached value {}",
                amount, self.value
            ))
        })?;
        Ok(())
    }

    pub fn is_not_allowed(&self, asset: Address) -> bool {
        self.not_allowed.contains(&asset)
    }

    pub fn emit(&mut self, event: WalletEvent) {
        self.events.push(event);
    }

    pub fn into_events(self) -> Vec<WalletEvent> {
        self.events
    }
}

/// A protocol adapter
pub trait LogicModule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one ABI-encoded call against the wallet in `ctx`
    fn call(&self, ctx: &mut ModuleContext<'_>, data: &[u8]) -> Result<StepOutcome>;
}
