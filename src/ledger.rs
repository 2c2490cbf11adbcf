//! Journaled asset ledger
//!
//! Holds every balance in the environment: fungible assets (the native asset
//! included, under [`NATIVE_ETH`](crate::tokens::addresses::NATIVE_ETH)),
//! non-fungible ownership and semi-fungible balances. External protocol state
//! (market reserves, receipt and debt tokens, pool reserves, LP shares) is
//! expressed as ledger balances too, so a single journal covers everything a
//! batch can touch.
//!
//! Writes made while a checkpoint is open are journaled and can be undone with
//! [`Ledger::revert_to`]. Checkpoints nest.

use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum JournalEntry {
    Balance {
        asset: Address,
        holder: Address,
        previous: U256,
    },
    Supply {
        asset: Address,
        previous: U256,
    },
    NftOwner {
        collection: Address,
        id: U256,
        previous: Option<Address>,
    },
    MultiBalance {
        collection: Address,
        id: U256,
        holder: Address,
        previous: U256,
    },
}

/// Position in the journal a batch can roll back to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Checkpoint {
    journal_len: usize,
    depth: usize,
}

#[derive(Debug, Default)]
pub struct Ledger {
    balances: HashMap<(Address, Address), U256>,
    supply: HashMap<Address, U256>,
    nft_owners: HashMap<(Address, U256), Address>,
    multi_balances: HashMap<(Address, U256, Address), U256>,
    journal: Vec<JournalEntry>,
    depth: usize,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a checkpoint
    pub fn checkpoint(&mut self) -> Checkpoint {
        self.depth += 1;
        Checkpoint {
            journal_len: self.journal.len(),
            depth: self.depth,
        }
    }

    /// Undo every write made since `checkpoint` and close it
    pub fn revert_to(&mut self, checkpoint: Checkpoint) {
        debug_assert_eq!(checkpoint.depth, self.depth, "checkpoints must close in order");
        while self.journal.len() > checkpoint.journal_len {
            let Some(entry) = self.journal.pop() else {
                break;
            };
            match entry {
                JournalEntry::Balance {
                    asset,
                    holder,
                    previous,
                } => {
                    self.balances.insert((asset, holder), previous);
                }
                JournalEntry::Supply { asset, previous } => {
                    self.supply.insert(asset, previous);
                }
                JournalEntry::NftOwner {
                    collection,
                    id,
                    previous,
                } => match previous {
                    Some(owner) => {
                        self.nft_owners.insert((collection, id), owner);
                    }
                    None => {
                        self.nft_owners.remove(&(collection, id));
                    }
                },
                JournalEntry::MultiBalance {
                    collection,
                    id,
                    holder,
                    previous,
                } => {
                    self.multi_balances.insert((collection, id, holder), previous);
                }
            }
        }
        self.depth = checkpoint.depth - 1;
    }

    /// Keep every write made since `checkpoint` and close it
    pub fn commit(&mut self, checkpoint: Checkpoint) {
        debug_assert_eq!(checkpoint.depth, self.depth, "checkpoints must close in order");
        self.depth = checkpoint.depth - 1;
        if self.depth == 0 {
            self.journal.clear();
        }
    }

    pub fn balance_of(&self, asset: Address, holder: Address) -> U256 {
        self.balances
            .get(&(asset, holder))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub fn total_supply(&self, asset: Address) -> U256 {
        self.supply.get(&asset).copied().unwrap_or(U256::ZERO)
    }

    /// Create `amount` of `asset` out of thin air for `to`
    pub fn mint(&mut self, asset: Address, to: Address, amount: U256) -> Result<()> {
        let supply = checked_add(self.total_supply(asset), amount)?;
        let balance = checked_add(self.balance_of(asset, to), amount)?;
        self.set_supply(asset, supply);
        self.set_balance(asset, to, balance);
        Ok(())
    }

    /// Destroy `amount` of `asset` held by `from`
    pub fn burn(&mut self, asset: Address, from: Address, amount: U256) -> Result<()> {
        let balance = self.debit(asset, from, amount)?;
        let supply = self.total_supply(asset).saturating_sub(amount);
        self.set_balance(asset, from, balance);
        self.set_supply(asset, supply);
        Ok(())
    }

    pub fn transfer(
        &mut self,
        asset: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        if amount.is_zero() || from == to {
            // Still surface an insufficient balance on a self transfer
            self.debit(asset, from, amount)?;
            return Ok(());
        }
        let from_balance = self.debit(asset, from, amount)?;
        let to_balance = checked_add(self.balance_of(asset, to), amount)?;
        self.set_balance(asset, from, from_balance);
        self.set_balance(asset, to, to_balance);
        Ok(())
    }

    pub fn owner_of(&self, collection: Address, id: U256) -> Option<Address> {
        self.nft_owners.get(&(collection, id)).copied()
    }

    pub fn mint_nft(&mut self, collection: Address, to: Address, id: U256) -> Result<()> {
        if self.owner_of(collection, id).is_some() {
            return Err(Error::ExternalCallFailed(format!(
                "token {} of {} already minted",
                id, collection
            )));
        }
        self.set_nft_owner(collection, id, Some(to));
        Ok(())
    }

    pub fn transfer_nft(
        &mut self,
        collection: Address,
        from: Address,
        to: Address,
        id: U256,
    ) -> Result<()> {
        if self.owner_of(collection, id) != Some(from) {
            return Err(Error::ExternalCallFailed(
                "transfer of token that is not own".to_string(),
            ));
        }
        self.set_nft_owner(collection, id, Some(to));
        Ok(())
    }

    pub fn multi_balance_of(&self, collection: Address, id: U256, holder: Address) -> U256 {
        self.multi_balances
            .get(&(collection, id, holder))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub fn mint_multi(
        &mut self,
        collection: Address,
        to: Address,
        id: U256,
        amount: U256,
    ) -> Result<()> {
        let balance = checked_add(self.multi_balance_of(collection, id, to), amount)?;
        self.set_multi_balance(collection, id, to, balance);
        Ok(())
    }

    pub fn transfer_multi(
        &mut self,
        collection: Address,
        from: Address,
        to: Address,
        id: U256,
        amount: U256,
    ) -> Result<()> {
        let available = self.multi_balance_of(collection, id, from);
        if available < amount {
            return Err(Error::InsufficientBalance {
                asset: collection,
                holder: from,
                available,
                needed: amount,
            });
        }
        self.set_multi_balance(collection, id, from, available - amount);
        let balance = checked_add(self.multi_balance_of(collection, id, to), amount)?;
        self.set_multi_balance(collection, id, to, balance);
        Ok(())
    }

    fn debit(&self, asset: Address, holder: Address, amount: U256) -> Result<U256> {
        let available = self.balance_of(asset, holder);
        available
            .checked_sub(amount)
            .ok_or(Error::InsufficientBalance {
                asset,
                holder,
                available,
                needed: amount,
            })
    }

    fn set_balance(&mut self, asset: Address, holder: Address, value: U256) {
        let previous = self
            .balances
            .insert((asset, holder), value)
            .unwrap_or(U256::ZERO);
        if self.depth > 0 {
            self.journal.push(JournalEntry::Balance {
                asset,
                holder,
                previous,
            });
        }
    }

    fn set_supply(&mut self, asset: Address, value: U256) {
        let previous = self.supply.insert(asset, value).unwrap_or(U256::ZERO);
        if self.depth > 0 {
            self.journal.push(JournalEntry::Supply { asset, previous });
        }
    }

    fn set_nft_owner(&mut self, collection: Address, id: U256, owner: Option<Address>) {
        let previous = match owner {
            Some(owner) => self.nft_owners.insert((collection, id), owner),
            None => self.nft_owners.remove(&(collection, id)),
        };
        if self.depth > 0 {
            self.journal.push(JournalEntry::NftOwner {
                collection,
                id,
                previous,
            });
        }
    }

    fn set_multi_balance(&mut self, collection: Address, id: U256, holder: Address, value: U256) {
        let previous = self
            .multi_balances
            .insert((collection, id, holder), value)
            .unwrap_or(U256::ZERO);
        if self.depth > 0 {
            self.journal.push(JournalEntry::MultiBalance {
                collection,
                id,
                holder,
                previous,
            });
        }
    }
}

fn checked_add(a: U256, b: U256) -> Result<U256> {
    a.checked_add(b)
        .ok_or_else(|| Error::ExternalCallFailed("arithmetic overflow".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: Address = Address::repeat_byte(0x11);
    const ALICE: Address = Address::repeat_byte(0xa1);
    const BOB: Address = Address::repeat_byte(0xb0);

    #[test]
    fn test_transfer_moves_balance() {
        let mut ledger = Ledger::new();
        ledger.mint(TOKEN, ALICE, U256::from(100)).unwrap();
        ledger.transfer(TOKEN, ALICE, BOB, U256::from(40)).unwrap();

        assert_eq!(ledger.balance_of(TOKEN, ALICE), U256::from(60));
        assert_eq!(ledger.balance_of(TOKEN, BOB), U256::from(40));
        assert_eq!(ledger.total_supply(TOKEN), U256::from(100));
    }

    #[test]
    fn test_insufficient_balance() {
        let mut ledger = Ledger::new();
        ledger.mint(TOKEN, ALICE, U256::from(10)).unwrap();

        let err = ledger
            .transfer(TOKEN, ALICE, BOB, U256::from(11))
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
        assert_eq!(ledger.balance_of(TOKEN, ALICE), U256::from(10));
    }

    #[test]
    fn test_revert_restores_all_writes() {
        let mut ledger = Ledger::new();
        ledger.mint(TOKEN, ALICE, U256::from(100)).unwrap();

        let checkpoint = ledger.checkpoint();
        ledger.transfer(TOKEN, ALICE, BOB, U256::from(30)).unwrap();
        ledger.burn(TOKEN, BOB, U256::from(10)).unwrap();
        ledger.mint_nft(TOKEN, BOB, U256::from(7)).unwrap();
        ledger.revert_to(checkpoint);

        assert_eq!(ledger.balance_of(TOKEN, ALICE), U256::from(100));
        assert_eq!(ledger.balance_of(TOKEN, BOB), U256::ZERO);
        assert_eq!(ledger.total_supply(TOKEN), U256::from(100));
        assert_eq!(ledger.owner_of(TOKEN, U256::from(7)), None);
    }

    #[test]
    fn test_nested_checkpoint_keeps_outer_writes() {
        let mut ledger = Ledger::new();
        ledger.mint(TOKEN, ALICE, U256::from(100)).unwrap();

        let outer = ledger.checkpoint();
        ledger.transfer(TOKEN, ALICE, BOB, U256::from(30)).unwrap();

        let inner = ledger.checkpoint();
        ledger.transfer(TOKEN, BOB, ALICE, U256::from(5)).unwrap();
        ledger.revert_to(inner);

        ledger.commit(outer);

        assert_eq!(ledger.balance_of(TOKEN, ALICE), U256::from(70));
        assert_eq!(ledger.balance_of(TOKEN, BOB), U256::from(30));
    }

    #[test]
    fn test_multi_token_transfer() {
        let mut ledger = Ledger::new();
        let id = U256::from(61296);
        ledger.mint_multi(TOKEN, ALICE, id, U256::from(2)).unwrap();
        ledger
            .transfer_multi(TOKEN, ALICE, BOB, id, U256::from(2))
            .unwrap();

        assert_eq!(ledger.multi_balance_of(TOKEN, id, BOB), U256::from(2));
        assert!(ledger
            .transfer_multi(TOKEN, ALICE, BOB, id, U256::from(1))
            .is_err());
    }
}
