//! Authoritative chain state: the block list, account balances and nonces,
//! and the validator registry.

use std::collections::{BTreeMap, HashMap};

use tessera_types::block::Block;
use tessera_types::constants::{MAX_VALIDATOR_SLOTS, MINIMUM_VALIDATOR_AGE, VALIDATOR_STAKE};
use tessera_types::primitives::*;
use tessera_types::transaction::{Transaction, TransactionType};

use crate::error::ChainError;

/// Committed state of one address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Account {
    pub balance: Amount,
    /// Nonce of the last committed transaction sent from this address.
    pub nonce: Nonce,
}

/// Registry entry of a validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorInfo {
    /// Block count at which the validator was registered.
    pub induction_height: u64,
    /// Block count after the last block this validator minted (or its induction).
    pub last_minted_height: u64,
}

/// Current and available balance of an address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balance {
    /// Committed balance.
    pub current: Amount,
    /// Committed balance minus pending outgoing transfers and their fees.
    pub available: Amount,
}

/// The replicated ledger. Always holds at least the genesis block.
#[derive(Debug, Clone)]
pub struct LedgerState {
    blocks: Vec<Block>,
    block_index: HashMap<Hash, BlockHeight>,
    tx_index: HashMap<Hash, BlockHeight>,
    accounts: HashMap<Address, Account>,
    validators: BTreeMap<Address, ValidatorInfo>,
}

impl LedgerState {
    /// Start a ledger from its genesis block.
    pub fn new(genesis: Block) -> Result<Self, ChainError> {
        Self::replay(vec![genesis])
    }

    /// Rebuild a ledger by applying persisted blocks in order.
    pub fn replay(blocks: Vec<Block>) -> Result<Self, ChainError> {
        let mut iter = blocks.into_iter();
        let genesis = iter.next().ok_or_else(|| ChainError::InvalidBlock {
            reason: "cannot build a ledger without a genesis block".to_string(),
        })?;

        let mut ledger = LedgerState {
            blocks: Vec::new(),
            block_index: HashMap::new(),
            tx_index: HashMap::new(),
            accounts: HashMap::new(),
            validators: BTreeMap::new(),
        };
        ledger.append(genesis)?;
        for block in iter {
            ledger.apply_block(block)?;
        }
        Ok(ledger)
    }

    // ─── Chain Queries ───────────────────────────────────────────────────────

    /// Number of blocks in the chain, genesis included.
    pub fn block_count(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Height and hash of the tip.
    pub fn head(&self) -> (BlockHeight, Hash) {
        let height = self.block_count().saturating_sub(1);
        (height, self.tip_hash())
    }

    pub fn tip_hash(&self) -> Hash {
        self.blocks.last().map(|b| b.hash).unwrap_or(ZERO_HASH)
    }

    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn block(&self, height: BlockHeight) -> Option<&Block> {
        self.blocks.get(height as usize)
    }

    pub fn block_by_hash(&self, hash: &Hash) -> Option<(BlockHeight, &Block)> {
        let height = *self.block_index.get(hash)?;
        self.block(height).map(|b| (height, b))
    }

    /// Up to `count` blocks starting at `start`.
    pub fn blocks_range(&self, start: BlockHeight, count: u64) -> &[Block] {
        let len = self.blocks.len();
        let start = (start.min(len as u64)) as usize;
        let end = start.saturating_add(count.min(len as u64) as usize).min(len);
        &self.blocks[start..end]
    }

    pub fn contains_block(&self, hash: &Hash) -> bool {
        self.block_index.contains_key(hash)
    }

    /// True if a block extends the current tip.
    pub fn is_next_block(&self, block: &Block) -> bool {
        block.last_hash == self.tip_hash()
    }

    pub fn contains_transaction(&self, hash: &Hash) -> bool {
        self.tx_index.contains_key(hash)
    }

    /// Committed transaction and the height of its block.
    pub fn transaction(&self, hash: &Hash) -> Option<(BlockHeight, &Transaction)> {
        let height = *self.tx_index.get(hash)?;
        self.block(height)?
            .transactions
            .iter()
            .find(|tx| tx.hash == *hash)
            .map(|tx| (height, tx))
    }

    // ─── Account Queries ─────────────────────────────────────────────────────

    pub fn account(&self, address: &Address) -> Account {
        self.accounts.get(address).copied().unwrap_or_default()
    }

    pub fn nonce(&self, address: &Address) -> Nonce {
        self.account(address).nonce
    }

    /// Balance of `address` net of `pending` outgoing transfers, skipping the
    /// pending transaction `exclude`.
    pub fn balance_of<'a>(
        &self,
        address: &Address,
        pending: impl IntoIterator<Item = &'a Transaction>,
        exclude: Option<&Hash>,
    ) -> Balance {
        let current = self.account(address).balance;
        let pooled = pending
            .into_iter()
            .filter(|tx| tx.from == *address && tx.tx_type == TransactionType::Transfer)
            .filter(|tx| exclude != Some(&tx.hash))
            .fold(0u64, |acc, tx| {
                acc.saturating_add(tx.total_cost().unwrap_or(u64::MAX))
            });
        Balance {
            current,
            available: current.saturating_sub(pooled),
        }
    }

    // ─── Validator Queries ───────────────────────────────────────────────────

    pub fn validator_info(&self, address: &Address) -> Option<&ValidatorInfo> {
        self.validators.get(address)
    }

    /// Registered validators in address order.
    pub fn validators(&self) -> impl Iterator<Item = (&Address, &ValidatorInfo)> {
        self.validators.iter()
    }

    pub fn registered_validator_count(&self) -> usize {
        self.validators.len()
    }

    /// Whether `address` is a registered validator old enough to participate.
    /// With `ignore_age`, only registration is checked.
    pub fn is_validator(&self, address: &Address, ignore_age: bool) -> bool {
        match self.validators.get(address) {
            Some(info) => ignore_age || self.is_of_age(info),
            None => false,
        }
    }

    /// Number of validators passing the age rule.
    pub fn eligible_validator_count(&self) -> usize {
        self.validators
            .values()
            .filter(|info| self.is_of_age(info))
            .count()
    }

    fn is_of_age(&self, info: &ValidatorInfo) -> bool {
        let count = self.block_count();
        count <= MINIMUM_VALIDATOR_AGE
            || count.saturating_sub(info.induction_height) >= MINIMUM_VALIDATOR_AGE
    }

    // ─── Commit ──────────────────────────────────────────────────────────────

    /// Append a block that extends the tip and apply its transactions.
    ///
    /// Either the whole block applies or the ledger is left untouched.
    /// Returns the height of the new block.
    pub fn apply_block(&mut self, block: Block) -> Result<BlockHeight, ChainError> {
        if !self.is_next_block(&block) {
            return Err(ChainError::ParentMismatch {
                expected: hex::encode(self.tip_hash()),
                actual: hex::encode(block.last_hash),
            });
        }
        self.append(block)
    }

    fn append(&mut self, block: Block) -> Result<BlockHeight, ChainError> {
        if self.block_index.contains_key(&block.hash) {
            return Err(ChainError::Duplicate {
                kind: "block",
                hash: hex::encode(block.hash),
            });
        }

        let height = self.block_count();
        let new_count = height + 1;
        // Genesis has no minter to pay, so its fees are not charged.
        let mut staged = StagedState::new(&self.accounts, self.validators.clone(), height != 0);

        for tx in &block.transactions {
            staged.apply_transaction(&block.validator, new_count, tx)?;
        }
        if let Some(info) = staged.validators.get_mut(&block.validator) {
            info.last_minted_height = new_count;
        }

        let StagedState {
            touched,
            validators,
            ..
        } = staged;
        self.accounts.extend(touched);
        self.validators = validators;
        for tx in &block.transactions {
            self.tx_index.insert(tx.hash, height);
        }
        self.block_index.insert(block.hash, height);
        self.blocks.push(block);
        Ok(height)
    }
}

/// Copy-on-write view used while applying one block.
struct StagedState<'a> {
    base: &'a HashMap<Address, Account>,
    touched: HashMap<Address, Account>,
    validators: BTreeMap<Address, ValidatorInfo>,
    charge_fees: bool,
}

impl<'a> StagedState<'a> {
    fn new(
        base: &'a HashMap<Address, Account>,
        validators: BTreeMap<Address, ValidatorInfo>,
        charge_fees: bool,
    ) -> Self {
        Self {
            base,
            touched: HashMap::new(),
            validators,
            charge_fees,
        }
    }

    fn entry(&mut self, address: &Address) -> &mut Account {
        let base = self.base;
        self.touched
            .entry(*address)
            .or_insert_with(|| base.get(address).copied().unwrap_or_default())
    }

    /// The zero address is a sink: credits and debits to it are dropped.
    fn credit(&mut self, address: &Address, amount: Amount) -> Result<(), ChainError> {
        if *address == ZERO_ADDRESS {
            return Ok(());
        }
        let account = self.entry(address);
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or(ChainError::Overflow)?;
        Ok(())
    }

    fn debit(&mut self, address: &Address, amount: Amount) -> Result<(), ChainError> {
        if *address == ZERO_ADDRESS {
            return Ok(());
        }
        let account = self.entry(address);
        account.balance =
            account
                .balance
                .checked_sub(amount)
                .ok_or(ChainError::InsufficientBalance {
                    available: account.balance,
                    required: amount,
                })?;
        Ok(())
    }

    fn pay_fee(&mut self, tx: &Transaction, minter: &Address) -> Result<(), ChainError> {
        if !self.charge_fees {
            return Ok(());
        }
        self.debit(&tx.from, tx.fee)?;
        self.credit(minter, tx.fee)
    }

    fn apply_transaction(
        &mut self,
        minter: &Address,
        new_count: u64,
        tx: &Transaction,
    ) -> Result<(), ChainError> {
        match tx.tx_type {
            TransactionType::Transfer => {
                let amount = tx.amount().ok_or_else(|| ChainError::InvalidTransaction {
                    reason: "malformed transfer amount".to_string(),
                })?;
                self.pay_fee(tx, minter)?;
                self.debit(&tx.from, amount)?;
                self.credit(&tx.to, amount)?;
            }
            TransactionType::AddValidator => {
                if !self.validators.contains_key(&tx.from)
                    && self.validators.len() < MAX_VALIDATOR_SLOTS
                {
                    self.pay_fee(tx, minter)?;
                    self.debit(&tx.from, VALIDATOR_STAKE)?;
                    self.validators.insert(
                        tx.from,
                        ValidatorInfo {
                            induction_height: new_count,
                            last_minted_height: new_count,
                        },
                    );
                }
            }
            TransactionType::RemoveValidator => {
                if self.validators.contains_key(&tx.from) {
                    self.pay_fee(tx, minter)?;
                    self.credit(&tx.from, VALIDATOR_STAKE)?;
                    self.validators.remove(&tx.from);
                }
            }
        }
        if tx.from != ZERO_ADDRESS {
            self.entry(&tx.from).nonce = tx.nonce;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{build_block, genesis_block};
    use crate::transaction::{create_add_validator, create_remove_validator, create_transfer};
    use tessera_crypto::keys::Keypair;
    use tessera_types::constants::{TOTAL_SUPPLY, TRANSFER_FEE, VALIDATOR_FEE};

    fn keys(n: u8) -> Vec<Keypair> {
        (1..=n)
            .map(|i| Keypair::from_seed(&[i; 32]).unwrap())
            .collect()
    }

    fn ledger_for(keys: &[Keypair]) -> LedgerState {
        let addrs: Vec<Address> = keys.iter().map(|k| k.address()).collect();
        LedgerState::new(genesis_block(&addrs, TOTAL_SUPPLY)).unwrap()
    }

    #[test]
    fn test_genesis_state() {
        let keys = keys(4);
        let ledger = ledger_for(&keys);
        assert_eq!(ledger.block_count(), 1);
        assert_eq!(ledger.head().0, 0);
        assert_eq!(ledger.registered_validator_count(), 4);
        for k in &keys {
            let account = ledger.account(&k.address());
            assert_eq!(account.balance, TOTAL_SUPPLY - VALIDATOR_STAKE);
            assert_eq!(account.nonce, 0);
            let info = ledger.validator_info(&k.address()).unwrap();
            assert_eq!(info.induction_height, 1);
            assert!(ledger.is_validator(&k.address(), false));
        }
        assert_eq!(ledger.eligible_validator_count(), 4);
        assert_eq!(ledger.account(&ZERO_ADDRESS), Account::default());
    }

    #[test]
    fn test_genesis_charges_no_fees() {
        let keys = keys(2);
        let mut ledger = ledger_for(&keys);
        let genesis_fees: Amount = ledger.block(0).unwrap().transactions.iter().map(|tx| tx.fee).sum();
        assert!(genesis_fees > 0);
        for k in &keys {
            assert_eq!(ledger.account(&k.address()).balance, TOTAL_SUPPLY - VALIDATOR_STAKE);
        }

        // Fees resume from the first minted block.
        let tx = create_transfer(&keys[0], 1, [0xAAu8; 20], 1).unwrap();
        let block = build_block(&keys[1], ledger.tip_hash(), vec![tx], vec![], 1).unwrap();
        ledger.apply_block(block).unwrap();
        assert_eq!(
            ledger.account(&keys[1].address()).balance,
            TOTAL_SUPPLY - VALIDATOR_STAKE + TRANSFER_FEE
        );
    }

    #[test]
    fn test_transfer_moves_amount_and_fee() {
        let keys = keys(2);
        let mut ledger = ledger_for(&keys);
        let start = ledger.account(&keys[0].address()).balance;
        let recipient = [0xAAu8; 20];

        let tx = create_transfer(&keys[0], 1, recipient, 1_000).unwrap();
        let block = build_block(&keys[1], ledger.tip_hash(), vec![tx], vec![], 10).unwrap();
        let height = ledger.apply_block(block).unwrap();

        assert_eq!(height, 1);
        assert_eq!(
            ledger.account(&keys[0].address()).balance,
            start - 1_000 - TRANSFER_FEE
        );
        assert_eq!(ledger.account(&keys[0].address()).nonce, 1);
        assert_eq!(ledger.account(&recipient).balance, 1_000);
        assert_eq!(
            ledger.account(&keys[1].address()).balance,
            start + TRANSFER_FEE
        );
        let info = ledger.validator_info(&keys[1].address()).unwrap();
        assert_eq!(info.last_minted_height, 2);
    }

    #[test]
    fn test_wrong_parent_rejected() {
        let keys = keys(2);
        let mut ledger = ledger_for(&keys);
        let tx = create_transfer(&keys[0], 1, [1u8; 20], 1).unwrap();
        let block = build_block(&keys[1], [9u8; 32], vec![tx], vec![], 10).unwrap();
        assert!(matches!(
            ledger.apply_block(block),
            Err(ChainError::ParentMismatch { .. })
        ));
        assert_eq!(ledger.block_count(), 1);
    }

    #[test]
    fn test_overdraft_leaves_state_untouched() {
        let keys = keys(2);
        let mut ledger = ledger_for(&keys);
        let before = ledger.account(&keys[0].address());
        let ok = create_transfer(&keys[0], 1, [1u8; 20], 5).unwrap();
        let overdraft = create_transfer(&keys[0], 2, [1u8; 20], TOTAL_SUPPLY).unwrap();
        let block =
            build_block(&keys[1], ledger.tip_hash(), vec![ok, overdraft], vec![], 10).unwrap();

        assert!(matches!(
            ledger.apply_block(block),
            Err(ChainError::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.account(&keys[0].address()), before);
        assert_eq!(ledger.account(&[1u8; 20]).balance, 0);
        assert_eq!(ledger.block_count(), 1);
    }

    #[test]
    fn test_add_and_remove_validator() {
        let keys = keys(2);
        let mut ledger = ledger_for(&keys);
        let newcomer = Keypair::from_seed(&[50u8; 32]).unwrap();

        let fund = create_transfer(&keys[0], 1, newcomer.address(), VALIDATOR_STAKE * 2).unwrap();
        let block = build_block(&keys[1], ledger.tip_hash(), vec![fund], vec![], 1).unwrap();
        ledger.apply_block(block).unwrap();

        let add = create_add_validator(&newcomer, 1).unwrap();
        let block = build_block(&keys[1], ledger.tip_hash(), vec![add], vec![], 2).unwrap();
        ledger.apply_block(block).unwrap();
        assert!(ledger.is_validator(&newcomer.address(), true));
        // Inducted at block count 3: not yet of age.
        assert!(!ledger.is_validator(&newcomer.address(), false));
        assert_eq!(ledger.eligible_validator_count(), 2);
        assert_eq!(
            ledger.account(&newcomer.address()).balance,
            VALIDATOR_STAKE - VALIDATOR_FEE
        );

        let remove = create_remove_validator(&newcomer, 2).unwrap();
        let block = build_block(&keys[1], ledger.tip_hash(), vec![remove], vec![], 3).unwrap();
        ledger.apply_block(block).unwrap();
        assert!(ledger.validator_info(&newcomer.address()).is_none());
        assert_eq!(
            ledger.account(&newcomer.address()).balance,
            VALIDATOR_STAKE * 2 - 2 * VALIDATOR_FEE
        );
        assert_eq!(ledger.nonce(&newcomer.address()), 2);
    }

    #[test]
    fn test_available_balance_excludes_pending() {
        let keys = keys(1);
        let ledger = ledger_for(&keys);
        let a = create_transfer(&keys[0], 1, [1u8; 20], 1_000).unwrap();
        let b = create_transfer(&keys[0], 2, [1u8; 20], 2_000).unwrap();
        let pending = vec![a.clone(), b];
        let balance = ledger.balance_of(&keys[0].address(), &pending, None);
        assert_eq!(balance.available, balance.current - 3_000 - 2 * TRANSFER_FEE);
        let excluding = ledger.balance_of(&keys[0].address(), &pending, Some(&a.hash));
        assert_eq!(excluding.available, balance.current - 2_000 - TRANSFER_FEE);
    }

    #[test]
    fn test_replay_matches_incremental() {
        let keys = keys(2);
        let mut ledger = ledger_for(&keys);
        let tx = create_transfer(&keys[0], 1, [3u8; 20], 77).unwrap();
        let block = build_block(&keys[1], ledger.tip_hash(), vec![tx.clone()], vec![], 5).unwrap();
        ledger.apply_block(block).unwrap();

        let replayed = LedgerState::replay(ledger.blocks_range(0, 10).to_vec()).unwrap();
        assert_eq!(replayed.head(), ledger.head());
        assert_eq!(replayed.account(&[3u8; 20]), ledger.account(&[3u8; 20]));
        assert_eq!(replayed.transaction(&tx.hash).map(|(h, _)| h), Some(1));
    }

    #[test]
    fn test_blocks_range_bounds() {
        let keys = keys(1);
        let ledger = ledger_for(&keys);
        assert_eq!(ledger.blocks_range(0, 10).len(), 1);
        assert!(ledger.blocks_range(1, 10).is_empty());
        assert!(ledger.blocks_range(5, 10).is_empty());
        assert!(LedgerState::replay(vec![]).is_err());
    }
}
