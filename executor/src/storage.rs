//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `tokens` - Ledger state (key: contract address)
//! - `paymasters` - Policy engine state (key: contract address)
//! - `native` - Native balances (key: account)
//! - `nonces` - Signed-call nonces (key: account)
//! - `events` - Transfer event log (key: sequence, big-endian)
//! - `meta` - Counters (next event sequence, contract nonce, genesis marker)
//!
//! Every committed call is written as one `WriteBatch`.

use crate::{
    config::Config,
    error::{Error, Result},
    types::EventRecord,
};
use ledger_core::{AccountId, NativeAmount, TokenLedger};
use paymaster::Paymaster;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};

/// Column family names
const CF_TOKENS: &str = "tokens";
const CF_PAYMASTERS: &str = "paymasters";
const CF_NATIVE: &str = "native";
const CF_NONCES: &str = "nonces";
const CF_EVENTS: &str = "events";
const CF_META: &str = "meta";

/// Meta keys
const META_NEXT_SEQUENCE: &[u8] = b"next_sequence";
const META_CONTRACT_NONCE: &[u8] = b"contract_nonce";
const META_GENESIS: &[u8] = b"genesis_applied";

/// Writes produced by one committed call
#[derive(Debug, Default)]
pub struct ChangeSet {
    /// Ledgers whose state changed
    pub tokens: Vec<TokenLedger>,

    /// Engines whose state changed
    pub paymasters: Vec<Paymaster>,

    /// Native balances that changed (zero deletes the entry)
    pub native: Vec<(AccountId, NativeAmount)>,

    /// Nonces that advanced
    pub nonces: Vec<(AccountId, u64)>,

    /// Newly sequenced events
    pub events: Vec<EventRecord>,

    /// Next event sequence after this commit
    pub next_sequence: Option<u64>,

    /// Contract nonce after this commit
    pub contract_nonce: Option<u64>,

    /// Mark genesis allocations as applied
    pub genesis_applied: bool,
}

/// Everything needed to rebuild the runtime
#[derive(Debug, Default)]
pub struct PersistedState {
    /// All ledgers
    pub tokens: Vec<TokenLedger>,

    /// All engines
    pub paymasters: Vec<Paymaster>,

    /// Non-zero native balances
    pub native: Vec<(AccountId, NativeAmount)>,

    /// Signed-call nonces
    pub nonces: Vec<(AccountId, u64)>,

    /// Sequence of the newest stored event
    pub last_event: Option<u64>,

    /// Next event sequence
    pub next_sequence: u64,

    /// Next contract nonce
    pub contract_nonce: u64,

    /// Whether genesis allocations were applied
    pub genesis_applied: bool,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("path", &self.db.path()).finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_TOKENS, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_PAYMASTERS, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_NATIVE, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_NONCES, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_EVENTS, Self::cf_options_events()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB");

        Ok(Self { db })
    }

    // Column family options

    fn cf_options_events() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_state() -> Options {
        let mut opts = Options::default();
        // State is read on every restart, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    /// Write a change set atomically
    pub fn commit(&self, changes: &ChangeSet) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_tokens = self.cf_handle(CF_TOKENS)?;
        for token in &changes.tokens {
            batch.put_cf(cf_tokens, token.address().as_bytes(), bincode::serialize(token)?);
        }

        let cf_paymasters = self.cf_handle(CF_PAYMASTERS)?;
        for paymaster in &changes.paymasters {
            batch.put_cf(
                cf_paymasters,
                paymaster.address().as_bytes(),
                bincode::serialize(paymaster)?,
            );
        }

        let cf_native = self.cf_handle(CF_NATIVE)?;
        for (account, balance) in &changes.native {
            if *balance == 0 {
                batch.delete_cf(cf_native, account.as_bytes());
            } else {
                batch.put_cf(cf_native, account.as_bytes(), bincode::serialize(balance)?);
            }
        }

        let cf_nonces = self.cf_handle(CF_NONCES)?;
        for (account, nonce) in &changes.nonces {
            batch.put_cf(cf_nonces, account.as_bytes(), nonce.to_be_bytes());
        }

        let cf_events = self.cf_handle(CF_EVENTS)?;
        for record in &changes.events {
            batch.put_cf(cf_events, record.sequence.to_be_bytes(), bincode::serialize(record)?);
        }

        let cf_meta = self.cf_handle(CF_META)?;
        if let Some(next) = changes.next_sequence {
            batch.put_cf(cf_meta, META_NEXT_SEQUENCE, next.to_be_bytes());
        }
        if let Some(nonce) = changes.contract_nonce {
            batch.put_cf(cf_meta, META_CONTRACT_NONCE, nonce.to_be_bytes());
        }
        if changes.genesis_applied {
            batch.put_cf(cf_meta, META_GENESIS, [1u8]);
        }

        self.db.write(batch)?;

        tracing::debug!(
            tokens = changes.tokens.len(),
            paymasters = changes.paymasters.len(),
            native = changes.native.len(),
            events = changes.events.len(),
            "Change set committed"
        );

        Ok(())
    }

    /// Read back the whole persisted state
    pub fn load(&self) -> Result<PersistedState> {
        let mut state = PersistedState::default();

        for (_, value) in self.scan(CF_TOKENS)? {
            state.tokens.push(bincode::deserialize(&value)?);
        }

        for (_, value) in self.scan(CF_PAYMASTERS)? {
            state.paymasters.push(bincode::deserialize(&value)?);
        }

        for (key, value) in self.scan(CF_NATIVE)? {
            state.native.push((Self::account_key(&key)?, bincode::deserialize(&value)?));
        }

        for (key, value) in self.scan(CF_NONCES)? {
            state.nonces.push((Self::account_key(&key)?, Self::u64_value(&value)?));
        }

        // The event log stays on disk; replays go through `events_since`
        state.last_event = self.last_event_sequence()?;

        let cf_meta = self.cf_handle(CF_META)?;
        if let Some(value) = self.db.get_cf(cf_meta, META_NEXT_SEQUENCE)? {
            state.next_sequence = Self::u64_value(&value)?;
        }
        if let Some(value) = self.db.get_cf(cf_meta, META_CONTRACT_NONCE)? {
            state.contract_nonce = Self::u64_value(&value)?;
        }
        state.genesis_applied = self.db.get_cf(cf_meta, META_GENESIS)?.is_some();

        tracing::info!(
            tokens = state.tokens.len(),
            paymasters = state.paymasters.len(),
            next_sequence = state.next_sequence,
            "Persisted state loaded"
        );

        Ok(state)
    }

    /// At most `limit` events with `sequence >= from`, in order
    pub fn events_since(&self, from: u64, limit: usize) -> Result<Vec<EventRecord>> {
        let cf = self.cf_handle(CF_EVENTS)?;
        let start = from.to_be_bytes();
        // Big-endian keys iterate in sequence order
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start[..], rocksdb::Direction::Forward));

        let mut events = Vec::new();
        for item in iter.take(limit) {
            let (_, value) = item?;
            events.push(bincode::deserialize(&value)?);
        }
        Ok(events)
    }

    /// Sequence of the newest stored event
    pub fn last_event_sequence(&self) -> Result<Option<u64>> {
        let cf = self.cf_handle(CF_EVENTS)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                Ok(Some(Self::u64_value(&key)?))
            }
            None => Ok(None),
        }
    }

    fn scan(&self, cf_name: &str) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf_handle(cf_name)?;
        self.db
            .iterator_cf(cf, IteratorMode::Start)
            .map(|item| item.map_err(Error::from))
            .collect()
    }

    fn account_key(key: &[u8]) -> Result<AccountId> {
        let bytes: [u8; 20] = key
            .try_into()
            .map_err(|_| Error::Storage(format!("Corrupt account key of {} bytes", key.len())))?;
        Ok(AccountId::from_bytes(bytes))
    }

    fn u64_value(value: &[u8]) -> Result<u64> {
        let bytes: [u8; 8] = value
            .try_into()
            .map_err(|_| Error::Storage(format!("Corrupt counter of {} bytes", value.len())))?;
        Ok(u64::from_be_bytes(bytes))
    }
}
