/// Set of outstanding (issued, not yet redeemed) access tokens
/// Removal is per-token atomic: when overlapping batches race, each token is
/// counted by exactly one caller.
use dashmap::DashSet;
use parking_lot::Mutex;
use planetflare_sdk::token::{Token, TOKEN_BYTES};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::error::{PublisherError, Result};

pub trait TokenStore: Send + Sync {
    /// Add tokens to the outstanding set. Re-inserting a present token is a no-op.
    fn insert(&self, tokens: &[Token]) -> Result<()>;

    /// Remove every listed token that is outstanding and return how many were removed.
    /// Unknown or already redeemed tokens contribute 0.
    fn delete_if_present(&self, tokens: &[Token]) -> Result<usize>;

    fn contains(&self, token: &Token) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn remove_each(set: &DashSet<Token>, tokens: &[Token]) -> Vec<Token> {
    tokens
        .iter()
        .filter(|token| set.remove(*token).is_some())
        .copied()
        .collect()
}

#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: DashSet<Token>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn insert(&self, tokens: &[Token]) -> Result<()> {
        for token in tokens {
            self.tokens.insert(*token);
        }
        Ok(())
    }

    fn delete_if_present(&self, tokens: &[Token]) -> Result<usize> {
        Ok(remove_each(&self.tokens, tokens).len())
    }

    fn contains(&self, token: &Token) -> bool {
        self.tokens.contains(token)
    }

    fn len(&self) -> usize {
        self.tokens.len()
    }
}

/// Outstanding tokens kept in memory and written through to disk.
/// File layout: 32-byte SHA-256 checksum header followed by the tokens,
/// so a single rename commits both.
///
/// Concurrent writers coalesce: every change bumps `generation`, and a writer
/// whose change is already covered by a snapshot on disk skips its own write.
pub struct FileTokenStore {
    cache: DashSet<Token>,
    path: PathBuf,
    generation: AtomicU64,
    /// Generation covered by the file on disk. Held while writing a snapshot;
    /// lookups and removals never take it.
    persisted: Mutex<u64>,
}

const CHECKSUM_BYTES: usize = 32;

impl FileTokenStore {
    fn compute_checksum(body: &[u8]) -> [u8; CHECKSUM_BYTES] {
        let mut hasher = Sha256::new();
        hasher.update(b"outstanding_tokens_v2:");
        hasher.update(body);
        let result = hasher.finalize();

        let mut checksum = [0u8; CHECKSUM_BYTES];
        checksum.copy_from_slice(&result);
        checksum
    }

    /// Split a snapshot into tokens, or `None` if it does not check out
    fn decode(data: &[u8]) -> Option<Vec<Token>> {
        if data.len() < CHECKSUM_BYTES {
            return None;
        }
        let (checksum, body) = data.split_at(CHECKSUM_BYTES);
        if body.len() % TOKEN_BYTES != 0 || checksum != &Self::compute_checksum(body)[..] {
            return None;
        }

        Some(
            body.chunks_exact(TOKEN_BYTES)
                .map(|chunk| {
                    let mut bytes = [0u8; TOKEN_BYTES];
                    bytes.copy_from_slice(chunk);
                    Token::from_bytes(bytes)
                })
                .collect(),
        )
    }

    /// Load the store from `path`, or start empty.
    /// A corrupted file is discarded: losing outstanding tokens means they
    /// redeem for 0, which never over-pays a provider.
    pub fn load(path: PathBuf) -> Self {
        let cache = DashSet::new();

        if path.exists() {
            match std::fs::read(&path) {
                Ok(data) => match Self::decode(&data) {
                    Some(tokens) => {
                        for token in tokens {
                            cache.insert(token);
                        }
                        info!(
                            "Loaded {} outstanding tokens from {}",
                            cache.len(),
                            path.display()
                        );
                    }
                    None => {
                        warn!("Token store checksum mismatch! File may be corrupted.");
                        warn!("Starting with empty store for safety.");
                    }
                },
                Err(e) => {
                    warn!("Failed to load token store: {}, starting fresh", e);
                }
            }
        }

        Self {
            cache,
            path,
            generation: AtomicU64::new(0),
            persisted: Mutex::new(0),
        }
    }

    /// Record that `cache` changed and return the change's generation
    fn bump(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Make the change numbered `change` durable. On failure `rollback` runs
    /// before any other writer can snapshot the set.
    fn persist(&self, change: u64, rollback: impl FnOnce()) -> Result<()> {
        let mut persisted = self.persisted.lock();
        if *persisted >= change {
            return Ok(());
        }

        let covered = self.generation.load(Ordering::SeqCst);
        match self.write_snapshot() {
            Ok(()) => {
                *persisted = covered;
                Ok(())
            }
            Err(e) => {
                rollback();
                Err(e)
            }
        }
    }

    /// Write the current set to disk (temp file, fsync, atomic rename)
    fn write_snapshot(&self) -> Result<()> {
        let mut tokens: Vec<Token> = self.cache.iter().map(|t| *t.key()).collect();
        tokens.sort();
        let mut body = Vec::with_capacity(tokens.len() * TOKEN_BYTES);
        for token in &tokens {
            body.extend_from_slice(token.as_bytes());
        }
        let checksum = Self::compute_checksum(&body);

        let temp_path = self.path.with_extension("tmp");
        {
            let mut file = std::fs::File::create(&temp_path).map_err(|e| {
                PublisherError::Storage(format!("Failed to create temp token store: {}", e))
            })?;
            file.write_all(&checksum)
                .and_then(|_| file.write_all(&body))
                .map_err(|e| PublisherError::Storage(format!("Failed to write tokens: {}", e)))?;
            file.sync_all().map_err(|e| {
                PublisherError::Storage(format!("Failed to sync token store: {}", e))
            })?;
        }

        std::fs::rename(&temp_path, &self.path).map_err(|e| {
            PublisherError::Storage(format!("Failed to rename token store: {}", e))
        })?;

        debug!(tokens = tokens.len(), "persisted token store");
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn insert(&self, tokens: &[Token]) -> Result<()> {
        let added: Vec<Token> = tokens
            .iter()
            .filter(|token| self.cache.insert(**token))
            .copied()
            .collect();
        if added.is_empty() {
            return Ok(());
        }

        // Not durable, so never hand these out
        self.persist(self.bump(), || {
            for token in &added {
                self.cache.remove(token);
            }
        })
    }

    fn delete_if_present(&self, tokens: &[Token]) -> Result<usize> {
        let removed = remove_each(&self.cache, tokens);
        if removed.is_empty() {
            return Ok(0);
        }

        // Nobody was credited, so the tokens stay redeemable
        self.persist(self.bump(), || {
            for token in &removed {
                self.cache.insert(*token);
            }
        })?;
        Ok(removed.len())
    }

    fn contains(&self, token: &Token) -> bool {
        self.cache.contains(token)
    }

    fn len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(n: usize) -> Vec<Token> {
        (0..n).map(|_| Token::random()).collect()
    }

    #[test]
    fn test_insert_is_idempotent() {
        let store = MemoryTokenStore::new();
        let batch = tokens(3);
        store.insert(&batch).unwrap();
        store.insert(&batch).unwrap();
        assert_eq!(store.len(), 3);
        assert!(batch.iter().all(|t| store.contains(t)));
    }

    #[test]
    fn test_delete_counts_only_present_tokens() {
        let store = MemoryTokenStore::new();
        let batch = tokens(3);
        store.insert(&batch).unwrap();

        let mut presented = batch[..2].to_vec();
        presented.push(Token::random());
        assert_eq!(store.delete_if_present(&presented).unwrap(), 2);
        assert_eq!(store.delete_if_present(&presented).unwrap(), 0);
        assert!(store.contains(&batch[2]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicate_in_batch_counts_once() {
        let store = MemoryTokenStore::new();
        let batch = tokens(1);
        store.insert(&batch).unwrap();
        assert_eq!(
            store
                .delete_if_present(&[batch[0], batch[0], batch[0]])
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_file_store_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.dat");

        let batch = tokens(4);
        {
            let store = FileTokenStore::load(path.clone());
            assert!(store.is_empty());
            store.insert(&batch).unwrap();
            assert_eq!(store.delete_if_present(&batch[..1]).unwrap(), 1);
        }

        let store = FileTokenStore::load(path);
        assert_eq!(store.len(), 3);
        assert!(!store.contains(&batch[0]));
        assert!(batch[1..].iter().all(|t| store.contains(t)));
    }

    #[test]
    fn test_file_store_discards_corrupted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.dat");
        {
            let store = FileTokenStore::load(path.clone());
            store.insert(&tokens(2)).unwrap();
        }

        // Append a token behind the checksum's back
        let mut data = std::fs::read(&path).unwrap();
        data.extend_from_slice(Token::random().as_bytes());
        std::fs::write(&path, data).unwrap();

        let store = FileTokenStore::load(path);
        assert!(store.is_empty());
    }

    #[test]
    fn test_stale_snapshot_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.dat");
        let batch = tokens(2);
        {
            let store = FileTokenStore::load(path.clone());
            store.insert(&batch).unwrap();
        }
        let snapshot = std::fs::read(&path).unwrap();
        {
            let store = FileTokenStore::load(path.clone());
            store.insert(&tokens(1)).unwrap();
        }

        // Crash before the rename: the previous snapshot is what remains
        std::fs::write(&path, snapshot).unwrap();
        std::fs::write(path.with_extension("tmp"), b"partial").unwrap();

        let store = FileTokenStore::load(path);
        assert_eq!(store.len(), 2);
        assert!(batch.iter().all(|t| store.contains(t)));
    }

    #[test]
    fn test_file_store_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.dat");
        {
            let store = FileTokenStore::load(path.clone());
            store.insert(&tokens(3)).unwrap();
        }

        let data = std::fs::read(&path).unwrap();
        std::fs::write(&path, &data[..data.len() - 5]).unwrap();
        assert!(FileTokenStore::load(path).is_empty());
    }

    #[test]
    fn test_covered_change_skips_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.dat");
        let store = FileTokenStore::load(path.clone());
        store.insert(&tokens(2)).unwrap();
        store.insert(&tokens(1)).unwrap();
        assert_eq!(*store.persisted.lock(), 2);

        // Both changes are on disk already, so neither writes again
        std::fs::remove_file(&path).unwrap();
        store.persist(1, || panic!("covered change rolled back")).unwrap();
        store.persist(2, || panic!("covered change rolled back")).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_file_store_rolls_back_failed_insert() {
        let dir = tempfile::tempdir().unwrap();
        // Parent directory does not exist, so every write fails
        let path = dir.path().join("missing").join("tokens.dat");
        let store = FileTokenStore::load(path);

        let batch = tokens(2);
        assert!(matches!(
            store.insert(&batch),
            Err(PublisherError::Storage(_))
        ));
        assert!(store.is_empty());
    }
}
