//! Wallet directory: the address → (label, owner type) lookup table.
//!
//! The directory is loaded once per run from a CSV file with the columns
//! `address,label,owner_type` and is read-only afterwards. It is passed by
//! reference to every wallet sync in a batch.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use tracing::{debug, instrument};

use crate::error::{DirectoryError, DirectoryResult, SyncError, SyncResult};
use crate::models::{OwnerType, WalletEntry};

/// Columns the directory file must provide.
const REQUIRED_COLUMNS: [&str; 3] = ["address", "label", "owner_type"];

/// Characters that are unsafe in file names or sheet tab names.
const FORBIDDEN_LABEL_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '[', ']', '\''];

const MAX_LABEL_LEN: usize = 64;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Immutable address-keyed wallet directory with a secondary label index.
#[derive(Debug, Clone, Default)]
pub struct WalletDirectory {
    entries: Vec<WalletEntry>,
    by_address: HashMap<String, usize>,
    by_label: HashMap<String, usize>,
}

impl WalletDirectory {
    /// Load the directory from a CSV file.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> DirectoryResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => DirectoryError::NotFound(path.to_path_buf()),
            _ => DirectoryError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })?;

        let directory = Self::from_reader(file)?;
        debug!(
            wallets = directory.len(),
            internal = directory.internal().count(),
            "Wallet directory loaded"
        );
        Ok(directory)
    }

    /// Parse a directory from any CSV source.
    ///
    /// Rows with an empty address are skipped. Extra columns are ignored, but a
    /// row with fewer fields than the header is rejected.
    pub fn from_reader<R: Read>(reader: R) -> DirectoryResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| DirectoryError::Malformed(format!("unreadable header: {}", e)))?
            .clone();

        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}') == name)
                .ok_or_else(|| DirectoryError::Malformed(format!("missing required column '{}'", name)))
        };
        let [address_col, label_col, owner_col] = [
            column(REQUIRED_COLUMNS[0])?,
            column(REQUIRED_COLUMNS[1])?,
            column(REQUIRED_COLUMNS[2])?,
        ];

        let mut entries = Vec::new();
        for (index, record) in rdr.records().enumerate() {
            // Header is line 1
            let line = index + 2;
            let record =
                record.map_err(|e| DirectoryError::Malformed(format!("line {}: {}", line, e)))?;
            if record.len() < headers.len() {
                return Err(DirectoryError::Malformed(format!(
                    "line {}: expected {} fields, found {}",
                    line,
                    headers.len(),
                    record.len()
                )));
            }

            let address = record.get(address_col).unwrap_or_default();
            if address.is_empty() {
                continue;
            }
            let label = record.get(label_col).unwrap_or_default();
            let owner_type: OwnerType = record
                .get(owner_col)
                .unwrap_or_default()
                .parse()
                .map_err(|e| DirectoryError::Malformed(format!("line {}: {}", line, e)))?;

            validate_label(label)
                .map_err(|e| DirectoryError::Malformed(format!("line {}: {}", line, e)))?;

            entries.push(WalletEntry::new(address, label, owner_type));
        }

        Self::from_entries(entries)
    }

    /// Build a directory from entries, enforcing unique addresses and account
    /// labels.
    ///
    /// The account label (the label, or the address suffix when unlabeled)
    /// names the output file and the sheet tab, so two entries may not share
    /// one, ignoring ASCII case.
    pub fn from_entries(entries: Vec<WalletEntry>) -> DirectoryResult<Self> {
        let mut by_address = HashMap::with_capacity(entries.len());
        let mut by_label = HashMap::with_capacity(entries.len());
        let mut accounts: HashMap<String, usize> = HashMap::with_capacity(entries.len());

        for (index, entry) in entries.iter().enumerate() {
            if by_address.insert(entry.address.clone(), index).is_some() {
                return Err(DirectoryError::Malformed(format!(
                    "duplicate address {}",
                    entry.address
                )));
            }
            let account = entry.account_label();
            let key = account.to_ascii_lowercase();
            if let Some(&other) = accounts.get(&key) {
                return Err(DirectoryError::Malformed(format!(
                    "account label '{}' of {} collides with {}",
                    account, entry.address, entries[other].address
                )));
            }
            accounts.insert(key, index);
            if !entry.label.is_empty() {
                by_label.insert(entry.label.clone(), index);
            }
        }

        Ok(Self {
            entries,
            by_address,
            by_label,
        })
    }

    /// Look up a wallet by address.
    pub fn get(&self, address: &str) -> Option<&WalletEntry> {
        self.by_address.get(address).map(|&i| &self.entries[i])
    }

    /// Look up a wallet by label.
    pub fn by_label(&self, label: &str) -> Option<&WalletEntry> {
        self.by_label.get(label).map(|&i| &self.entries[i])
    }

    /// Non-empty label for an address, if the directory knows one.
    pub fn label_for(&self, address: &str) -> Option<&str> {
        self.get(address)
            .map(|e| e.label.as_str())
            .filter(|label| !label.is_empty())
    }

    /// Resolve a CLI identifier: an address first, then a label.
    ///
    /// A well-formed TRON address missing from the directory resolves to an
    /// unlabeled client wallet.
    pub fn resolve(&self, identifier: &str) -> SyncResult<WalletEntry> {
        let ident = identifier.trim();
        if let Some(entry) = self.get(ident).or_else(|| self.by_label(ident)) {
            return Ok(entry.clone());
        }
        if is_tron_address(ident) {
            debug!(address = ident, "Address not in directory, syncing unlabeled");
            return Ok(WalletEntry::new(ident, "", OwnerType::Client));
        }
        Err(SyncError::UnknownWallet {
            identifier: identifier.to_string(),
            known: self.labels().join(", "),
        })
    }

    /// Internal wallets, in file order.
    pub fn internal(&self) -> impl Iterator<Item = &WalletEntry> {
        self.entries.iter().filter(|e| e.is_internal())
    }

    /// Known labels, sorted.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.by_label.keys().map(String::as_str).collect();
        labels.sort_unstable();
        labels
    }

    pub fn entries(&self) -> &[WalletEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Check that a label can be used in file names and sheet tab names.
fn validate_label(label: &str) -> Result<(), String> {
    if label.chars().count() > MAX_LABEL_LEN {
        return Err(format!("label '{}' is longer than {} characters", label, MAX_LABEL_LEN));
    }
    if label.trim() != label {
        return Err(format!("label '{}' has surrounding whitespace", label));
    }
    if label == "." || label == ".." {
        return Err(format!("label '{}' is not a valid file name", label));
    }
    if let Some(c) = label
        .chars()
        .find(|c| c.is_control() || FORBIDDEN_LABEL_CHARS.contains(c))
    {
        return Err(format!("label '{}' contains forbidden character {:?}", label, c));
    }
    Ok(())
}

/// Base58 TRON address: 34 characters starting with `T`.
pub fn is_tron_address(s: &str) -> bool {
    s.len() == 34 && s.starts_with('T') && s.chars().all(|c| BASE58_ALPHABET.contains(c))
}
