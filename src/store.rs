use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::error::StoreError;
use crate::filter::SeenIds;
use crate::models::{Listing, STORE_HEADER};

/// Where an append ended up
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    Nothing,
    Primary(usize),
    Fallback { path: PathBuf, rows: usize },
    /// Neither location accepted the rows; they will resurface next run
    Lost(usize),
}

/// Append-only CSV ledger of persisted listings
#[derive(Debug, Clone)]
pub struct ListingStore {
    path: PathBuf,
    fallback_path: Option<PathBuf>,
}

impl ListingStore {
    pub fn new(path: impl Into<PathBuf>, fallback_path: Option<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fallback_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every persisted listing id, creating an empty store on first use.
    /// Ids in the fallback file are included when it exists.
    ///
    /// Only a store that exists but can't be read is an error. If a new
    /// store can't be created, appends will go to the fallback location.
    pub fn load_seen_ids(&self) -> Result<SeenIds, StoreError> {
        let mut seen = if is_blank(&self.path) {
            info!(path = %self.path.display(), "Listing store not found, creating a new one");
            if let Err(e) = create_with_header(&self.path) {
                error!(error = %e, "Could not create listing store; new listings will go to the fallback location");
            }
            SeenIds::new()
        } else {
            let seen = read_ids(&self.path)?;
            info!(path = %self.path.display(), count = seen.len(), "Loaded existing listing ids");
            seen
        };

        if let Some(fallback) = self.fallback_path.as_deref().filter(|p| p.exists()) {
            match read_ids(fallback) {
                Ok(extra) => {
                    info!(path = %fallback.display(), count = extra.len(), "Merged ids from fallback store");
                    seen.extend(extra);
                }
                Err(e) => warn!(error = %e, "Ignoring unreadable fallback store"),
            }
        }

        Ok(seen)
    }

    /// Append rows; existing rows are never rewritten.
    ///
    /// A failed write (e.g. the file is locked by a spreadsheet) is retried
    /// once at the fallback location. If that fails too the rows are
    /// reported lost and control returns to the caller.
    pub fn append(&self, listings: &[Listing]) -> AppendOutcome {
        if listings.is_empty() {
            return AppendOutcome::Nothing;
        }

        info!(count = listings.len(), path = %self.path.display(), "Saving new listings");
        let primary_err = match append_rows(&self.path, listings) {
            Ok(()) => return AppendOutcome::Primary(listings.len()),
            Err(e) => e,
        };
        error!(error = %primary_err, "Could not write listing store; is it open in another program?");

        let Some(fallback) = &self.fallback_path else {
            error!(count = listings.len(), "No fallback store configured; new listings were not saved");
            return AppendOutcome::Lost(listings.len());
        };

        warn!(path = %fallback.display(), "Attempting to save to fallback location");
        match append_rows(fallback, listings) {
            Ok(()) => {
                info!(path = %fallback.display(), "Saved listings to fallback location");
                AppendOutcome::Fallback {
                    path: fallback.clone(),
                    rows: listings.len(),
                }
            }
            Err(e) => {
                error!(
                    error = %e,
                    count = listings.len(),
                    "Fallback save failed too; these listings may be reported again next run"
                );
                AppendOutcome::Lost(listings.len())
            }
        }
    }
}

fn read_ids(path: &Path) -> Result<SeenIds, StoreError> {
    let file = File::open(path).map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let mut seen = SeenIds::new();
    for record in reader.records() {
        let record = record.map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(id) = record.get(0).map(str::trim).filter(|id| !id.is_empty()) {
            seen.insert(id);
        }
    }
    Ok(seen)
}

fn create_with_header(path: &Path) -> Result<(), StoreError> {
    let file = File::create(path).map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(STORE_HEADER)
        .map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    writer.flush().map_err(|source| StoreError::Flush {
        path: path.to_path_buf(),
        source,
    })
}

/// Missing or zero-length; either way it still needs a header row
fn is_blank(path: &Path) -> bool {
    fs::metadata(path).map(|meta| meta.len() == 0).unwrap_or(true)
}

fn append_rows(path: &Path, listings: &[Listing]) -> Result<(), StoreError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    let is_new = file.metadata().map(|meta| meta.len() == 0).map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    if is_new {
        writer.write_record(STORE_HEADER).map_err(write_err)?;
    }
    for listing in listings {
        writer.write_record(listing.to_row()).map_err(write_err)?;
    }
    writer.flush().map_err(|source| StoreError::Flush {
        path: path.to_path_buf(),
        source,
    })
}
