//! Instrument registry for the etftrack ETF history tracker.
//!
//! The registry is an ordered, immutable list of tracked funds. It is loaded
//! once at startup and handed to the components that need it.
//!
//! # Example
//!
//! ```
//! use etftrack_instruments::InstrumentRegistry;
//!
//! let registry = InstrumentRegistry::builtin();
//!
//! if let Some(instrument) = registry.get("0050") {
//!     println!("{}", instrument.name());
//! }
//! ```

#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use etftrack_types::Instrument;
use thiserror::Error;

/// The built-in instrument list embedded at compile time.
const INSTRUMENTS_JSON: &str = include_str!("../data/instruments.json");

/// Errors that can occur while loading a registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Failed to read the registry file.
    #[error("Failed to read registry '{path}': {source}")]
    ReadFile {
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The registry is not a valid instrument list.
    #[error("Failed to parse registry: {0}")]
    Parse(#[from] serde_json::Error),

    /// The same code appears twice.
    #[error("Duplicate instrument code: {0}")]
    DuplicateCode(String),

    /// An instrument has an empty code.
    #[error("Instrument with empty code")]
    EmptyCode,
}

/// Ordered registry of tracked instruments.
#[derive(Debug, Clone)]
pub struct InstrumentRegistry {
    instruments: Vec<Instrument>,
    index: HashMap<String, usize>,
}

impl InstrumentRegistry {
    /// Creates a registry from an ordered list of instruments.
    ///
    /// # Errors
    ///
    /// Returns an error if a code is empty or appears more than once.
    pub fn new(instruments: Vec<Instrument>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(instruments.len());
        for (position, instrument) in instruments.iter().enumerate() {
            let key = normalize(instrument.code());
            if key.is_empty() {
                return Err(RegistryError::EmptyCode);
            }
            if index.insert(key, position).is_some() {
                return Err(RegistryError::DuplicateCode(instrument.code().to_string()));
            }
        }
        Ok(Self { instruments, index })
    }

    /// Returns the built-in list of common Taiwan ETFs.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_json(INSTRUMENTS_JSON).expect("Invalid built-in instruments.json")
    }

    /// Parses a registry from a JSON array of instruments.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or the list violates
    /// [`InstrumentRegistry::new`]'s rules.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let instruments: Vec<Instrument> = serde_json::from_str(json)?;
        Self::new(instruments)
    }

    /// Loads a registry from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|e| RegistryError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let registry = Self::from_json(&content)?;
        tracing::debug!(path = %path.display(), instruments = registry.len(), "Loaded registry");
        Ok(registry)
    }

    /// Looks up an instrument by code (case-insensitive).
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&Instrument> {
        self.index
            .get(&normalize(code))
            .map(|&position| &self.instruments[position])
    }

    /// Returns true if the code is registered.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.index.contains_key(&normalize(code))
    }

    /// Returns all instruments in registry order.
    pub fn all(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.iter()
    }

    /// Returns all codes in registry order.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.instruments.iter().map(Instrument::code)
    }

    /// Returns the total number of instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// Returns true if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Searches instruments by code or name (case-insensitive).
    pub fn search(&self, pattern: &str) -> Vec<&Instrument> {
        let pattern = pattern.to_lowercase();
        self.instruments
            .iter()
            .filter(|i| {
                i.code().to_lowercase().contains(&pattern)
                    || i.name().to_lowercase().contains(&pattern)
            })
            .collect()
    }
}

fn normalize(code: &str) -> String {
    code.trim().to_uppercase()
}
