//! Class taxonomies and label tables.
//!
//! A taxonomy maps a class index (position in the network's class-score
//! slice) to a stable identifier, and the identifier to a display name
//! through a label table. Two taxonomies ship with the crate, selected by
//! [`TaxonomyMode`].

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

/// Label used when a class index or identifier cannot be resolved.
pub const UNKNOWN_LABEL: &str = "Unknown";

const OUTDOOR_IDS: &[&str] = &[
    "/m/0199g",  // bicycle
    "/m/01bjv",  // bus
    "/m/01g317", // person
    "/m/04_sv",  // motorcycle
    "/m/07r04",  // truck
    "/m/0cvnqh", // bench
    "/m/0k4j",   // car
];

const INDOOR_IDS: &[&str] = &[
    "/m/01mzpv", // chair
    "/m/04bcr3", // table
    "/m/02dgv",  // door
    "/m/01lynh", // stairs
    "/m/03ssj5", // bed
    "/m/02crq1", // couch
    "/m/01g317", // person
    "/m/09g1w",  // toilet
    "/m/0130jx", // sink
    "/m/040b_t", // refrigerator
    "/m/07c52",  // television
    "/m/01c648", // laptop
];

const OUTDOOR_LABELS: &str = include_str!("../../assets/labels_outdoor.txt");
const INDOOR_LABELS: &str = include_str!("../../assets/labels_indoor.txt");

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxonomyMode {
    Indoor,
    #[default]
    Outdoor,
}

impl TaxonomyMode {
    fn ids(self) -> &'static [&'static str] {
        match self {
            TaxonomyMode::Indoor => INDOOR_IDS,
            TaxonomyMode::Outdoor => OUTDOOR_IDS,
        }
    }

    fn builtin_labels(self) -> &'static str {
        match self {
            TaxonomyMode::Indoor => INDOOR_LABELS,
            TaxonomyMode::Outdoor => OUTDOOR_LABELS,
        }
    }

    /// Number of classes the built-in weights for this mode are trained on.
    pub fn class_count(self) -> usize {
        self.ids().len()
    }
}

impl fmt::Display for TaxonomyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaxonomyMode::Indoor => f.write_str("indoor"),
            TaxonomyMode::Outdoor => f.write_str("outdoor"),
        }
    }
}

impl FromStr for TaxonomyMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "indoor" => Ok(TaxonomyMode::Indoor),
            "outdoor" => Ok(TaxonomyMode::Outdoor),
            other => Err(anyhow!("unknown taxonomy mode '{}'", other)),
        }
    }
}

/// Identifier to display-name mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelTable {
    entries: HashMap<String, String>,
}

impl LabelTable {
    /// Parse a whitespace-delimited `identifier label` table.
    ///
    /// Lines that do not have exactly two columns are skipped.
    pub fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        for (lineno, line) in text.lines().enumerate() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            match parts.as_slice() {
                [id, label] => {
                    entries.insert((*id).to_string(), (*label).to_string());
                }
                [] => {}
                _ => log::debug!("label table: skipping malformed line {}", lineno + 1),
            }
        }
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read label table {}", path.display()))?;
        Ok(Self::parse(&text))
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Positional class identifiers plus the label table that names them.
#[derive(Clone, Debug)]
pub struct Taxonomy {
    mode: TaxonomyMode,
    ids: Vec<String>,
    labels: LabelTable,
}

impl Taxonomy {
    pub fn new(mode: TaxonomyMode, ids: Vec<String>, labels: LabelTable) -> Self {
        Self { mode, ids, labels }
    }

    /// Built-in taxonomy for `mode`.
    pub fn builtin(mode: TaxonomyMode) -> Self {
        Self::with_labels(mode, LabelTable::parse(mode.builtin_labels()))
    }

    /// Built-in identifier order for `mode` with a caller-supplied label table.
    pub fn with_labels(mode: TaxonomyMode, labels: LabelTable) -> Self {
        let ids = mode.ids().iter().map(|id| id.to_string()).collect();
        Self { mode, ids, labels }
    }

    pub fn mode(&self) -> TaxonomyMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn identifier(&self, class_id: usize) -> Option<&str> {
        self.ids.get(class_id).map(String::as_str)
    }

    /// Display name for a class index, or [`UNKNOWN_LABEL`].
    pub fn label(&self, class_id: usize) -> &str {
        self.identifier(class_id)
            .and_then(|id| self.labels.get(id))
            .unwrap_or(UNKNOWN_LABEL)
    }
}
