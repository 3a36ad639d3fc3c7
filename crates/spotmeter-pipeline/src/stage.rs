//! The fixed, totally ordered sequence of stages a processing item
//! passes through.
//!
//! ```text
//! New -read-> Loaded -convert-> Converted -preprocess-> Preprocessed
//!   -binarize-> Binarized -postprocess-> Postprocessed
//!   -extract_features-> FeaturesExtracted -filter_features-> FeaturesFiltered
//!   -analyze-> Analyzed -store-> Stored
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Total number of stages.
pub const STAGE_COUNT: usize = 10;

/// A position in the linear sequence of pipeline stages.
///
/// Ordering follows the discriminant, so `Stage::New < Stage::Stored`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Only the source identifier is known.
    New = 0,
    /// The image has been read.
    Loaded = 1,
    /// Converted to a single-channel image.
    Converted = 2,
    /// Cleaned up in preparation for binarization.
    Preprocessed = 3,
    /// Black-and-white image.
    Binarized = 4,
    /// Binary image after morphological cleanup.
    Postprocessed = 5,
    /// Contours have been found; the image payload is dropped.
    FeaturesExtracted = 6,
    /// Contours have been filtered.
    FeaturesFiltered = 7,
    /// Measurements are available as a table.
    Analyzed = 8,
    /// Results were written out.
    Stored = 9,
}

impl Stage {
    /// Every stage, in order.
    pub const ALL: [Self; STAGE_COUNT] = [
        Self::New,
        Self::Loaded,
        Self::Converted,
        Self::Preprocessed,
        Self::Binarized,
        Self::Postprocessed,
        Self::FeaturesExtracted,
        Self::FeaturesFiltered,
        Self::Analyzed,
        Self::Stored,
    ];

    /// Zero-based position of this stage.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The stage at `index`, or `None` past [`Stage::Stored`].
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < STAGE_COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    /// The stage one step further along, or `None` at the terminal stage.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    /// The stage one step back, or `None` at [`Stage::New`].
    #[must_use]
    pub const fn previous(self) -> Option<Self> {
        match self.index().checked_sub(1) {
            Some(i) => Self::from_index(i),
            None => None,
        }
    }

    /// Stages from `self` up to and including `last`.
    pub fn through(self, last: Self) -> impl Iterator<Item = Self> {
        Self::ALL[self.index()..=last.index().max(self.index())]
            .iter()
            .copied()
            .filter(move |s| *s <= last)
    }

    /// Lower-case identifier, as used in logs and persisted pipelines.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Loaded => "loaded",
            Self::Converted => "converted",
            Self::Preprocessed => "preprocessed",
            Self::Binarized => "binarized",
            Self::Postprocessed => "postprocessed",
            Self::FeaturesExtracted => "features_extracted",
            Self::FeaturesFiltered => "features_filtered",
            Self::Analyzed => "analyzed",
            Self::Stored => "stored",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
