//! Cart lines and the read-only cart snapshot.
//!
//! A [`CartSnapshot`] is the complete cart as last confirmed by the backend.
//! It is immutable: the store replaces it wholesale, readers only ever see a
//! fully built value and cannot change it. All totals are pure functions over
//! the lines, computed from backend-supplied prices.

use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{LineId, TargetId};
use super::price::UnitPrice;
use super::source::SourceKind;

/// Errors that can occur when building a [`CartSnapshot`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// Two lines share a line id.
    #[error("duplicate cart line id: {0}")]
    DuplicateLine(LineId),
    /// Two lines point at the same target in the same catalog.
    #[error("duplicate cart target: {source_kind} {target_id}")]
    DuplicateTarget {
        /// Target that appears more than once.
        target_id: TargetId,
        /// Catalog of the target.
        source_kind: SourceKind,
    },
}

/// One line of the authoritative cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Backend-assigned line id.
    pub line_id: LineId,
    /// Purchasable thing this line refers to.
    pub target_id: TargetId,
    /// Catalog of `target_id`.
    pub source: SourceKind,
    /// Name as shown to the customer.
    pub display_name: String,
    /// Price of one unit as reported by the backend.
    pub unit_price: UnitPrice,
    /// Optional image URL.
    pub image_ref: Option<String>,
    /// Number of units. A line never exists with zero units.
    pub quantity: NonZeroU32,
}

impl CartLine {
    /// Price of the whole line (`unit_price * quantity`).
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price.times(self.quantity.get())
    }

    /// Returns true if this line holds `target_id` from `source`.
    #[must_use]
    pub fn is_target(&self, target_id: &TargetId, source: SourceKind) -> bool {
        self.source == source && &self.target_id == target_id
    }
}

/// Unit counts split by catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceQuantities {
    /// Units of shop products.
    pub products: u64,
    /// Units of gallery artworks.
    pub gallery: u64,
}

impl SourceQuantities {
    /// Units for one catalog.
    #[must_use]
    pub const fn get(&self, source: SourceKind) -> u64 {
        match source {
            SourceKind::Product => self.products,
            SourceKind::GalleryArtwork => self.gallery,
        }
    }
}

/// Complete, immutable cart state in server order.
///
/// Cloning is cheap (reference counted).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CartSnapshot {
    lines: Arc<[CartLine]>,
}

impl CartSnapshot {
    /// An empty cart.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from lines in server order.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if a line id repeats or if one
    /// `(target_id, source)` pair occupies more than one line.
    pub fn from_lines(lines: Vec<CartLine>) -> Result<Self, SnapshotError> {
        let mut line_ids = HashSet::with_capacity(lines.len());
        let mut targets = HashSet::with_capacity(lines.len());

        for line in &lines {
            if !line_ids.insert(&line.line_id) {
                return Err(SnapshotError::DuplicateLine(line.line_id.clone()));
            }
            if !targets.insert((&line.target_id, line.source)) {
                return Err(SnapshotError::DuplicateTarget {
                    target_id: line.target_id.clone(),
                    source_kind: line.source,
                });
            }
        }

        Ok(Self {
            lines: lines.into(),
        })
    }

    /// Lines in server order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Returns true if the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Sum of quantities over all lines.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.lines
            .iter()
            .map(|line| u64::from(line.quantity.get()))
            .sum()
    }

    /// Sum of quantities for one catalog.
    #[must_use]
    pub fn quantity_for(&self, source: SourceKind) -> u64 {
        self.lines
            .iter()
            .filter(|line| line.source == source)
            .map(|line| u64::from(line.quantity.get()))
            .sum()
    }

    /// Quantities partitioned by catalog.
    #[must_use]
    pub fn quantities(&self) -> SourceQuantities {
        SourceQuantities {
            products: self.quantity_for(SourceKind::Product),
            gallery: self.quantity_for(SourceKind::GalleryArtwork),
        }
    }

    /// Sum of `unit_price * quantity` over all lines.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Look up a line by id.
    #[must_use]
    pub fn find_line(&self, line_id: &LineId) -> Option<&CartLine> {
        self.lines.iter().find(|line| &line.line_id == line_id)
    }

    /// Look up the line holding a target.
    #[must_use]
    pub fn find_target(&self, target_id: &TargetId, source: SourceKind) -> Option<&CartLine> {
        self.lines
            .iter()
            .find(|line| line.is_target(target_id, source))
    }

    /// Returns true if both snapshots share the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.lines, &other.lines)
    }
}
