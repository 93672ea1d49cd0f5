//! Catalog namespaces for purchasable targets.

use serde::{Deserialize, Serialize};

/// Which catalog a cart target belongs to.
///
/// Products and gallery artworks are separate catalogs whose ids can collide,
/// so a target is only unique together with its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    /// Regular shop product.
    #[serde(alias = "PRODUCTS")]
    Product,
    /// Artwork from the gallery.
    #[serde(alias = "GALLERY")]
    GalleryArtwork,
}

impl SourceKind {
    /// All source kinds, in display order.
    pub const ALL: [Self; 2] = [Self::Product, Self::GalleryArtwork];

    /// Wire name of the source.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "PRODUCT",
            Self::GalleryArtwork => "GALLERY_ARTWORK",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "product" | "products" => Ok(Self::Product),
            "gallery_artwork" | "gallery" | "artwork" => Ok(Self::GalleryArtwork),
            _ => Err(format!("invalid source kind: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&SourceKind::GalleryArtwork).unwrap(),
            "\"GALLERY_ARTWORK\""
        );
        assert_eq!(
            serde_json::from_str::<SourceKind>("\"PRODUCT\"").unwrap(),
            SourceKind::Product
        );
    }

    #[test]
    fn test_legacy_wire_names() {
        assert_eq!(
            serde_json::from_str::<SourceKind>("\"PRODUCTS\"").unwrap(),
            SourceKind::Product
        );
        assert_eq!(
            serde_json::from_str::<SourceKind>("\"GALLERY\"").unwrap(),
            SourceKind::GalleryArtwork
        );
    }

    #[test]
    fn test_from_str() {
        assert_eq!("gallery".parse::<SourceKind>(), Ok(SourceKind::GalleryArtwork));
        assert_eq!("PRODUCT".parse::<SourceKind>(), Ok(SourceKind::Product));
        assert!("poster".parse::<SourceKind>().is_err());
    }
}
