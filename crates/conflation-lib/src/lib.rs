//! Conflation Library - Tolerance-aware matching of polyline features
//!
//! This library aligns linear features from two datasets describing the same
//! network. Candidate features are cut into direction-monotonic segments and
//! indexed in an R-tree; each source feature is then walked against the
//! candidates it runs along, producing range-to-range references between
//! the two features' parametric offsets.
//!
//! # Architecture
//!
//! - **[`Feature`]**: Immutable polyline owning its vertices, edges and monotonic segments
//! - **[`Cursor`]**: Edge walker over a feature in either direction
//! - **[`RTree`]**: Insertion-only index over bounding boxes
//! - **[`Range`] / [`RangeReference`]**: Parametric intervals and links between them
//! - **[`Matcher`]**: Segment index over candidates plus the matching loop
//! - **[`InputAdapter`]**: Conversion of `geo` and GPX geometries into features
//!
//! # Performance Characteristics
//!
//! - **Index Build**: O(S log S) for S segments
//! - **Query Time**: O(log S + K) where K=overlapping segments
//! - **Matching**: proportional to the edges of each aligned segment pair

mod bbox;
mod cursor;
pub mod euclid;
mod feature;
mod input;
mod matcher;
mod pair;
mod range;
mod rtree;
mod segment;
pub mod utils;
mod vertex;

// Public API exports
pub use bbox::{BoundingBox, IntersectionBuffer, IntersectionTest};
pub use cursor::{Cursor, CursorDirection};
pub use feature::{DEFAULT_SEGMENT_TOLERANCE, Feature};
pub use input::{EuclideanAdapter, GeodeticAdapter, InputAdapter};
pub use matcher::{Config, FeatureMatches, Matcher, PointProjectionReferences, SegmentOfFeature};
pub use pair::{MatchDirection, MatchingContext, match_direction, sync_edges_and_match_first_point};
pub use range::{FeatureRangeReference, Range, RangeReference};
pub use rtree::{IndexItem, MIN_CHILDREN, RTree};
pub use segment::{EdgeRef, SegmentRef, TangentOrder};
pub use vertex::{Vertex, triangle_area};

/// Error types for the conflation library
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Too few vertices: {count}, at least 2 required")]
    TooFewVertices { count: usize },

    #[error("Non-finite coordinate at vertex {index}")]
    NonFiniteCoordinate { index: usize },

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Invalid offset: {0}")]
    InvalidOffset(f64),

    #[error("Empty range [{min}, {max}]")]
    EmptyRange { min: f64, max: f64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Feature is not a ring")]
    NotARing,

    #[error("Vertex {index} out of range for {count} vertices")]
    VertexOutOfRange { index: usize, count: usize },
}

pub type Result<T> = std::result::Result<T, DataError>;
