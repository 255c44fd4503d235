//! Partition and constraint manager errors

use thiserror::Error;

use crate::data::DataError;
use crate::data::catalog::DuplicateIdentity;

#[derive(Error, Debug)]
pub enum PartitionError {
    /// Year span is empty or outside the supported calendar
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Identity key arguments are unusable
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// An existing partition covers only part of a requested year
    #[error("Partition {partition} partially overlaps year {year}")]
    OverlappingPartition { year: i32, partition: String },

    /// Provisioning stopped partway; `provisioned` partitions were created
    /// before the failure and count as satisfied on the next run
    #[error("Failed to provision partition for {year} after creating {provisioned}: {source}")]
    ProvisionFailed {
        year: i32,
        provisioned: usize,
        #[source]
        source: DataError,
    },

    /// Constraints on the old key survived the drop pass
    #[error("Old identity constraint still present on: {}", .partitions.join(", "))]
    ConflictingConstraint { partitions: Vec<String> },

    /// The new key was added but some partitions do not enforce it
    #[error("New identity constraint missing on: {}", .partitions.join(", "))]
    IncompleteConstraint { partitions: Vec<String> },

    /// Existing rows collide under the new key
    #[error(
        "Cannot add {constraint}: {} duplicate identities, first {}",
        .duplicates.len(),
        .duplicates.first().map(|d| d.to_string()).unwrap_or_default()
    )]
    DuplicateIdentities {
        constraint: String,
        duplicates: Vec<DuplicateIdentity>,
    },

    #[error(transparent)]
    Store(#[from] DataError),
}

impl PartitionError {
    /// Safe to re-invoke the same call unchanged
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ProvisionFailed { source, .. } | Self::Store(source) => source.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_display_names_first_row() {
        let err = PartitionError::DuplicateIdentities {
            constraint: "market_time_series_identity_key".into(),
            duplicates: vec![DuplicateIdentity {
                values: vec![("region_id".into(), Some("06037".into()))],
                count: 3,
            }],
        };
        assert_eq!(
            err.to_string(),
            "Cannot add market_time_series_identity_key: 1 duplicate identities, first (region_id=06037) x3"
        );
    }

    #[test]
    fn test_transient_classification() {
        let err = PartitionError::ProvisionFailed {
            year: 2010,
            provisioned: 4,
            source: DataError::Unavailable("reset".into()),
        };
        assert!(err.is_transient());
        assert!(!PartitionError::InvalidRange("x".into()).is_transient());
    }
}
