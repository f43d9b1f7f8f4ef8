use std::fs;
use tempfile::TempDir;

// Import the helper functions we're testing
use crate::commands::features::{
    create_feature_tgz, detect_mode, enumerate_and_validate_collection, validate_single,
    write_collection_metadata, CollectionMetadata, FeatureDescriptor, PackagingMode,
    SourceInformation,
};
