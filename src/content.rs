//! Content domain: closed set of content kinds, their schemas, and the artifact lifecycle.

pub mod artifact;
pub mod kind;

pub use artifact::{body_digest, Artifact, ArtifactStatus, TaxonomyRefs, ValidationRecord};
pub use kind::{ContentKind, ElementSpec, FieldSpec, FieldType, KindProfile, Register};
