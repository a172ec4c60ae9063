//! External collaborator abstractions
//!
//! Trait-based seams for the systems the workflow engine consumes but does
//! not own: the credential store, the advisor directory and blob storage.
//! Production and test implementations are injected at construction time.

pub mod blob;
pub mod directory;

pub use blob::{
    guess_content_type, BlobError, BlobStorage, InMemoryBlobStorage, LocalBlobStorage,
    DEFAULT_CONTENT_TYPE,
};
pub use directory::{
    password_digest, AdvisorDirectory, CredentialStore, DirectoryError, DirectoryUser,
    StaticDirectory,
};

#[cfg(any(test, feature = "testing"))]
pub use blob::MockBlobStorage;
#[cfg(any(test, feature = "testing"))]
pub use directory::{MockAdvisorDirectory, MockCredentialStore};
