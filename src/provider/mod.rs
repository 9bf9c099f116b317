//! The seams between this crate and the cloud APIs it drives.

mod memory;

pub use memory::{InMemoryCloud, DEFAULT_ACCOUNT_ID, DEFAULT_REGION};

use {
    crate::{Attributes, ProvisionError, ResourceKind},
    std::collections::BTreeMap,
};

/// A resource as the provider sees it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteObject {
    pub id: String,
    pub attributes: Attributes,
}

/// Create, read, update and delete calls for the resource kinds the modules declare.
///
/// In `update`, a `null` value removes the field.
pub trait Provider {
    fn create(&mut self, kind: ResourceKind, fields: &Attributes) -> Result<RemoteObject, ProvisionError>;
    fn read(&self, kind: ResourceKind, id: &str) -> Result<Option<RemoteObject>, ProvisionError>;
    fn update(&mut self, kind: ResourceKind, id: &str, changes: &Attributes) -> Result<RemoteObject, ProvisionError>;
    fn delete(&mut self, kind: ResourceKind, id: &str) -> Result<(), ProvisionError>;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectHead {
    pub etag: String,
    pub metadata: BTreeMap<String, String>,
}

/// The subset of object storage used to ship function code.
pub trait ObjectStore {
    fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectHead>, ProvisionError>;
    fn put_object(
        &mut self,
        bucket: &str,
        key: &str,
        body: &[u8],
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), ProvisionError>;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FunctionVersion {
    pub version: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AliasDescription {
    pub function_version: String,
    pub additional_version_weights: BTreeMap<String, f64>,
    pub revision_id: String,
}

/// Alias and version calls used to shift traffic between published versions.
pub trait AliasOps {
    /// Names of every function in the account and region.
    fn list_functions(&self) -> Result<Vec<String>, ProvisionError>;

    /// Published versions of a function, excluding `$LATEST`.
    fn list_versions(&self, function_name: &str) -> Result<Vec<FunctionVersion>, ProvisionError>;

    fn get_alias(&self, function_name: &str, alias: &str) -> Result<Option<AliasDescription>, ProvisionError>;

    /// Point an alias at a version with optional weighted routing. Fails with `PreconditionFailed` if the alias has
    /// changed since `revision_id` was read.
    fn update_alias(
        &mut self,
        function_name: &str,
        alias: &str,
        function_version: &str,
        additional_version_weights: &BTreeMap<String, f64>,
        revision_id: &str,
    ) -> Result<AliasDescription, ProvisionError>;
}
