use {
    crate::{digest::compute_digest, provider::ObjectStore, ProvisionError},
    log::{debug, info},
    std::collections::BTreeMap,
};

/// Metadata key holding the archive digest.
pub const DIGEST_METADATA_KEY: &str = "digest";

/// Metadata key holding the source revision an archive was built from.
pub const REVISION_METADATA_KEY: &str = "revision";

/// Human-readable source revision: the abbreviated commit, flagged when the working tree had local changes.
pub fn revision_label(sha: &str, dirty: bool) -> String {
    let short: String = sha.chars().take(9).collect();
    if dirty {
        format!("{} (dirty)", short)
    } else {
        short
    }
}

/// Upload `archive` to `bucket`/`key` unless the object already carries the same digest.
///
/// The object is normally created beforehand with a placeholder archive. Credentials that aren't allowed to read the
/// object's metadata are treated the same as a missing object, and the upload goes ahead. Returns whether an upload
/// happened.
pub fn upload_if_changed(
    store: &mut dyn ObjectStore,
    bucket: &str,
    key: &str,
    archive: &[u8],
    revision: &str,
) -> Result<bool, ProvisionError> {
    let previous = match store.head_object(bucket, key) {
        Ok(Some(head)) => head
            .metadata
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(DIGEST_METADATA_KEY))
            .map(|(_, v)| v),
        Ok(None) => None,
        Err(ProvisionError::AccessDenied(resource)) => {
            debug!("Cannot read metadata of {}; assuming it has changed", resource);
            None
        }
        Err(e) => return Err(e),
    };

    let digest = compute_digest(archive);
    if previous.as_deref() == Some(digest.as_str()) {
        debug!("s3://{}/{} is already at digest {}", bucket, key, digest);
        return Ok(false);
    }

    info!("Updating s3://{}/{} to digest {} ({})", bucket, key, digest, revision);
    let metadata = BTreeMap::from([
        (DIGEST_METADATA_KEY.to_string(), digest),
        (REVISION_METADATA_KEY.to_string(), revision.to_string()),
    ]);
    store.put_object(bucket, key, archive, &metadata)?;
    Ok(true)
}
