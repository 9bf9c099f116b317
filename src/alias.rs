use {
    crate::{
        provider::{AliasDescription, AliasOps, FunctionVersion},
        ProvisionError,
    },
    log::{debug, info, trace, warn},
    std::{
        cmp::Reverse,
        collections::BTreeMap,
        fmt::{Display, Formatter, Result as FmtResult},
    },
};

/// The alias every provisioned function is invoked through.
pub const ALIAS_NAME: &str = "current";

/// How an alias splits traffic: everything to `primary_version`, or a weighted share to `secondary_version`.
#[derive(Clone, Debug, PartialEq)]
pub struct AliasRouting {
    primary_version: String,
    secondary_version: Option<String>,
    secondary_weight: f64,
}

impl AliasRouting {
    pub fn new<S: Into<String>>(primary_version: S) -> Self {
        Self {
            primary_version: primary_version.into(),
            secondary_version: None,
            secondary_weight: 0.0,
        }
    }

    pub fn weighted<P: Into<String>, S: Into<String>>(
        primary_version: P,
        secondary_version: S,
        secondary_weight: f64,
    ) -> Self {
        Self {
            primary_version: primary_version.into(),
            secondary_version: Some(secondary_version.into()),
            secondary_weight,
        }
    }

    /// Read the routing off an alias. An alias on `$LATEST` has no version routing.
    pub fn from_description(description: &AliasDescription) -> Option<Self> {
        if description.function_version == "$LATEST" {
            return None;
        }

        Some(match description.additional_version_weights.iter().next() {
            Some((version, weight)) => Self::weighted(description.function_version.as_str(), version.as_str(), *weight),
            None => Self::new(description.function_version.as_str()),
        })
    }

    #[inline]
    pub fn primary_version(&self) -> &str {
        &self.primary_version
    }

    #[inline]
    pub fn secondary_version(&self) -> Option<&str> {
        self.secondary_version.as_deref()
    }

    #[inline]
    pub fn secondary_weight(&self) -> f64 {
        self.secondary_weight
    }

    pub fn versions(&self) -> Vec<&str> {
        let mut result = vec![self.primary_version.as_str()];
        result.extend(self.secondary_version.as_deref());
        result
    }

    /// The share of traffic `version` receives, from 0 to 1.
    pub fn weight(&self, version: &str) -> f64 {
        if self.secondary_version.as_deref() == Some(version) {
            self.secondary_weight
        } else if self.primary_version == version {
            1.0 - self.secondary_weight
        } else {
            0.0
        }
    }

    /// Collapse degenerate weights: none at all drops the secondary version, all of it promotes the secondary.
    pub fn normalized(&self) -> Self {
        match &self.secondary_version {
            Some(_) if self.secondary_weight <= 0.0 => Self::new(self.primary_version.as_str()),
            Some(secondary) if self.secondary_weight >= 1.0 => Self::new(secondary.as_str()),
            Some(_) => self.clone(),
            None => Self::new(self.primary_version.as_str()),
        }
    }

    fn additional_version_weights(&self) -> BTreeMap<String, f64> {
        match &self.secondary_version {
            Some(secondary) => BTreeMap::from([(secondary.clone(), self.secondary_weight)]),
            None => BTreeMap::new(),
        }
    }
}

impl Display for AliasRouting {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let mut versions = self.versions();
        versions.sort_by_key(|v| Reverse(version_number(v)));
        for (i, version) in versions.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "v{} ({:.1}%)", version, self.weight(version) * 100.0)?;
        }
        Ok(())
    }
}

/// What `deploy_alias` ended up doing.
#[derive(Clone, Debug, PartialEq)]
pub enum DeployOutcome {
    /// The alias already routed traffic as requested.
    Unchanged,

    Updated(AliasRouting),

    /// Someone else changed the alias after it was read; nothing was written.
    Conflict,
}

fn version_number(version: &str) -> u64 {
    version.parse().unwrap_or(0)
}

/// `v<version> [<description>]`, as versions are presented for selection.
pub fn version_label(version: &FunctionVersion) -> String {
    let description = if version.description.is_empty() {
        "<missing>"
    } else {
        version.description.as_str()
    };
    format!("v{} [{}]", version.version, description)
}

/// Order published versions for selection: versions the alias currently routes to come first, then the rest, each
/// group newest first.
pub fn version_choices(versions: &[FunctionVersion], current: Option<&AliasRouting>) -> Vec<FunctionVersion> {
    let aliased = current.map(AliasRouting::versions).unwrap_or_default();
    let mut result: Vec<FunctionVersion> = versions.iter().filter(|v| v.version != "$LATEST").cloned().collect();
    result.sort_by_key(|v| Reverse((aliased.contains(&v.version.as_str()), version_number(&v.version))));
    result
}

/// Functions that carry the deployment alias, sorted by name. These are the candidates for `deploy_alias`.
pub fn functions_with_alias(ops: &dyn AliasOps) -> Result<Vec<String>, ProvisionError> {
    let mut result = Vec::new();
    for function_name in ops.list_functions()? {
        if ops.get_alias(&function_name, ALIAS_NAME)?.is_some() {
            result.push(function_name);
        } else {
            trace!("functions_with_alias: {} has no {} alias", function_name, ALIAS_NAME);
        }
    }
    result.sort();
    debug!("functions_with_alias: found {} function(s)", result.len());
    Ok(result)
}

/// Route the function's alias to one or two of its published versions.
///
/// With two versions, the newer becomes the primary and the older receives `secondary_weight` of the traffic. The
/// write is conditional on the alias revision read at the start, so a concurrent change results in `Conflict`
/// instead of being overwritten.
pub fn deploy_alias(
    ops: &mut dyn AliasOps,
    function_name: &str,
    selected: &[String],
    secondary_weight: f64,
) -> Result<DeployOutcome, ProvisionError> {
    let available = ops.list_versions(function_name)?;
    if available.len() < 2 {
        return Err(ProvisionError::NoDeploymentOptions(function_name.to_string()));
    }

    if selected.is_empty() || selected.len() > 2 {
        return Err(ProvisionError::InvalidAliasSelection(format!(
            "select one or two versions, not {}",
            selected.len()
        )));
    }
    if !(0.0..=1.0).contains(&secondary_weight) {
        return Err(ProvisionError::InvalidAliasSelection(format!("weight {} is outside 0..1", secondary_weight)));
    }

    let mut selected: Vec<&str> = selected.iter().map(String::as_str).collect();
    for version in &selected {
        if !available.iter().any(|v| v.version == *version) {
            return Err(ProvisionError::InvalidAliasSelection(format!(
                "{} is not a published version of {}",
                version, function_name
            )));
        }
    }
    selected.sort_by_key(|v| Reverse(version_number(v)));
    selected.dedup();

    let alias = ops
        .get_alias(function_name, ALIAS_NAME)?
        .ok_or_else(|| ProvisionError::ResourceNotFound(format!("alias {} of {}", ALIAS_NAME, function_name)))?;
    let current = AliasRouting::from_description(&alias).map(|routing| routing.normalized());
    match &current {
        Some(routing) => debug!("{}: {} configured for {}", function_name, ALIAS_NAME, routing),
        None => debug!("{}: {} configured for $LATEST", function_name, ALIAS_NAME),
    }

    let requested = match selected.as_slice() {
        [primary, secondary] => AliasRouting::weighted(*primary, *secondary, secondary_weight).normalized(),
        _ => AliasRouting::new(selected[0]),
    };
    if current.as_ref() == Some(&requested) {
        info!("{}: requested traffic routing matches {}", function_name, ALIAS_NAME);
        return Ok(DeployOutcome::Unchanged);
    }

    info!("{}: updating {} to route traffic to {}", function_name, ALIAS_NAME, requested);
    let result = ops.update_alias(
        function_name,
        ALIAS_NAME,
        requested.primary_version(),
        &requested.additional_version_weights(),
        &alias.revision_id,
    );

    match result {
        Ok(description) => {
            let routing = AliasRouting::from_description(&description).unwrap_or(requested);
            Ok(DeployOutcome::Updated(routing))
        }
        Err(ProvisionError::PreconditionFailed(msg)) if msg.to_lowercase().contains("revision id") => {
            warn!("{}: {} was updated by someone else; not overwriting it", function_name, ALIAS_NAME);
            Ok(DeployOutcome::Conflict)
        }
        Err(e) => Err(e),
    }
}
