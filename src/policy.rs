use {
    crate::{display_json, from_str_json, PrincipalSpec, ProvisionError, TrustStatement},
    derive_builder::Builder,
    log::debug,
    serde::{de::Deserializer, ser::Serializer, Deserialize, Serialize},
    std::{
        fmt::{Display, Formatter, Result as FmtResult},
        str::FromStr,
    },
};

/// Policy versions.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PolicyVersion {
    V2008_10_17,
    V2012_10_17,
}

impl Default for PolicyVersion {
    fn default() -> Self {
        Self::V2012_10_17
    }
}

impl Display for PolicyVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::V2008_10_17 => f.write_str("2008-10-17"),
            Self::V2012_10_17 => f.write_str("2012-10-17"),
        }
    }
}

impl FromStr for PolicyVersion {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2008-10-17" => Ok(Self::V2008_10_17),
            "2012-10-17" => Ok(Self::V2012_10_17),
            _ => Err(ProvisionError::InvalidPolicyVersion(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for PolicyVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        PolicyVersion::from_str(&value).map_err(serde::de::Error::custom)
    }
}

impl Serialize for PolicyVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.to_string().as_str())
    }
}

/// An assume-role trust policy document.
#[derive(Builder, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields, rename_all = "PascalCase")]
pub struct TrustPolicy {
    #[builder(default)]
    version: PolicyVersion,

    #[builder(setter(into))]
    statement: Vec<TrustStatement>,
}

display_json!(TrustPolicy);
from_str_json!(TrustPolicy);

impl TrustPolicy {
    #[inline]
    pub fn builder() -> TrustPolicyBuilder {
        TrustPolicyBuilder::default()
    }

    /// Build the trust policy for a role: one statement per principal entry, in the order given.
    pub fn from_principals(principals: &[PrincipalSpec]) -> Result<Self, ProvisionError> {
        let mut statement = Vec::with_capacity(principals.len());
        for spec in principals {
            statement.push(TrustStatement::from_principal(spec)?);
        }

        debug!("Built trust policy with {} statement(s)", statement.len());
        Ok(Self {
            version: PolicyVersion::V2012_10_17,
            statement,
        })
    }

    #[inline]
    pub fn version(&self) -> PolicyVersion {
        self.version
    }

    #[inline]
    pub fn statement(&self) -> &[TrustStatement] {
        &self.statement
    }
}
