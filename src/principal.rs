use {
    crate::{display_json, QualifiedOp},
    derive_builder::Builder,
    serde::{Deserialize, Serialize},
    std::fmt::{Display, Formatter, Result as FmtResult},
};

/// The kind of principal named in a trust statement.
///
/// There is no separate wildcard kind. Anonymous trust is written as `Aws` with the identifier `*`, which renders as
/// `{"AWS": "*"}` and is equivalent to a bare `"Principal": "*"`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum PrincipalType {
    #[serde(rename = "AWS", alias = "aws")]
    Aws,

    #[serde(alias = "canonical_user")]
    CanonicalUser,

    #[serde(alias = "federated")]
    Federated,

    #[serde(alias = "service")]
    Service,
}

impl PrincipalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "AWS",
            Self::CanonicalUser => "CanonicalUser",
            Self::Federated => "Federated",
            Self::Service => "Service",
        }
    }
}

impl Display for PrincipalType {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A condition attached to a principal entry: `{test, variable, values}`.
#[derive(Builder, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ConditionSpec {
    /// The operator, optionally set-qualified as in `ForAnyValue:StringLike`.
    #[builder(setter(into))]
    test: QualifiedOp,

    #[builder(setter(into))]
    variable: String,

    #[builder(setter(into))]
    values: Vec<String>,
}

impl ConditionSpec {
    #[inline]
    pub fn builder() -> ConditionSpecBuilder {
        ConditionSpecBuilder::default()
    }

    #[inline]
    pub fn test(&self) -> QualifiedOp {
        self.test
    }

    #[inline]
    pub fn variable(&self) -> &str {
        &self.variable
    }

    #[inline]
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// One entry of the role's trust relationship. Each entry becomes exactly one trust statement.
#[derive(Builder, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct PrincipalSpec {
    #[serde(rename = "type")]
    principal_type: PrincipalType,

    #[builder(setter(into))]
    identifiers: Vec<String>,

    #[builder(setter(into), default)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    conditions: Vec<ConditionSpec>,
}

display_json!(PrincipalSpec);

impl PrincipalSpec {
    #[inline]
    pub fn builder() -> PrincipalSpecBuilder {
        PrincipalSpecBuilder::default()
    }

    #[inline]
    pub fn principal_type(&self) -> PrincipalType {
        self.principal_type
    }

    #[inline]
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    #[inline]
    pub fn conditions(&self) -> &[ConditionSpec] {
        &self.conditions
    }
}

impl PrincipalSpecBuilder {
    fn validate(&self) -> Result<(), PrincipalSpecBuilderError> {
        match &self.identifiers {
            Some(identifiers) if identifiers.is_empty() => {
                Err(PrincipalSpecBuilderError::ValidationError("At least one identifier must be set.".to_string()))
            }
            _ => Ok(()),
        }
    }
}
