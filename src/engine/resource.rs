use {
    super::FieldExpr,
    crate::ProvisionError,
    derive_builder::Builder,
    serde::{Deserialize, Serialize},
    std::{
        collections::{BTreeMap, BTreeSet},
        fmt::{Display, Formatter, Result as FmtResult},
    },
};

/// The cloud resource types the modules provision.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    IamPolicy,
    IamRole,
    IamRolePolicyAttachment,
    LambdaAlias,
    LambdaFunction,
    LogGroup,
    S3Object,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IamPolicy => "iam_policy",
            Self::IamRole => "iam_role",
            Self::IamRolePolicyAttachment => "iam_role_policy_attachment",
            Self::LambdaAlias => "lambda_alias",
            Self::LambdaFunction => "lambda_function",
            Self::LogGroup => "log_group",
            Self::S3Object => "s3_object",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// The desired configuration of a single resource.
///
/// `managed` fields are reconciled on every apply. `external` fields are only sent when the resource is created;
/// after that they belong to whoever changes them out of band and never show up in a plan.
#[derive(Builder, Clone, Debug, Eq, PartialEq)]
pub struct ResourceSpec {
    #[builder(setter(into))]
    address: String,

    kind: ResourceKind,

    #[builder(default)]
    managed: BTreeMap<String, FieldExpr>,

    #[builder(default)]
    external: BTreeMap<String, FieldExpr>,

    #[builder(default)]
    depends_on: Vec<String>,

    #[builder(default)]
    create_before_destroy: bool,

    /// Managed fields whose change requires replacing the resource.
    #[builder(default)]
    force_new: BTreeSet<String>,
}

impl ResourceSpec {
    #[inline]
    pub fn builder() -> ResourceSpecBuilder {
        ResourceSpecBuilder::default()
    }

    #[inline]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[inline]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    #[inline]
    pub fn managed(&self) -> &BTreeMap<String, FieldExpr> {
        &self.managed
    }

    #[inline]
    pub fn external(&self) -> &BTreeMap<String, FieldExpr> {
        &self.external
    }

    #[inline]
    pub fn create_before_destroy(&self) -> bool {
        self.create_before_destroy
    }

    #[inline]
    pub fn force_new(&self) -> &BTreeSet<String> {
        &self.force_new
    }

    /// Explicit dependencies followed by every resource referenced from a field, without duplicates.
    pub fn dependencies(&self) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        let referenced = self.managed.values().chain(self.external.values()).flat_map(|expr| expr.references());
        for address in self.depends_on.iter().map(String::as_str).chain(referenced.map(|r| r.address())) {
            if !result.iter().any(|existing| existing == address) {
                result.push(address.to_string());
            }
        }
        result
    }
}

impl ResourceSpecBuilder {
    pub fn managed_field<K: Into<String>>(&mut self, key: K, expr: FieldExpr) -> &mut Self {
        self.managed.get_or_insert_with(BTreeMap::new).insert(key.into(), expr);
        self
    }

    pub fn external_field<K: Into<String>>(&mut self, key: K, expr: FieldExpr) -> &mut Self {
        self.external.get_or_insert_with(BTreeMap::new).insert(key.into(), expr);
        self
    }

    pub fn depends_on_address<A: Into<String>>(&mut self, address: A) -> &mut Self {
        self.depends_on.get_or_insert_with(Vec::new).push(address.into());
        self
    }

    pub fn force_new_field<K: Into<String>>(&mut self, key: K) -> &mut Self {
        self.force_new.get_or_insert_with(BTreeSet::new).insert(key.into());
        self
    }
}

impl From<ResourceSpecBuilderError> for ProvisionError {
    fn from(e: ResourceSpecBuilderError) -> Self {
        Self::InvalidResource(e.to_string())
    }
}
