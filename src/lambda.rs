use {
    crate::{
        alias::ALIAS_NAME,
        digest::{compute_digest, EMPTY_ARCHIVE},
        engine::{FieldExpr, Reference, ResourceKind, ResourceSpec, State},
        ProvisionError,
    },
    derive_builder::Builder,
    log::trace,
    scratchstack_arn::Arn,
    serde::{Deserialize, Serialize},
    serde_json::{json, Value},
    std::{collections::BTreeMap, str::FromStr},
};

/// Revision recorded on the placeholder archive.
pub const PLACEHOLDER_REVISION: &str = "empty";

/// Where a function's execution role comes from.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RoleRef {
    /// The role created by the named role module.
    Module {
        module: String,
    },

    /// An existing role's ARN.
    Arn(String),
}

impl RoleRef {
    fn to_expr(&self) -> Result<FieldExpr, ProvisionError> {
        match self {
            Self::Module {
                module,
            } => Ok(FieldExpr::reference(format!("{}.role", module), "arn")),
            Self::Arn(arn) => {
                validate_role_arn(arn)?;
                Ok(FieldExpr::literal(arn.as_str()))
            }
        }
    }
}

impl From<&str> for RoleRef {
    fn from(arn: &str) -> Self {
        Self::Arn(arn.to_string())
    }
}

/// Check that `arn` names an IAM role.
pub fn validate_role_arn(arn: &str) -> Result<(), ProvisionError> {
    let parsed = Arn::from_str(arn).map_err(|e| ProvisionError::InvalidRoleArn(format!("{}: {}", arn, e)))?;
    if parsed.service() != "iam" || !parsed.resource().starts_with("role/") {
        return Err(ProvisionError::InvalidRoleArn(arn.to_string()));
    }
    Ok(())
}

fn default_memory_size() -> u32 {
    256
}

fn default_timeout() -> u32 {
    10
}

fn default_log_retention_days() -> u32 {
    90
}

/// A Lambda function deployed from an object store, published through the `current` alias.
///
/// The function starts out running an empty placeholder archive. Real code is shipped out of band by uploading to
/// the deployment object; the next apply notices the new digest and points the function at it. Traffic shifting
/// between published versions is done on the alias and is never undone by an apply.
#[derive(Builder, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct FunctionModule {
    #[builder(setter(into))]
    name: String,

    #[builder(setter(into))]
    role: RoleRef,

    #[builder(default = "256")]
    #[serde(default = "default_memory_size")]
    memory_size: u32,

    #[builder(setter(into))]
    handler: String,

    #[builder(setter(into))]
    runtime: String,

    #[builder(default)]
    #[serde(default)]
    environment: BTreeMap<String, String>,

    #[builder(setter(into))]
    deploy_bucket: String,

    /// Object key of the deployment archive. Defaults to `<name>.zip`.
    #[builder(setter(into, strip_option), default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deploy_key: Option<String>,

    #[builder(default = "10")]
    #[serde(default = "default_timeout")]
    timeout: u32,

    #[builder(default = "90")]
    #[serde(default = "default_log_retention_days")]
    log_retention_days: u32,
}

impl FunctionModuleBuilder {
    fn validate(&self) -> Result<(), FunctionModuleBuilderError> {
        if let Some(name) = &self.name {
            if name.is_empty() {
                return Err(FunctionModuleBuilderError::ValidationError(
                    "Function name must not be empty.".to_string(),
                ));
            }
        }

        if let Some(RoleRef::Arn(arn)) = &self.role {
            if let Err(e) = validate_role_arn(arn) {
                return Err(FunctionModuleBuilderError::ValidationError(e.to_string()));
            }
        }

        Ok(())
    }
}

impl FunctionModule {
    #[inline]
    pub fn builder() -> FunctionModuleBuilder {
        FunctionModuleBuilder::default()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn role(&self) -> &RoleRef {
        &self.role
    }

    #[inline]
    pub fn memory_size(&self) -> u32 {
        self.memory_size
    }

    #[inline]
    pub fn handler(&self) -> &str {
        &self.handler
    }

    #[inline]
    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    #[inline]
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    #[inline]
    pub fn deploy_bucket(&self) -> &str {
        &self.deploy_bucket
    }

    pub fn deploy_key(&self) -> String {
        match &self.deploy_key {
            Some(key) => key.clone(),
            None => format!("{}.zip", self.name),
        }
    }

    #[inline]
    pub fn timeout(&self) -> u32 {
        self.timeout
    }

    #[inline]
    pub fn log_retention_days(&self) -> u32 {
        self.log_retention_days
    }

    #[inline]
    pub fn log_group_name(&self) -> String {
        format!("/aws/lambda/{}", self.name)
    }

    fn address(&self, resource: &str) -> String {
        format!("{}.{}", self.name, resource)
    }

    /// The log group, code object, function and alias resources.
    pub fn resources(&self) -> Result<Vec<ResourceSpec>, ProvisionError> {
        let role = self.role.to_expr()?;
        let code = self.address("code");

        let log_group = ResourceSpec::builder()
            .address(self.address("log_group"))
            .kind(ResourceKind::LogGroup)
            .managed_field("name", FieldExpr::literal(self.log_group_name()))
            .managed_field("retention_in_days", FieldExpr::literal(self.log_retention_days))
            .force_new_field("name")
            .build()?;

        // Content and metadata are only ever written at creation. After that they belong to the code uploader.
        let code_object = ResourceSpec::builder()
            .address(code.as_str())
            .kind(ResourceKind::S3Object)
            .managed_field("bucket", FieldExpr::literal(self.deploy_bucket.as_str()))
            .managed_field("key", FieldExpr::literal(self.deploy_key()))
            .external_field("content_base64", FieldExpr::literal(base64::encode(EMPTY_ARCHIVE)))
            .external_field(
                "metadata",
                FieldExpr::literal(json!({
                    "digest": compute_digest(EMPTY_ARCHIVE),
                    "revision": PLACEHOLDER_REVISION,
                })),
            )
            .force_new_field("bucket")
            .force_new_field("key")
            .build()?;

        let mut function = ResourceSpec::builder();
        function
            .address(self.address("function"))
            .kind(ResourceKind::LambdaFunction)
            .managed_field("function_name", FieldExpr::literal(self.name.as_str()))
            .managed_field("role", role)
            .managed_field("handler", FieldExpr::literal(self.handler.as_str()))
            .managed_field("runtime", FieldExpr::literal(self.runtime.as_str()))
            .managed_field("memory_size", FieldExpr::literal(self.memory_size))
            .managed_field("timeout", FieldExpr::literal(self.timeout))
            .managed_field("publish", FieldExpr::literal(true))
            .managed_field("s3_bucket", FieldExpr::reference(code.as_str(), "bucket"))
            .managed_field("s3_key", FieldExpr::reference(code.as_str(), "key"))
            .managed_field(
                "source_code_hash",
                FieldExpr::SourceCodeHash(Box::new(FieldExpr::reference(code.as_str(), "metadata.digest"))),
            )
            .depends_on_address(self.address("log_group"))
            .force_new_field("function_name");
        if !self.environment.is_empty() {
            function.managed_field("environment", FieldExpr::literal(json!({ "variables": self.environment })));
        }
        let function = function.build()?;

        // Version and routing are shifted by deployments, so only the initial values are ours.
        let alias = ResourceSpec::builder()
            .address(self.address("alias"))
            .kind(ResourceKind::LambdaAlias)
            .managed_field("name", FieldExpr::literal(ALIAS_NAME))
            .managed_field("function_name", FieldExpr::reference(self.address("function"), "function_name"))
            .external_field("function_version", FieldExpr::reference(self.address("function"), "version"))
            .external_field("routing_config", FieldExpr::literal(json!({ "additional_version_weights": {} })))
            .force_new_field("name")
            .force_new_field("function_name")
            .build()?;

        trace!("{}: declared function resources", self.name);
        Ok(vec![log_group, code_object, function, alias])
    }

    /// `function_arn`, `log_group_arn`, `alias_name` and `alias_invoke_arn`, once they exist.
    pub fn outputs(&self, state: &State) -> Vec<(String, Option<Value>)> {
        [
            ("function_arn", "function", "arn"),
            ("log_group_arn", "log_group", "arn"),
            ("alias_name", "alias", "name"),
            ("alias_invoke_arn", "alias", "invoke_arn"),
        ]
        .iter()
        .map(|(output, resource, attribute)| {
            let value = state.lookup(&Reference::new(self.address(resource), attribute));
            (self.address(output), value)
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{validate_role_arn, FunctionModule, RoleRef},
        crate::{digest::compute_digest, FieldExpr, ProvisionError, ResourceKind, EMPTY_ARCHIVE},
        pretty_assertions::assert_eq,
        serde_json::json,
        std::collections::BTreeMap,
    };

    const ROLE: &str = "arn:aws:iam::123456789012:role/api";

    fn module() -> FunctionModule {
        FunctionModule::builder()
            .name("api")
            .role(ROLE)
            .handler("index.handler")
            .runtime("nodejs18.x")
            .deploy_bucket("deploys")
            .build()
            .unwrap()
    }

    #[test_log::test]
    fn test_defaults() {
        let m = module();
        assert_eq!(m.memory_size(), 256);
        assert_eq!(m.timeout(), 10);
        assert_eq!(m.log_retention_days(), 90);
        assert_eq!(m.deploy_key(), "api.zip");
        assert_eq!(m.log_group_name(), "/aws/lambda/api");

        let parsed: FunctionModule = serde_json::from_value(json!({
            "name": "api",
            "role": ROLE,
            "handler": "index.handler",
            "runtime": "nodejs18.x",
            "deploy_bucket": "deploys",
        }))
        .unwrap();
        assert_eq!(parsed, m);

        let keyed = FunctionModule::builder()
            .name("api")
            .role(RoleRef::Module {
                module: "runtime".to_string(),
            })
            .handler("main")
            .runtime("provided.al2")
            .deploy_bucket("deploys")
            .deploy_key("functions/api.zip")
            .build()
            .unwrap();
        assert_eq!(keyed.deploy_key(), "functions/api.zip");
    }

    #[test_log::test]
    fn test_role_arn_validation() {
        validate_role_arn(ROLE).unwrap();
        assert!(matches!(validate_role_arn("not-an-arn"), Err(ProvisionError::InvalidRoleArn(_))));
        assert!(matches!(
            validate_role_arn("arn:aws:iam::123456789012:policy/api"),
            Err(ProvisionError::InvalidRoleArn(_))
        ));
        assert!(matches!(
            validate_role_arn("arn:aws:s3:::bucket/role/x"),
            Err(ProvisionError::InvalidRoleArn(_))
        ));

        let e = FunctionModule::builder()
            .name("api")
            .role("arn:aws:iam::123456789012:user/bob")
            .handler("index.handler")
            .runtime("nodejs18.x")
            .deploy_bucket("deploys")
            .build()
            .unwrap_err();
        assert!(e.to_string().contains("Invalid role ARN"));
    }

    #[test_log::test]
    fn test_role_ref_forms() {
        let by_module: RoleRef = serde_json::from_value(json!({"module": "runtime"})).unwrap();
        assert_eq!(
            by_module,
            RoleRef::Module {
                module: "runtime".to_string()
            }
        );
        assert_eq!(by_module.to_expr().unwrap(), FieldExpr::reference("runtime.role", "arn"));

        let by_arn: RoleRef = serde_json::from_value(json!(ROLE)).unwrap();
        assert_eq!(by_arn.to_expr().unwrap(), FieldExpr::literal(ROLE));
    }

    #[test_log::test]
    fn test_resources() {
        let specs = module().resources().unwrap();
        let addresses: Vec<&str> = specs.iter().map(|s| s.address()).collect();
        assert_eq!(addresses, vec!["api.log_group", "api.code", "api.function", "api.alias"]);
        let kinds: Vec<ResourceKind> = specs.iter().map(|s| s.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::LogGroup,
                ResourceKind::S3Object,
                ResourceKind::LambdaFunction,
                ResourceKind::LambdaAlias
            ]
        );

        let code = &specs[1];
        assert_eq!(code.external()["content_base64"], FieldExpr::literal(base64::encode(EMPTY_ARCHIVE)));
        assert_eq!(
            code.external()["metadata"],
            FieldExpr::literal(json!({"digest": compute_digest(EMPTY_ARCHIVE), "revision": "empty"}))
        );
        assert!(!code.managed().contains_key("metadata"));

        let function = &specs[2];
        assert_eq!(function.dependencies(), vec!["api.log_group".to_string(), "api.code".to_string()]);
        assert_eq!(function.managed()["publish"], FieldExpr::literal(true));
        assert!(!function.managed().contains_key("environment"));

        let alias = &specs[3];
        assert_eq!(alias.managed()["name"], FieldExpr::literal("current"));
        assert!(alias.external().contains_key("function_version"));
        assert!(alias.external().contains_key("routing_config"));
        assert!(!alias.managed().contains_key("function_version"));
    }

    #[test_log::test]
    fn test_environment_block() {
        let mut m = module();
        m.environment = BTreeMap::from([
            ("STAGE".to_string(), "prod".to_string()),
            ("TABLE".to_string(), "orders".to_string()),
        ]);
        let specs = m.resources().unwrap();
        assert_eq!(
            specs[2].managed()["environment"],
            FieldExpr::literal(json!({"variables": {"STAGE": "prod", "TABLE": "orders"}}))
        );
    }
}
