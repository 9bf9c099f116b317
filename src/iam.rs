use {
    crate::{
        engine::{FieldExpr, Reference, ResourceKind, ResourceSpec, State},
        PrincipalSpec, ProvisionError, TrustPolicy,
    },
    derive_builder::Builder,
    log::trace,
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// An IAM role with one managed policy attached, assumable by the principals listed.
#[derive(Builder, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct RoleModule {
    #[builder(setter(into))]
    name: String,

    #[builder(setter(into), default)]
    #[serde(default)]
    description: String,

    /// The permissions policy, as a JSON document.
    #[builder(setter(into))]
    policy_document: String,

    #[builder(setter(into), default)]
    #[serde(default)]
    principals: Vec<PrincipalSpec>,
}

impl RoleModuleBuilder {
    fn validate(&self) -> Result<(), RoleModuleBuilderError> {
        if let Some(name) = &self.name {
            if name.is_empty() {
                return Err(RoleModuleBuilderError::ValidationError("Role name must not be empty.".to_string()));
            }
        }

        if let Some(document) = &self.policy_document {
            if let Err(e) = check_policy_document(document) {
                return Err(RoleModuleBuilderError::ValidationError(e.to_string()));
            }
        }

        Ok(())
    }
}

fn check_policy_document(document: &str) -> Result<(), ProvisionError> {
    match serde_json::from_str::<Value>(document) {
        Ok(Value::Object(_)) => Ok(()),
        Ok(_) => Err(ProvisionError::InvalidPolicyDocument("expected a JSON object".to_string())),
        Err(e) => Err(ProvisionError::InvalidPolicyDocument(e.to_string())),
    }
}

impl RoleModule {
    #[inline]
    pub fn builder() -> RoleModuleBuilder {
        RoleModuleBuilder::default()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    pub fn policy_document(&self) -> &str {
        &self.policy_document
    }

    #[inline]
    pub fn principals(&self) -> &[PrincipalSpec] {
        &self.principals
    }

    #[inline]
    pub fn policy_address(&self) -> String {
        format!("{}.policy", self.name)
    }

    #[inline]
    pub fn role_address(&self) -> String {
        format!("{}.role", self.name)
    }

    #[inline]
    pub fn attachment_address(&self) -> String {
        format!("{}.attachment", self.name)
    }

    /// The role's ARN, for use by other modules.
    pub fn role_arn(&self) -> FieldExpr {
        FieldExpr::reference(self.role_address(), "arn")
    }

    /// The policy, role and attachment resources.
    ///
    /// The policy is replaced create-before-destroy so the role is never left without permissions. The attachment
    /// refers to both by reference, which is what orders it after them.
    pub fn resources(&self) -> Result<Vec<ResourceSpec>, ProvisionError> {
        check_policy_document(&self.policy_document)?;
        let trust = TrustPolicy::from_principals(&self.principals)?;
        trace!("{}: trust policy {}", self.name, trust);

        let policy = ResourceSpec::builder()
            .address(self.policy_address())
            .kind(ResourceKind::IamPolicy)
            .managed_field("name", FieldExpr::literal(self.name.as_str()))
            .managed_field("description", FieldExpr::literal(self.description.as_str()))
            .managed_field("policy", FieldExpr::literal(self.policy_document.as_str()))
            .create_before_destroy(true)
            .force_new_field("name")
            .build()?;

        let role = ResourceSpec::builder()
            .address(self.role_address())
            .kind(ResourceKind::IamRole)
            .managed_field("name", FieldExpr::literal(self.name.as_str()))
            .managed_field("description", FieldExpr::literal(self.description.as_str()))
            .managed_field("assume_role_policy", FieldExpr::literal(trust.to_string()))
            .force_new_field("name")
            .build()?;

        let attachment = ResourceSpec::builder()
            .address(self.attachment_address())
            .kind(ResourceKind::IamRolePolicyAttachment)
            .managed_field("role", FieldExpr::reference(self.role_address(), "name"))
            .managed_field("policy_arn", FieldExpr::reference(self.policy_address(), "arn"))
            .force_new_field("role")
            .force_new_field("policy_arn")
            .build()?;

        Ok(vec![policy, role, attachment])
    }

    /// `role_arn`, once the role exists.
    pub fn outputs(&self, state: &State) -> Vec<(String, Option<Value>)> {
        vec![(format!("{}.role_arn", self.name), state.lookup(&Reference::new(self.role_address(), "arn")))]
    }
}

#[cfg(test)]
mod tests {
    use {
        super::RoleModule,
        crate::{
            engine::{destroy, plan, reconcile, ChangeAction, State},
            provider::InMemoryCloud,
            PrincipalSpec, PrincipalType, ProvisionError, ResourceKind, TrustPolicy,
        },
        pretty_assertions::assert_eq,
        serde_json::json,
        std::str::FromStr,
    };

    const POLICY: &str = r#"{
        "Version": "2012-10-17",
        "Statement": [{"Effect": "Allow", "Action": "s3:GetObject", "Resource": "*"}]
    }"#;

    fn module() -> RoleModule {
        RoleModule::builder()
            .name("deployer")
            .description("Deploys things")
            .policy_document(POLICY)
            .principals(vec![
                PrincipalSpec::builder()
                    .principal_type(PrincipalType::Service)
                    .identifiers(vec!["lambda.amazonaws.com".to_string()])
                    .build()
                    .unwrap(),
                PrincipalSpec::builder()
                    .principal_type(PrincipalType::Federated)
                    .identifiers(vec![
                        "arn:aws:iam::123456789012:oidc-provider/token.actions.githubusercontent.com".to_string()
                    ])
                    .build()
                    .unwrap(),
            ])
            .build()
            .unwrap()
    }

    #[test_log::test]
    fn test_builder_validation() {
        let e = RoleModule::builder().name("r").policy_document("{").build().unwrap_err();
        assert!(e.to_string().contains("Invalid policy document"));

        let e = RoleModule::builder().name("r").policy_document("[]").build().unwrap_err();
        assert!(e.to_string().contains("expected a JSON object"));

        let e = RoleModule::builder().name("").policy_document("{}").build().unwrap_err();
        assert!(e.to_string().contains("Role name must not be empty."));
    }

    #[test_log::test]
    fn test_resources() {
        let specs = module().resources().unwrap();
        let addresses: Vec<&str> = specs.iter().map(|s| s.address()).collect();
        assert_eq!(addresses, vec!["deployer.policy", "deployer.role", "deployer.attachment"]);

        assert!(specs[0].create_before_destroy());
        assert_eq!(specs[2].dependencies(), vec!["deployer.policy".to_string(), "deployer.role".to_string()]);

        let trust = match &specs[1].managed()["assume_role_policy"] {
            crate::FieldExpr::Literal(value) => TrustPolicy::from_str(value.as_str().unwrap()).unwrap(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(trust.statement().len(), 2);
    }

    #[test_log::test]
    fn test_deserialized_document_is_checked() {
        let module: RoleModule = serde_json::from_value(json!({
            "name": "deployer",
            "policy_document": "not json",
        }))
        .unwrap();
        assert!(matches!(module.resources().unwrap_err(), ProvisionError::InvalidPolicyDocument(_)));
    }

    #[test_log::test]
    fn test_mixed_identifiers_rejected() {
        let module: RoleModule = serde_json::from_value(json!({
            "name": "deployer",
            "policy_document": "{}",
            "principals": [{
                "type": "Federated",
                "identifiers": [
                    "arn:aws:iam::123456789012:oidc-provider/token.actions.githubusercontent.com",
                    "cognito-identity.amazonaws.com"
                ]
            }]
        }))
        .unwrap();
        assert!(matches!(module.resources().unwrap_err(), ProvisionError::MixedPrincipalIdentifiers(_)));
    }

    #[test_log::test]
    fn test_set_qualified_condition_provisions() {
        let module: RoleModule = serde_json::from_value(json!({
            "name": "identity-pool",
            "policy_document": "{}",
            "principals": [{
                "type": "Federated",
                "identifiers": ["cognito-identity.amazonaws.com"],
                "conditions": [{
                    "test": "ForAnyValue:StringLike",
                    "variable": "cognito-identity.amazonaws.com:amr",
                    "values": ["authenticated"]
                }]
            }]
        }))
        .unwrap();

        let mut cloud = InMemoryCloud::default();
        let mut state = State::default();
        reconcile(&module.resources().unwrap(), &mut state, &mut cloud).unwrap();

        let role = cloud.attributes(ResourceKind::IamRole, "identity-pool").unwrap();
        let trust: serde_json::Value = serde_json::from_str(role["assume_role_policy"].as_str().unwrap()).unwrap();
        assert_eq!(
            trust["Statement"][0]["Condition"],
            json!({"ForAnyValue:StringLike": {"cognito-identity.amazonaws.com:amr": "authenticated"}})
        );
    }

    #[test_log::test]
    fn test_lifecycle() {
        let module = module();
        let specs = module.resources().unwrap();
        let mut cloud = InMemoryCloud::default();
        let mut state = State::default();

        let (_, summary) = reconcile(&specs, &mut state, &mut cloud).unwrap();
        assert_eq!(summary.created, 3);
        assert_eq!(
            cloud.calls(),
            &[
                "create iam_policy arn:aws:iam::123456789012:policy/deployer".to_string(),
                "create iam_role deployer".to_string(),
                "create iam_role_policy_attachment deployer/arn:aws:iam::123456789012:policy/deployer".to_string(),
            ]
        );
        assert_eq!(
            module.outputs(&state),
            vec![("deployer.role_arn".to_string(), Some(json!("arn:aws:iam::123456789012:role/deployer")))]
        );
        assert!(plan(&specs, &state).unwrap().is_empty());

        cloud.clear_calls();
        destroy(&mut state, &mut cloud).unwrap();
        assert_eq!(
            cloud.calls(),
            &[
                "delete iam_role_policy_attachment deployer/arn:aws:iam::123456789012:policy/deployer".to_string(),
                "delete iam_role deployer".to_string(),
                "delete iam_policy arn:aws:iam::123456789012:policy/deployer".to_string(),
            ]
        );
        assert!(state.resources().is_empty());
    }

    #[test_log::test]
    fn test_policy_drift_is_reverted() {
        let specs = module().resources().unwrap();
        let mut cloud = InMemoryCloud::default();
        let mut state = State::default();
        reconcile(&specs, &mut state, &mut cloud).unwrap();

        let arn = "arn:aws:iam::123456789012:policy/deployer";
        cloud.set_attribute(ResourceKind::IamPolicy, arn, "policy", json!("{}")).unwrap();
        cloud.clear_calls();

        let (plan, summary) = reconcile(&specs, &mut state, &mut cloud).unwrap();
        assert_eq!(plan.action("deployer.policy"), Some(ChangeAction::Update));
        assert_eq!(summary.updated, 1);
        assert_eq!(cloud.attributes(ResourceKind::IamPolicy, arn).unwrap()["policy"], json!(POLICY));
    }

    #[test_log::test]
    fn test_partial_failure_resumes() {
        let specs = module().resources().unwrap();
        let mut cloud = InMemoryCloud::default();
        let mut state = State::default();

        cloud.fail_next(ResourceKind::IamRolePolicyAttachment);
        assert!(matches!(reconcile(&specs, &mut state, &mut cloud), Err(ProvisionError::Api(_))));
        assert!(state.get("deployer.policy").is_some());
        assert!(state.get("deployer.role").is_some());
        assert!(state.get("deployer.attachment").is_none());

        cloud.clear_calls();
        let (plan, summary) = reconcile(&specs, &mut state, &mut cloud).unwrap();
        assert_eq!(plan.count(ChangeAction::NoOp), 2);
        assert_eq!(summary.created, 1);
        assert_eq!(cloud.calls().len(), 1);
        assert_eq!(cloud.count(ResourceKind::IamRolePolicyAttachment), 1);
    }

    #[test_log::test]
    fn test_rename_replaces_policy_before_destroying() {
        let mut cloud = InMemoryCloud::default();
        let mut state = State::default();
        reconcile(&module().resources().unwrap(), &mut state, &mut cloud).unwrap();

        let renamed: RoleModule = serde_json::from_value(json!({
            "name": "deployer",
            "policy_document": POLICY,
        }))
        .unwrap();
        let mut specs = renamed.resources().unwrap();
        specs[0] = crate::ResourceSpec::builder()
            .address("deployer.policy")
            .kind(ResourceKind::IamPolicy)
            .managed_field("name", crate::FieldExpr::literal("deployer-v2"))
            .managed_field("description", crate::FieldExpr::literal(""))
            .managed_field("policy", crate::FieldExpr::literal(POLICY))
            .create_before_destroy(true)
            .force_new_field("name")
            .build()
            .unwrap();

        cloud.clear_calls();
        let (plan, summary) = reconcile(&specs, &mut state, &mut cloud).unwrap();
        assert_eq!(plan.action("deployer.policy"), Some(ChangeAction::Replace));
        assert_eq!(plan.action("deployer.attachment"), Some(ChangeAction::Replace));
        assert_eq!(summary.replaced, 2);
        assert_eq!(
            cloud.calls(),
            &[
                "create iam_policy arn:aws:iam::123456789012:policy/deployer-v2".to_string(),
                "update iam_role deployer".to_string(),
                "delete iam_role_policy_attachment deployer/arn:aws:iam::123456789012:policy/deployer".to_string(),
                "create iam_role_policy_attachment deployer/arn:aws:iam::123456789012:policy/deployer-v2".to_string(),
                "delete iam_policy arn:aws:iam::123456789012:policy/deployer".to_string(),
            ]
        );
        assert!(state.deposed().is_empty());
    }
}
