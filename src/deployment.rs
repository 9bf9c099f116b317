use {
    crate::{
        display_json,
        engine::{self, ApplySummary, Plan, ResourceSpec, State},
        from_str_json,
        iam::RoleModule,
        lambda::{FunctionModule, RoleRef},
        provider::Provider,
        ProvisionError,
    },
    log::debug,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    std::{
        collections::{BTreeMap, BTreeSet},
        fs,
        path::Path,
        str::FromStr,
    },
};

/// Everything to provision: role modules and the functions that run under them.
///
/// ```json
/// {
///     "roles": [{"name": "runtime", "policy_document": "{...}", "principals": [...]}],
///     "functions": [{"name": "api", "role": {"module": "runtime"}, "handler": "index.handler", ...}]
/// }
/// ```
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Deployment {
    #[serde(default)]
    roles: Vec<RoleModule>,

    #[serde(default)]
    functions: Vec<FunctionModule>,
}

display_json!(Deployment);
from_str_json!(Deployment);

impl Deployment {
    pub fn new(roles: Vec<RoleModule>, functions: Vec<FunctionModule>) -> Self {
        Self {
            roles,
            functions,
        }
    }

    /// Read a deployment from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ProvisionError> {
        let text = fs::read_to_string(path)?;
        Ok(Self::from_str(&text)?)
    }

    #[inline]
    pub fn roles(&self) -> &[RoleModule] {
        &self.roles
    }

    #[inline]
    pub fn functions(&self) -> &[FunctionModule] {
        &self.functions
    }

    /// Every resource of every module. Module names share one namespace since they prefix resource addresses.
    pub fn resources(&self) -> Result<Vec<ResourceSpec>, ProvisionError> {
        let mut names = BTreeSet::new();
        for name in self.roles.iter().map(RoleModule::name).chain(self.functions.iter().map(FunctionModule::name)) {
            if !names.insert(name) {
                return Err(ProvisionError::DuplicateAddress(name.to_string()));
            }
        }

        let role_names: BTreeSet<&str> = self.roles.iter().map(RoleModule::name).collect();
        for function in &self.functions {
            if let RoleRef::Module {
                module,
            } = function.role()
            {
                if !role_names.contains(module.as_str()) {
                    return Err(ProvisionError::UnknownDependency(
                        format!("{}.function", function.name()),
                        format!("{}.role", module),
                    ));
                }
            }
        }

        let mut specs = Vec::new();
        for role in &self.roles {
            specs.extend(role.resources()?);
        }
        for function in &self.functions {
            specs.extend(function.resources()?);
        }
        debug!("{} module(s) declare {} resource(s)", names.len(), specs.len());
        Ok(specs)
    }

    pub fn plan(&self, state: &State) -> Result<Plan, ProvisionError> {
        engine::plan(&self.resources()?, state)
    }

    /// Refresh, plan and apply every module.
    pub fn reconcile(
        &self,
        state: &mut State,
        provider: &mut dyn Provider,
    ) -> Result<(Plan, ApplySummary), ProvisionError> {
        engine::reconcile(&self.resources()?, state, provider)
    }

    /// Module outputs that are known so far, keyed `<module>.<output>`.
    pub fn outputs(&self, state: &State) -> BTreeMap<String, Value> {
        let roles = self.roles.iter().flat_map(|r| r.outputs(state));
        let functions = self.functions.iter().flat_map(|f| f.outputs(state));
        roles.chain(functions).filter_map(|(name, value)| value.map(|v| (name, v))).collect()
    }
}
