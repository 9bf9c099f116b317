use {
    crate::{
        display_json, from_str_json, serutil::StringList, AssumeAction, Condition, Effect, PrincipalSpec,
        PrincipalType, ProvisionError,
    },
    derive_builder::Builder,
    log::trace,
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
};

/// A single trust-policy statement: who may assume the role, with which action, under which conditions.
#[derive(Builder, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[builder(build_fn(validate = "Self::validate"))]
#[serde(deny_unknown_fields, rename_all = "PascalCase")]
pub struct TrustStatement {
    #[builder(setter(into, strip_option), default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    sid: Option<String>,

    #[builder(default)]
    effect: Effect,

    #[builder(setter(into))]
    principal: BTreeMap<PrincipalType, StringList>,

    action: AssumeAction,

    #[builder(setter(into, strip_option), default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    condition: Option<Condition>,
}

display_json!(TrustStatement);
from_str_json!(TrustStatement);

impl TrustStatement {
    pub fn builder() -> TrustStatementBuilder {
        TrustStatementBuilder::default()
    }

    /// Build the `Allow` statement for one principal entry.
    pub fn from_principal(spec: &PrincipalSpec) -> Result<Self, ProvisionError> {
        let action = AssumeAction::classify(spec.identifiers())?;

        let mut principal = BTreeMap::new();
        principal.insert(spec.principal_type(), StringList::from(spec.identifiers().to_vec()));

        let mut builder = Self::builder();
        builder.effect(Effect::Allow).principal(principal).action(action);

        if !spec.conditions().is_empty() {
            let mut condition = Condition::new();
            for cond in spec.conditions() {
                let by_key = condition.entry(cond.test()).or_default();
                match by_key.get_mut(cond.variable()) {
                    Some(existing) => existing.extend(cond.values().iter().cloned()),
                    None => {
                        by_key.insert(cond.variable().to_string(), StringList::from(cond.values().to_vec()));
                    }
                }
            }
            builder.condition(condition);
        }

        trace!("from_principal: {} {:?} -> {}", spec.principal_type(), spec.identifiers(), action);
        builder.build().map_err(|e| ProvisionError::InvalidPrincipal(e.to_string()))
    }

    #[inline]
    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    #[inline]
    pub fn effect(&self) -> &Effect {
        &self.effect
    }

    #[inline]
    pub fn principal(&self) -> &BTreeMap<PrincipalType, StringList> {
        &self.principal
    }

    #[inline]
    pub fn action(&self) -> AssumeAction {
        self.action
    }

    #[inline]
    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }
}

impl TrustStatementBuilder {
    fn validate(&self) -> Result<(), TrustStatementBuilderError> {
        match &self.principal {
            None => Err(TrustStatementBuilderError::ValidationError("Principal must be set.".to_string())),
            Some(principal) if principal.is_empty() || principal.values().any(|ids| ids.is_empty()) => Err(
                TrustStatementBuilderError::ValidationError("Principal must name at least one identifier.".to_string()),
            ),
            _ => Ok(()),
        }
    }
}
