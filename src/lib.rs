#![warn(clippy::all)]
pub(crate) mod action;
pub(crate) mod alias;
pub(crate) mod bundle;
pub(crate) mod code;
pub(crate) mod condition;
pub(crate) mod deployment;
pub(crate) mod digest;
pub(crate) mod effect;
pub(crate) mod engine;
pub(crate) mod error;
pub(crate) mod iam;
pub(crate) mod lambda;
pub(crate) mod policy;
pub(crate) mod principal;
pub(crate) mod provider;
pub(crate) mod statement;

#[macro_use]
pub(crate) mod serutil;

pub use {
    action::{is_oidc_provider_arn, AssumeAction},
    alias::{
        deploy_alias, functions_with_alias, version_choices, version_label, AliasRouting, DeployOutcome, ALIAS_NAME,
    },
    bundle::bundle_directory,
    code::{revision_label, upload_if_changed, DIGEST_METADATA_KEY, REVISION_METADATA_KEY},
    condition::{Condition, ConditionMap, ConditionOp, QualifiedOp, SetQualifier},
    deployment::Deployment,
    digest::{compute_digest, is_url_safe_digest, padding_len, to_source_code_hash, EMPTY_ARCHIVE},
    effect::Effect,
    engine::{
        apply, destroy, plan, reconcile, refresh, ApplySummary, Attributes, Change, ChangeAction, DeposedRecord,
        FieldChange, FieldExpr, Plan, PlannedValue, Reference, ResourceKind, ResourceRecord, ResourceSpec,
        ResourceSpecBuilder, ResourceSpecBuilderError, State, TaskGraph, STATE_FORMAT_VERSION,
    },
    error::ProvisionError,
    iam::{RoleModule, RoleModuleBuilder, RoleModuleBuilderError},
    lambda::{
        validate_role_arn, FunctionModule, FunctionModuleBuilder, FunctionModuleBuilderError, RoleRef,
        PLACEHOLDER_REVISION,
    },
    policy::{PolicyVersion, TrustPolicy, TrustPolicyBuilder, TrustPolicyBuilderError},
    principal::{
        ConditionSpec, ConditionSpecBuilder, ConditionSpecBuilderError, PrincipalSpec, PrincipalSpecBuilder,
        PrincipalSpecBuilderError, PrincipalType,
    },
    provider::{
        AliasDescription, AliasOps, FunctionVersion, InMemoryCloud, ObjectHead, ObjectStore, Provider, RemoteObject,
        DEFAULT_ACCOUNT_ID, DEFAULT_REGION,
    },
    serutil::StringList,
    statement::{TrustStatement, TrustStatementBuilder, TrustStatementBuilderError},
};
