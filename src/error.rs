use {
    std::{
        error::Error,
        fmt::{Display, Formatter, Result as FmtResult},
        io::Error as IoError,
    },
    zip::result::ZipError,
};

#[derive(Debug, Eq, PartialEq)]
pub enum ProvisionError {
    AccessDenied(String),
    Api(String),
    DependencyCycle(Vec<String>),
    DuplicateAddress(String),
    InvalidAliasSelection(String),
    InvalidConditionOperator(String),
    InvalidDigest(String),
    InvalidPolicyDocument(String),
    InvalidPolicyVersion(String),
    InvalidPrincipal(String),
    InvalidResource(String),
    InvalidRoleArn(String),
    Io(String),
    MixedPrincipalIdentifiers(String),
    NoDeploymentOptions(String),
    PreconditionFailed(String),
    ResourceNotFound(String),
    Serialization(String),
    UnknownDependency(String, String),
    UnresolvedReference(String),
}

impl Display for ProvisionError {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::AccessDenied(resource) => write!(f, "Access denied: {}", resource),
            Self::Api(msg) => write!(f, "API request rejected: {}", msg),
            Self::DependencyCycle(addresses) => write!(f, "Dependency cycle: {}", addresses.join(" -> ")),
            Self::DuplicateAddress(address) => write!(f, "Duplicate resource address: {}", address),
            Self::InvalidAliasSelection(msg) => write!(f, "Invalid alias selection: {}", msg),
            Self::InvalidConditionOperator(operator) => write!(f, "Invalid condition operator: {}", operator),
            Self::InvalidDigest(digest) => write!(f, "Invalid digest: {}", digest),
            Self::InvalidPolicyDocument(msg) => write!(f, "Invalid policy document: {}", msg),
            Self::InvalidPolicyVersion(version) => write!(f, "Invalid policy version: {}", version),
            Self::InvalidPrincipal(principal) => write!(f, "Invalid principal: {}", principal),
            Self::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Self::InvalidRoleArn(arn) => write!(f, "Invalid role ARN: {}", arn),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
            Self::MixedPrincipalIdentifiers(identifiers) => {
                write!(f, "Principal mixes OIDC provider and non-OIDC identifiers: {}", identifiers)
            }
            Self::NoDeploymentOptions(function) => {
                write!(f, "No deployment options available for {}, try deploying another version", function)
            }
            Self::PreconditionFailed(msg) => write!(f, "Precondition failed: {}", msg),
            Self::ResourceNotFound(resource) => write!(f, "Resource not found: {}", resource),
            Self::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Self::UnknownDependency(address, dependency) => {
                write!(f, "Resource {} depends on undeclared resource {}", address, dependency)
            }
            Self::UnresolvedReference(reference) => write!(f, "Unresolved reference: {}", reference),
        }
    }
}

impl Error for ProvisionError {}

impl From<IoError> for ProvisionError {
    fn from(e: IoError) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ProvisionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<ZipError> for ProvisionError {
    fn from(e: ZipError) -> Self {
        match e {
            ZipError::Io(e) => e.into(),
            e => Self::Io(e.to_string()),
        }
    }
}
