use {
    crate::ProvisionError,
    lazy_static::lazy_static,
    log::trace,
    regex::Regex,
    serde::{
        de::{self, Deserializer, Unexpected, Visitor},
        ser::Serializer,
        Deserialize, Serialize,
    },
    std::fmt::{Display, Formatter, Result as FmtResult},
};

lazy_static! {
    static ref OIDC_PROVIDER_ARN: Regex = Regex::new(r"^arn:aws:iam::[^:]*:oidc-provider/").unwrap();
}

/// The STS action a trust statement allows.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AssumeAction {
    /// `sts:AssumeRole`
    StandardAssume,

    /// `sts:AssumeRoleWithWebIdentity`
    WebIdentityAssume,
}

impl AssumeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StandardAssume => "sts:AssumeRole",
            Self::WebIdentityAssume => "sts:AssumeRoleWithWebIdentity",
        }
    }

    /// Pick the assumption action for a principal's identifiers.
    ///
    /// Identifiers that are OIDC provider ARNs assume the role with a web identity token; anything else uses the
    /// standard assumption. An entry mixing the two kinds is rejected since no single action is right for it.
    pub fn classify<S: AsRef<str>>(identifiers: &[S]) -> Result<Self, ProvisionError> {
        let first = match identifiers.first() {
            Some(first) => first.as_ref(),
            None => return Err(ProvisionError::InvalidPrincipal("principal has no identifiers".to_string())),
        };

        let web_identity = is_oidc_provider_arn(first);
        for identifier in &identifiers[1..] {
            if is_oidc_provider_arn(identifier.as_ref()) != web_identity {
                let joined = identifiers.iter().map(|i| i.as_ref()).collect::<Vec<_>>().join(", ");
                return Err(ProvisionError::MixedPrincipalIdentifiers(joined));
            }
        }

        let action = if web_identity {
            Self::WebIdentityAssume
        } else {
            Self::StandardAssume
        };
        trace!("classify: {} -> {}", first, action);
        Ok(action)
    }
}

#[inline]
pub fn is_oidc_provider_arn(identifier: &str) -> bool {
    OIDC_PROVIDER_ARN.is_match(identifier)
}

impl Display for AssumeAction {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.write_str(self.as_str())
    }
}

struct AssumeActionVisitor;

impl<'de> Visitor<'de> for AssumeActionVisitor {
    type Value = AssumeAction;

    fn expecting(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "sts:AssumeRole or sts:AssumeRoleWithWebIdentity")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        match v {
            "sts:AssumeRole" => Ok(AssumeAction::StandardAssume),
            "sts:AssumeRoleWithWebIdentity" => Ok(AssumeAction::WebIdentityAssume),
            _ => Err(E::invalid_value(Unexpected::Str(v), &self)),
        }
    }
}

impl<'de> Deserialize<'de> for AssumeAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(AssumeActionVisitor)
    }
}

impl Serialize for AssumeAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use {
        crate::{action::is_oidc_provider_arn, AssumeAction, ProvisionError},
        pretty_assertions::assert_eq,
    };

    const GITHUB_OIDC: &str = "arn:aws:iam::123456789012:oidc-provider/token.actions.githubusercontent.com";

    #[test_log::test]
    fn test_pattern() {
        assert!(is_oidc_provider_arn(GITHUB_OIDC));
        assert!(is_oidc_provider_arn("arn:aws:iam:::oidc-provider/example.com"));
        assert!(!is_oidc_provider_arn("arn:aws:iam::123456789012:role/deployer"));
        assert!(!is_oidc_provider_arn("arn:aws-cn:iam::123456789012:oidc-provider/example.com"));
        assert!(!is_oidc_provider_arn("lambda.amazonaws.com"));
        assert!(!is_oidc_provider_arn(" arn:aws:iam::123456789012:oidc-provider/example.com"));
    }

    #[test_log::test]
    fn test_classify() {
        assert_eq!(AssumeAction::classify(&[GITHUB_OIDC]).unwrap(), AssumeAction::WebIdentityAssume);
        assert_eq!(AssumeAction::classify(&["lambda.amazonaws.com"]).unwrap(), AssumeAction::StandardAssume);
        assert_eq!(
            AssumeAction::classify(&["123456789012", "arn:aws:iam::123456789012:root"]).unwrap(),
            AssumeAction::StandardAssume
        );
        assert_eq!(
            AssumeAction::classify(&[GITHUB_OIDC, "arn:aws:iam::123456789012:oidc-provider/gitlab.com"]).unwrap(),
            AssumeAction::WebIdentityAssume
        );
    }

    #[test_log::test]
    fn test_classify_rejects_mixed_and_empty() {
        let e = AssumeAction::classify(&[GITHUB_OIDC, "123456789012"]).unwrap_err();
        assert_eq!(e, ProvisionError::MixedPrincipalIdentifiers(format!("{}, 123456789012", GITHUB_OIDC)));

        let e = AssumeAction::classify(&["123456789012", GITHUB_OIDC]).unwrap_err();
        assert!(matches!(e, ProvisionError::MixedPrincipalIdentifiers(_)));

        let empty: [&str; 0] = [];
        assert!(matches!(AssumeAction::classify(&empty).unwrap_err(), ProvisionError::InvalidPrincipal(_)));
    }

    #[test_log::test]
    fn test_serde() {
        assert_eq!(
            serde_json::to_string(&AssumeAction::WebIdentityAssume).unwrap(),
            r#""sts:AssumeRoleWithWebIdentity""#
        );
        assert_eq!(serde_json::from_str::<AssumeAction>(r#""sts:AssumeRole""#).unwrap(), AssumeAction::StandardAssume);
        assert!(serde_json::from_str::<AssumeAction>(r#""sts:TagSession""#).is_err());
    }
}
