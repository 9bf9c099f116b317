use {
    crate::{serutil::StringList, ProvisionError},
    serde::{
        de::{self, Deserializer, Unexpected, Visitor},
        ser::Serializer,
        Deserialize, Serialize,
    },
    std::{
        collections::BTreeMap,
        fmt::{Display, Formatter, Result as FmtResult},
        str::FromStr,
    },
};

macro_rules! condition_ops {
    ($($op:ident),* $(,)?) => {
        /// IAM condition operators accepted in a trust statement.
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub enum ConditionOp {
            $($op,)*
        }

        impl ConditionOp {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$op => stringify!($op),)*
                }
            }
        }

        impl FromStr for ConditionOp {
            type Err = ProvisionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($op) => Ok(Self::$op),)*
                    _ => Err(ProvisionError::InvalidConditionOperator(s.to_string())),
                }
            }
        }
    };
}

condition_ops! {
    ArnEquals,
    ArnEqualsIfExists,
    ArnLike,
    ArnLikeIfExists,
    ArnNotEquals,
    ArnNotEqualsIfExists,
    ArnNotLike,
    ArnNotLikeIfExists,
    BinaryEquals,
    BinaryEqualsIfExists,
    Bool,
    BoolIfExists,
    DateEquals,
    DateEqualsIfExists,
    DateGreaterThan,
    DateGreaterThanEquals,
    DateGreaterThanEqualsIfExists,
    DateGreaterThanIfExists,
    DateLessThan,
    DateLessThanEquals,
    DateLessThanEqualsIfExists,
    DateLessThanIfExists,
    DateNotEquals,
    DateNotEqualsIfExists,
    IpAddress,
    IpAddressIfExists,
    NotIpAddress,
    NotIpAddressIfExists,
    Null,
    NumericEquals,
    NumericEqualsIfExists,
    NumericGreaterThan,
    NumericGreaterThanEquals,
    NumericGreaterThanEqualsIfExists,
    NumericGreaterThanIfExists,
    NumericLessThan,
    NumericLessThanEquals,
    NumericLessThanEqualsIfExists,
    NumericLessThanIfExists,
    NumericNotEquals,
    NumericNotEqualsIfExists,
    StringEquals,
    StringEqualsIfExists,
    StringEqualsIgnoreCase,
    StringEqualsIgnoreCaseIfExists,
    StringLike,
    StringLikeIfExists,
    StringNotEquals,
    StringNotEqualsIfExists,
    StringNotEqualsIgnoreCase,
    StringNotEqualsIgnoreCaseIfExists,
    StringNotLike,
    StringNotLikeIfExists,
}

impl Display for ConditionOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl Serialize for ConditionOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

struct ConditionOpVisitor;

impl<'de> Visitor<'de> for ConditionOpVisitor {
    type Value = ConditionOp;

    fn expecting(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "an IAM condition operator")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        ConditionOp::from_str(v).map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }
}

impl<'de> Deserialize<'de> for ConditionOp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(ConditionOpVisitor)
    }
}

/// How a multivalued condition key is matched against the operator's values.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SetQualifier {
    ForAllValues,
    ForAnyValue,
}

impl SetQualifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ForAllValues => "ForAllValues",
            Self::ForAnyValue => "ForAnyValue",
        }
    }
}

impl Display for SetQualifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A condition operator as written in a policy, e.g. `StringLike` or `ForAnyValue:StringLike`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct QualifiedOp {
    qualifier: Option<SetQualifier>,
    op: ConditionOp,
}

impl QualifiedOp {
    pub fn new(qualifier: Option<SetQualifier>, op: ConditionOp) -> Self {
        Self {
            qualifier,
            op,
        }
    }

    #[inline]
    pub fn qualifier(&self) -> Option<SetQualifier> {
        self.qualifier
    }

    #[inline]
    pub fn op(&self) -> ConditionOp {
        self.op
    }
}

impl From<ConditionOp> for QualifiedOp {
    fn from(op: ConditionOp) -> Self {
        Self::new(None, op)
    }
}

impl PartialEq<ConditionOp> for QualifiedOp {
    fn eq(&self, other: &ConditionOp) -> bool {
        self.qualifier.is_none() && self.op == *other
    }
}

impl Display for QualifiedOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.qualifier {
            Some(qualifier) => write!(f, "{}:{}", qualifier, self.op),
            None => f.write_str(self.op.as_str()),
        }
    }
}

impl FromStr for QualifiedOp {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (qualifier, op) = match s.split_once(':') {
            Some(("ForAllValues", op)) => (Some(SetQualifier::ForAllValues), op),
            Some(("ForAnyValue", op)) => (Some(SetQualifier::ForAnyValue), op),
            Some(_) => return Err(ProvisionError::InvalidConditionOperator(s.to_string())),
            None => (None, s),
        };

        match ConditionOp::from_str(op) {
            Ok(op) => Ok(Self::new(qualifier, op)),
            Err(_) => Err(ProvisionError::InvalidConditionOperator(s.to_string())),
        }
    }
}

struct QualifiedOpVisitor;

impl<'de> Visitor<'de> for QualifiedOpVisitor {
    type Value = QualifiedOp;

    fn expecting(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "an IAM condition operator")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        QualifiedOp::from_str(v).map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }
}

impl<'de> Deserialize<'de> for QualifiedOp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(QualifiedOpVisitor)
    }
}

impl Serialize for QualifiedOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub type ConditionMap = BTreeMap<String, StringList>;
pub type Condition = BTreeMap<QualifiedOp, ConditionMap>;
