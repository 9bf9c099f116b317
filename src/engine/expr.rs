use {
    crate::{digest::to_source_code_hash, ProvisionError},
    log::trace,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    std::fmt::{Display, Formatter, Result as FmtResult},
};

/// A pointer at an attribute of another resource, e.g. `api.code` / `metadata.digest`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Reference {
    address: String,
    path: Vec<String>,
}

impl Reference {
    /// Build a reference from a resource address and a dotted attribute path.
    pub fn new<A: Into<String>>(address: A, path: &str) -> Self {
        Self {
            address: address.into(),
            path: path.split('.').map(str::to_string).collect(),
        }
    }

    #[inline]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[inline]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Walk the path through a JSON value whose top level is the first path element.
    pub fn select<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.path[1..] {
            current = current.get(segment.as_str())?;
        }
        Some(current)
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}.{}", self.address, self.path.join("."))
    }
}

/// The desired value of a resource field.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldExpr {
    Literal(Value),
    Ref(Reference),

    /// Translate a URL-safe unpadded digest into a padded standard base64 source code hash.
    SourceCodeHash(Box<FieldExpr>),
}

impl FieldExpr {
    pub fn literal<V: Into<Value>>(value: V) -> Self {
        Self::Literal(value.into())
    }

    pub fn reference<A: Into<String>>(address: A, path: &str) -> Self {
        Self::Ref(Reference::new(address, path))
    }

    /// Every resource this expression reads from.
    pub fn references(&self) -> Vec<&Reference> {
        match self {
            Self::Literal(_) => vec![],
            Self::Ref(reference) => vec![reference],
            Self::SourceCodeHash(inner) => inner.references(),
        }
    }

    /// Evaluate the expression. `lookup` returns `None` for values that are not known yet, which propagates as
    /// `Ok(None)`.
    pub fn resolve<F>(&self, lookup: &F) -> Result<Option<Value>, ProvisionError>
    where
        F: Fn(&Reference) -> Result<Option<Value>, ProvisionError>,
    {
        match self {
            Self::Literal(value) => Ok(Some(value.clone())),
            Self::Ref(reference) => {
                let value = lookup(reference)?;
                trace!("resolve: {} -> {:?}", reference, value);
                Ok(value)
            }
            Self::SourceCodeHash(inner) => match inner.resolve(lookup)? {
                None => Ok(None),
                Some(Value::String(digest)) => Ok(Some(Value::String(to_source_code_hash(&digest)))),
                Some(other) => Err(ProvisionError::InvalidDigest(other.to_string())),
            },
        }
    }
}

impl From<Reference> for FieldExpr {
    fn from(reference: Reference) -> Self {
        Self::Ref(reference)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{FieldExpr, Reference},
        crate::ProvisionError,
        pretty_assertions::assert_eq,
        serde_json::{json, Value},
    };

    fn lookup(reference: &Reference) -> Result<Option<Value>, ProvisionError> {
        let code = json!({"metadata": {"digest": "abc", "padded": "ab-=", "revision": "empty"}, "etag": 7});
        match reference.address() {
            "app.code" => Ok(reference.select(&code[reference.path()[0].as_str()]).cloned()),
            "app.pending" => Ok(None),
            _ => Err(ProvisionError::UnresolvedReference(reference.to_string())),
        }
    }

    #[test_log::test]
    fn test_reference() {
        let r = Reference::new("app.code", "metadata.digest");
        assert_eq!(r.address(), "app.code");
        assert_eq!(r.path(), &["metadata".to_string(), "digest".to_string()]);
        assert_eq!(r.to_string(), "app.code.metadata.digest");
        assert_eq!(r.select(&json!({"digest": "x"})), Some(&json!("x")));
        assert_eq!(r.select(&json!({"other": "x"})), None);
    }

    #[test_log::test]
    fn test_resolve() {
        assert_eq!(FieldExpr::literal(10).resolve(&lookup).unwrap(), Some(json!(10)));
        assert_eq!(
            FieldExpr::reference("app.code", "metadata.revision").resolve(&lookup).unwrap(),
            Some(json!("empty"))
        );
        assert_eq!(FieldExpr::reference("app.pending", "arn").resolve(&lookup).unwrap(), None);

        let hash = FieldExpr::SourceCodeHash(Box::new(FieldExpr::reference("app.code", "metadata.digest")));
        assert_eq!(hash.resolve(&lookup).unwrap(), Some(json!("abc=")));
        assert_eq!(hash.references().len(), 1);

        let padded = FieldExpr::SourceCodeHash(Box::new(FieldExpr::reference("app.code", "metadata.padded")));
        assert_eq!(padded.resolve(&lookup).unwrap(), Some(json!("ab+=")));

        let bad = FieldExpr::SourceCodeHash(Box::new(FieldExpr::reference("app.code", "etag")));
        assert_eq!(bad.resolve(&lookup).unwrap_err(), ProvisionError::InvalidDigest("7".to_string()));

        let pending = FieldExpr::SourceCodeHash(Box::new(FieldExpr::reference("app.pending", "digest")));
        assert_eq!(pending.resolve(&lookup).unwrap(), None);

        assert!(FieldExpr::reference("nowhere", "arn").resolve(&lookup).is_err());
    }
}
