use {
    super::{AliasDescription, AliasOps, FunctionVersion, ObjectHead, ObjectStore, Provider, RemoteObject},
    crate::{
        digest::{compute_digest, to_source_code_hash},
        Attributes, ProvisionError, ResourceKind,
    },
    log::{debug, trace},
    serde_json::{json, Map, Value},
    std::collections::BTreeMap,
};

pub const DEFAULT_ACCOUNT_ID: &str = "123456789012";
pub const DEFAULT_REGION: &str = "us-east-1";

/// A cloud that lives in memory.
///
/// It keeps enough of the real services' behaviour for the modules to be exercised end to end: IAM names are
/// unique and attached policies can't be deleted, functions need their code object to exist and publish a new
/// version on every change, and aliases carry revision ids.
#[derive(Clone, Debug)]
pub struct InMemoryCloud {
    account_id: String,
    region: String,
    resources: BTreeMap<(ResourceKind, String), Attributes>,
    versions: BTreeMap<String, Vec<FunctionVersion>>,
    calls: Vec<String>,
    fail_next: Option<ResourceKind>,
    deny_head: bool,
    revision: u64,
}

impl Default for InMemoryCloud {
    fn default() -> Self {
        Self::new(DEFAULT_ACCOUNT_ID, DEFAULT_REGION)
    }
}

impl InMemoryCloud {
    pub fn new<A: Into<String>, R: Into<String>>(account_id: A, region: R) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
            resources: BTreeMap::new(),
            versions: BTreeMap::new(),
            calls: Vec::new(),
            fail_next: None,
            deny_head: false,
            revision: 0,
        }
    }

    #[inline]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    #[inline]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Mutating calls made so far, e.g. `create iam_role api`.
    #[inline]
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Make the next create, update or delete of `kind` fail.
    pub fn fail_next(&mut self, kind: ResourceKind) {
        self.fail_next = Some(kind);
    }

    /// Make `head_object` fail with access denied, as it does for low-privilege CI credentials.
    pub fn set_deny_head(&mut self, deny: bool) {
        self.deny_head = deny;
    }

    pub fn attributes(&self, kind: ResourceKind, id: &str) -> Option<&Attributes> {
        self.resources.get(&(kind, id.to_string()))
    }

    pub fn count(&self, kind: ResourceKind) -> usize {
        self.resources.keys().filter(|(k, _)| *k == kind).count()
    }

    /// Change an attribute behind the provisioner's back.
    pub fn set_attribute(
        &mut self,
        kind: ResourceKind,
        id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), ProvisionError> {
        let attrs = self
            .resources
            .get_mut(&(kind, id.to_string()))
            .ok_or_else(|| ProvisionError::ResourceNotFound(format!("{} {}", kind, id)))?;
        attrs.insert(key.to_string(), value);
        Ok(())
    }

    pub fn object_body(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let attrs = self.attributes(ResourceKind::S3Object, &object_id(bucket, key))?;
        attrs.get("content_base64").and_then(Value::as_str).and_then(|b64| base64::decode(b64).ok())
    }

    fn check_failure(&mut self, kind: ResourceKind, op: &str) -> Result<(), ProvisionError> {
        if self.fail_next == Some(kind) {
            self.fail_next = None;
            debug!("Injected failure: {} {}", op, kind);
            return Err(ProvisionError::Api(format!("ServiceException: injected failure during {} {}", op, kind)));
        }
        Ok(())
    }

    fn next_revision(&mut self) -> String {
        self.revision += 1;
        format!("rev-{}", self.revision)
    }

    fn exists(&self, kind: ResourceKind, id: &str) -> bool {
        self.resources.contains_key(&(kind, id.to_string()))
    }

    fn attached(&self, field: &str, value: &str) -> bool {
        self.resources.iter().any(|((k, _), attrs)| {
            *k == ResourceKind::IamRolePolicyAttachment && attrs.get(field).and_then(Value::as_str) == Some(value)
        })
    }

    fn function_arn(&self, function_name: &str) -> String {
        format!("arn:aws:lambda:{}:{}:function:{}", self.region, self.account_id, function_name)
    }

    fn invoke_arn(&self, target_arn: &str) -> String {
        format!("arn:aws:apigateway:{}:lambda:path/2015-03-31/functions/{}/invocations", self.region, target_arn)
    }

    fn publish_version(&mut self, function_name: &str) -> String {
        let versions = self.versions.entry(function_name.to_string()).or_default();
        let next = versions.iter().filter_map(|v| v.version.parse::<u64>().ok()).max().unwrap_or(0) + 1;
        versions.push(FunctionVersion {
            version: next.to_string(),
            description: String::new(),
        });
        next.to_string()
    }

    // Lambda reports the hash of the code it actually loaded, which is whatever the object held at the last create
    // or update.
    fn deployed_code_hash(&self, fields: &Attributes) -> Result<Option<String>, ProvisionError> {
        let bucket = fields.get("s3_bucket").and_then(Value::as_str);
        let key = fields.get("s3_key").and_then(Value::as_str);
        match (bucket, key) {
            (Some(bucket), Some(key)) => match self.object_body(bucket, key) {
                Some(body) => Ok(Some(to_source_code_hash(&compute_digest(&body)))),
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn store_object(&mut self, bucket: &str, key: &str, body: &[u8], metadata: Value) -> (String, Attributes) {
        let id = object_id(bucket, key);
        let mut attrs = Attributes::new();
        attrs.insert("bucket".to_string(), json!(bucket));
        attrs.insert("key".to_string(), json!(key));
        attrs.insert("content_base64".to_string(), json!(base64::encode(body)));
        attrs.insert("metadata".to_string(), metadata);
        attrs.insert("etag".to_string(), json!(format!("\"{}\"", compute_digest(body))));
        self.resources.insert((ResourceKind::S3Object, id.clone()), attrs.clone());
        (id, attrs)
    }

    fn alias_description(attrs: &Attributes) -> AliasDescription {
        let mut weights = BTreeMap::new();
        if let Some(Value::Object(map)) =
            attrs.get("routing_config").and_then(|rc| rc.get("additional_version_weights"))
        {
            for (version, weight) in map {
                if let Some(weight) = weight.as_f64() {
                    weights.insert(version.clone(), weight);
                }
            }
        }

        AliasDescription {
            function_version: attrs.get("function_version").and_then(Value::as_str).unwrap_or("$LATEST").to_string(),
            additional_version_weights: weights,
            revision_id: attrs.get("revision_id").and_then(Value::as_str).unwrap_or_default().to_string(),
        }
    }
}

fn object_id(bucket: &str, key: &str) -> String {
    format!("{}/{}", bucket, key)
}

fn str_field<'a>(fields: &'a Attributes, key: &str) -> Result<&'a str, ProvisionError> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ProvisionError::Api(format!("InvalidParameterValueException: {} is required", key)))
}

fn check_json_document(fields: &Attributes, key: &str) -> Result<(), ProvisionError> {
    if let Some(document) = fields.get(key) {
        let text = document.as_str().unwrap_or_default();
        if let Err(e) = serde_json::from_str::<Value>(text) {
            return Err(ProvisionError::Api(format!("MalformedPolicyDocument: {}: {}", key, e)));
        }
    }
    Ok(())
}

impl Provider for InMemoryCloud {
    fn create(&mut self, kind: ResourceKind, fields: &Attributes) -> Result<RemoteObject, ProvisionError> {
        self.check_failure(kind, "create")?;
        let mut attrs = fields.clone();

        let id = match kind {
            ResourceKind::IamPolicy => {
                let name = str_field(fields, "name")?;
                check_json_document(fields, "policy")?;
                let arn = format!("arn:aws:iam::{}:policy/{}", self.account_id, name);
                if self.exists(kind, &arn) {
                    return Err(ProvisionError::Api(format!("EntityAlreadyExists: policy {}", name)));
                }
                attrs.insert("arn".to_string(), json!(arn));
                arn
            }
            ResourceKind::IamRole => {
                let name = str_field(fields, "name")?.to_string();
                check_json_document(fields, "assume_role_policy")?;
                if self.exists(kind, &name) {
                    return Err(ProvisionError::Api(format!("EntityAlreadyExists: role {}", name)));
                }
                attrs.insert("arn".to_string(), json!(format!("arn:aws:iam::{}:role/{}", self.account_id, name)));
                name
            }
            ResourceKind::IamRolePolicyAttachment => {
                let role = str_field(fields, "role")?;
                let policy_arn = str_field(fields, "policy_arn")?;
                if !self.exists(ResourceKind::IamRole, role) {
                    return Err(ProvisionError::ResourceNotFound(format!("role {}", role)));
                }
                if !self.exists(ResourceKind::IamPolicy, policy_arn) {
                    return Err(ProvisionError::ResourceNotFound(format!("policy {}", policy_arn)));
                }
                format!("{}/{}", role, policy_arn)
            }
            ResourceKind::LogGroup => {
                let name = str_field(fields, "name")?.to_string();
                if self.exists(kind, &name) {
                    return Err(ProvisionError::Api(format!("ResourceAlreadyExistsException: log group {}", name)));
                }
                attrs.insert(
                    "arn".to_string(),
                    json!(format!("arn:aws:logs:{}:{}:log-group:{}", self.region, self.account_id, name)),
                );
                name
            }
            ResourceKind::S3Object => {
                let bucket = str_field(fields, "bucket")?.to_string();
                let key = str_field(fields, "key")?.to_string();
                let body = match fields.get("content_base64").and_then(Value::as_str) {
                    Some(b64) => base64::decode(b64)
                        .map_err(|e| ProvisionError::Api(format!("InvalidArgument: content_base64: {}", e)))?,
                    None => Vec::new(),
                };
                let metadata = fields.get("metadata").cloned().unwrap_or_else(|| Value::Object(Map::new()));
                let (id, stored) = self.store_object(&bucket, &key, &body, metadata);
                self.calls.push(format!("create {} {}", kind, id));
                return Ok(RemoteObject {
                    id,
                    attributes: stored,
                });
            }
            ResourceKind::LambdaFunction => {
                let name = str_field(fields, "function_name")?.to_string();
                let bucket = str_field(fields, "s3_bucket")?;
                let key = str_field(fields, "s3_key")?;
                if self.exists(kind, &name) {
                    return Err(ProvisionError::Api(format!("ResourceConflictException: function {}", name)));
                }
                if !self.exists(ResourceKind::S3Object, &object_id(bucket, key)) {
                    return Err(ProvisionError::Api(format!(
                        "InvalidParameterValueException: s3://{}/{} does not exist",
                        bucket, key
                    )));
                }

                if let Some(hash) = self.deployed_code_hash(fields)? {
                    attrs.insert("source_code_hash".to_string(), json!(hash));
                }

                let arn = self.function_arn(&name);
                let publish = fields.get("publish").and_then(Value::as_bool).unwrap_or(false);
                let version = if publish {
                    self.publish_version(&name)
                } else {
                    self.versions.entry(name.clone()).or_default();
                    "$LATEST".to_string()
                };
                attrs.insert("qualified_arn".to_string(), json!(format!("{}:{}", arn, version)));
                attrs.insert("invoke_arn".to_string(), json!(self.invoke_arn(&arn)));
                attrs.insert("arn".to_string(), json!(arn));
                attrs.insert("version".to_string(), json!(version));
                name
            }
            ResourceKind::LambdaAlias => {
                let name = str_field(fields, "name")?;
                let function_name = str_field(fields, "function_name")?;
                let function_version = str_field(fields, "function_version")?;
                if !self.exists(ResourceKind::LambdaFunction, function_name) {
                    return Err(ProvisionError::ResourceNotFound(format!("function {}", function_name)));
                }
                let published = self.versions.get(function_name).map_or(false, |versions| {
                    versions.iter().any(|v| v.version == function_version)
                });
                if function_version != "$LATEST" && !published {
                    return Err(ProvisionError::ResourceNotFound(format!(
                        "version {} of {}",
                        function_version, function_name
                    )));
                }

                let id = format!("{}:{}", function_name, name);
                if self.exists(kind, &id) {
                    return Err(ProvisionError::Api(format!("ResourceConflictException: alias {}", id)));
                }
                let arn = format!("{}:{}", self.function_arn(function_name), name);
                if !attrs.contains_key("routing_config") {
                    attrs.insert("routing_config".to_string(), json!({"additional_version_weights": {}}));
                }
                attrs.insert("invoke_arn".to_string(), json!(self.invoke_arn(&arn)));
                attrs.insert("arn".to_string(), json!(arn));
                attrs.insert("revision_id".to_string(), json!(self.next_revision()));
                id
            }
        };

        self.calls.push(format!("create {} {}", kind, id));
        self.resources.insert((kind, id.clone()), attrs.clone());
        Ok(RemoteObject {
            id,
            attributes: attrs,
        })
    }

    fn read(&self, kind: ResourceKind, id: &str) -> Result<Option<RemoteObject>, ProvisionError> {
        trace!("read {} {}", kind, id);
        Ok(self.attributes(kind, id).map(|attrs| RemoteObject {
            id: id.to_string(),
            attributes: attrs.clone(),
        }))
    }

    fn update(&mut self, kind: ResourceKind, id: &str, changes: &Attributes) -> Result<RemoteObject, ProvisionError> {
        self.check_failure(kind, "update")?;
        if !self.exists(kind, id) {
            return Err(ProvisionError::ResourceNotFound(format!("{} {}", kind, id)));
        }
        match kind {
            ResourceKind::IamPolicy => check_json_document(changes, "policy")?,
            ResourceKind::IamRole => check_json_document(changes, "assume_role_policy")?,
            _ => (),
        }

        let mut attrs = self.resources[&(kind, id.to_string())].clone();
        for (key, value) in changes {
            if value.is_null() {
                attrs.remove(key);
            } else {
                attrs.insert(key.clone(), value.clone());
            }
        }

        if kind == ResourceKind::LambdaFunction {
            if let Some(hash) = self.deployed_code_hash(&attrs)? {
                attrs.insert("source_code_hash".to_string(), json!(hash));
            }
        }

        match kind {
            ResourceKind::LambdaFunction if attrs.get("publish").and_then(Value::as_bool).unwrap_or(false) => {
                let version = self.publish_version(id);
                let arn = self.function_arn(id);
                attrs.insert("qualified_arn".to_string(), json!(format!("{}:{}", arn, version)));
                attrs.insert("version".to_string(), json!(version));
            }
            ResourceKind::LambdaAlias => {
                attrs.insert("revision_id".to_string(), json!(self.next_revision()));
            }
            _ => (),
        }

        self.calls.push(format!("update {} {}", kind, id));
        self.resources.insert((kind, id.to_string()), attrs.clone());
        Ok(RemoteObject {
            id: id.to_string(),
            attributes: attrs,
        })
    }

    fn delete(&mut self, kind: ResourceKind, id: &str) -> Result<(), ProvisionError> {
        self.check_failure(kind, "delete")?;
        if !self.exists(kind, id) {
            return Err(ProvisionError::ResourceNotFound(format!("{} {}", kind, id)));
        }

        match kind {
            ResourceKind::IamPolicy if self.attached("policy_arn", id) => {
                return Err(ProvisionError::Api(format!("DeleteConflict: policy {} is still attached", id)));
            }
            ResourceKind::IamRole if self.attached("role", id) => {
                return Err(ProvisionError::Api(format!("DeleteConflict: role {} has attached policies", id)));
            }
            ResourceKind::LambdaFunction => {
                let prefix = format!("{}:", id);
                self.resources
                    .retain(|(k, alias_id), _| !(*k == ResourceKind::LambdaAlias && alias_id.starts_with(&prefix)));
                self.versions.remove(id);
            }
            _ => (),
        }

        self.calls.push(format!("delete {} {}", kind, id));
        self.resources.remove(&(kind, id.to_string()));
        Ok(())
    }
}

impl ObjectStore for InMemoryCloud {
    fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectHead>, ProvisionError> {
        if self.deny_head {
            return Err(ProvisionError::AccessDenied(format!("s3://{}/{}", bucket, key)));
        }

        Ok(self.attributes(ResourceKind::S3Object, &object_id(bucket, key)).map(|attrs| {
            let mut metadata = BTreeMap::new();
            if let Some(Value::Object(map)) = attrs.get("metadata") {
                for (k, v) in map {
                    if let Some(v) = v.as_str() {
                        metadata.insert(k.clone(), v.to_string());
                    }
                }
            }
            ObjectHead {
                etag: attrs.get("etag").and_then(Value::as_str).unwrap_or_default().to_string(),
                metadata,
            }
        }))
    }

    fn put_object(
        &mut self,
        bucket: &str,
        key: &str,
        body: &[u8],
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), ProvisionError> {
        let metadata: Map<String, Value> = metadata.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
        let (id, _) = self.store_object(bucket, key, body, Value::Object(metadata));
        self.calls.push(format!("put_object {}", id));
        Ok(())
    }
}

impl AliasOps for InMemoryCloud {
    fn list_functions(&self) -> Result<Vec<String>, ProvisionError> {
        Ok(self
            .resources
            .keys()
            .filter(|(kind, _)| *kind == ResourceKind::LambdaFunction)
            .map(|(_, name)| name.clone())
            .collect())
    }

    fn list_versions(&self, function_name: &str) -> Result<Vec<FunctionVersion>, ProvisionError> {
        self.versions
            .get(function_name)
            .cloned()
            .ok_or_else(|| ProvisionError::ResourceNotFound(format!("function {}", function_name)))
    }

    fn get_alias(&self, function_name: &str, alias: &str) -> Result<Option<AliasDescription>, ProvisionError> {
        let id = format!("{}:{}", function_name, alias);
        Ok(self.attributes(ResourceKind::LambdaAlias, &id).map(Self::alias_description))
    }

    fn update_alias(
        &mut self,
        function_name: &str,
        alias: &str,
        function_version: &str,
        additional_version_weights: &BTreeMap<String, f64>,
        revision_id: &str,
    ) -> Result<AliasDescription, ProvisionError> {
        let id = format!("{}:{}", function_name, alias);
        let current = self
            .attributes(ResourceKind::LambdaAlias, &id)
            .map(Self::alias_description)
            .ok_or_else(|| ProvisionError::ResourceNotFound(format!("alias {}", id)))?;

        if current.revision_id != revision_id {
            return Err(ProvisionError::PreconditionFailed(format!(
                "The Revision Id provided does not match the latest Revision Id for {}",
                id
            )));
        }

        let versions = self.list_versions(function_name)?;
        for version in std::iter::once(function_version).chain(additional_version_weights.keys().map(String::as_str)) {
            if !versions.iter().any(|v| v.version == version) {
                return Err(ProvisionError::ResourceNotFound(format!("version {} of {}", version, function_name)));
            }
        }

        let revision = self.next_revision();
        let weights: Map<String, Value> =
            additional_version_weights.iter().map(|(k, w)| (k.clone(), json!(w))).collect();
        if let Some(attrs) = self.resources.get_mut(&(ResourceKind::LambdaAlias, id.clone())) {
            attrs.insert("function_version".to_string(), json!(function_version));
            attrs.insert("routing_config".to_string(), json!({ "additional_version_weights": weights }));
            attrs.insert("revision_id".to_string(), json!(revision));
        }
        self.calls.push(format!("update_alias {}", id));

        self.get_alias(function_name, alias)?
            .ok_or_else(|| ProvisionError::ResourceNotFound(format!("alias {}", id)))
    }
}
