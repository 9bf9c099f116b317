use {
    super::{Reference, ResourceKind},
    crate::{display_json, from_str_json, ProvisionError},
    log::debug,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    std::{
        collections::BTreeMap,
        fs,
        io::ErrorKind,
        path::Path,
        str::FromStr,
    },
};

pub const STATE_FORMAT_VERSION: u32 = 1;

pub type Attributes = BTreeMap<String, Value>;

/// What is known about one provisioned resource.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ResourceRecord {
    pub kind: ResourceKind,

    /// The identifier the provider uses for this resource.
    pub id: String,

    /// Last known values of the reconciled fields.
    #[serde(default)]
    pub managed: Attributes,

    /// Last known values of the fields owned outside of this system. Never diffed.
    #[serde(default)]
    pub external: Attributes,

    /// Every attribute the provider reported, including computed ones such as ARNs and versions.
    #[serde(default)]
    pub attributes: Attributes,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub create_before_destroy: bool,
}

impl ResourceRecord {
    /// Look up the top-level attribute named by `reference` and walk the rest of its path.
    pub fn lookup(&self, reference: &Reference) -> Option<Value> {
        let top = reference.path().first()?;
        match self.attributes.get(top).or_else(|| self.external.get(top)).or_else(|| self.managed.get(top)) {
            Some(root) => reference.select(root).cloned(),
            None if top == "id" && reference.path().len() == 1 => Some(Value::String(self.id.clone())),
            None => None,
        }
    }
}

/// A resource replaced create-before-destroy whose old object still has to be deleted.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DeposedRecord {
    pub address: String,
    pub record: ResourceRecord,
}

/// The persisted record of everything provisioned so far.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct State {
    format_version: u32,
    serial: u64,

    #[serde(default)]
    resources: BTreeMap<String, ResourceRecord>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    deposed: Vec<DeposedRecord>,
}

display_json!(State);
from_str_json!(State);

impl Default for State {
    fn default() -> Self {
        Self {
            format_version: STATE_FORMAT_VERSION,
            serial: 0,
            resources: BTreeMap::new(),
            deposed: Vec::new(),
        }
    }
}

impl State {
    /// Read state from `path`. A missing file is an empty state.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ProvisionError> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No state at {}; starting empty", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let state = Self::from_str(&text)?;
        if state.format_version != STATE_FORMAT_VERSION {
            return Err(ProvisionError::Serialization(format!(
                "unsupported state format version {}",
                state.format_version
            )));
        }
        Ok(state)
    }

    /// Write state to `path`, replacing the previous file only once the new one is fully written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ProvisionError> {
        let path = path.as_ref();
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, format!("{}\n", self))?;
        fs::rename(&tmp, path)?;
        debug!("Saved state serial {} to {}", self.serial, path.display());
        Ok(())
    }

    #[inline]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub(crate) fn bump_serial(&mut self) {
        self.serial += 1;
    }

    #[inline]
    pub fn resources(&self) -> &BTreeMap<String, ResourceRecord> {
        &self.resources
    }

    #[inline]
    pub fn get(&self, address: &str) -> Option<&ResourceRecord> {
        self.resources.get(address)
    }

    pub(crate) fn get_mut(&mut self, address: &str) -> Option<&mut ResourceRecord> {
        self.resources.get_mut(address)
    }

    pub(crate) fn insert(&mut self, address: String, record: ResourceRecord) -> Option<ResourceRecord> {
        self.resources.insert(address, record)
    }

    pub(crate) fn remove(&mut self, address: &str) -> Option<ResourceRecord> {
        self.resources.remove(address)
    }

    #[inline]
    pub fn deposed(&self) -> &[DeposedRecord] {
        &self.deposed
    }

    pub(crate) fn depose(&mut self, address: String, record: ResourceRecord) {
        self.deposed.push(DeposedRecord {
            address,
            record,
        });
    }

    pub(crate) fn take_deposed(&mut self) -> Vec<DeposedRecord> {
        std::mem::take(&mut self.deposed)
    }

    /// Resolve a reference against what has been recorded. Unknown resources and attributes are `None`.
    pub fn lookup(&self, reference: &Reference) -> Option<Value> {
        self.resources.get(reference.address()).and_then(|record| record.lookup(reference))
    }
}
