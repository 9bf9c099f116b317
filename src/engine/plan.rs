use {
    super::{Reference, ResourceKind, ResourceSpec, State, TaskGraph},
    crate::{display_json, ProvisionError},
    log::{debug, info},
    serde::{ser::Serializer, Serialize},
    serde_json::Value,
    std::{
        collections::{BTreeSet, HashMap, HashSet},
        fmt::{Display, Formatter, Result as FmtResult},
    },
};

/// What a plan intends to do with one resource.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Update,
    Replace,
    Delete,
    NoOp,
}

impl Display for ChangeAction {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::Create => f.write_str("create"),
            Self::Update => f.write_str("update"),
            Self::Replace => f.write_str("replace"),
            Self::Delete => f.write_str("delete"),
            Self::NoOp => f.write_str("no-op"),
        }
    }
}

/// A planned field value; values that depend on resources not yet created are unknown until apply.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PlannedValue {
    Known(Value),
    Unknown,
}

impl Serialize for PlannedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(value) => value.serialize(serializer),
            Self::Unknown => serializer.serialize_str("(known after apply)"),
        }
    }
}

/// A single field difference. `after` is `None` when the field is removed.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<PlannedValue>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Change {
    pub address: String,
    pub kind: ResourceKind,
    pub action: ChangeAction,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldChange>,
}

/// An ordered list of changes: creates, updates and replacements in dependency order, then deletions in reverse
/// dependency order.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Plan {
    changes: Vec<Change>,
}

display_json!(Plan);

impl Plan {
    #[inline]
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn get(&self, address: &str) -> Option<&Change> {
        self.changes.iter().find(|c| c.address == address)
    }

    pub fn action(&self, address: &str) -> Option<ChangeAction> {
        self.get(address).map(|c| c.action)
    }

    /// True when applying would not touch anything.
    pub fn is_empty(&self) -> bool {
        self.changes.iter().all(|c| c.action == ChangeAction::NoOp)
    }

    pub fn count(&self, action: ChangeAction) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }
}

/// Compare the desired resources against recorded state.
pub fn plan(specs: &[ResourceSpec], state: &State) -> Result<Plan, ProvisionError> {
    let graph = TaskGraph::new(specs.iter().map(|s| (s.address().to_string(), s.dependencies())))?;
    let by_address: HashMap<&str, &ResourceSpec> = specs.iter().map(|s| (s.address(), s)).collect();

    let mut pending: HashSet<String> = HashSet::new();
    let mut changes = Vec::with_capacity(specs.len());

    for address in graph.order()? {
        let spec = by_address[address.as_str()];
        let lookup = |r: &Reference| -> Result<Option<Value>, ProvisionError> {
            if pending.contains(r.address()) {
                Ok(None)
            } else {
                Ok(state.lookup(r))
            }
        };

        let change = match state.get(&address) {
            None => {
                let mut fields = Vec::new();
                for (field, expr) in spec.managed().iter().chain(spec.external().iter()) {
                    fields.push(FieldChange {
                        field: field.clone(),
                        before: None,
                        after: Some(planned(expr.resolve(&lookup)?)),
                    });
                }
                Change {
                    address: address.clone(),
                    kind: spec.kind(),
                    action: ChangeAction::Create,
                    fields,
                }
            }
            Some(record) => {
                let mut fields = Vec::new();
                let keys: BTreeSet<&String> = spec.managed().keys().chain(record.managed.keys()).collect();
                for field in keys {
                    let desired = match spec.managed().get(field) {
                        Some(expr) => Some(planned(expr.resolve(&lookup)?)),
                        None => None,
                    };
                    let current = record.managed.get(field);

                    let differs = match (&desired, current) {
                        (Some(PlannedValue::Known(d)), Some(c)) => d != c,
                        (None, None) => false,
                        _ => true,
                    };

                    if differs {
                        fields.push(FieldChange {
                            field: field.clone(),
                            before: current.cloned(),
                            after: desired,
                        });
                    }
                }

                let action = if record.kind != spec.kind() || fields.iter().any(|f| spec.force_new().contains(&f.field))
                {
                    ChangeAction::Replace
                } else if fields.is_empty() {
                    ChangeAction::NoOp
                } else {
                    ChangeAction::Update
                };

                Change {
                    address: address.clone(),
                    kind: spec.kind(),
                    action,
                    fields,
                }
            }
        };

        if matches!(change.action, ChangeAction::Create | ChangeAction::Replace) {
            pending.insert(address.clone());
        }

        if change.action == ChangeAction::NoOp {
            debug!("{}: no changes", address);
        } else {
            info!("{}: will {} ({} field(s))", address, change.action, change.fields.len());
        }
        changes.push(change);
    }

    // Resources recorded in state but no longer declared go away, dependents first.
    let orphans: Vec<(&String, Vec<String>)> = state
        .resources()
        .iter()
        .filter(|(address, _)| !by_address.contains_key(address.as_str()))
        .map(|(address, record)| {
            let deps =
                record.depends_on.iter().filter(|d| !by_address.contains_key(d.as_str()) && state.get(d).is_some());
            (address, deps.cloned().collect())
        })
        .collect();

    if !orphans.is_empty() {
        let kinds: HashMap<&str, ResourceKind> =
            orphans.iter().map(|(address, _)| (address.as_str(), state.resources()[*address].kind)).collect();
        let orphan_graph = TaskGraph::new(orphans.iter().map(|(address, deps)| ((*address).clone(), deps.clone())))?;
        for address in orphan_graph.reverse_order()? {
            info!("{}: will delete", address);
            changes.push(Change {
                kind: kinds[address.as_str()],
                address,
                action: ChangeAction::Delete,
                fields: vec![],
            });
        }
    }

    Ok(Plan {
        changes,
    })
}

fn planned(value: Option<Value>) -> PlannedValue {
    match value {
        Some(value) => PlannedValue::Known(value),
        None => PlannedValue::Unknown,
    }
}
