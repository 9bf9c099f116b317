//! Reconciliation of declared resources against recorded state.
//!
//! Resources form a dependency graph derived from the references between their fields. A provisioning cycle is
//! `refresh` (pull the remote view into state), `plan` (diff desired against recorded) and `apply` (walk the plan in
//! dependency order). Fields a resource marks as external are sent once at creation and then only ever read back.

mod expr;
mod graph;
mod plan;
mod resource;
mod state;

pub use {
    expr::{FieldExpr, Reference},
    graph::TaskGraph,
    plan::{plan, Change, ChangeAction, FieldChange, Plan, PlannedValue},
    resource::{ResourceKind, ResourceSpec, ResourceSpecBuilder, ResourceSpecBuilderError},
    state::{Attributes, DeposedRecord, ResourceRecord, State, STATE_FORMAT_VERSION},
};

use {
    crate::{display_json, provider::Provider, ProvisionError},
    log::{debug, info, warn},
    serde::Serialize,
    serde_json::Value,
    std::collections::{BTreeMap, BTreeSet, HashMap},
};

/// Counts of what an apply or destroy actually did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ApplySummary {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub deleted: usize,
}

display_json!(ApplySummary);

/// Pull the provider's view of every recorded resource into state.
///
/// Managed fields are overwritten with what the provider reports so that drift shows up in the next plan. External
/// fields are overwritten too, which is how out-of-band changes get recorded without ever being reverted. Records
/// whose remote object is gone are dropped.
pub fn refresh(specs: &[ResourceSpec], state: &mut State, provider: &dyn Provider) -> Result<(), ProvisionError> {
    let by_address: HashMap<&str, &ResourceSpec> = specs.iter().map(|s| (s.address(), s)).collect();
    let addresses: Vec<String> = state.resources().keys().cloned().collect();

    for address in addresses {
        let (kind, id) = match state.get(&address) {
            Some(record) => (record.kind, record.id.clone()),
            None => continue,
        };

        let remote = match provider.read(kind, &id)? {
            Some(remote) => remote,
            None => {
                warn!("{}: {} {} no longer exists; forgetting it", address, kind, id);
                state.remove(&address);
                continue;
            }
        };

        let record = match state.get_mut(&address) {
            Some(record) => record,
            None => continue,
        };

        let mut keys: BTreeSet<String> = record.managed.keys().cloned().collect();
        if let Some(spec) = by_address.get(address.as_str()) {
            keys.extend(spec.managed().keys().cloned());
        }

        for key in keys {
            match remote.attributes.get(&key) {
                Some(value) => {
                    if record.managed.get(&key) != Some(value) {
                        debug!("{}: {} drifted to {}", address, key, value);
                    }
                    record.managed.insert(key, value.clone());
                }
                None => {
                    if record.managed.remove(&key).is_some() {
                        debug!("{}: {} removed remotely", address, key);
                    }
                }
            }
        }

        let external_keys: Vec<String> = record.external.keys().cloned().collect();
        for key in external_keys {
            if let Some(value) = remote.attributes.get(&key) {
                record.external.insert(key, value.clone());
            }
        }

        record.attributes = remote.attributes;
    }

    Ok(())
}

/// Carry out a plan. Each step is recorded in `state` as soon as it succeeds, so a failed apply can simply be run
/// again.
pub fn apply(
    specs: &[ResourceSpec],
    plan: &Plan,
    state: &mut State,
    provider: &mut dyn Provider,
) -> Result<ApplySummary, ProvisionError> {
    let by_address: HashMap<&str, &ResourceSpec> = specs.iter().map(|s| (s.address(), s)).collect();
    let mut summary = ApplySummary::default();

    for change in plan.changes() {
        let spec = by_address.get(change.address.as_str()).copied();
        match (change.action, spec) {
            (ChangeAction::NoOp, _) => (),
            (ChangeAction::Create, Some(spec)) => {
                create(spec, state, provider)?;
                summary.created += 1;
            }
            (ChangeAction::Update, Some(spec)) => {
                if update(spec, state, provider)? {
                    summary.updated += 1;
                }
            }
            (ChangeAction::Replace, Some(spec)) => {
                replace(spec, state, provider)?;
                summary.replaced += 1;
            }
            (ChangeAction::Delete, _) => {
                if let Some(record) = state.get(&change.address) {
                    let (kind, id) = (record.kind, record.id.clone());
                    delete(&change.address, kind, &id, provider)?;
                    state.remove(&change.address);
                    summary.deleted += 1;
                }
            }
            (_, None) => return Err(ProvisionError::UnresolvedReference(change.address.clone())),
        }
    }

    summary.deleted += delete_deposed(state, provider)?;
    state.bump_serial();
    info!(
        "Apply complete: {} created, {} updated, {} replaced, {} deleted",
        summary.created, summary.updated, summary.replaced, summary.deleted
    );
    Ok(summary)
}

/// Refresh, plan and apply in one go. Returns the plan that was applied along with what happened.
pub fn reconcile(
    specs: &[ResourceSpec],
    state: &mut State,
    provider: &mut dyn Provider,
) -> Result<(Plan, ApplySummary), ProvisionError> {
    refresh(specs, state, provider)?;
    let plan = plan(specs, state)?;
    let summary = apply(specs, &plan, state, provider)?;
    Ok((plan, summary))
}

/// Delete everything recorded in state, dependents first.
pub fn destroy(state: &mut State, provider: &mut dyn Provider) -> Result<ApplySummary, ProvisionError> {
    let graph = TaskGraph::new(state.resources().iter().map(|(address, record)| {
        let deps: Vec<String> = record.depends_on.iter().filter(|d| state.get(d).is_some()).cloned().collect();
        (address.clone(), deps)
    }))?;

    let mut summary = ApplySummary::default();
    for address in graph.reverse_order()? {
        if let Some(record) = state.get(&address) {
            let (kind, id) = (record.kind, record.id.clone());
            delete(&address, kind, &id, provider)?;
            state.remove(&address);
            summary.deleted += 1;
        }
    }

    summary.deleted += delete_deposed(state, provider)?;
    state.bump_serial();
    info!("Destroy complete: {} deleted", summary.deleted);
    Ok(summary)
}

fn resolve_fields(
    address: &str,
    exprs: &BTreeMap<String, FieldExpr>,
    state: &State,
) -> Result<BTreeMap<String, Value>, ProvisionError> {
    let lookup = |r: &Reference| -> Result<Option<Value>, ProvisionError> { Ok(state.lookup(r)) };
    let mut result = BTreeMap::new();
    for (field, expr) in exprs {
        match expr.resolve(&lookup)? {
            Some(value) => {
                result.insert(field.clone(), value);
            }
            None => {
                return Err(ProvisionError::UnresolvedReference(format!("{}.{}", address, field)));
            }
        }
    }
    Ok(result)
}

fn create(spec: &ResourceSpec, state: &mut State, provider: &mut dyn Provider) -> Result<(), ProvisionError> {
    let managed = resolve_fields(spec.address(), spec.managed(), state)?;
    let external = resolve_fields(spec.address(), spec.external(), state)?;

    let mut fields = managed.clone();
    fields.extend(external.iter().map(|(k, v)| (k.clone(), v.clone())));

    info!("{}: creating {}", spec.address(), spec.kind());
    let remote = provider.create(spec.kind(), &fields)?;
    debug!("{}: created {}", spec.address(), remote.id);

    state.insert(
        spec.address().to_string(),
        ResourceRecord {
            kind: spec.kind(),
            id: remote.id,
            managed,
            external,
            attributes: remote.attributes,
            depends_on: spec.dependencies(),
            create_before_destroy: spec.create_before_destroy(),
        },
    );
    Ok(())
}

// Returns false when the values turned out to match once every reference was known.
fn update(spec: &ResourceSpec, state: &mut State, provider: &mut dyn Provider) -> Result<bool, ProvisionError> {
    let desired = resolve_fields(spec.address(), spec.managed(), state)?;
    let record = match state.get(spec.address()) {
        Some(record) => record,
        None => return create(spec, state, provider).map(|_| true),
    };

    let mut changes = BTreeMap::new();
    for (field, value) in &desired {
        if record.managed.get(field) != Some(value) {
            changes.insert(field.clone(), value.clone());
        }
    }
    for field in record.managed.keys() {
        if !desired.contains_key(field) {
            changes.insert(field.clone(), Value::Null);
        }
    }

    if changes.is_empty() {
        debug!("{}: nothing to update", spec.address());
        return Ok(false);
    }

    info!("{}: updating {:?}", spec.address(), changes.keys().collect::<Vec<_>>());
    let (kind, id) = (record.kind, record.id.clone());
    let remote = provider.update(kind, &id, &changes)?;

    if let Some(record) = state.get_mut(spec.address()) {
        record.managed = desired;
        for (key, value) in record.external.iter_mut() {
            if let Some(remote_value) = remote.attributes.get(key) {
                *value = remote_value.clone();
            }
        }
        record.attributes = remote.attributes;
        record.depends_on = spec.dependencies();
    }
    Ok(true)
}

fn replace(spec: &ResourceSpec, state: &mut State, provider: &mut dyn Provider) -> Result<(), ProvisionError> {
    let old = match state.remove(spec.address()) {
        Some(old) => old,
        None => return create(spec, state, provider),
    };

    if spec.create_before_destroy() {
        info!("{}: replacing {} (create before destroy)", spec.address(), old.id);
        if let Err(e) = create(spec, state, provider) {
            state.insert(spec.address().to_string(), old);
            return Err(e);
        }
        state.depose(spec.address().to_string(), old);
    } else {
        info!("{}: replacing {}", spec.address(), old.id);
        if let Err(e) = delete(spec.address(), old.kind, &old.id, provider) {
            state.insert(spec.address().to_string(), old);
            return Err(e);
        }
        create(spec, state, provider)?;
    }
    Ok(())
}

fn delete(address: &str, kind: ResourceKind, id: &str, provider: &mut dyn Provider) -> Result<(), ProvisionError> {
    info!("{}: deleting {} {}", address, kind, id);
    match provider.delete(kind, id) {
        Ok(()) => Ok(()),
        Err(ProvisionError::ResourceNotFound(_)) => {
            debug!("{}: {} already gone", address, id);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn delete_deposed(state: &mut State, provider: &mut dyn Provider) -> Result<usize, ProvisionError> {
    let mut deposed = state.take_deposed().into_iter();
    let mut deleted = 0;
    while let Some(entry) = deposed.next() {
        if let Err(e) = delete(&entry.address, entry.record.kind, &entry.record.id, provider) {
            state.depose(entry.address, entry.record);
            for rest in deposed {
                state.depose(rest.address, rest.record);
            }
            return Err(e);
        }
        deleted += 1;
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use {
        super::{destroy, plan, reconcile, refresh, ChangeAction, FieldExpr, ResourceKind, ResourceSpec, State},
        crate::provider::{InMemoryCloud, Provider},
        pretty_assertions::assert_eq,
    };

    fn group(address: &str, name: &str) -> ResourceSpec {
        ResourceSpec::builder()
            .address(address)
            .kind(ResourceKind::LogGroup)
            .managed_field("name", FieldExpr::literal(name))
            .managed_field("retention_in_days", FieldExpr::literal(90))
            .force_new_field("name")
            .build()
            .unwrap()
    }

    #[test_log::test]
    fn test_orphans_are_deleted() {
        let mut cloud = InMemoryCloud::default();
        let mut state = State::default();
        reconcile(&[group("a", "/a"), group("b", "/b")], &mut state, &mut cloud).unwrap();
        assert_eq!(cloud.count(ResourceKind::LogGroup), 2);

        let (plan, summary) = reconcile(&[group("a", "/a")], &mut state, &mut cloud).unwrap();
        assert_eq!(plan.action("a"), Some(ChangeAction::NoOp));
        assert_eq!(plan.action("b"), Some(ChangeAction::Delete));
        assert_eq!(summary.deleted, 1);
        assert_eq!(cloud.count(ResourceKind::LogGroup), 1);
        assert!(state.get("b").is_none());
    }

    #[test_log::test]
    fn test_replace_deletes_first() {
        let mut cloud = InMemoryCloud::default();
        let mut state = State::default();
        reconcile(&[group("a", "/a")], &mut state, &mut cloud).unwrap();

        cloud.clear_calls();
        let (plan, summary) = reconcile(&[group("a", "/a2")], &mut state, &mut cloud).unwrap();
        assert_eq!(plan.action("a"), Some(ChangeAction::Replace));
        assert_eq!(summary.replaced, 1);
        assert_eq!(cloud.calls(), &["delete log_group /a".to_string(), "create log_group /a2".to_string()]);
        assert_eq!(state.get("a").unwrap().id, "/a2");
    }

    #[test_log::test]
    fn test_vanished_resources() {
        let specs = [group("a", "/a")];
        let mut cloud = InMemoryCloud::default();
        let mut state = State::default();
        reconcile(&specs, &mut state, &mut cloud).unwrap();

        cloud.delete(ResourceKind::LogGroup, "/a").unwrap();
        refresh(&specs, &mut state, &cloud).unwrap();
        assert!(state.get("a").is_none());
        assert_eq!(plan(&specs, &state).unwrap().action("a"), Some(ChangeAction::Create));

        // Destroying something already gone out of band still clears it from state.
        reconcile(&specs, &mut state, &mut cloud).unwrap();
        cloud.delete(ResourceKind::LogGroup, "/a").unwrap();
        let summary = destroy(&mut state, &mut cloud).unwrap();
        assert_eq!(summary.deleted, 1);
        assert!(state.resources().is_empty());
    }

    #[test_log::test]
    fn test_unknown_reference_fails_apply() {
        let spec = ResourceSpec::builder()
            .address("attachment")
            .kind(ResourceKind::IamRolePolicyAttachment)
            .managed_field("role", FieldExpr::reference("role", "name"))
            .build()
            .unwrap();
        let mut cloud = InMemoryCloud::default();
        let mut state = State::default();
        assert!(reconcile(&[spec], &mut state, &mut cloud).is_err());
    }
}
