//! Batch upsert and delete.
//!
//! An upsert runs in three phases:
//!
//! 1. every input object becomes a [`PendingOp`];
//! 2. the ops are applied to a working copy of the items, producing the new
//!    ordering and the list of positions whose properties must be written;
//! 3. the ordering is committed and the property writes are replayed
//!    through [`EntityIndex::set_entity_prop_value`].
//!
//! Phases 1 and 2 never touch the index, so a rejected batch leaves it
//! unchanged.

use serde_json::Value;

use super::{EntityError, EntityIndex, EntityObject, EntityResult, INDEX_PROP, Update};

/// The structural effect of one input object.
#[derive(Debug, Clone, PartialEq)]
enum PendingOp {
    /// Overwrite the slot at `index`; `None` keeps its value.
    Update {
        index: usize,
        value: Option<Value>,
        source: usize,
    },
    /// Insert a new slot before `index`.
    Insert {
        index: usize,
        value: Value,
        source: usize,
    },
    /// Add a new slot at the end.
    Append { value: Value, source: usize },
}

impl PendingOp {
    fn from_object(object: &EntityObject, source: usize, overwrite: bool) -> Option<Self> {
        match (object.index, &object.value) {
            (Some(index), value) if overwrite => Some(Self::Update {
                index,
                value: value.clone(),
                source,
            }),
            (Some(index), value) => Some(Self::Insert {
                index,
                value: value.clone().unwrap_or(Value::Null),
                source,
            }),
            (None, Some(value)) => Some(Self::Append {
                value: value.clone(),
                source,
            }),
            (None, None) => None,
        }
    }
}

/// A position of the working copy.
#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    /// Input object that last touched this slot.
    source: Option<usize>,
    /// Position before the batch, `None` for new slots.
    origin: Option<usize>,
}

/// Result of the structural phase.
#[derive(Debug, Default)]
struct Plan {
    items: Vec<Value>,
    updates: Vec<(usize, EntityObject)>,
    results: Vec<Option<usize>>,
    /// `(old, new)` value pairs whose old value no longer exists.
    orphaned: Vec<(Value, Value)>,
}

pub(super) fn apply<I>(index: &mut I, objects: Vec<EntityObject>, overwrite: bool) -> EntityResult<Vec<Option<usize>>>
where
    I: EntityIndex + ?Sized,
{
    if objects.is_empty() {
        return Ok(Vec::new());
    }
    let plan = plan(index, &objects, overwrite)?;
    index.validate_items(&plan.items)?;

    index.state_mut().suspend();
    let outcome = commit(index, &plan, overwrite);
    index.state_mut().resume();
    index.notify();

    outcome.map(|()| plan.results)
}

fn plan<I>(index: &I, objects: &[EntityObject], overwrite: bool) -> EntityResult<Plan>
where
    I: EntityIndex + ?Sized,
{
    let mut slots: Vec<Slot> = index
        .items()
        .iter()
        .enumerate()
        .map(|(position, value)| Slot {
            value: value.clone(),
            source: None,
            origin: Some(position),
        })
        .collect();
    let mut transfers = Vec::new();

    let ops = objects
        .iter()
        .enumerate()
        .filter_map(|(source, object)| PendingOp::from_object(object, source, overwrite));
    for op in ops {
        match op {
            PendingOp::Update { index, value, source } => {
                let length = slots.len();
                let slot = slots
                    .get_mut(index)
                    .ok_or(EntityError::IndexOutOfRange { index, length })?;
                if let Some(value) = value
                    && slot.value != value
                {
                    transfers.push((std::mem::replace(&mut slot.value, value.clone()), value));
                }
                slot.source = Some(source);
            }
            PendingOp::Insert { index, value, source } => {
                let at = index.min(slots.len());
                slots.insert(
                    at,
                    Slot {
                        value,
                        source: Some(source),
                        origin: None,
                    },
                );
            }
            PendingOp::Append { value, source } => slots.push(Slot {
                value,
                source: Some(source),
                origin: None,
            }),
        }
    }

    let value_indexing = index.value_indexing();
    if !value_indexing && let Some(compare) = index.index_sorting() {
        slots.sort_by(|a, b| compare(&a.value, &b.value));
    }

    let mut plan = Plan {
        results: vec![None; objects.len()],
        ..Plan::default()
    };
    for (position, slot) in slots.into_iter().enumerate() {
        plan.items.push(if value_indexing {
            Value::from(position)
        } else {
            slot.value
        });
        if slot.origin == Some(position) && slot.source.is_none() {
            continue;
        }
        let mut update = match (slot.source, slot.origin) {
            (Some(source), _) => {
                plan.results[source] = Some(position);
                objects[source].clone()
            }
            (None, Some(origin)) => index.entity_object(origin).unwrap_or_default(),
            (None, None) => continue,
        };
        if value_indexing {
            update.value = Some(Value::from(position));
        }
        plan.updates.push((position, update));
    }

    if !value_indexing {
        plan.orphaned = transfers
            .into_iter()
            .filter(|(old, _)| !plan.items.contains(old))
            .collect();
    }
    Ok(plan)
}

fn commit<I>(index: &mut I, plan: &Plan, overwrite: bool) -> EntityResult<()>
where
    I: EntityIndex + ?Sized,
{
    for (old, new) in &plan.orphaned {
        index.handle_value_replace(old, new);
    }
    index.set_items(plan.items.clone())?;
    apply_updates(index, &plan.updates, overwrite)
}

/// Replays property writes. Auto props are recomputed instead of copied,
/// except for a plain overwrite of an index without dimensions.
fn apply_updates<I>(index: &mut I, updates: &[(usize, EntityObject)], overwrite: bool) -> EntityResult<()>
where
    I: EntityIndex + ?Sized,
{
    let auto_props: Vec<String> = if overwrite && !index.has_entity_dim() {
        Vec::new()
    } else {
        index.auto_props().to_vec()
    };
    let props: Vec<String> = index
        .entity_props()
        .into_iter()
        .filter(|prop| prop != INDEX_PROP && !auto_props.contains(prop))
        .collect();

    for (at, object) in updates {
        for prop in &props {
            index.set_entity_prop_value(*at, prop, object.get(prop))?;
        }
    }

    if !auto_props.is_empty() {
        let positions: Vec<usize> = updates.iter().map(|(at, _)| *at).collect();
        for prop in index.assign_auto_props(&positions) {
            for (at, object) in updates {
                index.set_entity_prop_value(*at, &prop, object.get(&prop))?;
            }
        }
    }
    Ok(())
}

pub(super) fn delete<I>(index: &mut I, indices: &[usize]) -> EntityResult<()>
where
    I: EntityIndex + ?Sized,
{
    for &position in indices {
        index.check_index(position)?;
    }

    index.state_mut().suspend();
    let outcome = delete_suspended(index, indices);
    index.state_mut().resume();
    index.notify();
    outcome
}

fn delete_suspended<I>(index: &mut I, indices: &[usize]) -> EntityResult<()>
where
    I: EntityIndex + ?Sized,
{
    let mut kept = Vec::new();
    for position in 0..index.len() {
        if indices.contains(&position) {
            let value = index.entity_value(position).cloned().unwrap_or(Value::Null);
            index.state_mut().push_update(Update::delete(position, value));
            index.delete_prop_values(position);
        } else {
            kept.push(position);
        }
    }

    let mut updates = Vec::new();
    let items = if index.value_indexing() {
        for (position, &origin) in kept.iter().enumerate() {
            if origin != position {
                let mut moved = index.entity_object(origin).unwrap_or_default();
                moved.value = Some(Value::from(position));
                updates.push((position, moved));
            }
        }
        (0..kept.len()).map(Value::from).collect()
    } else {
        kept.iter()
            .filter_map(|&origin| index.entity_value(origin).cloned())
            .collect()
    };

    index.set_items(items)?;
    if updates.is_empty() {
        Ok(())
    } else {
        apply_updates(index, &updates, true)
    }
}
