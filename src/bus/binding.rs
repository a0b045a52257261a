//! Combinatorial binding of a batch of events onto a handler's parameters.
//!
//! `bind` is a pure function: scheduling lives in [`EventBus`](super::EventBus).

use std::sync::Arc;

use crate::event::{Event, EventKind};

/// One declared handler parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventParam {
    pub name: &'static str,
    pub kind: EventKind,
    pub optional: bool,
}

impl EventParam {
    pub const fn required(name: &'static str, kind: EventKind) -> Self {
        Self {
            name,
            kind,
            optional: false,
        }
    }

    pub const fn optional(name: &'static str, kind: EventKind) -> Self {
        Self {
            name,
            kind,
            optional: true,
        }
    }
}

/// A complete assignment of events to parameters for one invocation.
///
/// Slots appear in binding order (most specific parameter first). An
/// optional parameter that found no event holds `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Binding {
    slots: Vec<(&'static str, Option<Arc<Event>>)>,
}

impl Binding {
    /// Event bound to `name`, `None` when absent or undeclared.
    pub fn get(&self, name: &str) -> Option<&Event> {
        self.slots
            .iter()
            .find(|(slot, _)| *slot == name)
            .and_then(|(_, event)| event.as_deref())
    }

    /// Whether `name` is a declared slot of this binding.
    pub fn contains(&self, name: &str) -> bool {
        self.slots.iter().any(|(slot, _)| *slot == name)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Option<&Event>)> {
        self.slots.iter().map(|(name, event)| (*name, event.as_deref()))
    }
}

/// Parameters ordered most-derived kind first; ties keep declaration order.
pub fn sort_by_specificity(params: &[EventParam]) -> Vec<EventParam> {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| b.kind.depth().cmp(&a.kind.depth()));
    sorted
}

/// Every way of assigning `events` to `params`.
///
/// Each event is consumed by at most one parameter per binding. A required
/// parameter with no remaining candidate prunes the branch; an optional one
/// binds `None` and the search continues.
pub fn bind(params: &[EventParam], events: &[Arc<Event>]) -> Vec<Binding> {
    let params = sort_by_specificity(params);
    let mut out = Vec::new();
    let mut current = Vec::with_capacity(params.len());
    let mut used = vec![false; events.len()];
    backtrack(&params, events, 0, &mut current, &mut used, &mut out);
    out
}

fn backtrack(
    params: &[EventParam],
    events: &[Arc<Event>],
    index: usize,
    current: &mut Vec<(&'static str, Option<Arc<Event>>)>,
    used: &mut [bool],
    out: &mut Vec<Binding>,
) {
    let Some(param) = params.get(index) else {
        out.push(Binding {
            slots: current.clone(),
        });
        return;
    };

    let candidates: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(i, event)| !used[*i] && event.is_instance_of(param.kind))
        .map(|(i, _)| i)
        .collect();

    for &i in &candidates {
        used[i] = true;
        current.push((param.name, Some(Arc::clone(&events[i]))));
        backtrack(params, events, index + 1, current, used, out);
        current.pop();
        used[i] = false;
    }

    if candidates.is_empty() && param.optional {
        current.push((param.name, None));
        backtrack(params, events, index + 1, current, used, out);
        current.pop();
    }
}
