//! The Authorization Evaluator (§4.4): intersects consumer and identity
//! permissions against each referenced `Permission`'s metadata and writes
//! claims. Never rejects a request — it only populates claims.
//!
//! Resolves §9 Open Questions #1 and #2: the locally-built `consumerActs`/
//! `identityActs` maps are the maps actually consulted below (the source
//! shadows them and reads stale empty outer maps instead), and the action
//! substring is taken *after* the colon.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use portway_core::claims::set_claim;
use portway_core::entities::{PermissionScope, PermissionType};
use portway_core::context::RequestContext;

/// Splits a permission id into (plain id, optional action). `"P1:read"` →
/// `("P1", Some("read"))`; `"P1"` → `("P1", None)`.
fn split_permission_id(raw: &str) -> (&str, Option<&str>) {
    match raw.find(':') {
        Some(idx) => (&raw[..idx], Some(&raw[idx + 1..])),
        None => (raw, None),
    }
}

fn build_action_map(permission_ids: &[String]) -> HashMap<&str, HashSet<&str>> {
    let mut map: HashMap<&str, HashSet<&str>> = HashMap::new();
    for raw in permission_ids {
        let (id, action) = split_permission_id(raw);
        let entry = map.entry(id).or_default();
        if let Some(action) = action {
            entry.insert(action);
        }
    }
    map
}

/// Runs authorization for the consumer/identity already installed on `ctx`,
/// populating `ctx.claims`. Runs only if either is present — callers should
/// skip this stage otherwise (it is a no-op on an empty union regardless).
pub fn run_authorization(ctx: &mut RequestContext) {
    if ctx.consumer.is_none() && ctx.identity.is_none() {
        return;
    }

    let empty = Vec::new();
    let consumer_ids = ctx.consumer.as_ref().map(|c| &c.permission_ids).unwrap_or(&empty);
    let identity_ids = ctx.identity.as_ref().map(|i| &i.permission_ids).unwrap_or(&empty);

    let consumer_acts = build_action_map(consumer_ids);
    let identity_acts = build_action_map(identity_ids);

    let mut union: Vec<&str> = consumer_acts.keys().chain(identity_acts.keys()).copied().collect();
    union.sort_unstable();
    union.dedup();

    for pid in union {
        let Some(permission) = ctx.snapshot.permission(pid) else {
            continue; // unknown permissionId: silently skip (§7)
        };

        let in_consumer = consumer_acts.contains_key(pid);
        let in_identity = identity_acts.contains_key(pid);

        if matches!(permission.scope, PermissionScope::Consumer | PermissionScope::Both) && !in_consumer {
            continue;
        }
        if matches!(permission.scope, PermissionScope::User | PermissionScope::Both) && !in_identity {
            continue;
        }

        match permission.kind {
            PermissionType::Entity => {
                let empty_set = HashSet::new();
                let consumer_set = consumer_acts.get(pid).unwrap_or(&empty_set);
                let identity_set = identity_acts.get(pid).unwrap_or(&empty_set);
                let intersection: Vec<&str> =
                    consumer_set.intersection(identity_set).copied().collect();
                match intersection.len() {
                    0 => continue,
                    1 => set_claim(&mut ctx.claims, &permission.claim_path, Value::String(intersection[0].to_string())),
                    _ => {
                        let mut sorted = intersection;
                        sorted.sort_unstable();
                        let arr = Value::Array(sorted.into_iter().map(|a| Value::String(a.to_string())).collect());
                        set_claim(&mut ctx.claims, &permission.claim_path, arr);
                    }
                }
            }
            PermissionType::Action => {
                set_claim(&mut ctx.claims, &permission.claim_path, permission.claim_value.clone());
            }
        }
    }
}
