//! Filter collection, grouping, and sorting (§4.5 steps 1–4).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use portway_core::entities::{Consumer, Operation, Service};
use portway_core::error::{GatewayError, Reason};

use crate::engine::FilterSlot;
use crate::filter::Filter;

#[derive(Default)]
pub struct FilterRegistry {
    filters: HashMap<String, Arc<dyn Filter>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, filter: Arc<dyn Filter>) {
        self.filters.insert(filter.name().to_string(), filter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.filters.get(name).cloned()
    }
}

/// Collects, groups, and sorts the filter chain for one request, per §4.5
/// steps 1–4:
///
/// 1. Collect plugin-config entries in order: consumer, service, operation.
/// 2. Group by filter name; combine per-group configs (or take the first).
/// 3. Sort groups by priority ascending, ties preserving first-encounter
///    (collection) order — a stable sort gives us this for free.
/// 4. Any unregistered name aborts the whole collection.
pub fn collect_filter_chain(
    registry: &FilterRegistry,
    consumer: Option<&Consumer>,
    service: &Service,
    operation: Option<&Operation>,
) -> Result<Vec<FilterSlot>, GatewayError> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();

    let refs = consumer
        .map(|c| c.filters.iter())
        .into_iter()
        .flatten()
        .chain(service.filters.iter())
        .chain(operation.map(|op| op.filters.iter()).into_iter().flatten());

    for plugin_ref in refs {
        let filter = registry
            .get(&plugin_ref.name)
            .ok_or_else(|| unregistered(&plugin_ref.name))?;
        let canonical = filter.name().to_string();
        if !grouped.contains_key(&canonical) {
            order.push(canonical.clone());
        }
        grouped.entry(canonical).or_default().push(plugin_ref.properties.clone());
    }

    let mut slots: Vec<FilterSlot> = Vec::with_capacity(order.len());
    for name in order {
        let filter = registry.get(&name).expect("grouped name was resolved from the registry above");
        let configs = grouped.remove(&name).unwrap_or_default();
        let config = filter.combine(&configs);
        slots.push(FilterSlot { filter, config });
    }

    // Stable sort: ties preserve the collection order established above.
    slots.sort_by_key(|slot| slot.filter.priority());

    Ok(slots)
}

fn unregistered(name: &str) -> GatewayError {
    let mut params = HashMap::new();
    params.insert("name".to_string(), Value::String(name.to_string()));
    GatewayError::with_params(Reason::UnregisteredFilter, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use portway_core::entities::{AuthenticationType, HttpMethod, PluginRef};

    struct NamedFilter {
        name: &'static str,
        priority: i32,
    }

    #[async_trait]
    impl Filter for NamedFilter {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        async fn evaluate(
            &self,
            _ctx: &mut crate::engine::FilterCtx<'_>,
            _config: &Value,
        ) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    fn registry() -> FilterRegistry {
        let mut r = FilterRegistry::new();
        r.register(Arc::new(NamedFilter { name: "f1", priority: 10 }));
        r.register(Arc::new(NamedFilter { name: "f2", priority: 5 }));
        r.register(Arc::new(NamedFilter { name: "f3", priority: 10 }));
        r
    }

    fn service_with_filters(names: &[&str]) -> Service {
        Service {
            id: "svc".into(),
            hostnames: vec!["example.com".into()],
            uri_prefix: None,
            context_root: None,
            default_version: None,
            scheme: "http".into(),
            authentication_type: AuthenticationType::None,
            operations: vec![],
            filters: names
                .iter()
                .map(|n| PluginRef { name: n.to_string(), properties: Value::Null })
                .collect(),
            backend: None,
        }
    }

    fn operation_with_filters(names: &[&str]) -> Operation {
        Operation {
            name: "op".into(),
            method: HttpMethod::Get,
            uri_pattern: "/x".into(),
            permission_ids: vec![],
            claims: vec![],
            filters: names
                .iter()
                .map(|n| PluginRef { name: n.to_string(), properties: Value::Null })
                .collect(),
            backend: None,
        }
    }

    fn consumer_with_filters(names: &[&str]) -> Consumer {
        Consumer {
            id: "cons".into(),
            permission_ids: vec![],
            filters: names
                .iter()
                .map(|n| PluginRef { name: n.to_string(), properties: Value::Null })
                .collect(),
            plan_id: None,
        }
    }

    #[test]
    fn orders_by_priority_with_ties_preserving_collection_order() {
        // F1(priority=10) via service, F2(priority=5) via operation,
        // F3(priority=10) via consumer — the §8 scenario 5 fixture.
        let consumer = consumer_with_filters(&["f3"]);
        let service = service_with_filters(&["f1"]);
        let operation = operation_with_filters(&["f2"]);

        let slots = collect_filter_chain(&registry(), Some(&consumer), &service, Some(&operation)).unwrap();
        let names: Vec<&str> = slots.iter().map(|s| s.filter.name()).collect();
        assert_eq!(names, vec!["f2", "f3", "f1"]);
    }

    #[test]
    fn unregistered_name_aborts_collection() {
        let service = service_with_filters(&["nope"]);
        let err = collect_filter_chain(&registry(), None, &service, None).unwrap_err();
        assert_eq!(err.reason, Reason::UnregisteredFilter);
    }

    #[test]
    fn zero_filters_yields_empty_chain() {
        let service = service_with_filters(&[]);
        let slots = collect_filter_chain(&registry(), None, &service, None).unwrap();
        assert!(slots.is_empty());
    }

    #[test]
    fn same_name_entries_group_and_combine_to_first_by_default() {
        let service = service_with_filters(&["f1"]);
        let operation = operation_with_filters(&["f1"]);
        let slots = collect_filter_chain(&registry(), None, &service, Some(&operation)).unwrap();
        assert_eq!(slots.len(), 1);
    }
}
