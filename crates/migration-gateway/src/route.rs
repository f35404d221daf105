//! Migration rules and the first-match route table.

use std::collections::BTreeMap;
use std::sync::Arc;

use http::Method;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A migration rule as written in configuration.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MigrationRoute {
    /// Regular expression matched against the whole request path.
    pub pattern: String,

    /// HTTP methods the rule applies to; empty means all.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Share of traffic (0–100) sent to the new system.
    #[serde(default)]
    pub migration_percentage: u8,

    /// Write mutations to the new system and replicate them to legacy.
    #[serde(default)]
    pub dual_write_enabled: bool,

    /// Serve from legacy while mirroring to the new system for comparison.
    #[serde(default)]
    pub shadow_mode_enabled: bool,

    /// Operator annotations; not interpreted by the gateway.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A compiled, immutable migration rule.
#[derive(Debug)]
pub struct Route {
    definition: MigrationRoute,
    methods: Vec<Method>,
    regex: Regex,
}

impl Route {
    /// Compile `definition`, the `index`-th configured route.
    pub fn compile(index: usize, definition: MigrationRoute) -> Result<Self, Error> {
        let invalid = |reason: String| Error::InvalidRoute {
            index,
            pattern: definition.pattern.clone(),
            reason,
        };

        if definition.migration_percentage > 100 {
            return Err(invalid(format!(
                "migration_percentage {} is above 100",
                definition.migration_percentage
            )));
        }

        let regex = Regex::new(&format!("^(?:{})$", definition.pattern))
            .map_err(|e| invalid(e.to_string()))?;

        let methods = definition
            .methods
            .iter()
            .map(|name| {
                Method::from_bytes(name.trim().to_ascii_uppercase().as_bytes())
                    .map_err(|_| invalid(format!("unknown method '{name}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            definition,
            methods,
            regex,
        })
    }

    /// Whether the rule applies to `path` and `method`.
    #[must_use]
    pub fn matches(&self, path: &str, method: &Method) -> bool {
        (self.methods.is_empty() || self.methods.contains(method)) && self.regex.is_match(path)
    }

    /// The rule as configured.
    #[must_use]
    pub const fn definition(&self) -> &MigrationRoute {
        &self.definition
    }

    /// The configured path pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.definition.pattern
    }

    /// Share of traffic (0–100) sent to the new system.
    #[must_use]
    pub const fn migration_percentage(&self) -> u8 {
        self.definition.migration_percentage
    }

    /// Whether dual-write is enabled.
    #[must_use]
    pub const fn dual_write_enabled(&self) -> bool {
        self.definition.dual_write_enabled
    }

    /// Whether shadow mode is enabled.
    #[must_use]
    pub const fn shadow_mode_enabled(&self) -> bool {
        self.definition.shadow_mode_enabled
    }
}

/// Ordered rule set. The first route that applies wins.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    /// Compile every route. Any malformed route fails the whole table.
    pub fn new(definitions: Vec<MigrationRoute>) -> Result<Self, Error> {
        let routes = definitions
            .into_iter()
            .enumerate()
            .map(|(index, definition)| Route::compile(index, definition).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { routes })
    }

    /// First route applying to `path` and `method`, if any. Routes after the
    /// first match are never evaluated.
    #[must_use]
    pub fn find(&self, path: &str, method: &Method) -> Option<&Arc<Route>> {
        self.routes.iter().find(|route| route.matches(path, method))
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether there are no routes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(pattern: &str, methods: &[&str]) -> MigrationRoute {
        MigrationRoute {
            pattern: pattern.to_string(),
            methods: methods.iter().map(ToString::to_string).collect(),
            migration_percentage: 0,
            dual_write_enabled: false,
            shadow_mode_enabled: false,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_first_applicable_route_wins() {
        let table = RouteTable::new(vec![
            route("/orders/archive/.*", &["GET"]),
            route("/orders/.*", &[]),
            route("/orders/42", &[]),
        ])
        .unwrap();

        let hit = table.find("/orders/42", &Method::POST).unwrap();
        assert_eq!(hit.pattern(), "/orders/.*");

        let hit = table.find("/orders/archive/1", &Method::GET).unwrap();
        assert_eq!(hit.pattern(), "/orders/archive/.*");

        let hit = table.find("/orders/archive/1", &Method::DELETE).unwrap();
        assert_eq!(hit.pattern(), "/orders/.*");
    }

    #[test]
    fn test_no_match_is_none() {
        let table = RouteTable::new(vec![route("/orders/.*", &["get", "post"])]).unwrap();

        assert!(table.find("/reports/1", &Method::GET).is_none());
        assert!(table.find("/orders/1", &Method::PUT).is_none());
        assert!(table.find("/api/orders/1", &Method::GET).is_none(), "patterns are anchored");
        assert!(RouteTable::default().find("/", &Method::GET).is_none());
    }

    #[test]
    fn test_malformed_routes_are_rejected() {
        let bad_pattern = RouteTable::new(vec![route("/ok", &[]), route("/orders/(", &[])]);
        assert!(matches!(bad_pattern, Err(Error::InvalidRoute { index: 1, .. })));

        let bad_method = RouteTable::new(vec![route("/orders", &["GET PUT"])]);
        assert!(matches!(bad_method, Err(Error::InvalidRoute { index: 0, .. })));

        let mut over = route("/orders", &[]);
        over.migration_percentage = 101;
        assert!(matches!(
            RouteTable::new(vec![over]),
            Err(Error::InvalidRoute { .. })
        ));
    }

    #[test]
    fn test_routes_deserialize_with_defaults() {
        let routes: Vec<MigrationRoute> = serde_json::from_str(
            r#"[{"pattern": "/reports/.*", "shadow_mode_enabled": true, "metadata": {"owner": "reporting"}}]"#,
        )
        .unwrap();

        assert_eq!(routes[0].migration_percentage, 0);
        assert!(routes[0].methods.is_empty());
        assert!(routes[0].shadow_mode_enabled);
        assert_eq!(routes[0].metadata["owner"], "reporting");
    }
}
