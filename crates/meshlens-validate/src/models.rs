//! Validation result model
//!
//! [`Validations`] is the currency of the whole engine: every checker
//! produces one, the orchestrator merges them, the cache stores them, and
//! the HTTP layer serializes them. Merging is commutative and associative,
//! which is what lets checkers run in any order (or in parallel) and still
//! produce identical output.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use meshlens_common::mesh::{ObjectKind, ObjectRef};

use crate::messages;

/// Cache key identifying a validated object; identical to [`ObjectRef`]
pub type ValidationKey = ObjectRef;

/// Severity of a single validation finding
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The configuration is broken
    Error,
    /// The configuration is suspect but functional
    Warning,
    /// Informational finding
    Info,
    /// Could not be determined (e.g. depends on unreferenced config)
    Unknown,
}

/// One validation finding against one object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IstioCheck {
    /// Stable check identifier (e.g. `vs.nohost.hostnotfound`)
    pub code: String,
    /// Finding severity
    pub severity: Severity,
    /// JSON-pointer-like location inside the offending object
    pub path: String,
    /// Human-readable message resolved from the catalog
    pub message: String,
}

impl IstioCheck {
    /// Build a check from the message catalog with its default severity
    pub fn build(code: &str, path: impl Into<String>) -> Self {
        let (severity, message) = messages::lookup(code);
        Self {
            code: code.to_string(),
            severity,
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Build a check, overriding the catalog severity
    pub fn build_with_severity(code: &str, path: impl Into<String>, severity: Severity) -> Self {
        let mut check = Self::build(code, path);
        check.severity = severity;
        check
    }
}

/// Outbound edge to a service; the kind is implicit
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceReference {
    /// Target service name
    pub name: String,
    /// Target service namespace
    pub namespace: String,
}

/// Outbound edge to a workload; the kind is implicit
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadReference {
    /// Target workload name
    pub name: String,
    /// Target workload namespace
    pub namespace: String,
}

/// Outbound edge to another configuration object
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IstioReference {
    /// Target kind
    pub kind: ObjectKind,
    /// Target namespace (empty for the `mesh` gateway pseudo-target)
    #[serde(default)]
    pub namespace: String,
    /// Target name
    pub name: String,
    /// Target cluster
    #[serde(default)]
    pub cluster: String,
}

/// The reference sets attached to one object
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct References {
    /// Referenced services
    #[serde(default)]
    pub services: Vec<ServiceReference>,
    /// Referenced workloads
    #[serde(default)]
    pub workloads: Vec<WorkloadReference>,
    /// Referenced configuration objects
    #[serde(default)]
    pub objects: Vec<IstioReference>,
}

impl References {
    /// Whether no references were collected
    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.workloads.is_empty() && self.objects.is_empty()
    }

    /// Append another reference set, then dedup
    pub fn merge(&mut self, other: References) {
        self.services.extend(other.services);
        self.workloads.extend(other.workloads);
        self.objects.extend(other.objects);
        self.dedup();
    }

    /// Deduplicate each list, preserving a stable order
    pub fn dedup(&mut self) {
        self.services.sort();
        self.services.dedup();
        self.workloads.sort();
        self.workloads.dedup();
        self.objects.sort();
        self.objects.dedup();
    }
}

/// Validation state of one object
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectValidation {
    /// True iff no Error-severity check is present
    pub valid: bool,
    /// Findings, deduplicated by (code, path)
    pub checks: Vec<IstioCheck>,
    /// Outbound references
    #[serde(default)]
    pub references: References,
}

impl ObjectValidation {
    /// A valid object with no findings
    pub fn valid() -> Self {
        Self {
            valid: true,
            checks: Vec::new(),
            references: References::default(),
        }
    }

    /// Append a finding, downgrading `valid` on Error severity
    pub fn add_check(&mut self, check: IstioCheck) {
        if check.severity == Severity::Error {
            self.valid = false;
        }
        self.checks.push(check);
        self.dedup_checks();
    }

    /// Append several findings at once
    pub fn add_checks(&mut self, checks: Vec<IstioCheck>) {
        for check in checks {
            if check.severity == Severity::Error {
                self.valid = false;
            }
            self.checks.push(check);
        }
        self.dedup_checks();
    }

    /// Merge another validation of the same object: checks and references
    /// concatenate then dedup, `valid` is the AND of both contributions
    pub fn merge(&mut self, other: ObjectValidation) {
        self.valid = self.valid && other.valid;
        self.checks.extend(other.checks);
        self.dedup_checks();
        self.references.merge(other.references);
    }

    /// Recompute `valid` from the current check list
    pub fn recompute_valid(&mut self) {
        self.valid = !self.checks.iter().any(|c| c.severity == Severity::Error);
    }

    fn dedup_checks(&mut self) {
        self.checks.sort_by(|a, b| {
            (&a.code, &a.path, a.severity).cmp(&(&b.code, &b.path, b.severity))
        });
        self.checks.dedup_by(|a, b| a.code == b.code && a.path == b.path);
    }
}

/// Aggregate counts for a namespace
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    /// Number of Error-severity findings
    pub errors: usize,
    /// Number of Warning-severity findings
    pub warnings: usize,
    /// Number of validated objects
    pub object_count: usize,
}

/// Validation results keyed by object identity.
///
/// Iterates in key order, so serialized output is deterministic for a given
/// input snapshot. Serializes as a flat map keyed by
/// `cluster:namespace:kind:name`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Validations(pub BTreeMap<ValidationKey, ObjectValidation>);

impl Validations {
    /// Empty result set
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of validated objects
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no objects were validated
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fetch or create the validation slot for a key
    pub fn ensure(&mut self, key: ValidationKey) -> &mut ObjectValidation {
        self.0.entry(key).or_insert_with(ObjectValidation::valid)
    }

    /// Merge another result set into this one, combining per-key
    pub fn merge(&mut self, other: Validations) {
        for (key, validation) in other.0 {
            match self.0.get_mut(&key) {
                Some(existing) => existing.merge(validation),
                None => {
                    self.0.insert(key, validation);
                }
            }
        }
    }

    /// Drop every check whose code is in the ignore set, then recompute
    /// validity. Objects are kept even if all their checks are stripped.
    pub fn strip_ignored(&mut self, ignored: &BTreeSet<String>) {
        if ignored.is_empty() {
            return;
        }
        for validation in self.0.values_mut() {
            validation.checks.retain(|c| !ignored.contains(&c.code));
            validation.recompute_valid();
        }
    }

    /// Keep only entries for one (kind, name) pair
    pub fn filter_by_kind_name(&self, kind: ObjectKind, name: &str) -> Validations {
        Validations(
            self.0
                .iter()
                .filter(|(k, _)| k.kind == kind && k.name == name)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Keep only entries for one (cluster, namespace) pair
    pub fn filter_by_namespace(&self, cluster: &str, namespace: &str) -> Validations {
        Validations(
            self.0
                .iter()
                .filter(|(k, _)| k.cluster == cluster && k.namespace == namespace)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Aggregate error/warning counts for one namespace
    pub fn summary(&self, namespace: &str) -> ValidationSummary {
        let mut out = ValidationSummary::default();
        for (key, validation) in &self.0 {
            if key.namespace != namespace {
                continue;
            }
            out.object_count += 1;
            for check in &validation.checks {
                match check.severity {
                    Severity::Error => out.errors += 1,
                    Severity::Warning => out.warnings += 1,
                    _ => {}
                }
            }
        }
        out
    }
}

impl Serialize for Validations {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(&key.to_string(), value)?;
        }
        map.end()
    }
}

impl IntoIterator for Validations {
    type Item = (ValidationKey, ObjectValidation);
    type IntoIter = std::collections::btree_map::IntoIter<ValidationKey, ObjectValidation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(ValidationKey, ObjectValidation)> for Validations {
    fn from_iter<T: IntoIterator<Item = (ValidationKey, ObjectValidation)>>(iter: T) -> Self {
        Validations(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ns: &str, kind: ObjectKind, name: &str) -> ValidationKey {
        ValidationKey {
            cluster: "east".into(),
            namespace: ns.into(),
            kind,
            name: name.into(),
        }
    }

    #[test]
    fn add_check_downgrades_validity_on_error_only() {
        let mut v = ObjectValidation::valid();
        v.add_check(IstioCheck::build_with_severity("vs.singlehost", "spec/hosts", Severity::Warning));
        assert!(v.valid);
        v.add_check(IstioCheck::build("vs.nogateway", "spec/gateways[0]"));
        assert!(!v.valid);
    }

    #[test]
    fn checks_dedup_by_code_and_path() {
        let mut v = ObjectValidation::valid();
        v.add_check(IstioCheck::build("vs.nogateway", "spec/gateways[0]"));
        v.add_check(IstioCheck::build("vs.nogateway", "spec/gateways[0]"));
        v.add_check(IstioCheck::build("vs.nogateway", "spec/gateways[1]"));
        assert_eq!(v.checks.len(), 2);
    }

    #[test]
    fn references_dedup_per_identity() {
        let mut refs = References::default();
        refs.services.push(ServiceReference {
            name: "reviews".into(),
            namespace: "bookinfo".into(),
        });
        refs.merge(References {
            services: vec![ServiceReference {
                name: "reviews".into(),
                namespace: "bookinfo".into(),
            }],
            workloads: vec![],
            objects: vec![],
        });
        assert_eq!(refs.services.len(), 1);
    }

    /// Merging is commutative: a ⊕ b == b ⊕ a for any two result sets
    #[test]
    fn merge_is_commutative() {
        let make = |code: &str, valid_other: bool| {
            let mut vals = Validations::new();
            let v = vals.ensure(key("bookinfo", ObjectKind::VirtualService, "reviews"));
            v.add_check(IstioCheck::build(code, "spec/hosts"));
            if !valid_other {
                let v2 = vals.ensure(key("bookinfo", ObjectKind::DestinationRule, "reviews-dr"));
                v2.add_check(IstioCheck::build("dr.nodest.matchingregistry", "spec/host"));
            }
            vals
        };
        let a = make("vs.nogateway", true);
        let b = make("vs.singlehost", false);

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);
        assert_eq!(ab, ba);
    }

    #[test]
    fn merged_validity_is_and_of_contributions() {
        let k = key("bookinfo", ObjectKind::VirtualService, "reviews");
        let mut a = Validations::new();
        a.ensure(k.clone());
        assert!(a.0[&k].valid);

        let mut b = Validations::new();
        b.ensure(k.clone())
            .add_check(IstioCheck::build("vs.nogateway", "spec/gateways[0]"));

        a.merge(b);
        assert!(!a.0[&k].valid);
        assert_eq!(a.0[&k].checks.len(), 1);
    }

    #[test]
    fn strip_ignored_recomputes_validity() {
        let k = key("bookinfo", ObjectKind::VirtualService, "reviews");
        let mut vals = Validations::new();
        vals.ensure(k.clone())
            .add_check(IstioCheck::build("vs.nogateway", "spec/gateways[0]"));
        assert!(!vals.0[&k].valid);

        let ignored = BTreeSet::from(["vs.nogateway".to_string()]);
        vals.strip_ignored(&ignored);
        assert!(vals.0[&k].checks.is_empty());
        assert!(vals.0[&k].valid);
    }

    #[test]
    fn summary_counts_by_namespace() {
        let mut vals = Validations::new();
        vals.ensure(key("bookinfo", ObjectKind::VirtualService, "a"))
            .add_check(IstioCheck::build("vs.nogateway", "spec/gateways[0]"));
        vals.ensure(key("bookinfo", ObjectKind::VirtualService, "b"))
            .add_check(IstioCheck::build_with_severity(
                "vs.singlehost",
                "spec/hosts",
                Severity::Warning,
            ));
        vals.ensure(key("other", ObjectKind::VirtualService, "c"));

        let summary = vals.summary("bookinfo");
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.object_count, 2);
    }

    #[test]
    fn serializes_with_flat_string_keys() {
        let mut vals = Validations::new();
        vals.ensure(key("bookinfo", ObjectKind::VirtualService, "reviews"));
        let json = serde_json::to_value(&vals).unwrap();
        let expected_key = "east:bookinfo:virtualservice:reviews";
        assert!(json.get(expected_key).is_some());
        assert_eq!(json[expected_key]["valid"], serde_json::json!(true));
    }

    #[test]
    fn filter_by_kind_name() {
        let mut vals = Validations::new();
        vals.ensure(key("bookinfo", ObjectKind::VirtualService, "reviews"));
        vals.ensure(key("bookinfo", ObjectKind::DestinationRule, "reviews"));
        let filtered = vals.filter_by_kind_name(ObjectKind::VirtualService, "reviews");
        assert_eq!(filtered.len(), 1);
    }
}
