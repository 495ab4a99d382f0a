// Series -> group key. A `None` group excludes the series from aggregation.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::Labels;

pub type GroupKey = String;

pub trait GroupClassifier {
    fn classify(&self, labels: &Labels) -> Option<GroupKey>;
}

/// Groups by one label value; series without the label are excluded.
#[derive(Debug, Clone)]
pub struct LabelClassifier {
    label: String,
}

impl LabelClassifier {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl GroupClassifier for LabelClassifier {
    fn classify(&self, labels: &Labels) -> Option<GroupKey> {
        labels.get(&self.label).cloned()
    }
}

/// Deployment tables for `DeploymentClassifier`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRules {
    /// Deployments with output columns; everything else is dropped.
    pub watched: BTreeSet<String>,
    /// Column-name remaps kept for existing result tables.
    pub aliases: BTreeMap<String, String>,
    pub pod_label: String,
    pub container_label: String,
}

impl Default for DeploymentRules {
    fn default() -> Self {
        Self {
            watched: default_watched_deployments().into_iter().collect(),
            aliases: default_aliases(),
            pod_label: "pod_name".into(),
            container_label: "container_name".into(),
        }
    }
}

pub fn default_watched_deployments() -> Vec<String> {
    [
        "istio-pilot",
        "istio-telemetry",
        "istio-policy",
        "istio-ingressgateway",
        "fortioserver",
        "fortioclient",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

pub fn default_aliases() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("fortioserver".into(), "fortioserver_deployment".into()),
        ("fortioclient".into(), "fortio_deployment".into()),
    ])
}

/// Groups pods by deployment, optionally broken down per container.
#[derive(Debug, Clone)]
pub struct DeploymentClassifier {
    rules: DeploymentRules,
    per_container: bool,
}

impl DeploymentClassifier {
    pub fn new(rules: DeploymentRules) -> Self {
        Self {
            rules,
            per_container: false,
        }
    }

    pub fn per_container(rules: DeploymentRules) -> Self {
        Self {
            rules,
            per_container: true,
        }
    }

    pub fn rules(&self) -> &DeploymentRules {
        &self.rules
    }

    /// Watched deployment for a pod name, before aliasing.
    pub fn deployment<'a>(&self, pod_name: &'a str) -> Option<&'a str> {
        let depl = deployment_name(pod_name);
        self.rules.watched.contains(depl).then_some(depl)
    }
}

impl GroupClassifier for DeploymentClassifier {
    fn classify(&self, labels: &Labels) -> Option<GroupKey> {
        let pod = labels.get(&self.rules.pod_label)?;
        let depl = self.deployment(pod)?;
        let mapped = self
            .rules
            .aliases
            .get(depl)
            .map(String::as_str)
            .unwrap_or(depl);

        if !self.per_container {
            return Some(mapped.to_string());
        }
        match labels.get(&self.rules.container_label) {
            Some(container) => Some(format!("{}/{}", mapped, container)),
            None => {
                tracing::debug!(pod = %pod, "no container label; grouping by deployment");
                Some(mapped.to_string())
            }
        }
    }
}

/// Strips the ReplicaSet and pod-hash suffixes: at most the last two `-` segments.
pub fn deployment_name(pod_name: &str) -> &str {
    let mut name = pod_name;
    for _ in 0..2 {
        match name.rfind('-') {
            Some(idx) => name = &name[..idx],
            None => break,
        }
    }
    name
}
