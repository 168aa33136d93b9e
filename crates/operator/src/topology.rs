//! Mapping between live database nodes and StatefulSet pod ordinals

use crate::directory::NodeHost;
use crate::error::{OperatorError, Result};
use crate::platform::{PodInfo, ResourceClient};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// How nodes registered themselves with the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    /// Stable per-pod DNS names `<pod>.<service>.<namespace>...`
    Fqdn,
    /// Pod IPs, which change when a pod is rescheduled
    Ip,
}

/// Nodes keyed by the ordinal of the pod they run in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTopology<N> {
    pub placed: Vec<(u32, N)>,
    /// Nodes whose address matches no current pod
    pub orphans: Vec<N>,
}

impl<N> Default for ResolvedTopology<N> {
    fn default() -> Self {
        Self {
            placed: Vec::new(),
            orphans: Vec::new(),
        }
    }
}

impl<N> ResolvedTopology<N> {
    pub fn len(&self) -> usize {
        self.placed.len() + self.orphans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordinal of `name` when it is `<prefix>-<n>`
pub fn parse_ordinal(name: &str, prefix: &str) -> Result<u32> {
    let unresolvable = || {
        OperatorError::UnresolvableTopology(format!(
            "'{}' is not a replica name of '{}'",
            name, prefix
        ))
    };
    if !name.starts_with(prefix) || name[prefix.len()..].chars().next() != Some('-') {
        return Err(unresolvable());
    }
    name.rsplit('-')
        .next()
        .and_then(|segment| segment.parse::<u32>().ok())
        .ok_or_else(unresolvable)
}

/// First DNS label of a host name
pub fn pod_label(host: &str) -> &str {
    host.split('.').next().unwrap_or(host)
}

/// Resolve nodes registered under stable host names; every node must parse
pub fn resolve_by_hostname<N: NodeHost>(nodes: Vec<N>, prefix: &str) -> Result<ResolvedTopology<N>> {
    let mut topology = ResolvedTopology::default();
    for node in nodes {
        let ordinal = parse_ordinal(pod_label(node.host()), prefix)?;
        topology.placed.push((ordinal, node));
    }
    Ok(topology)
}

/// IP → pod name for the pods of one StatefulSet
pub fn ip_to_pod_map(pods: &[PodInfo], prefix: &str) -> HashMap<String, String> {
    pods.iter()
        .filter(|pod| pod.name.starts_with(prefix))
        .filter_map(|pod| pod.ip.as_ref().map(|ip| (ip.clone(), pod.name.clone())))
        .collect()
}

/// Resolve nodes registered by IP. Unknown IPs become orphans.
pub fn resolve_by_ip<N: NodeHost>(
    nodes: Vec<N>,
    ip_to_pod: &HashMap<String, String>,
    prefix: &str,
) -> Result<ResolvedTopology<N>> {
    let mut topology = ResolvedTopology::default();
    for node in nodes {
        match ip_to_pod.get(node.host()) {
            Some(pod) => {
                let ordinal = parse_ordinal(pod, prefix)?;
                topology.placed.push((ordinal, node));
            }
            None => {
                warn!(host = %node.host(), prefix = %prefix, "Node address matches no pod, treating as orphan");
                topology.orphans.push(node);
            }
        }
    }
    Ok(topology)
}

/// Resolves topologies, listing pods through the platform when needed
pub struct TopologyResolver {
    resources: Arc<dyn ResourceClient>,
}

impl TopologyResolver {
    pub fn new(resources: Arc<dyn ResourceClient>) -> Self {
        Self { resources }
    }

    pub async fn resolve<N: NodeHost + Send>(
        &self,
        nodes: Vec<N>,
        mode: AddressingMode,
        prefix: &str,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<ResolvedTopology<N>> {
        match mode {
            AddressingMode::Fqdn => resolve_by_hostname(nodes, prefix),
            AddressingMode::Ip => {
                let pods = self.resources.list_pods(namespace, selector).await?;
                let map = ip_to_pod_map(&pods, prefix);
                debug!(pods = map.len(), prefix = %prefix, "Built IP to pod map");
                resolve_by_ip(nodes, &map, prefix)
            }
        }
    }
}
