//! In-process control plane over the ledger.
//!
//! Holds entity records in a [`StateStore`] and enforces the rules a real
//! control plane would: valid names, existing references, 1:1 claim to
//! volume binding, and port consistency between workloads, addresses and
//! routes. It does not run containers; `exec` succeeds for any workload
//! with at least one replica and is recorded in the exec journal.

use std::time::{SystemTime, UNIX_EPOCH};

use deck_core::names::is_valid_name;
use deck_core::*;
use deck_state::{ApplyOutcome, ExecRecord, ResourceRecord, StateStore};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{ClusterError, ClusterResult};
use crate::plane::{ControlPlane, ExecOutput};

#[derive(Clone)]
pub struct LocalCluster {
    store: StateStore,
}

impl LocalCluster {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// A cluster over a fresh in-memory ledger.
    pub fn in_memory() -> ClusterResult<Self> {
        Ok(Self::new(StateStore::open_in_memory()?))
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// The stored record, including digest, generation and binding.
    pub fn record(&self, kind: ResourceKind, name: &str) -> ClusterResult<Option<ResourceRecord>> {
        Ok(self.store.get_resource(kind, name)?)
    }

    /// Fetch a referenced entity or fail with `MissingReference`.
    fn require(&self, resource: &Reference, reference: Reference) -> ClusterResult<Resource> {
        match self.store.get_resource(reference.kind, &reference.name)? {
            Some(record) => Ok(record.resource),
            None => Err(ClusterError::MissingReference {
                resource: resource.clone(),
                reference,
            }),
        }
    }

    fn validate(&self, resource: &Resource) -> ClusterResult<()> {
        let id = resource.id();
        match resource {
            Resource::Image(image) => {
                if image.repository.is_empty() {
                    return Err(ClusterError::invalid(id, "repository is empty"));
                }
            }
            Resource::Volume(volume) => self.validate_volume(&id, volume)?,
            Resource::Claim(claim) => {
                parse_quantity(&claim.capacity)
                    .map_err(|e| ClusterError::invalid(id, e.to_string()))?;
            }
            Resource::Secret(secret) => {
                if let Some(key) = secret.malformed_key() {
                    return Err(ClusterError::invalid(
                        id,
                        format!("binary_data key `{key}` is not hex"),
                    ));
                }
            }
            Resource::Config(_) => {}
            Resource::Workload(workload) => self.validate_workload(&id, workload)?,
            Resource::Address(address) => self.validate_address(&id, address)?,
            Resource::Route(route) => self.validate_route(&id, route)?,
            Resource::Autoscaler(hpa) => {
                self.require(&id, Reference::new(ResourceKind::Workload, &hpa.workload))?;
                if hpa.min_replicas == 0 || hpa.min_replicas > hpa.max_replicas {
                    return Err(ClusterError::invalid(
                        id,
                        format!(
                            "replica bounds {}..{} must satisfy 1 <= min <= max",
                            hpa.min_replicas, hpa.max_replicas
                        ),
                    ));
                }
                if !(1..=100).contains(&hpa.cpu_utilization) {
                    return Err(ClusterError::invalid(
                        id,
                        format!("cpu utilization {}% is outside 1..=100", hpa.cpu_utilization),
                    ));
                }
            }
        }
        Ok(())
    }

    /// The claim currently bound to `volume`, if any.
    fn claim_bound_to(&self, volume: &str) -> ClusterResult<Option<ResourceRecord>> {
        Ok(self
            .store
            .list_resources(ResourceKind::Claim)?
            .into_iter()
            .find(|c| c.bound_to.as_deref() == Some(volume)))
    }

    /// A bound volume must keep satisfying its claim.
    fn validate_volume(&self, id: &Reference, volume: &VolumeSpec) -> ClusterResult<()> {
        let capacity = parse_quantity(&volume.capacity)
            .map_err(|e| ClusterError::invalid(id.clone(), e.to_string()))?;
        let Some(record) = self.claim_bound_to(&volume.name)? else {
            return Ok(());
        };
        let Resource::Claim(claim) = &record.resource else {
            return Ok(());
        };
        let wanted = parse_quantity(&claim.capacity)
            .map_err(|e| ClusterError::invalid(id.clone(), e.to_string()))?;
        if capacity < wanted || volume.access_mode != claim.access_mode {
            return Err(ClusterError::invalid(
                id.clone(),
                format!(
                    "bound to claim `{}` requesting {} {}, cannot offer {} {}",
                    claim.name,
                    claim.capacity,
                    claim.access_mode,
                    volume.capacity,
                    volume.access_mode
                ),
            ));
        }
        Ok(())
    }

    fn validate_workload(&self, id: &Reference, workload: &WorkloadSpec) -> ClusterResult<()> {
        if workload.port == 0 {
            return Err(ClusterError::invalid(id.clone(), "container port is 0"));
        }
        if let ImageSource::Ref(image) = &workload.image {
            self.require(id, Reference::new(ResourceKind::Image, image))?;
        }
        for source in workload.env.values() {
            match source {
                EnvSource::Literal { .. } => {}
                EnvSource::Secret { name, key } => {
                    let set = Reference::new(ResourceKind::Secret, name);
                    if let Resource::Secret(secret) = self.require(id, set.clone())? {
                        if !secret.contains_key(key) {
                            return Err(ClusterError::MissingKey { set, key: key.clone() });
                        }
                    }
                }
                EnvSource::Config { name, key } => {
                    let set = Reference::new(ResourceKind::Config, name);
                    if let Resource::Config(config) = self.require(id, set.clone())? {
                        if !config.data.contains_key(key) {
                            return Err(ClusterError::MissingKey { set, key: key.clone() });
                        }
                    }
                }
                EnvSource::AddressHost { address } | EnvSource::AddressPort { address } => {
                    self.require(id, Reference::new(ResourceKind::Address, address))?;
                }
            }
        }
        for mount in &workload.mounts {
            self.require(id, Reference::new(ResourceKind::Claim, &mount.claim))?;
        }
        Ok(())
    }

    fn validate_address(&self, id: &Reference, address: &AddressSpec) -> ClusterResult<()> {
        let target = self.require(id, Reference::new(ResourceKind::Workload, &address.workload))?;
        if address.ports.is_empty() {
            return Err(ClusterError::invalid(id.clone(), "no ports"));
        }
        let Resource::Workload(workload) = target else {
            return Ok(());
        };
        for mapping in &address.ports {
            if mapping.port == 0 {
                return Err(ClusterError::invalid(id.clone(), "port 0"));
            }
            if mapping.target_port != workload.port {
                return Err(ClusterError::invalid(
                    id.clone(),
                    format!(
                        "target port {} does not match workload `{}` port {}",
                        mapping.target_port, workload.name, workload.port
                    ),
                ));
            }
        }
        Ok(())
    }

    fn validate_route(&self, id: &Reference, route: &RouteSpec) -> ClusterResult<()> {
        if route.host.is_empty() || !route.host.split('.').all(is_valid_name) {
            return Err(ClusterError::invalid(
                id.clone(),
                format!("host `{}` must be dot-separated DNS labels", route.host),
            ));
        }
        if !route.path.starts_with('/') {
            return Err(ClusterError::invalid(
                id.clone(),
                format!("path `{}` must start with `/`", route.path),
            ));
        }
        let target = self.require(id, Reference::new(ResourceKind::Address, &route.address))?;
        if let Resource::Address(address) = target {
            if !address.exposes(route.port) {
                return Err(ClusterError::invalid(
                    id.clone(),
                    format!(
                        "address `{}` does not expose port {}",
                        address.name, route.port
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Pick the volume a claim binds to. A claim keeps its current volume
    /// while that volume still satisfies it.
    fn bind_claim(
        &self,
        claim: &ClaimSpec,
        existing: Option<&ResourceRecord>,
    ) -> ClusterResult<String> {
        let id = Reference::new(ResourceKind::Claim, &claim.name);
        let wanted = parse_quantity(&claim.capacity)
            .map_err(|e| ClusterError::invalid(id.clone(), e.to_string()))?;

        let candidates: Vec<VolumeSpec> = match &claim.volume {
            Some(volume) => {
                match self.require(&id, Reference::new(ResourceKind::Volume, volume))? {
                    Resource::Volume(v) => vec![v],
                    _ => Vec::new(),
                }
            }
            None => {
                let current = existing.and_then(|r| r.bound_to.as_deref());
                let mut volumes: Vec<VolumeSpec> = self
                    .store
                    .list_resources(ResourceKind::Volume)?
                    .into_iter()
                    .filter_map(|r| match r.resource {
                        Resource::Volume(v) => Some(v),
                        _ => None,
                    })
                    .collect();
                volumes.sort_by_key(|v| Some(v.name.as_str()) != current);
                volumes
            }
        };

        let claims = self.store.list_resources(ResourceKind::Claim)?;
        let holder = |volume: &str| {
            claims
                .iter()
                .find(|c| c.bound_to.as_deref() == Some(volume) && c.table_key() != claim.name)
                .map(|c| c.table_key().to_string())
        };

        let pinned = claim.volume.is_some();
        for volume in candidates {
            if let Some(bound_to) = holder(&volume.name) {
                if pinned {
                    return Err(ClusterError::Bound {
                        volume: volume.name,
                        bound_to,
                    });
                }
                continue;
            }
            let capacity = parse_quantity(&volume.capacity)
                .map_err(|e| ClusterError::invalid(id.clone(), e.to_string()))?;
            if capacity >= wanted && volume.access_mode == claim.access_mode {
                return Ok(volume.name);
            }
            if pinned {
                return Err(ClusterError::invalid(
                    id,
                    format!(
                        "volume `{}` offers {} {}, claim requests {} {}",
                        volume.name,
                        volume.capacity,
                        volume.access_mode,
                        claim.capacity,
                        claim.access_mode
                    ),
                ));
            }
        }

        Err(ClusterError::invalid(
            id,
            format!(
                "no free volume offers {} {}",
                claim.capacity, claim.access_mode
            ),
        ))
    }
}

impl ControlPlane for LocalCluster {
    fn apply(&self, resource: &Resource) -> ClusterResult<ApplyOutcome> {
        let kind = resource.kind();
        let name = resource.name();
        if !is_valid_name(name) {
            return Err(ClusterError::InvalidName {
                kind,
                name: name.to_string(),
            });
        }

        self.validate(resource)?;
        let digest = resource_digest(resource)?;
        let existing = self.store.get_resource(kind, name)?;
        let bound_to = match resource {
            Resource::Claim(claim) => Some(self.bind_claim(claim, existing.as_ref())?),
            _ => None,
        };

        let (outcome, generation) = match &existing {
            Some(record) if record.digest == digest && record.bound_to == bound_to => {
                debug!(%kind, %name, "unchanged");
                return Ok(ApplyOutcome::Unchanged);
            }
            Some(record) => (ApplyOutcome::Configured, record.generation + 1),
            None => (ApplyOutcome::Created, 1),
        };

        self.store.put_resource(&ResourceRecord {
            resource: resource.clone(),
            digest,
            generation,
            bound_to: bound_to.clone(),
        })?;
        info!(
            %kind,
            %name,
            outcome = outcome.label(),
            generation,
            bound_to = bound_to.as_deref().unwrap_or("-"),
            "applied"
        );
        Ok(outcome)
    }

    fn get(&self, kind: ResourceKind, name: &str) -> ClusterResult<Option<Resource>> {
        Ok(self.store.get_resource(kind, name)?.map(|r| r.resource))
    }

    fn list(&self) -> ClusterResult<Vec<Resource>> {
        Ok(self
            .store
            .list_all_resources()?
            .into_iter()
            .map(|r| r.resource)
            .collect())
    }

    fn delete(&self, kind: ResourceKind, name: &str) -> ClusterResult<bool> {
        if kind == ResourceKind::Volume {
            if let Some(claim) = self.claim_bound_to(name)? {
                return Err(ClusterError::Bound {
                    volume: name.to_string(),
                    bound_to: claim.table_key().to_string(),
                });
            }
        }
        let existed = self.store.delete_resource(kind, name)?;
        if existed {
            info!(%kind, %name, "deleted");
        }
        Ok(existed)
    }

    fn exec(&self, workload: &str, command: &[String]) -> ClusterResult<ExecOutput> {
        let exec_err = |reason: &str| ClusterError::Exec {
            workload: workload.to_string(),
            reason: reason.to_string(),
        };
        if command.is_empty() {
            return Err(exec_err("empty command"));
        }
        match self.store.get_resource(ResourceKind::Workload, workload)? {
            Some(ResourceRecord {
                resource: Resource::Workload(w),
                ..
            }) if w.replicas > 0 => {}
            Some(_) => return Err(exec_err("no running replicas")),
            None => return Err(exec_err("workload does not exist")),
        }

        let seq = self.store.append_exec(&ExecRecord {
            seq: 0,
            workload: workload.to_string(),
            command: command.to_vec(),
            exit_code: 0,
            at: epoch_secs(),
        })?;
        debug!(%workload, seq, command = %command.join(" "), "exec");
        Ok(ExecOutput::default())
    }
}

/// `sha256:<hex>` of the entity's JSON encoding. Maps are ordered, so equal
/// entities always hash equally.
pub fn resource_digest(resource: &Resource) -> ClusterResult<String> {
    let bytes = serde_json::to_vec(resource)
        .map_err(|e| ClusterError::invalid(resource.id(), e.to_string()))?;
    Ok(format!("sha256:{}", hex::encode(Sha256::digest(&bytes))))
}

/// Seconds since the Unix epoch.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
