//! Entity types shared across deck crates.
//!
//! Every entity is a flat, named record. References between entities are
//! by name and are listed by [`Resource::references`], which both the plan
//! validator and the control plane use to enforce creation order.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The kind of an entity. Names are unique within a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Image,
    Volume,
    Claim,
    Secret,
    Config,
    Workload,
    Address,
    Route,
    Autoscaler,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::Image,
        ResourceKind::Volume,
        ResourceKind::Claim,
        ResourceKind::Secret,
        ResourceKind::Config,
        ResourceKind::Workload,
        ResourceKind::Address,
        ResourceKind::Route,
        ResourceKind::Autoscaler,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Image => "image",
            ResourceKind::Volume => "volume",
            ResourceKind::Claim => "claim",
            ResourceKind::Secret => "secret",
            ResourceKind::Config => "config",
            ResourceKind::Workload => "workload",
            ResourceKind::Address => "address",
            ResourceKind::Route => "route",
            ResourceKind::Autoscaler => "autoscaler",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named reference from one entity to another.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub kind: ResourceKind,
    pub name: String,
}

impl Reference {
    pub fn new(kind: ResourceKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

// ── Resource ──────────────────────────────────────────────────────

/// Any entity a stage can apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    Image(ImageSpec),
    Volume(VolumeSpec),
    Claim(ClaimSpec),
    Secret(CredentialSet),
    Config(ConfigSet),
    Workload(WorkloadSpec),
    Address(AddressSpec),
    Route(RouteSpec),
    Autoscaler(AutoscalerSpec),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Image(_) => ResourceKind::Image,
            Resource::Volume(_) => ResourceKind::Volume,
            Resource::Claim(_) => ResourceKind::Claim,
            Resource::Secret(_) => ResourceKind::Secret,
            Resource::Config(_) => ResourceKind::Config,
            Resource::Workload(_) => ResourceKind::Workload,
            Resource::Address(_) => ResourceKind::Address,
            Resource::Route(_) => ResourceKind::Route,
            Resource::Autoscaler(_) => ResourceKind::Autoscaler,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Resource::Image(r) => &r.name,
            Resource::Volume(r) => &r.name,
            Resource::Claim(r) => &r.name,
            Resource::Secret(r) => &r.name,
            Resource::Config(r) => &r.name,
            Resource::Workload(r) => &r.name,
            Resource::Address(r) => &r.name,
            Resource::Route(r) => &r.name,
            Resource::Autoscaler(r) => &r.name,
        }
    }

    /// `kind/name`, used in logs and error messages.
    pub fn id(&self) -> Reference {
        Reference::new(self.kind(), self.name())
    }

    /// Entities that must exist before this one can be applied.
    ///
    /// A claim without an explicit volume binds at apply time and so has no
    /// static reference.
    pub fn references(&self) -> Vec<Reference> {
        match self {
            Resource::Image(_)
            | Resource::Volume(_)
            | Resource::Secret(_)
            | Resource::Config(_) => Vec::new(),
            Resource::Claim(c) => c
                .volume
                .iter()
                .map(|v| Reference::new(ResourceKind::Volume, v))
                .collect(),
            Resource::Workload(w) => w.references(),
            Resource::Address(a) => vec![Reference::new(ResourceKind::Workload, &a.workload)],
            Resource::Route(r) => vec![Reference::new(ResourceKind::Address, &r.address)],
            Resource::Autoscaler(a) => vec![Reference::new(ResourceKind::Workload, &a.workload)],
        }
    }
}

// ── Image ─────────────────────────────────────────────────────────

/// A container image built from a local context and published to a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub name: String,
    /// Registry host, e.g. `docker.io`. Empty means the builder's default.
    #[serde(default)]
    pub registry: String,
    pub repository: String,
    #[serde(default = "default_tag")]
    pub tag: String,
    /// Build context directory, relative to the plan file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<PathBuf>,
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    /// Content digest, filled in by the image builder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// Ports declared with `EXPOSE`, filled in by the image builder.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exposed_ports: Vec<u16>,
}

fn default_tag() -> String {
    "latest".to_string()
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

impl ImageSpec {
    /// Pullable reference: `registry/repository:tag`.
    pub fn reference(&self) -> String {
        if self.registry.is_empty() {
            format!("{}:{}", self.repository, self.tag)
        } else {
            format!("{}/{}:{}", self.registry, self.repository, self.tag)
        }
    }
}

// ── Storage ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    ReadWriteOnce,
    ReadOnlyMany,
    ReadWriteMany,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessMode::ReadWriteOnce => "ReadWriteOnce",
            AccessMode::ReadOnlyMany => "ReadOnlyMany",
            AccessMode::ReadWriteMany => "ReadWriteMany",
        };
        f.write_str(s)
    }
}

/// A durable storage pool that claims bind to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub name: String,
    /// Capacity as a quantity string, e.g. `5Gi`.
    pub capacity: String,
    pub access_mode: AccessMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<String>,
}

/// A request for durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimSpec {
    pub name: String,
    pub capacity: String,
    pub access_mode: AccessMode,
    /// Pin the claim to a specific volume. Otherwise any free volume that
    /// satisfies capacity and access mode is bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
}

// ── Credential / config sets ──────────────────────────────────────

/// Shared secret values. Values are opaque bytes: `data` holds them as
/// text, `binary_data` as hex.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialSet {
    pub name: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub binary_data: BTreeMap<String, String>,
}

impl CredentialSet {
    /// Raw bytes for `key`, or `None` if the key is absent or its hex is malformed.
    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(text) = self.data.get(key) {
            return Some(text.as_bytes().to_vec());
        }
        self.binary_data.get(key).and_then(|h| hex::decode(h).ok())
    }

    /// First `binary_data` key whose value is not valid hex.
    pub fn malformed_key(&self) -> Option<&str> {
        self.binary_data
            .iter()
            .find(|(_, h)| hex::decode(h).is_err())
            .map(|(k, _)| k.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key) || self.binary_data.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys().chain(self.binary_data.keys())
    }
}

// Values stay out of logs.
impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("name", &self.name)
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Non-secret settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSet {
    pub name: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

// ── Workload ──────────────────────────────────────────────────────

/// Where a workload's container image comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// An image entity built by the plan.
    Ref(String),
    /// A published image used as-is, e.g. `mysql:8.0`.
    External(String),
}

/// How one environment variable gets its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum EnvSource {
    Literal { value: String },
    Secret { name: String, key: String },
    Config { name: String, key: String },
    /// The in-cluster host name of an internal address.
    AddressHost { address: String },
    /// The first exposed port of an internal address.
    AddressPort { address: String },
}

impl EnvSource {
    pub fn reference(&self) -> Option<Reference> {
        match self {
            EnvSource::Literal { .. } => None,
            EnvSource::Secret { name, .. } => Some(Reference::new(ResourceKind::Secret, name)),
            EnvSource::Config { name, .. } => Some(Reference::new(ResourceKind::Config, name)),
            EnvSource::AddressHost { address } | EnvSource::AddressPort { address } => {
                Some(Reference::new(ResourceKind::Address, address))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mount {
    pub claim: String,
    pub path: String,
}

/// A replicated container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub name: String,
    pub replicas: u32,
    pub image: ImageSource,
    /// Container listening port.
    pub port: u16,
    #[serde(default)]
    pub env: BTreeMap<String, EnvSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl WorkloadSpec {
    fn references(&self) -> Vec<Reference> {
        let mut refs = Vec::new();
        if let ImageSource::Ref(image) = &self.image {
            refs.push(Reference::new(ResourceKind::Image, image));
        }
        refs.extend(self.env.values().filter_map(EnvSource::reference));
        refs.extend(
            self.mounts
                .iter()
                .map(|m| Reference::new(ResourceKind::Claim, &m.claim)),
        );
        refs.sort();
        refs.dedup();
        refs
    }
}

// ── Addresses and routes ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub port: u16,
    pub target_port: u16,
}

/// A stable in-cluster name for one workload's replicas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressSpec {
    pub name: String,
    pub workload: String,
    pub ports: Vec<PortMapping>,
}

impl AddressSpec {
    pub fn exposes(&self, port: u16) -> bool {
        self.ports.iter().any(|p| p.port == port)
    }
}

/// Maps an external host and path prefix to an internal address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub name: String,
    pub host: String,
    #[serde(default = "default_path")]
    pub path: String,
    pub address: String,
    pub port: u16,
}

fn default_path() -> String {
    "/".to_string()
}

/// Horizontal autoscaling target, handed to an external controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoscalerSpec {
    pub name: String,
    pub workload: String,
    /// Target average CPU utilization, percent.
    pub cpu_utilization: u32,
    pub min_replicas: u32,
    pub max_replicas: u32,
}
