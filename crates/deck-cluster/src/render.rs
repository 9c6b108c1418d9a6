//! Render entities as Kubernetes manifests for an external `kubectl apply`.
//!
//! Images are built, not applied, so they produce no manifest; workloads
//! refer to them by their published reference.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use deck_core::*;
use serde_json::{Value, json};

use crate::error::{ClusterError, ClusterResult};

fn metadata(name: &str) -> Value {
    json!({ "name": name, "labels": { "app.kubernetes.io/managed-by": "deck" } })
}

/// One manifest per applicable entity, in the given order. `resources` is
/// also used to look up images and address ports referenced by workloads.
pub fn manifests(resources: &[&Resource]) -> ClusterResult<Vec<Value>> {
    let mut out = Vec::with_capacity(resources.len());
    for resource in resources {
        if let Some(value) = manifest(resource, resources)? {
            out.push(value);
        }
    }
    Ok(out)
}

fn manifest(resource: &Resource, all: &[&Resource]) -> ClusterResult<Option<Value>> {
    let value = match resource {
        Resource::Image(_) => return Ok(None),
        Resource::Volume(v) => {
            let mut spec = json!({
                "capacity": { "storage": v.capacity },
                "accessModes": [v.access_mode.to_string()],
            });
            if let Some(path) = &v.host_path {
                spec["hostPath"] = json!({ "path": path });
            }
            json!({
                "apiVersion": "v1",
                "kind": "PersistentVolume",
                "metadata": metadata(&v.name),
                "spec": spec,
            })
        }
        Resource::Claim(c) => {
            let mut spec = json!({
                "accessModes": [c.access_mode.to_string()],
                "resources": { "requests": { "storage": c.capacity } },
            });
            if let Some(volume) = &c.volume {
                spec["volumeName"] = json!(volume);
            }
            json!({
                "apiVersion": "v1",
                "kind": "PersistentVolumeClaim",
                "metadata": metadata(&c.name),
                "spec": spec,
            })
        }
        Resource::Secret(s) => {
            let mut data = serde_json::Map::new();
            for (key, encoded) in &s.binary_data {
                let bytes = hex::decode(encoded).map_err(|_| {
                    ClusterError::invalid(
                        resource.id(),
                        format!("binary_data key `{key}` is not hex"),
                    )
                })?;
                data.insert(key.clone(), json!(BASE64.encode(bytes)));
            }
            let mut secret = json!({
                "apiVersion": "v1",
                "kind": "Secret",
                "metadata": metadata(&s.name),
                "type": "Opaque",
                "stringData": s.data,
            });
            if !data.is_empty() {
                secret["data"] = Value::Object(data);
            }
            secret
        }
        Resource::Config(c) => json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": metadata(&c.name),
            "data": c.data,
        }),
        Resource::Workload(w) => deployment(w, all),
        Resource::Address(a) => json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": metadata(&a.name),
            "spec": {
                "selector": { "app": a.workload },
                "ports": a.ports.iter().map(|p| json!({
                    "port": p.port,
                    "targetPort": p.target_port,
                })).collect::<Vec<_>>(),
            },
        }),
        Resource::Route(r) => json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "Ingress",
            "metadata": metadata(&r.name),
            "spec": {
                "rules": [{
                    "host": r.host,
                    "http": {
                        "paths": [{
                            "path": r.path,
                            "pathType": "Prefix",
                            "backend": {
                                "service": { "name": r.address, "port": { "number": r.port } },
                            },
                        }],
                    },
                }],
            },
        }),
        Resource::Autoscaler(h) => json!({
            "apiVersion": "autoscaling/v2",
            "kind": "HorizontalPodAutoscaler",
            "metadata": metadata(&h.name),
            "spec": {
                "scaleTargetRef": { "apiVersion": "apps/v1", "kind": "Deployment", "name": h.workload },
                "minReplicas": h.min_replicas,
                "maxReplicas": h.max_replicas,
                "metrics": [{
                    "type": "Resource",
                    "resource": {
                        "name": "cpu",
                        "target": { "type": "Utilization", "averageUtilization": h.cpu_utilization },
                    },
                }],
            },
        }),
    };
    Ok(Some(value))
}

fn deployment(w: &WorkloadSpec, all: &[&Resource]) -> Value {
    let image = match &w.image {
        ImageSource::External(reference) => reference.clone(),
        ImageSource::Ref(name) => all
            .iter()
            .find_map(|r| match r {
                Resource::Image(i) if &i.name == name => Some(i.reference()),
                _ => None,
            })
            .unwrap_or_else(|| name.clone()),
    };

    let env: Vec<Value> = w
        .env
        .iter()
        .map(|(var, source)| match source {
            EnvSource::Literal { value } => json!({ "name": var, "value": value }),
            EnvSource::Secret { name, key } => json!({
                "name": var,
                "valueFrom": { "secretKeyRef": { "name": name, "key": key } },
            }),
            EnvSource::Config { name, key } => json!({
                "name": var,
                "valueFrom": { "configMapKeyRef": { "name": name, "key": key } },
            }),
            EnvSource::AddressHost { address } => json!({ "name": var, "value": address }),
            EnvSource::AddressPort { address } => {
                let port = all
                    .iter()
                    .find_map(|r| match r {
                        Resource::Address(a) if &a.name == address => {
                            a.ports.first().map(|p| p.port.to_string())
                        }
                        _ => None,
                    })
                    .unwrap_or_default();
                json!({ "name": var, "value": port })
            }
        })
        .collect();

    let mut container = json!({
        "name": w.name,
        "image": image,
        "ports": [{ "containerPort": w.port }],
        "env": env,
    });
    if !w.args.is_empty() {
        container["args"] = json!(w.args);
    }
    if !w.mounts.is_empty() {
        container["volumeMounts"] = w
            .mounts
            .iter()
            .map(|m| json!({ "name": m.claim, "mountPath": m.path }))
            .collect();
    }
    let volumes: Vec<Value> = w
        .mounts
        .iter()
        .map(|m| json!({ "name": m.claim, "persistentVolumeClaim": { "claimName": m.claim } }))
        .collect();

    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": metadata(&w.name),
        "spec": {
            "replicas": w.replicas,
            "selector": { "matchLabels": { "app": w.name } },
            "template": {
                "metadata": { "labels": { "app": w.name } },
                "spec": { "containers": [container], "volumes": volumes },
            },
        },
    })
}

/// A `v1/List` wrapping the manifests.
pub fn to_json(manifests: &[Value]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&json!({
        "apiVersion": "v1",
        "kind": "List",
        "items": manifests,
    }))
}

/// Multi-document YAML, one document per manifest.
pub fn to_yaml(manifests: &[Value]) -> Result<String, serde_yaml::Error> {
    let mut out = String::new();
    for manifest in manifests {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(manifest)?);
    }
    Ok(out)
}
