//! Resolve a workload's environment bindings to concrete values.

use std::collections::BTreeMap;

use deck_core::*;

use crate::error::{ClusterError, ClusterResult};
use crate::plane::ControlPlane;

/// Every env var of `workload` with its resolved value.
///
/// Secret values must be UTF-8. Address hosts resolve to the address name,
/// which is the in-cluster DNS name of the address.
pub fn resolve_env(
    plane: &dyn ControlPlane,
    workload: &WorkloadSpec,
) -> ClusterResult<BTreeMap<String, String>> {
    let id = Reference::new(ResourceKind::Workload, &workload.name);
    let mut resolved = BTreeMap::new();
    for (var, source) in &workload.env {
        let value = resolve_one(plane, &id, source)?;
        resolved.insert(var.clone(), value);
    }
    Ok(resolved)
}

fn fetch(plane: &dyn ControlPlane, id: &Reference, reference: Reference) -> ClusterResult<Resource> {
    plane
        .get(reference.kind, &reference.name)?
        .ok_or_else(|| ClusterError::MissingReference {
            resource: id.clone(),
            reference,
        })
}

fn resolve_one(plane: &dyn ControlPlane, id: &Reference, source: &EnvSource) -> ClusterResult<String> {
    if let EnvSource::Literal { value } = source {
        return Ok(value.clone());
    }
    let Some(reference) = source.reference() else {
        return Err(ClusterError::invalid(id.clone(), "binding names no source"));
    };
    let target = fetch(plane, id, reference.clone())?;
    let missing_key = |key: &str| ClusterError::MissingKey {
        set: reference.clone(),
        key: key.to_string(),
    };

    match (source, target) {
        (EnvSource::Secret { key, .. }, Resource::Secret(secret)) => {
            let bytes = secret.value(key).ok_or_else(|| missing_key(key))?;
            String::from_utf8(bytes).map_err(|_| {
                ClusterError::invalid(
                    id.clone(),
                    format!("{reference} key `{key}` is not valid UTF-8"),
                )
            })
        }
        (EnvSource::Config { key, .. }, Resource::Config(config)) => {
            config.data.get(key).cloned().ok_or_else(|| missing_key(key))
        }
        (EnvSource::AddressHost { .. }, Resource::Address(address)) => Ok(address.name),
        (EnvSource::AddressPort { .. }, Resource::Address(address)) => address
            .ports
            .first()
            .map(|p| p.port.to_string())
            .ok_or_else(|| ClusterError::invalid(reference.clone(), "no ports")),
        (_, other) => Err(ClusterError::invalid(
            id.clone(),
            format!("{reference} resolved to a {}", other.kind()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalCluster;

    fn setup() -> (LocalCluster, WorkloadSpec) {
        let cluster = LocalCluster::in_memory().unwrap();
        let mut data = BTreeMap::new();
        data.insert("username".to_string(), "database".to_string());
        let mut binary_data = BTreeMap::new();
        binary_data.insert("blob".to_string(), "ff".to_string());
        cluster
            .apply(&Resource::Secret(CredentialSet {
                name: "db".to_string(),
                data,
                binary_data,
            }))
            .unwrap();
        cluster
            .apply(&Resource::Workload(WorkloadSpec {
                name: "mysql".to_string(),
                replicas: 1,
                image: ImageSource::External("mysql:8.0".to_string()),
                port: 3306,
                env: BTreeMap::new(),
                mounts: vec![],
                args: vec![],
            }))
            .unwrap();
        cluster
            .apply(&Resource::Address(AddressSpec {
                name: "mysql".to_string(),
                workload: "mysql".to_string(),
                ports: vec![PortMapping {
                    port: 3306,
                    target_port: 3306,
                }],
            }))
            .unwrap();

        let mut env = BTreeMap::new();
        env.insert(
            "HOST".to_string(),
            EnvSource::AddressHost {
                address: "mysql".to_string(),
            },
        );
        env.insert(
            "PORT".to_string(),
            EnvSource::AddressPort {
                address: "mysql".to_string(),
            },
        );
        env.insert(
            "USER".to_string(),
            EnvSource::Secret {
                name: "db".to_string(),
                key: "username".to_string(),
            },
        );
        env.insert(
            "MODE".to_string(),
            EnvSource::Literal {
                value: "prod".to_string(),
            },
        );
        let app = WorkloadSpec {
            name: "app".to_string(),
            replicas: 1,
            image: ImageSource::External("app:1".to_string()),
            port: 8000,
            env,
            mounts: vec![],
            args: vec![],
        };
        (cluster, app)
    }

    #[test]
    fn resolves_every_source() {
        let (cluster, app) = setup();
        let env = resolve_env(&cluster, &app).unwrap();
        assert_eq!(env["HOST"], "mysql");
        assert_eq!(env["PORT"], "3306");
        assert_eq!(env["USER"], "database");
        assert_eq!(env["MODE"], "prod");
    }

    #[test]
    fn missing_set_and_key_are_reported() {
        let (cluster, mut app) = setup();
        app.env.insert(
            "NAME".to_string(),
            EnvSource::Config {
                name: "app-config".to_string(),
                key: "DATABASE_NAME".to_string(),
            },
        );
        assert!(matches!(
            resolve_env(&cluster, &app),
            Err(ClusterError::MissingReference { .. })
        ));

        app.env.remove("NAME");
        app.env.insert(
            "PASSWORD".to_string(),
            EnvSource::Secret {
                name: "db".to_string(),
                key: "password".to_string(),
            },
        );
        assert!(matches!(
            resolve_env(&cluster, &app),
            Err(ClusterError::MissingKey { .. })
        ));
    }

    #[test]
    fn non_utf8_secret_is_rejected() {
        let (cluster, mut app) = setup();
        app.env.insert(
            "BLOB".to_string(),
            EnvSource::Secret {
                name: "db".to_string(),
                key: "blob".to_string(),
            },
        );
        let err = resolve_env(&cluster, &app).unwrap_err();
        assert!(err.to_string().contains("UTF-8"), "{err}");
    }
}
