//! The reference plan: a Django application backed by MySQL.
//!
//! `deck init` writes this plan as a starting point. The values match the
//! deployment walkthrough it encodes: database `mydb`, user `database`,
//! database address `mysql:3306`, two application replicas on port 8000,
//! exposed as `mydjangoapp.com/`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::{CheckConfig, ExecAction, Plan, ProjectConfig, StageConfig};
use crate::types::*;

pub const DATABASE_NAME: &str = "mydb";
pub const DATABASE_USER: &str = "database";
pub const DATABASE_ADDRESS: &str = "mysql";
pub const DATABASE_PORT: u16 = 3306;
pub const APP_WORKLOAD: &str = "django";
pub const APP_ADDRESS: &str = "django-service";
pub const APP_PORT: u16 = 8000;
pub const APP_REPLICAS: u32 = 2;
pub const APP_HOST: &str = "mydjangoapp.com";
pub const SECRET_NAME: &str = "mysql-secret";
pub const CONFIG_NAME: &str = "django-config";
pub const IMAGE_NAME: &str = "mydjangoapp";

fn stage(name: &str, depends_on: &[&str], resources: Vec<Resource>) -> StageConfig {
    StageConfig {
        name: name.to_string(),
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        resources,
        exec: Vec::new(),
    }
}

fn secret_env(key: &str) -> EnvSource {
    EnvSource::Secret {
        name: SECRET_NAME.to_string(),
        key: key.to_string(),
    }
}

fn config_env(key: &str) -> EnvSource {
    EnvSource::Config {
        name: CONFIG_NAME.to_string(),
        key: key.to_string(),
    }
}

fn strings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Plan {
    /// The reference plan. `registry_user` namespaces the published image.
    pub fn guide(registry_user: &str) -> Self {
        let image = Resource::Image(ImageSpec {
            name: IMAGE_NAME.to_string(),
            registry: "docker.io".to_string(),
            repository: format!("{registry_user}/{IMAGE_NAME}"),
            tag: "latest".to_string(),
            context: Some(PathBuf::from(".")),
            dockerfile: "Dockerfile".to_string(),
            digest: None,
            exposed_ports: Vec::new(),
        });

        let volume = Resource::Volume(VolumeSpec {
            name: "mysql-pv".to_string(),
            capacity: "5Gi".to_string(),
            access_mode: AccessMode::ReadWriteOnce,
            host_path: Some("/mnt/data".to_string()),
        });
        let claim = Resource::Claim(ClaimSpec {
            name: "mysql-pv-claim".to_string(),
            capacity: "5Gi".to_string(),
            access_mode: AccessMode::ReadWriteOnce,
            volume: None,
        });

        let secret = Resource::Secret(CredentialSet {
            name: SECRET_NAME.to_string(),
            data: strings(&[
                ("root-password", "change-me-root"),
                ("username", DATABASE_USER),
                ("password", "change-me"),
            ]),
            binary_data: BTreeMap::new(),
        });

        let config = Resource::Config(ConfigSet {
            name: CONFIG_NAME.to_string(),
            data: strings(&[
                ("DATABASE_NAME", DATABASE_NAME),
                ("DJANGO_ALLOWED_HOSTS", APP_HOST),
                ("DJANGO_DEBUG", "False"),
            ]),
        });

        let mut mysql_env = BTreeMap::new();
        mysql_env.insert("MYSQL_ROOT_PASSWORD".to_string(), secret_env("root-password"));
        mysql_env.insert(
            "MYSQL_DATABASE".to_string(),
            EnvSource::Literal {
                value: DATABASE_NAME.to_string(),
            },
        );
        mysql_env.insert("MYSQL_USER".to_string(), secret_env("username"));
        mysql_env.insert("MYSQL_PASSWORD".to_string(), secret_env("password"));
        let mysql = Resource::Workload(WorkloadSpec {
            name: DATABASE_ADDRESS.to_string(),
            replicas: 1,
            image: ImageSource::External("mysql:8.0".to_string()),
            port: DATABASE_PORT,
            env: mysql_env,
            mounts: vec![Mount {
                claim: "mysql-pv-claim".to_string(),
                path: "/var/lib/mysql".to_string(),
            }],
            args: Vec::new(),
        });
        let mysql_address = Resource::Address(AddressSpec {
            name: DATABASE_ADDRESS.to_string(),
            workload: DATABASE_ADDRESS.to_string(),
            ports: vec![PortMapping {
                port: DATABASE_PORT,
                target_port: DATABASE_PORT,
            }],
        });

        let mut django_env = BTreeMap::new();
        django_env.insert("DATABASE_NAME".to_string(), config_env("DATABASE_NAME"));
        django_env.insert("DATABASE_USER".to_string(), secret_env("username"));
        django_env.insert("DATABASE_PASSWORD".to_string(), secret_env("password"));
        django_env.insert(
            "DATABASE_HOST".to_string(),
            EnvSource::AddressHost {
                address: DATABASE_ADDRESS.to_string(),
            },
        );
        django_env.insert(
            "DATABASE_PORT".to_string(),
            EnvSource::AddressPort {
                address: DATABASE_ADDRESS.to_string(),
            },
        );
        django_env.insert(
            "DJANGO_ALLOWED_HOSTS".to_string(),
            config_env("DJANGO_ALLOWED_HOSTS"),
        );
        django_env.insert("DJANGO_DEBUG".to_string(), config_env("DJANGO_DEBUG"));
        let django = Resource::Workload(WorkloadSpec {
            name: APP_WORKLOAD.to_string(),
            replicas: APP_REPLICAS,
            image: ImageSource::Ref(IMAGE_NAME.to_string()),
            port: APP_PORT,
            env: django_env,
            mounts: Vec::new(),
            args: Vec::new(),
        });
        let django_address = Resource::Address(AddressSpec {
            name: APP_ADDRESS.to_string(),
            workload: APP_WORKLOAD.to_string(),
            ports: vec![PortMapping {
                port: APP_PORT,
                target_port: APP_PORT,
            }],
        });

        let route = Resource::Route(RouteSpec {
            name: "django-ingress".to_string(),
            host: APP_HOST.to_string(),
            path: "/".to_string(),
            address: APP_ADDRESS.to_string(),
            port: APP_PORT,
        });

        let hpa = Resource::Autoscaler(AutoscalerSpec {
            name: "django-hpa".to_string(),
            workload: APP_WORKLOAD.to_string(),
            cpu_utilization: 50,
            min_replicas: APP_REPLICAS,
            max_replicas: 5,
        });

        let mut migrate = stage("migrate", &["application", "database"], Vec::new());
        migrate.exec.push(ExecAction {
            workload: APP_WORKLOAD.to_string(),
            command: ["python", "manage.py", "migrate", "--noinput"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        });

        Plan {
            project: ProjectConfig {
                name: IMAGE_NAME.to_string(),
                version: "0.1.0".to_string(),
                description: Some("Django application with a MySQL database".to_string()),
            },
            stages: vec![
                stage("image", &[], vec![image]),
                stage("storage", &[], vec![volume, claim]),
                stage("secret", &[], vec![secret]),
                stage("config", &[], vec![config]),
                stage("database", &["storage", "secret"], vec![mysql, mysql_address]),
                stage(
                    "application",
                    &["image", "secret", "config", "database"],
                    vec![django, django_address],
                ),
                stage("exposure", &["application"], vec![route]),
                stage("autoscale", &["application"], vec![hpa]),
                migrate,
            ],
            checks: vec![
                CheckConfig::Database {
                    name: "database-connectivity".to_string(),
                    workload: APP_WORKLOAD.to_string(),
                    host_env: "DATABASE_HOST".to_string(),
                    port_env: "DATABASE_PORT".to_string(),
                    command: None,
                },
                CheckConfig::Route {
                    name: "ingress".to_string(),
                    route: "django-ingress".to_string(),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guide_shape() {
        let plan = Plan::guide("someone");
        let names: Vec<_> = plan.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "image",
                "storage",
                "secret",
                "config",
                "database",
                "application",
                "exposure",
                "autoscale",
                "migrate"
            ]
        );
        assert_eq!(plan.resources().count(), 11);

        let Some(Resource::Workload(app)) = plan.find_resource(ResourceKind::Workload, APP_WORKLOAD)
        else {
            panic!("expected application workload");
        };
        assert_eq!(app.replicas, 2);
        assert_eq!(app.port, 8000);
    }

    #[test]
    fn test_guide_round_trips_through_toml() {
        let plan = Plan::guide("someone");
        let toml_str = plan.to_toml_string().unwrap();
        assert!(toml_str.contains("mydjangoapp.com"));
        assert!(toml_str.contains("someone/mydjangoapp"));

        let back = Plan::from_toml_str(&toml_str).unwrap();
        assert_eq!(back, plan);
    }
}
