//! Object sanitisation
//!
//! Every object leaving the agent passes through [`Sanitizer::sanitize`]:
//! ConfigMap and Secret payloads are always dropped, and container
//! environment variables are stripped when redaction is enabled.

use kubetrail_common::ResourceObject;
use serde_json::Value;

const CONTAINER_LISTS: [&str; 2] = ["containers", "initContainers"];

/// Location of the pod spec inside objects that carry one.
fn pod_spec_path(kind: &str) -> Option<&'static [&'static str]> {
    match kind {
        "Pod" => Some(&["spec"]),
        "Deployment" | "StatefulSet" | "DaemonSet" | "Job" => Some(&["spec", "template", "spec"]),
        "CronJob" => Some(&["spec", "jobTemplate", "spec", "template", "spec"]),
        _ => None,
    }
}

pub fn is_config_map_or_secret(object: &ResourceObject) -> bool {
    matches!(object.kind(), "ConfigMap" | "Secret")
}

/// Remove the `data` field of ConfigMaps and Secrets.
pub fn prune_data(object: &mut ResourceObject) {
    if is_config_map_or_secret(object) {
        object.remove_field("data");
    }
}

/// Remove `env` from every container and init container of the object's pod spec.
pub fn redact_env(object: &mut ResourceObject) {
    let Some(path) = pod_spec_path(object.kind()) else {
        return;
    };
    let Some(pod_spec) = object.nested_mut(path) else {
        return;
    };

    for list in CONTAINER_LISTS {
        if let Some(containers) = pod_spec.get_mut(list).and_then(Value::as_array_mut) {
            for container in containers.iter_mut().filter_map(Value::as_object_mut) {
                container.remove("env");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sanitizer {
    redact_env: bool,
}

impl Sanitizer {
    pub fn new(redact_env: bool) -> Self {
        Self { redact_env }
    }

    pub fn redacts_env(&self) -> bool {
        self.redact_env
    }

    pub fn sanitize(&self, mut object: ResourceObject) -> ResourceObject {
        prune_data(&mut object);
        if self.redact_env {
            redact_env(&mut object);
        }
        object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
    use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, Job, JobSpec, JobTemplateSpec};
    use k8s_openapi::api::core::v1::{Container, EnvVar, Pod, PodSpec, PodTemplateSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde::Serialize;
    use serde_json::json;

    fn to_object<T: Serialize>(resource: &T) -> ResourceObject {
        ResourceObject::try_from(serde_json::to_value(resource).unwrap()).unwrap()
    }

    fn container(name: &str, with_env: bool) -> Container {
        Container {
            name: name.to_string(),
            image: Some("nginx:1.25".to_string()),
            env: with_env.then(|| {
                vec![EnvVar {
                    name: "PASSWORD".to_string(),
                    value: Some("hunter2".to_string()),
                    ..Default::default()
                }]
            }),
            ..Default::default()
        }
    }

    fn pod_spec(with_env: bool) -> PodSpec {
        PodSpec {
            containers: vec![container("app", with_env)],
            init_containers: Some(vec![container("init", with_env)]),
            ..Default::default()
        }
    }

    fn template(with_env: bool) -> PodTemplateSpec {
        PodTemplateSpec {
            metadata: None,
            spec: Some(pod_spec(with_env)),
        }
    }

    fn meta() -> ObjectMeta {
        ObjectMeta {
            name: Some("subject".to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        }
    }

    fn redacted(mut object: ResourceObject) -> ResourceObject {
        redact_env(&mut object);
        object
    }

    #[test]
    fn test_redact_pod() {
        let input = to_object(&Pod {
            metadata: meta(),
            spec: Some(pod_spec(true)),
            status: None,
        });
        let expected = to_object(&Pod {
            metadata: meta(),
            spec: Some(pod_spec(false)),
            status: None,
        });
        assert_eq!(redacted(input), expected);
    }

    #[test]
    fn test_redact_deployment_template() {
        let build = |env| Deployment {
            metadata: meta(),
            spec: Some(DeploymentSpec {
                template: template(env),
                ..Default::default()
            }),
            status: None,
        };
        assert_eq!(redacted(to_object(&build(true))), to_object(&build(false)));
    }

    #[test]
    fn test_redact_statefulset_template() {
        let build = |env| StatefulSet {
            metadata: meta(),
            spec: Some(StatefulSetSpec {
                template: template(env),
                ..Default::default()
            }),
            status: None,
        };
        assert_eq!(redacted(to_object(&build(true))), to_object(&build(false)));
    }

    #[test]
    fn test_redact_job_template() {
        let build = |env| Job {
            metadata: meta(),
            spec: Some(JobSpec {
                template: template(env),
                ..Default::default()
            }),
            status: None,
        };
        assert_eq!(redacted(to_object(&build(true))), to_object(&build(false)));
    }

    #[test]
    fn test_redact_cronjob_job_template() {
        let build = |env| CronJob {
            metadata: meta(),
            spec: Some(CronJobSpec {
                schedule: "0 3 * * *".to_string(),
                job_template: JobTemplateSpec {
                    metadata: None,
                    spec: Some(JobSpec {
                        template: template(env),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            status: None,
        };
        assert_eq!(redacted(to_object(&build(true))), to_object(&build(false)));
    }

    #[test]
    fn test_redact_keeps_container_identity() {
        let object = redacted(to_object(&Pod {
            metadata: meta(),
            spec: Some(pod_spec(true)),
            status: None,
        }));
        let app = object.nested(&["spec", "containers"]).unwrap()[0].clone();
        assert_eq!(app["name"], "app");
        assert_eq!(app["image"], "nginx:1.25");
        assert!(app.get("env").is_none());
    }

    #[test]
    fn test_redact_ignores_other_kinds() {
        let raw = json!({
            "apiVersion": "v1",
            "kind": "ReplicationController",
            "metadata": {"name": "rc"},
            "spec": {"template": {"spec": {"containers": [{"name": "a", "env": []}]}}}
        });
        let object = ResourceObject::try_from(raw).unwrap();
        assert_eq!(redacted(object.clone()), object);
    }

    #[test]
    fn test_sanitize_prunes_secret_data_regardless_of_redaction() {
        let secret = ResourceObject::try_from(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "creds", "namespace": "default"},
            "data": {"password": "aHVudGVyMg=="},
            "type": "Opaque"
        }))
        .unwrap();

        for sanitizer in [Sanitizer::new(false), Sanitizer::new(true)] {
            let out = sanitizer.sanitize(secret.clone());
            assert!(out.data().is_none());
            assert_eq!(out.field("type"), Some(&json!("Opaque")));
        }
    }

    #[test]
    fn test_sanitize_without_redaction_keeps_env() {
        let pod = to_object(&Pod {
            metadata: meta(),
            spec: Some(pod_spec(true)),
            status: None,
        });
        assert_eq!(Sanitizer::new(false).sanitize(pod.clone()), pod);
        assert_ne!(Sanitizer::new(true).sanitize(pod.clone()), pod);
    }
}
