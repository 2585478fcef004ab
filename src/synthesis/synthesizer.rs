use super::configuration::{Artifact, RuntimeConfiguration, WorkloadSection};
use super::SynthesisError;
use crate::config::declarations::{AggregationRule, DependencyDeclaration, WorkloadSettings};
use crate::dependency::{DependencyInstance, RegistrySnapshot};
use crate::domain::{render_scalar, SOURCE_KEY};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet};

/// Maps valid relation data plus workload settings to a runtime configuration.
///
/// Only valid instances contribute, in source-id order. Fails when a required
/// declaration has no valid instance.
pub fn synthesize(
    declarations: &[DependencyDeclaration],
    snapshot: &RegistrySnapshot,
    settings: &WorkloadSettings,
) -> Result<RuntimeConfiguration, SynthesisError> {
    let mut environment = BTreeMap::new();
    let mut sections = BTreeMap::new();
    let mut artifacts = BTreeMap::new();

    for declaration in declarations {
        let instances: Vec<&DependencyInstance> = snapshot
            .instances(&declaration.name)
            .iter()
            .filter(|instance| instance.is_valid())
            .collect();

        if instances.is_empty() && declaration.required {
            return Err(SynthesisError::MissingRequired {
                relation: declaration.name.clone(),
            });
        }

        if let Some(section) = aggregate(declaration.aggregation, &instances) {
            sections.insert(declaration.section.clone(), section);
        }

        for field in &declaration.fields {
            let Some(env) = field.env.as_ref() else {
                continue;
            };
            if let Some(joined) = join_field(&instances, &field.name) {
                environment.insert(env.clone(), joined);
            }
        }

        for field in &declaration.fields {
            let Some(path) = field.file.as_ref() else {
                continue;
            };
            let Some(value) = instances
                .first()
                .and_then(|instance| instance.data.get(&field.name))
            else {
                continue;
            };
            let contents = STANDARD
                .decode(render_scalar(value).trim())
                .map_err(|err| SynthesisError::Artifact {
                    relation: declaration.name.clone(),
                    field: field.name.clone(),
                    path: path.clone(),
                    reason: err.to_string(),
                })?;
            artifacts.insert(
                path.clone(),
                Artifact::new(&declaration.name, &field.name, contents),
            );
        }
    }

    Ok(RuntimeConfiguration {
        workload: WorkloadSection {
            image: settings.image.clone(),
            deployment_mode: settings.deployment_mode.clone(),
            log_levels: settings.log_levels.clone(),
            overrides: settings.overrides.clone(),
            advertised_url: settings.advertised_url.clone(),
        },
        environment,
        sections,
        artifacts,
    })
}

fn aggregate(rule: AggregationRule, instances: &[&DependencyInstance]) -> Option<JsonValue> {
    match rule {
        AggregationRule::Single => instances.first().map(|instance| object(instance, false)),
        AggregationRule::List => Some(JsonValue::Array(
            instances
                .iter()
                .map(|instance| object(instance, true))
                .collect(),
        )),
        AggregationRule::BySource => Some(JsonValue::Object(
            instances
                .iter()
                .map(|instance| (instance.source.clone(), object(instance, false)))
                .collect(),
        )),
        AggregationRule::Join => {
            if instances.is_empty() {
                return None;
            }
            let keys: BTreeSet<&String> = instances
                .iter()
                .flat_map(|instance| instance.data.keys())
                .collect();
            let joined = keys
                .into_iter()
                .filter_map(|key| {
                    join_field(instances, key).map(|value| (key.clone(), JsonValue::String(value)))
                })
                .collect::<JsonMap<_, _>>();
            Some(JsonValue::Object(joined))
        }
    }
}

/// Comma-joins `key` across instances. A source without the key leaves an empty
/// slot, so position `n` is always source `n`. `None` when no source has it.
fn join_field(instances: &[&DependencyInstance], key: &str) -> Option<String> {
    if !instances.iter().any(|instance| instance.data.contains_key(key)) {
        return None;
    }
    let values: Vec<String> = instances
        .iter()
        .map(|instance| instance.data.get(key).map(render_scalar).unwrap_or_default())
        .collect();
    Some(values.join(","))
}

fn object(instance: &DependencyInstance, tag_source: bool) -> JsonValue {
    let mut map: JsonMap<String, JsonValue> = instance
        .data
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if tag_source {
        map.insert(
            SOURCE_KEY.to_string(),
            JsonValue::String(instance.source.clone()),
        );
    }
    JsonValue::Object(map)
}
