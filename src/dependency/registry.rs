use super::schema::{self, SchemaError};
use crate::config::declarations::DependencyDeclaration;
use crate::domain::RelationData;
use crate::metrics::metrics;
use crate::relation_event;
use std::collections::BTreeMap;
use thiserror::Error;

const TARGET: &str = "workload_operator::dependency";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{}", describe_schema_error(.0))]
    Schema(#[from] SchemaError),
    #[error("relation `{relation}` is not declared")]
    UnknownDeclaration { relation: String },
    #[error("relation `{relation}` accepts a single source; `{existing}` is already related, rejecting `{rejected}`")]
    MultiplicityExceeded {
        relation: String,
        existing: String,
        rejected: String,
    },
}

fn describe_schema_error(err: &SchemaError) -> String {
    format!(
        "invalid relation data for {} ({}): {err}",
        err.relation, err.source_id
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Data one remote source currently provides for a declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyInstance {
    pub relation: String,
    pub source: String,
    pub data: RelationData,
    pub issue: Option<SchemaError>,
    pub revision: u64,
}

impl DependencyInstance {
    pub fn is_valid(&self) -> bool {
        self.issue.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationSnapshot {
    pub name: String,
    /// Ordered by source id.
    pub instances: Vec<DependencyInstance>,
}

/// Immutable view of the registry, ordered by declaration order then source id.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrySnapshot {
    revision: u64,
    relations: Vec<RelationSnapshot>,
}

impl RegistrySnapshot {
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn relations(&self) -> &[RelationSnapshot] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&RelationSnapshot> {
        self.relations.iter().find(|relation| relation.name == name)
    }

    pub fn instances(&self, name: &str) -> &[DependencyInstance] {
        self.relation(name)
            .map(|relation| relation.instances.as_slice())
            .unwrap_or(&[])
    }

    pub fn instance_count(&self) -> usize {
        self.relations
            .iter()
            .map(|relation| relation.instances.len())
            .sum()
    }
}

pub struct DependencyRegistry {
    declarations: Vec<DependencyDeclaration>,
    instances: BTreeMap<String, BTreeMap<String, DependencyInstance>>,
    revision: u64,
}

impl DependencyRegistry {
    pub fn new(declarations: Vec<DependencyDeclaration>) -> Self {
        let instances = declarations
            .iter()
            .map(|declaration| (declaration.name.clone(), BTreeMap::new()))
            .collect();
        Self {
            declarations,
            instances,
            revision: 0,
        }
    }

    pub fn declarations(&self) -> &[DependencyDeclaration] {
        &self.declarations
    }

    pub fn declaration(&self, relation: &str) -> Option<&DependencyDeclaration> {
        self.declarations
            .iter()
            .find(|declaration| declaration.name == relation)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Records `data` from `source` for `relation`.
    ///
    /// Data failing the schema is still stored, marked invalid, so an earlier
    /// valid payload from the same source stops counting; the schema error is
    /// returned afterwards.
    pub fn upsert(
        &mut self,
        relation: &str,
        source: &str,
        data: RelationData,
    ) -> Result<UpsertOutcome, RegistryError> {
        let declaration = self
            .declaration(relation)
            .ok_or_else(|| RegistryError::UnknownDeclaration {
                relation: relation.to_string(),
            })?;

        let slot = self.instances.get(relation);
        if !declaration.accepts_multiple_sources() {
            if let Some(existing) = slot
                .and_then(|instances| instances.keys().find(|existing| existing.as_str() != source))
            {
                return Err(RegistryError::MultiplicityExceeded {
                    relation: relation.to_string(),
                    existing: existing.clone(),
                    rejected: source.to_string(),
                });
            }
        }

        let (data, issue) = match schema::validate(declaration, source, &data) {
            Ok(normalized) => (normalized, None),
            Err(err) => (data, Some(err)),
        };

        let previous = slot.and_then(|instances| instances.get(source));
        let outcome = match previous {
            None => UpsertOutcome::Created,
            Some(existing) if existing.data == data && existing.issue == issue => {
                UpsertOutcome::Unchanged
            }
            Some(_) => UpsertOutcome::Updated,
        };

        if outcome != UpsertOutcome::Unchanged {
            self.revision += 1;
            let instance = DependencyInstance {
                relation: relation.to_string(),
                source: source.to_string(),
                data,
                issue: issue.clone(),
                revision: self.revision,
            };
            self.instances
                .entry(relation.to_string())
                .or_default()
                .insert(source.to_string(), instance);
        }

        match issue {
            Some(err) => {
                metrics().record_schema_rejection(relation);
                relation_event!(
                    warn,
                    TARGET,
                    "relation_data_rejected",
                    relation = relation,
                    source = source,
                    revision = self.revision,
                    reason = err
                );
                Err(RegistryError::Schema(err))
            }
            None => {
                relation_event!(
                    debug,
                    TARGET,
                    "relation_data_recorded",
                    relation = relation,
                    source = source,
                    revision = self.revision
                );
                Ok(outcome)
            }
        }
    }

    /// Drops the instance for `source`; returns whether one existed.
    pub fn remove(&mut self, relation: &str, source: &str) -> Result<bool, RegistryError> {
        let instances =
            self.instances
                .get_mut(relation)
                .ok_or_else(|| RegistryError::UnknownDeclaration {
                    relation: relation.to_string(),
                })?;

        if instances.remove(source).is_some() {
            self.revision += 1;
            relation_event!(
                debug,
                TARGET,
                "relation_source_removed",
                relation = relation,
                source = source,
                revision = self.revision
            );
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Drops every instance of `relation`; returns how many were removed.
    pub fn remove_all(&mut self, relation: &str) -> Result<usize, RegistryError> {
        let instances =
            self.instances
                .get_mut(relation)
                .ok_or_else(|| RegistryError::UnknownDeclaration {
                    relation: relation.to_string(),
                })?;

        let removed = instances.len();
        if removed > 0 {
            instances.clear();
            self.revision += 1;
            relation_event!(
                debug,
                TARGET,
                "relation_cleared",
                relation = relation,
                revision = self.revision,
                removed = removed
            );
        }
        Ok(removed)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let relations = self
            .declarations
            .iter()
            .map(|declaration| RelationSnapshot {
                name: declaration.name.clone(),
                instances: self
                    .instances
                    .get(&declaration.name)
                    .map(|instances| instances.values().cloned().collect())
                    .unwrap_or_default(),
            })
            .collect();

        RegistrySnapshot {
            revision: self.revision,
            relations,
        }
    }
}
