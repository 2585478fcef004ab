use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path};

/// Placeholders accepted inside `publish` templates.
pub const PUBLISH_PLACEHOLDERS: &[&str] = &["advertised_url", "app_name"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDeclaration {
    pub name: String,
    pub interface: String,
    pub required: bool,
    pub multiplicity: Multiplicity,
    pub aggregation: AggregationRule,
    pub section: String,
    pub fields: Vec<FieldSpec>,
    pub publish: BTreeMap<String, String>,
}

impl DependencyDeclaration {
    /// Builds a declaration with defaults: single source, single aggregation,
    /// section named after the relation.
    pub fn new(name: impl Into<String>, required: bool) -> Self {
        let name = name.into();
        Self {
            interface: name.clone(),
            section: name.clone(),
            name,
            required,
            multiplicity: Multiplicity::Single,
            aggregation: AggregationRule::Single,
            fields: Vec::new(),
            publish: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = interface.into();
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = section.into();
        self
    }

    pub fn with_multiplicity(mut self, multiplicity: Multiplicity, aggregation: AggregationRule) -> Self {
        self.multiplicity = multiplicity;
        self.aggregation = aggregation;
        self
    }

    pub fn with_publish(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.publish.insert(key.into(), template.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn accepts_multiple_sources(&self) -> bool {
        matches!(self.multiplicity, Multiplicity::Multiple)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    Single,
    Multiple,
}

impl Multiplicity {
    pub fn as_str(self) -> &'static str {
        match self {
            Multiplicity::Single => "single",
            Multiplicity::Multiple => "multiple",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationRule {
    /// Section is the one instance's object.
    Single,
    /// Section is an array of instance objects, each tagged with `source`.
    List,
    /// Section is an object keyed by source id.
    BySource,
    /// Each field becomes a comma-joined string across sources.
    Join,
}

impl AggregationRule {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregationRule::Single => "single",
            AggregationRule::List => "list",
            AggregationRule::BySource => "by_source",
            AggregationRule::Join => "join",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub env: Option<String>,
    /// Relative path the decoded value is written to. `base64` fields only.
    pub file: Option<String>,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            env: None,
            file: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.file = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Boolean,
    Url,
    Base64,
    Json,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Url => "url",
            FieldKind::Base64 => "base64",
            FieldKind::Json => "json",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "string" => Some(FieldKind::String),
            "integer" | "int" => Some(FieldKind::Integer),
            "boolean" | "bool" => Some(FieldKind::Boolean),
            "url" => Some(FieldKind::Url),
            "base64" => Some(FieldKind::Base64),
            "json" => Some(FieldKind::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawRelation {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    interface: Option<String>,
    #[serde(default)]
    required: Option<bool>,
    #[serde(default)]
    multiplicity: Option<String>,
    #[serde(default)]
    aggregation: Option<String>,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    fields: Vec<RawField>,
    #[serde(default)]
    publish: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawField {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    required: Option<bool>,
    #[serde(default)]
    env: Option<String>,
    #[serde(default)]
    file: Option<String>,
}

pub(crate) fn parse_relations(
    raw: Vec<RawRelation>,
    errors: &mut Vec<String>,
) -> Vec<DependencyDeclaration> {
    let mut names = BTreeSet::new();
    let mut sections = BTreeSet::new();
    let mut declarations = Vec::with_capacity(raw.len());

    for (index, relation) in raw.into_iter().enumerate() {
        let name = match relation.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                errors.push(format!("error[relations[{index}].name]: must be a non-empty string"));
                continue;
            }
        };

        let label = format!("relations.{name}");
        if !names.insert(name.clone()) {
            errors.push(format!("error[{label}]: relation declared more than once"));
            continue;
        }

        let multiplicity = match relation.multiplicity.as_deref().map(str::trim) {
            None => Multiplicity::Single,
            Some(value) if value.eq_ignore_ascii_case("single") => Multiplicity::Single,
            Some(value) if value.eq_ignore_ascii_case("multiple") => Multiplicity::Multiple,
            Some(other) => {
                errors.push(format!(
                    "error[{label}.multiplicity]: must be one of `single` or `multiple` (got `{other}`)"
                ));
                Multiplicity::Single
            }
        };

        let aggregation = match relation.aggregation.as_deref().map(str::trim) {
            None => match multiplicity {
                Multiplicity::Single => AggregationRule::Single,
                Multiplicity::Multiple => AggregationRule::List,
            },
            Some(value) => match parse_aggregation(value) {
                Some(rule) => rule,
                None => {
                    errors.push(format!(
                        "error[{label}.aggregation]: must be one of `single`, `list`, `by_source`, or `join` (got `{value}`)"
                    ));
                    AggregationRule::Single
                }
            },
        };

        if multiplicity == Multiplicity::Multiple && aggregation == AggregationRule::Single {
            errors.push(format!(
                "error[{label}.aggregation]: `{}` aggregation requires `{}` multiplicity",
                aggregation.as_str(),
                Multiplicity::Single.as_str()
            ));
        }

        let section = relation
            .section
            .as_deref()
            .map(str::trim)
            .filter(|section| !section.is_empty())
            .unwrap_or(name.as_str())
            .to_string();
        if !sections.insert(section.clone()) {
            errors.push(format!(
                "error[{label}.section]: section `{section}` is already used by another relation"
            ));
        }

        let interface = relation
            .interface
            .as_deref()
            .map(str::trim)
            .filter(|interface| !interface.is_empty())
            .unwrap_or(name.as_str())
            .to_string();

        let fields = parse_fields(&label, multiplicity, relation.fields, errors);
        validate_publish_templates(&label, &relation.publish, errors);

        declarations.push(DependencyDeclaration {
            name,
            interface,
            required: relation.required.unwrap_or(true),
            multiplicity,
            aggregation,
            section,
            fields,
            publish: relation.publish,
        });
    }

    declarations
}

fn parse_aggregation(value: &str) -> Option<AggregationRule> {
    match value.to_ascii_lowercase().as_str() {
        "single" => Some(AggregationRule::Single),
        "list" => Some(AggregationRule::List),
        "by_source" => Some(AggregationRule::BySource),
        "join" => Some(AggregationRule::Join),
        _ => None,
    }
}

fn parse_fields(
    label: &str,
    multiplicity: Multiplicity,
    raw: Vec<RawField>,
    errors: &mut Vec<String>,
) -> Vec<FieldSpec> {
    let mut seen = BTreeSet::new();
    let mut fields = Vec::with_capacity(raw.len());

    for (index, field) in raw.into_iter().enumerate() {
        let name = match field.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                errors.push(format!(
                    "error[{label}.fields[{index}].name]: must be a non-empty string"
                ));
                continue;
            }
        };

        if name == "source" {
            errors.push(format!(
                "error[{label}.fields.{name}]: `source` is reserved for aggregated sections"
            ));
        }

        if !seen.insert(name.clone()) {
            errors.push(format!("error[{label}.fields.{name}]: field declared more than once"));
            continue;
        }

        let kind = match field.kind.as_deref().map(str::trim) {
            None => FieldKind::String,
            Some(value) => FieldKind::parse(value).unwrap_or_else(|| {
                errors.push(format!(
                    "error[{label}.fields.{name}.type]: must be one of `string`, `integer`, `boolean`, `url`, `base64`, or `json` (got `{value}`)"
                ));
                FieldKind::String
            }),
        };

        let env = field.env.map(|env| env.trim().to_string());
        if let Some(env) = env.as_deref() {
            if !is_valid_env_name(env) {
                errors.push(format!(
                    "error[{label}.fields.{name}.env]: `{env}` must be an upper-case environment variable name"
                ));
            }
        }

        let file = field.file.map(|file| file.trim().to_string());
        if let Some(file) = file.as_deref() {
            if kind != FieldKind::Base64 {
                errors.push(format!(
                    "error[{label}.fields.{name}.file]: only `base64` fields can be written to a file (field is `{}`)",
                    kind.as_str()
                ));
            }
            if multiplicity == Multiplicity::Multiple {
                errors.push(format!(
                    "error[{label}.fields.{name}.file]: relations with `{}` multiplicity cannot write files",
                    multiplicity.as_str()
                ));
            }
            if !is_relative_file_path(file) {
                errors.push(format!(
                    "error[{label}.fields.{name}.file]: `{file}` must be a relative path without `..` components"
                ));
            }
        }

        fields.push(FieldSpec {
            name,
            kind,
            required: field.required.unwrap_or(true),
            env,
            file,
        });
    }

    fields
}

fn is_relative_file_path(value: &str) -> bool {
    let path = Path::new(value);
    !value.is_empty()
        && !value.ends_with('/')
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
        && path.file_name().is_some()
}

fn is_valid_env_name(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_')
}

fn validate_publish_templates(
    label: &str,
    publish: &BTreeMap<String, String>,
    errors: &mut Vec<String>,
) {
    for (key, template) in publish {
        let mut rest = template.as_str();
        while let Some(start) = rest.find('{') {
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                errors.push(format!(
                    "error[{label}.publish.{key}]: unterminated placeholder in `{template}`"
                ));
                break;
            };
            let placeholder = &after[..end];
            if !PUBLISH_PLACEHOLDERS.contains(&placeholder) {
                errors.push(format!(
                    "error[{label}.publish.{key}]: unknown placeholder `{{{placeholder}}}` (expected one of {})",
                    PUBLISH_PLACEHOLDERS.join(", ")
                ));
            }
            rest = &after[end + 1..];
        }
    }
}

pub(crate) fn validate_environment_names(
    declarations: &[DependencyDeclaration],
    errors: &mut Vec<String>,
) {
    let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
    for declaration in declarations {
        for field in &declaration.fields {
            let Some(env) = field.env.as_deref() else {
                continue;
            };
            if let Some(previous) = owners.insert(env, declaration.name.as_str()) {
                errors.push(format!(
                    "error[relations.{}.fields.{}.env]: `{env}` is already projected by relation `{previous}`",
                    declaration.name, field.name
                ));
            }
        }
    }
}

pub(crate) fn validate_artifact_paths(
    declarations: &[DependencyDeclaration],
    errors: &mut Vec<String>,
) {
    let mut owners: BTreeMap<&str, String> = BTreeMap::new();
    for declaration in declarations {
        for field in &declaration.fields {
            let Some(file) = field.file.as_deref() else {
                continue;
            };
            let owner = format!("{}.{}", declaration.name, field.name);
            if let Some(previous) = owners.insert(file, owner) {
                errors.push(format!(
                    "error[relations.{}.fields.{}.file]: `{file}` is already written by `{previous}`",
                    declaration.name, field.name
                ));
            }
        }
    }
}
