#[path = "common/mod.rs"]
mod common;

use serde_json::json;
use std::time::Duration;
use workload_operator::config::declarations::{
    AggregationRule, ApiVersion, DeclarationConfigError, FieldKind, JitterMode, Multiplicity,
};
use workload_operator::config::DeclarationsConfig;

fn validation_messages(yaml: &str) -> Vec<String> {
    match DeclarationsConfig::from_yaml_str(yaml) {
        Err(DeclarationConfigError::Invalid(err)) => err.messages().to_vec(),
        Err(other) => panic!("expected validation error, got {other}"),
        Ok(_) => panic!("expected validation error"),
    }
}

#[test]
fn fixture_declarations_load() {
    let config = common::load_declarations();

    assert_eq!(config.api_version, ApiVersion::V1);
    assert_eq!(config.workload.image, "finos/legend-engine-server:4.40.3");
    assert_eq!(
        config.workload.advertised_url.as_deref(),
        Some("http://legend-engine.example.com:6060")
    );
    assert_eq!(config.workload.overrides["sdlc_timeout_ms"], json!(30000));
    assert_eq!(config.reconcile.apply_timeout, Duration::from_secs(30));
    assert_eq!(config.reconcile.retry.max_backoff, Duration::from_secs(60));
    assert_eq!(config.reconcile.retry.jitter, JitterMode::None);
    assert_eq!(config.reconcile.recheck_interval, None);

    let names: Vec<_> = config.relations.iter().map(|decl| decl.name.as_str()).collect();
    assert_eq!(names, vec!["database", "gitlab", "studio"]);

    let database = config.relation("database").expect("database declared");
    assert!(database.required);
    assert_eq!(database.section, "mongo");
    assert_eq!(database.interface, "finos-legend-db-k8s");
    let uri = database.field("uri").expect("uri field");
    assert_eq!(uri.kind, FieldKind::Url);
    assert!(uri.required);
    assert_eq!(uri.env.as_deref(), Some("MONGO_URI"));
    assert_eq!(
        database.field("database").map(|field| field.kind),
        Some(FieldKind::String)
    );

    let gitlab = config.relation("gitlab").expect("gitlab declared");
    assert_eq!(gitlab.section, "gitlab");
    assert_eq!(gitlab.multiplicity, Multiplicity::Single);
    assert_eq!(gitlab.aggregation, AggregationRule::Single);
    assert_eq!(gitlab.publish["redirect_uris"], "{advertised_url}/callback");
    assert_eq!(
        gitlab.field("gitlab_host_cert_b64").and_then(|field| field.file.as_deref()),
        Some("certs/gitlab-host.pem")
    );

    let studio = config.relation("studio").expect("studio declared");
    assert!(!studio.required);
    assert!(studio.accepts_multiple_sources());
    assert_eq!(studio.aggregation, AggregationRule::List);
    assert!(!studio.field("studio_url").expect("studio_url").required);
}

#[test]
fn relation_defaults_are_applied() {
    let config = DeclarationsConfig::from_yaml_str(
        r#"
api_version: v1
workload:
  image: registry.example.com/app:1
relations:
  - name: peers
    multiplicity: multiple
    fields:
      - name: host
"#,
    )
    .expect("minimal config");

    let peers = config.relation("peers").expect("peers declared");
    assert!(peers.required);
    assert_eq!(peers.interface, "peers");
    assert_eq!(peers.section, "peers");
    assert_eq!(peers.aggregation, AggregationRule::List);
    assert_eq!(config.workload.deployment_mode, "production");
    assert_eq!(config.workload.log_levels["server"], "INFO");
    assert_eq!(config.reconcile.retry.jitter, JitterMode::Equal);
}

#[test]
fn relation_errors_are_accumulated() {
    let messages = validation_messages(
        r#"
api_version: v1
workload:
  image: registry.example.com/app:1
relations:
  - name: database
    fields:
      - name: uri
        type: uri
        env: MONGO_URI
      - name: uri
      - name: source
  - name: database
  - name: cache
    section: database
    multiplicity: single
    aggregation: list
  - name: peers
    multiplicity: multiple
    aggregation: single
    fields:
      - name: host
        env: peer_hosts
    publish:
      url: "{hostname}"
  - name: backup
    fields:
      - name: target
        env: MONGO_URI
"#,
    );

    let expected = [
        "error[relations.database.fields.uri.type]: must be one of",
        "error[relations.database.fields.uri]: field declared more than once",
        "error[relations.database.fields.source]: `source` is reserved",
        "error[relations.database]: relation declared more than once",
        "error[relations.cache.section]: section `database` is already used",
        "error[relations.peers.aggregation]: `single` aggregation requires `single` multiplicity",
        "error[relations.peers.fields.host.env]: `peer_hosts` must be an upper-case",
        "error[relations.peers.publish.url]: unknown placeholder `{hostname}`",
        "error[relations.backup.fields.target.env]: `MONGO_URI` is already projected by relation `database`",
    ];
    for prefix in expected {
        assert!(
            messages.iter().any(|message| message.starts_with(prefix)),
            "missing `{prefix}` in {messages:#?}"
        );
    }
}

#[test]
fn artifact_file_errors_are_accumulated() {
    let messages = validation_messages(
        r#"
api_version: v1
workload:
  image: registry.example.com/app:1
relations:
  - name: gitlab
    fields:
      - name: cert
        type: base64
        file: ../etc/cert.pem
      - name: host
        file: host.txt
  - name: vault
    fields:
      - name: ca
        type: base64
        file: /etc/ca.pem
      - name: bundle
        type: base64
        file: host.txt
  - name: peers
    multiplicity: multiple
    fields:
      - name: key
        type: base64
        file: peer.key
"#,
    );

    let expected = [
        "error[relations.gitlab.fields.cert.file]: `../etc/cert.pem` must be a relative path",
        "error[relations.gitlab.fields.host.file]: only `base64` fields can be written to a file",
        "error[relations.vault.fields.ca.file]: `/etc/ca.pem` must be a relative path",
        "error[relations.vault.fields.bundle.file]: `host.txt` is already written by `gitlab.host`",
        "error[relations.peers.fields.key.file]: relations with `multiple` multiplicity cannot write files",
    ];
    for prefix in expected {
        assert!(
            messages.iter().any(|message| message.starts_with(prefix)),
            "missing `{prefix}` in {messages:#?}"
        );
    }
}

#[test]
fn workload_and_tuning_errors_are_accumulated() {
    let messages = validation_messages(
        r#"
api_version: v2
reconcile:
  apply_timeout: soon
  recheck_interval: 0s
  retry:
    base_backoff: 10s
    max_backoff: 1s
    jitter: sometimes
"#,
    );

    let expected = [
        "error[root]: api_version `v2` is not supported",
        "error[workload]: section is required",
        "error[reconcile.apply_timeout]: must be a valid duration (got `soon`)",
        "error[reconcile.recheck_interval]: must be greater than zero",
        "error[reconcile.retry]: max_backoff",
        "error[reconcile.retry.jitter]: must be one of",
    ];
    for prefix in expected {
        assert!(
            messages.iter().any(|message| message.starts_with(prefix)),
            "missing `{prefix}` in {messages:#?}"
        );
    }
}

#[test]
fn rendered_error_lists_every_message() {
    let err = DeclarationsConfig::from_yaml_str(
        r#"
api_version: v1
workload:
  image: ""
  advertised_url: "not a url"
surprise: true
"#,
    )
    .unwrap_err();

    let rendered = err.to_string();
    assert!(rendered.starts_with("declarations config validation failed:"));
    assert!(rendered.contains("schema_version: \"v1\""));
    assert!(rendered.contains("- error[root]: unknown top-level key \"surprise\""));
    assert!(rendered.contains("- error[workload.image]: must be a non-empty image reference"));
    assert!(rendered.contains("- error[workload.advertised_url]: `not a url` is not a valid URL"));
}

#[test]
fn multiple_documents_are_rejected() {
    let messages = validation_messages(
        r#"
api_version: v1
workload:
  image: registry.example.com/app:1
---
api_version: v1
"#,
    );
    assert_eq!(
        messages,
        vec!["error[root]: multiple YAML documents are not supported".to_string()]
    );
}

#[test]
fn unknown_relation_keys_fail_to_parse() {
    let err = DeclarationsConfig::from_yaml_str(
        r#"
api_version: v1
workload:
  image: registry.example.com/app:1
relations:
  - name: database
    optional: true
"#,
    )
    .unwrap_err();
    assert!(matches!(err, DeclarationConfigError::Parse(_)), "{err}");
}
