use std::num::NonZeroUsize;

use acct_config::{
    load_layered_yaml, load_layered_yaml_from_strings, AccountingConfig, EnergySettings,
    ProviderConfig, SinkConfig, DEFAULT_IMAGE_METADATA_KEY, DEFAULT_LOGSTASH_TIMEOUT_SECS,
};
use acct_schemas::{parse_instant, RecordKind};

const MINIMAL: &str = r#"
site_name: "SITE-A"
service_name: "compute.example.org"
spooldir: "/var/spool/acct"
projects: ["proj-1"]
provider:
  kind: file
  root: "/srv/acct/data"
"#;

#[test]
fn defaults_are_applied() {
    let cfg = load_layered_yaml_from_strings(&[MINIMAL])
        .unwrap()
        .typed()
        .unwrap();

    assert_eq!(cfg.page_limit().unwrap(), NonZeroUsize::new(200).unwrap());
    assert_eq!(cfg.default_start().unwrap(), parse_instant("1970-01-01").unwrap());
    assert_eq!(
        cfg.image_metadata_key.as_deref(),
        Some(DEFAULT_IMAGE_METADATA_KEY)
    );
    assert_eq!(cfg.benchmark.name_key, "accounting:benchmark_type");
    assert!(cfg.extracts(RecordKind::Cloud));
    assert!(cfg.extracts(RecordKind::Storage));
    assert!(!cfg.extracts(RecordKind::Energy));
    assert!(!cfg.extracts(RecordKind::Ip));
    assert_eq!(cfg.energy, EnergySettings::default());
    assert_eq!(cfg.energy.step_seconds, 30);
    assert!(cfg.sinks.is_empty());
    assert_eq!(cfg.vo_for("proj-1"), "proj-1");
    assert_eq!(
        cfg.provider,
        ProviderConfig::File {
            root: "/srv/acct/data".into()
        }
    );
}

#[test]
fn sinks_and_record_types_parse() {
    let overlay = r#"
extractors: [cloud]
vo_map:
  proj-1: "vo.example.org"
sinks:
  - kind: jsonl
    path: "/tmp/out.jsonl"
  - kind: logstash
    host: "localhost"
    port: 5000
    record_types: [storage]
"#;
    let cfg = load_layered_yaml_from_strings(&[MINIMAL, overlay])
        .unwrap()
        .typed()
        .unwrap();

    assert!(!cfg.extracts(RecordKind::Storage));
    assert_eq!(cfg.vo_for("proj-1"), "vo.example.org");
    assert_eq!(cfg.sinks.len(), 2);
    assert!(cfg.sinks[0].record_types().is_empty());
    assert_eq!(cfg.sinks[1].record_types(), &[RecordKind::Storage]);
    assert!(matches!(
        cfg.sinks[1],
        SinkConfig::Logstash { port: 5000, timeout_secs, .. }
            if timeout_secs == DEFAULT_LOGSTASH_TIMEOUT_SECS
    ));
}

#[test]
fn energy_and_ip_extractors_are_opt_in() {
    let overlay = r#"
extractors: [cloud, energy, ip]
energy:
  cpu_normalization_factor: 2.5
  step_seconds: 60
sinks:
  - kind: logstash
    host: "localhost"
    port: 5000
    timeout_secs: 3
    record_types: [energy, ip]
"#;
    let cfg = load_layered_yaml_from_strings(&[MINIMAL, overlay])
        .unwrap()
        .typed()
        .unwrap();

    assert!(cfg.extracts(RecordKind::Energy));
    assert!(cfg.extracts(RecordKind::Ip));
    assert!(!cfg.extracts(RecordKind::Storage));
    assert_eq!(cfg.energy.cpu_normalization_factor, 2.5);
    assert_eq!(cfg.energy.step_seconds, 60);
    assert_eq!(
        cfg.sinks[0].record_types(),
        &[RecordKind::Energy, RecordKind::Ip]
    );
    assert!(matches!(
        cfg.sinks[0],
        SinkConfig::Logstash { timeout_secs: 3, .. }
    ));
}

#[test]
fn typed_config_rejects_credentials_without_the_loader() {
    let mut doc = load_layered_yaml_from_strings(&[MINIMAL])
        .unwrap()
        .config_json;
    doc["provider"]["password"] = serde_json::json!("sk-livesecretvalue");
    let err = AccountingConfig::from_json(&doc).unwrap_err().to_string();
    assert!(err.contains("CONFIG_SECRET_DETECTED leaf=/provider/password"), "{err}");
    assert!(!err.contains("livesecret"), "{err}");
}

#[test]
fn unknown_keys_are_rejected() {
    let overlay = "page_limt: 10\n";
    let err = load_layered_yaml_from_strings(&[MINIMAL, overlay])
        .unwrap()
        .typed()
        .unwrap_err();
    assert!(format!("{err:#}").contains("page_limt"), "{err:#}");
}

#[test]
fn unknown_record_type_is_rejected() {
    let overlay = "extractors: [cloud, accelerator]\n";
    assert!(load_layered_yaml_from_strings(&[MINIMAL, overlay])
        .unwrap()
        .typed()
        .is_err());
}

#[test]
fn invalid_values_fail_validation() {
    for overlay in [
        "page_limit: 0\n",
        "site_name: \"  \"\n",
        "default_window_start: \"someday\"\n",
        "extractors: []\n",
        "energy:\n  cpu_normalization_factor: 0\n",
        "energy:\n  cpu_normalization_factor: -1.5\n",
        "energy:\n  step_seconds: 0\n",
        "sinks:\n  - kind: logstash\n    host: h\n    port: 1\n    timeout_secs: 0\n",
    ] {
        let err = load_layered_yaml_from_strings(&[MINIMAL, overlay])
            .unwrap()
            .typed()
            .unwrap_err();
        assert!(err.to_string().contains("CONFIG_INVALID"), "{overlay}: {err}");
    }
}

#[test]
fn files_are_layered_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.yaml");
    let site = dir.path().join("site.yaml");
    std::fs::write(&base, MINIMAL).unwrap();
    std::fs::write(&site, "site_name: \"SITE-Z\"\n").unwrap();

    let cfg = load_layered_yaml(&[&base, &site]).unwrap().typed().unwrap();
    assert_eq!(cfg.site_name, "SITE-Z");

    let missing = dir.path().join("nope.yaml");
    assert!(load_layered_yaml(&[&missing]).is_err());
}
