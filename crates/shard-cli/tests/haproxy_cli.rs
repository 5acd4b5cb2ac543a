//! `shardctl haproxy` end to end.

use std::fs;
use std::process::Command;

const TEMPLATE: &str = "frontend apiserver\n    bind *:{{ proxy_port }}\n    {{ tp_source_acl }}\n    {{ tp_request_rule }}\n\n{{ backends }}\n";

fn shardctl(dir: &tempfile::TempDir, tenant_ips: &str, mode: &str) -> std::process::Output {
    let template = dir.path().join("in.template");
    fs::write(&template, TEMPLATE).unwrap();
    Command::new(env!("CARGO_BIN_EXE_shardctl"))
        .arg("haproxy")
        .arg("--template")
        .arg(&template)
        .arg("--target")
        .arg(dir.path().join("haproxy.cfg"))
        .arg("--tls-mode")
        .arg(mode)
        .env("TENANT_PARTITION_IP", tenant_ips)
        .env("RESOURCE_PARTITION_IP", "10.1.0.1")
        .output()
        .unwrap()
}

#[test]
fn generates_config() {
    let dir = tempfile::tempdir().unwrap();
    let out = shardctl(&dir, "10.0.0.1,10.0.0.2,10.0.0.3", "bridging");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let cfg = fs::read_to_string(dir.path().join("haproxy.cfg")).unwrap();
    assert!(cfg.contains("    bind *:6443\n"));
    assert!(cfg.contains("    acl from_tp3 src 10.0.0.3\n"));
    assert!(cfg.contains("    use_backend tp2_backend if tp2_api_request || tp2_apis_request\n"));
    assert_eq!(cfg.matches("tcp-check connect").count(), 4);
}

#[test]
fn too_many_partitions_fails() {
    let dir = tempfile::tempdir().unwrap();
    let ips: Vec<String> = (1..=27).map(|i| format!("10.0.0.{i}")).collect();
    let out = shardctl(&dir, &ips.join(","), "offloading");
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("at most 26"));
    assert!(!dir.path().join("haproxy.cfg").exists());
}

#[test]
fn unknown_tls_mode_fails() {
    let dir = tempfile::tempdir().unwrap();
    let out = shardctl(&dir, "10.0.0.1", "passthrough");
    assert!(!out.status.success());
}
