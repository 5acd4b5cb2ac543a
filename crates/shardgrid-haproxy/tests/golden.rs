//! Rendered configs compared byte for byte against checked-in fixtures.

use shardgrid_haproxy::{PartitionLayout, RenderOptions, Route, RoutingTable, TlsMode, synthesize};

const TEMPLATE: &str = include_str!("fixtures/haproxy.cfg.template");
const BRIDGING: &str = include_str!("fixtures/bridging.cfg");
const OFFLOADING: &str = include_str!("fixtures/offloading.cfg");

fn layout() -> PartitionLayout {
    PartitionLayout::from_env_values("1.1.1.1,2.2.2.2,3.3.3.3", "4.4.4.4").unwrap()
}

#[test]
fn bridging_matches_fixture() {
    let out = synthesize(TEMPLATE, &layout(), &RenderOptions::new(TlsMode::Bridging)).unwrap();
    assert_eq!(out, BRIDGING);
}

#[test]
fn offloading_matches_fixture() {
    let opts = RenderOptions::new(TlsMode::Offloading)
        .with_connection_timeout("5s")
        .with_proxy_port(8443);
    let out = synthesize(TEMPLATE, &layout(), &opts).unwrap();
    assert_eq!(out, OFFLOADING);
}

#[test]
fn output_is_deterministic() {
    let opts = RenderOptions::new(TlsMode::Bridging);
    let first = synthesize(TEMPLATE, &layout(), &opts).unwrap();
    let second = synthesize(TEMPLATE, &layout(), &opts).unwrap();
    assert_eq!(first, second);
}

#[test]
fn unrelated_template_lines_do_not_perturb_output() {
    let opts = RenderOptions::new(TlsMode::Bridging);
    let edited = TEMPLATE.replace("    maxconn 20000\n", "    maxconn 20000\n    # added by an operator\n");
    let out = synthesize(&edited, &layout(), &opts).unwrap();
    let without: String = out
        .split_inclusive('\n')
        .filter(|line| *line != "    # added by an operator\n")
        .collect();
    assert_eq!(without, BRIDGING);
}

#[test]
fn every_rendered_tenant_acl_agrees_with_the_classifier() {
    let table = RoutingTable::new(layout()).unwrap();
    for (tenant, backend) in [("alice", 1), ("hank", 1), ("ian", 2), ("quinn", 2), ("rose", 3), ("zoe", 3)] {
        let path = format!("/api/v1/tenants/{tenant}/namespaces/x/pods");
        assert_eq!(table.route(&path, None), Route::TenantPartition(backend), "{tenant}");
    }
    assert_eq!(table.route("/api/v1/tenants/system/namespaces/x/pods", None), Route::Default);
}
