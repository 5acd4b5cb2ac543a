use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use shardgrid_haproxy::{
    DEFAULT_CA_FILE, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_PROXY_PORT, PartitionLayout, RenderOptions, TlsMode,
    synthesize,
};
use tracing::{debug, info};

pub const TENANT_PARTITION_IP: &str = "TENANT_PARTITION_IP";
pub const RESOURCE_PARTITION_IP: &str = "RESOURCE_PARTITION_IP";

#[derive(Args, Debug)]
pub struct HaproxyArgs {
    /// Input template with {{ placeholder }} markers
    #[arg(long)]
    pub template: PathBuf,
    /// Output file
    #[arg(long)]
    pub target: PathBuf,
    /// bridging (re-encrypt to partitions on 443) or offloading (plain 8080)
    #[arg(long)]
    pub tls_mode: TlsMode,
    /// HAProxy connect timeout, e.g. 10s or 1500ms
    #[arg(long, default_value = DEFAULT_CONNECTION_TIMEOUT)]
    pub connection_timeout: String,
    /// Frontend port
    #[arg(long, default_value_t = DEFAULT_PROXY_PORT)]
    pub proxy_port: u16,
    /// CA bundle used to verify partitions in bridging mode
    #[arg(long, default_value = DEFAULT_CA_FILE)]
    pub ca_file: String,
}

pub fn haproxy(args: &HaproxyArgs) -> anyhow::Result<()> {
    let tenant_ips = std::env::var(TENANT_PARTITION_IP)
        .with_context(|| format!("{TENANT_PARTITION_IP} is not set"))?;
    let resource_ip = std::env::var(RESOURCE_PARTITION_IP)
        .with_context(|| format!("{RESOURCE_PARTITION_IP} is not set"))?;

    match generate(args, &tenant_ips, &resource_ip) {
        Ok(partitions) => {
            println!("✓ Wrote {} ({partitions} tenant partitions, {})", args.target.display(), args.tls_mode);
            Ok(())
        }
        Err(e) => {
            eprintln!("HAProxy config generation failed: {e:#}");
            Err(e)
        }
    }
}

/// Render the template into the target file. Returns the number of tenant
/// partitions.
pub fn generate(args: &HaproxyArgs, tenant_ips: &str, resource_ip: &str) -> anyhow::Result<usize> {
    let layout = PartitionLayout::from_env_values(tenant_ips, resource_ip)
        .context("invalid partition addresses")?;
    debug!(
        tenant_partitions = layout.tenant_partitions.len(),
        resource_partition = %resource_ip,
        "partition layout parsed"
    );
    info!("Rendering {} from {}", args.target.display(), args.template.display());
    let template = fs::read_to_string(&args.template)
        .with_context(|| format!("failed to read template {}", args.template.display()))?;

    let options = RenderOptions::new(args.tls_mode)
        .with_connection_timeout(args.connection_timeout.clone())
        .with_proxy_port(args.proxy_port)
        .with_ca_file(args.ca_file.clone());
    let rendered = synthesize(&template, &layout, &options)?;

    fs::write(&args.target, &rendered)
        .with_context(|| format!("failed to write {}", args.target.display()))?;
    debug!(bytes = rendered.len(), mode = %args.tls_mode, "haproxy config written");
    Ok(layout.tenant_partitions.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(dir: &tempfile::TempDir, mode: TlsMode) -> HaproxyArgs {
        let template = dir.path().join("haproxy.cfg.template");
        fs::write(&template, "timeout connect {{ connection_timeout }}\n{{ backends }}\n").unwrap();
        HaproxyArgs {
            template,
            target: dir.path().join("haproxy.cfg"),
            tls_mode: mode,
            connection_timeout: "3s".into(),
            proxy_port: DEFAULT_PROXY_PORT,
            ca_file: DEFAULT_CA_FILE.into(),
        }
    }

    #[test]
    fn writes_target() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(&dir, TlsMode::Offloading);
        assert_eq!(generate(&args, "10.0.0.1,10.0.0.2", "10.0.1.1").unwrap(), 2);

        let out = fs::read_to_string(&args.target).unwrap();
        assert!(out.starts_with("timeout connect 3s\nbackend tp1_backend\n"));
        assert!(out.contains("server rp 10.0.1.1:8080 check"));
    }

    #[test]
    fn rejects_bad_ip_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(&dir, TlsMode::Bridging);
        let err = generate(&args, "10.0.0.1,nope", "10.0.1.1").unwrap_err();
        assert!(format!("{err:#}").contains("nope"));
        assert!(!args.target.exists());
    }

    #[test]
    fn missing_template() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args(&dir, TlsMode::Bridging);
        args.template = dir.path().join("missing");
        let err = generate(&args, "10.0.0.1", "10.0.1.1").unwrap_err();
        assert!(err.to_string().contains("failed to read template"));
    }
}
