//! shardgrid-haproxy — L7 routing config for a partitioned control plane.
//!
//! Tenant partitions split the alphabet by tenant first letter; the resource
//! partition takes node and lease traffic. The layout is rendered into an
//! HAProxy template:
//!
//! ```text
//!   TENANT_PARTITION_IP ─┐
//!   RESOURCE_PARTITION_IP┼─► PartitionLayout ─► sections ─► template ─► haproxy.cfg
//!   TlsMode, options  ───┘          │
//!                                   └─► RoutingTable (same rules, in process)
//! ```

pub mod acl;
pub mod error;
pub mod partition;
pub mod render;
pub mod routing;
pub mod template;

use tracing::info;

pub use error::{HaproxyError, HaproxyResult};
pub use partition::{ALPHABET_LEN, PartitionLayout, TenantPartition, letter_range, split_ip_list};
pub use render::{DEFAULT_CA_FILE, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_PROXY_PORT, RenderOptions, TlsMode, sections};
pub use routing::{Route, RoutingTable};
pub use template::render_template;

/// Render `template` for `layout`. Output depends only on the inputs.
pub fn synthesize(template: &str, layout: &PartitionLayout, options: &RenderOptions) -> HaproxyResult<String> {
    options.validate()?;
    let rendered = render_template(template, &sections(layout, options))?;
    info!(
        tenant_partitions = layout.tenant_partitions.len(),
        resource_partition = %layout.resource_partition,
        tls_mode = %options.tls_mode,
        "rendered haproxy config"
    );
    Ok(rendered)
}
