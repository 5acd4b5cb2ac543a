//! Alphabet partitioning across tenant partitions.
//!
//! Tenants are sharded by the first letter of their name. With N tenant
//! partitions, partition i (1-indexed) serves the letters
//! `floor(26(i-1)/N) ..= floor(26i/N) - 1`:
//!
//! ```text
//! N=1   a-z
//! N=2   a-m n-z
//! N=3   a-h i-q r-z
//! N=26  a b c ... z
//! ```

use std::net::IpAddr;

use crate::error::{HaproxyError, HaproxyResult};

pub const ALPHABET_LEN: usize = 26;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantPartition {
    /// 1-based.
    pub index: usize,
    pub ip: IpAddr,
    pub first: char,
    pub last: char,
}

impl TenantPartition {
    pub fn serves(&self, tenant: &str) -> bool {
        tenant
            .chars()
            .next()
            .is_some_and(|c| (self.first..=self.last).contains(&c))
    }
}

/// First and last letter served by partition `index` (1-based) of `count`.
pub fn letter_range(index: usize, count: usize) -> (char, char) {
    let start = ALPHABET_LEN * (index - 1) / count;
    let end = ALPHABET_LEN * index / count - 1;
    (letter(start), letter(end))
}

fn letter(offset: usize) -> char {
    char::from(b'a' + offset as u8)
}

/// Every backend the router knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionLayout {
    pub tenant_partitions: Vec<TenantPartition>,
    pub resource_partition: IpAddr,
}

impl PartitionLayout {
    pub fn new<S: AsRef<str>>(tenant_ips: &[S], resource_ip: &str) -> HaproxyResult<Self> {
        let count = tenant_ips.len();
        if count == 0 {
            return Err(HaproxyError::NoTenantPartitions);
        }
        if count > ALPHABET_LEN {
            return Err(HaproxyError::TooManyTenantPartitions {
                count,
                max: ALPHABET_LEN,
            });
        }

        let mut tenant_partitions = Vec::with_capacity(count);
        for (i, raw) in tenant_ips.iter().enumerate() {
            let index = i + 1;
            let (first, last) = letter_range(index, count);
            tenant_partitions.push(TenantPartition {
                index,
                ip: parse_ip("tenant partition", raw.as_ref())?,
                first,
                last,
            });
        }
        Ok(Self {
            tenant_partitions,
            resource_partition: parse_ip("resource partition", resource_ip)?,
        })
    }

    /// Build from the comma-separated `TENANT_PARTITION_IP` list and the
    /// single `RESOURCE_PARTITION_IP`.
    pub fn from_env_values(tenant_ips: &str, resource_ip: &str) -> HaproxyResult<Self> {
        Self::new(&split_ip_list(tenant_ips), resource_ip.trim())
    }

    pub fn tenant_partition_for(&self, tenant: &str) -> Option<&TenantPartition> {
        self.tenant_partitions.iter().find(|tp| tp.serves(tenant))
    }
}

pub fn split_ip_list(raw: &str) -> Vec<&str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
}

fn parse_ip(role: &'static str, raw: &str) -> HaproxyResult<IpAddr> {
    raw.parse().map_err(|_| HaproxyError::InvalidIp {
        role,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(count: usize) -> Vec<(char, char)> {
        (1..=count).map(|i| letter_range(i, count)).collect()
    }

    #[test]
    fn three_partitions() {
        assert_eq!(ranges(3), vec![('a', 'h'), ('i', 'q'), ('r', 'z')]);
    }

    #[test]
    fn ranges_cover_the_alphabet_without_gaps() {
        for count in 1..=ALPHABET_LEN {
            let ranges = ranges(count);
            assert_eq!(ranges[0].0, 'a');
            assert_eq!(ranges[count - 1].1, 'z');
            for pair in ranges.windows(2) {
                assert_eq!(pair[1].0 as u8, pair[0].1 as u8 + 1, "count {count}");
            }
        }
        assert_eq!(ranges(26)[4], ('e', 'e'));
    }

    #[test]
    fn layout_validation() {
        assert!(matches!(
            PartitionLayout::new::<&str>(&[], "10.0.0.1"),
            Err(HaproxyError::NoTenantPartitions)
        ));
        let many: Vec<String> = (0..27).map(|i| format!("10.0.0.{i}")).collect();
        assert!(matches!(
            PartitionLayout::new(&many, "10.0.0.1"),
            Err(HaproxyError::TooManyTenantPartitions { count: 27, .. })
        ));
        assert!(matches!(
            PartitionLayout::new(&["1.1.1.1", "not-an-ip"], "10.0.0.1"),
            Err(HaproxyError::InvalidIp { role: "tenant partition", .. })
        ));
        assert!(matches!(
            PartitionLayout::new(&["1.1.1.1"], "10.0.0"),
            Err(HaproxyError::InvalidIp { role: "resource partition", .. })
        ));
    }

    #[test]
    fn env_values() {
        let layout = PartitionLayout::from_env_values(" 1.1.1.1, 2.2.2.2 ,", "3.3.3.3\n").unwrap();
        assert_eq!(layout.tenant_partitions.len(), 2);
        assert_eq!(layout.tenant_partition_for("nina").map(|tp| tp.index), Some(2));
        assert_eq!(layout.tenant_partition_for("Zed"), None);
        assert_eq!(layout.resource_partition.to_string(), "3.3.3.3");
    }
}
