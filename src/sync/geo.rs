use ipnet::IpNet;
use std::net::IpAddr;

use crate::config::CountryRange;
use crate::error::{DashboardError, Result};

/// IP → ISO country code, used when an alert carries no country
pub trait CountryLookup: Send + Sync {
    fn country(&self, ip: &str) -> Option<String>;
}

/// Lookup that never knows the answer
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCountryLookup;

impl CountryLookup for NoCountryLookup {
    fn country(&self, _ip: &str) -> Option<String> {
        None
    }
}

/// Static CIDR → country table. The most specific matching prefix wins.
#[derive(Debug, Default, Clone)]
pub struct CidrCountryTable {
    entries: Vec<(IpNet, String)>,
}

impl CidrCountryTable {
    pub fn new(entries: impl IntoIterator<Item = (IpNet, String)>) -> Self {
        let mut entries: Vec<(IpNet, String)> = entries.into_iter().collect();
        entries.sort_by(|a, b| b.0.prefix_len().cmp(&a.0.prefix_len()));
        Self { entries }
    }

    pub fn from_ranges(ranges: &[CountryRange]) -> Result<Self> {
        let entries = ranges
            .iter()
            .map(|r| {
                r.cidr
                    .parse::<IpNet>()
                    .map(|net| (net, r.country.to_ascii_uppercase()))
                    .map_err(|e| DashboardError::Config(format!("geoip cidr '{}': {}", r.cidr, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CountryLookup for CidrCountryTable {
    fn country(&self, ip: &str) -> Option<String> {
        let addr: IpAddr = ip.parse().ok()?;
        self.entries
            .iter()
            .find(|(net, _)| net.contains(&addr))
            .map(|(_, country)| country.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_prefix_wins() {
        let table = CidrCountryTable::from_ranges(&[
            CountryRange {
                cidr: "192.0.2.0/24".into(),
                country: "nl".into(),
            },
            CountryRange {
                cidr: "192.0.2.128/25".into(),
                country: "DE".into(),
            },
            CountryRange {
                cidr: "2001:db8::/32".into(),
                country: "FR".into(),
            },
        ])
        .unwrap();

        assert_eq!(table.country("192.0.2.1").as_deref(), Some("NL"));
        assert_eq!(table.country("192.0.2.200").as_deref(), Some("DE"));
        assert_eq!(table.country("2001:db8::1").as_deref(), Some("FR"));
        assert_eq!(table.country("198.51.100.1"), None);
        assert_eq!(table.country("not-an-ip"), None);
    }

    #[test]
    fn test_bad_cidr_rejected() {
        let err = CidrCountryTable::from_ranges(&[CountryRange {
            cidr: "300.0.0.0/8".into(),
            country: "XX".into(),
        }]);
        assert!(matches!(err, Err(DashboardError::Config(_))));
    }
}
