//! Identifiers and causal timestamps

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum site identifier length in bytes
pub const MAX_SITE_LEN: usize = 128;

const HEAD: &str = "head";
const TAIL: &str = "tail";

/// Identifier of a replica that originates operations.
///
/// ASCII alphanumerics, `_` and `-` only. The `:` separator is reserved for
/// [`ElementId`] so a site can always be recovered from an element id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SiteId(String);

impl SiteId {
    /// Create a new site ID, validating the format
    pub fn new(site: impl Into<String>) -> Result<Self> {
        let site = site.into();

        if site.is_empty() {
            return Err(Error::InvalidSite("Site ID cannot be empty".into()));
        }

        if site.len() > MAX_SITE_LEN {
            return Err(Error::InvalidSite(format!(
                "Site ID exceeds {} bytes",
                MAX_SITE_LEN
            )));
        }

        if !site
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::InvalidSite(
                "Site ID must match pattern [a-zA-Z0-9_-]+".into(),
            ));
        }

        Ok(Self(site))
    }

    /// Generate a random site ID
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self(uuid[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SiteId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<SiteId> for String {
    fn from(site: SiteId) -> Self {
        site.0
    }
}

/// Lamport timestamp carried by every operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(Timestamp)
            .map_err(|_| Error::InvalidTimestamp(s.to_string()))
    }
}

impl From<u64> for Timestamp {
    fn from(v: u64) -> Self {
        Timestamp(v)
    }
}

/// Lamport clock owned by a replica
#[derive(Debug, Clone, Copy, Default)]
pub struct LamportClock {
    time: u64,
}

impl LamportClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value without advancing
    pub fn now(&self) -> Timestamp {
        Timestamp(self.time)
    }

    /// Advance for a locally generated event.
    ///
    /// Fails once the clock has observed `u64::MAX`; no later timestamp exists.
    pub fn tick(&mut self) -> Result<Timestamp> {
        self.time = self.time.checked_add(1).ok_or(Error::ClockExhausted)?;
        Ok(Timestamp(self.time))
    }

    /// Merge a timestamp observed on a remote operation
    pub fn observe(&mut self, remote: Timestamp) {
        self.time = self.time.max(remote.0);
    }
}

/// Globally unique element identifier.
///
/// Written as `site:seq` on the wire; `head` and `tail` name the sentinels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ElementId {
    Head,
    Tail,
    Node { site: SiteId, seq: u64 },
}

impl ElementId {
    pub fn new(site: SiteId, seq: u64) -> Self {
        ElementId::Node { site, seq }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, ElementId::Head | ElementId::Tail)
    }

    /// Originating site, `None` for sentinels
    pub fn site(&self) -> Option<&SiteId> {
        match self {
            ElementId::Node { site, .. } => Some(site),
            _ => None,
        }
    }

    pub fn seq(&self) -> Option<u64> {
        match self {
            ElementId::Node { seq, .. } => Some(*seq),
            _ => None,
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::Head => f.write_str(HEAD),
            ElementId::Tail => f.write_str(TAIL),
            ElementId::Node { site, seq } => write!(f, "{}:{}", site, seq),
        }
    }
}

impl FromStr for ElementId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            HEAD => return Ok(ElementId::Head),
            TAIL => return Ok(ElementId::Tail),
            _ => {}
        }

        let (site, seq) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidId(format!("expected site:seq, got {:?}", s)))?;

        let site = SiteId::new(site).map_err(|_| Error::InvalidId(s.to_string()))?;
        let seq = seq
            .parse::<u64>()
            .map_err(|_| Error::InvalidId(s.to_string()))?;

        Ok(ElementId::Node { site, seq })
    }
}

impl TryFrom<String> for ElementId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ElementId> for String {
    fn from(id: ElementId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_id_valid() {
        assert!(SiteId::new("alice").is_ok());
        assert!(SiteId::new("tab_2-b").is_ok());
    }

    #[test]
    fn test_site_id_invalid() {
        assert!(SiteId::new("").is_err());
        assert!(SiteId::new("a:b").is_err());
        assert!(SiteId::new("a".repeat(MAX_SITE_LEN + 1)).is_err());
    }

    #[test]
    fn test_generated_site_is_valid() {
        let site = SiteId::generate();
        assert!(SiteId::new(site.as_str()).is_ok());
        assert_ne!(site, SiteId::generate());
    }

    #[test]
    fn test_element_id_parse() {
        assert_eq!("head".parse::<ElementId>().unwrap(), ElementId::Head);
        assert_eq!("tail".parse::<ElementId>().unwrap(), ElementId::Tail);

        let id: ElementId = "alice:42".parse().unwrap();
        assert_eq!(id.site().unwrap().as_str(), "alice");
        assert_eq!(id.seq(), Some(42));
        assert_eq!(id.to_string(), "alice:42");
    }

    #[test]
    fn test_element_id_invalid() {
        assert!("".parse::<ElementId>().is_err());
        assert!("alice".parse::<ElementId>().is_err());
        assert!("alice:x".parse::<ElementId>().is_err());
        assert!(":7".parse::<ElementId>().is_err());
        assert!("a b:1".parse::<ElementId>().is_err());
    }

    #[test]
    fn test_element_id_serde_as_string() {
        let id = ElementId::new(SiteId::new("bob").unwrap(), 3);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"bob:3\"");
        let back: ElementId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_lamport_clock() {
        let mut clock = LamportClock::new();
        assert_eq!(clock.tick().unwrap(), Timestamp(1));
        clock.observe(Timestamp(10));
        assert_eq!(clock.now(), Timestamp(10));
        clock.observe(Timestamp(4));
        assert_eq!(clock.tick().unwrap(), Timestamp(11));
    }

    #[test]
    fn test_lamport_clock_exhausted() {
        let mut clock = LamportClock::new();
        clock.observe(Timestamp(u64::MAX - 1));
        assert_eq!(clock.tick().unwrap(), Timestamp(u64::MAX));
        assert_eq!(clock.tick(), Err(Error::ClockExhausted));
        assert_eq!(clock.now(), Timestamp(u64::MAX));
    }

    #[test]
    fn test_timestamp_parse() {
        assert_eq!("17".parse::<Timestamp>().unwrap(), Timestamp(17));
        assert_eq!(" 5 ".parse::<Timestamp>().unwrap(), Timestamp(5));
        assert!("-1".parse::<Timestamp>().is_err());
        assert!("soon".parse::<Timestamp>().is_err());
    }
}
