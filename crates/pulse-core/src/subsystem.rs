use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Diagnostic area a metric source reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    Sharding,
    Replication,
    Indexing,
    Storage,
    Aggregation,
}

impl Subsystem {
    /// Every subsystem in default report order.
    pub const ALL: [Subsystem; 5] = [
        Subsystem::Sharding,
        Subsystem::Replication,
        Subsystem::Indexing,
        Subsystem::Storage,
        Subsystem::Aggregation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sharding => "sharding",
            Self::Replication => "replication",
            Self::Indexing => "indexing",
            Self::Storage => "storage",
            Self::Aggregation => "aggregation",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subsystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sharding" | "shard" => Ok(Self::Sharding),
            "replication" | "repl" | "replica-set" => Ok(Self::Replication),
            "indexing" | "index" => Ok(Self::Indexing),
            "storage" => Ok(Self::Storage),
            "aggregation" | "agg" => Ok(Self::Aggregation),
            other => Err(format!(
                "unknown subsystem '{other}' (expected sharding, replication, indexing, storage or aggregation)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases_case_insensitively() {
        assert_eq!("Repl".parse::<Subsystem>().unwrap(), Subsystem::Replication);
        assert_eq!("agg".parse::<Subsystem>().unwrap(), Subsystem::Aggregation);
        assert!("network".parse::<Subsystem>().is_err());
    }

    #[test]
    fn display_matches_serde_name() {
        for s in Subsystem::ALL {
            let yaml = serde_yaml::to_string(&s).unwrap();
            assert_eq!(yaml.trim(), s.to_string());
        }
    }
}
