//! Command-line instruction shapes: injector targets and staging actions.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::CoreError;

/// `COUNT,ADDRESS,PORT` — a bounded burst of generated records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduTarget {
    pub records: u64,
    pub address: String,
    pub port: u16,
}

/// `FILE,ADDRESS,PORT` — a file replayed byte-for-byte over TCP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpTarget {
    pub source: PathBuf,
    pub address: String,
    pub port: u16,
}

fn split_target(spec: &str) -> Result<(&str, &str, u16), CoreError> {
    let invalid = |reason: &str| CoreError::InvalidTarget {
        spec: spec.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = spec.split(',').collect();
    let [first, address, port] = parts.as_slice() else {
        return Err(invalid("expected three comma-separated fields"));
    };
    if address.is_empty() {
        return Err(invalid("empty address"));
    }
    let port = port
        .trim()
        .parse::<u16>()
        .map_err(|_| invalid("port is not a number in 0-65535"))?;
    Ok((*first, *address, port))
}

impl FromStr for PduTarget {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (records, address, port) = split_target(s)?;
        let records = records
            .trim()
            .parse::<u64>()
            .map_err(|_| CoreError::InvalidTarget {
                spec: s.to_string(),
                reason: "record count is not a number".to_string(),
            })?;
        Ok(Self {
            records,
            address: address.to_string(),
            port,
        })
    }
}

impl FromStr for TcpTarget {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (source, address, port) = split_target(s)?;
        if source.is_empty() {
            return Err(CoreError::InvalidTarget {
                spec: s.to_string(),
                reason: "empty file name".to_string(),
            });
        }
        Ok(Self {
            source: PathBuf::from(source),
            address: address.to_string(),
            port,
        })
    }
}

/// Bracketed host form, e.g. `[::1]:9000`.
pub fn bracketed(address: &str, port: u16) -> String {
    format!("[{address}]:{port}")
}

/// Whether a staging instruction copies or moves its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingMode {
    Copy,
    Move,
}

impl fmt::Display for StagingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StagingMode::Copy => f.write_str("copy"),
            StagingMode::Move => f.write_str("move"),
        }
    }
}

/// `FILE:DIRNAME` — place `FILE` into the named staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingInstruction {
    pub mode: StagingMode,
    pub source: PathBuf,
    pub directory: String,
}

impl StagingInstruction {
    pub fn parse(mode: StagingMode, spec: &str) -> Result<Self, CoreError> {
        let Some((source, directory)) = spec.rsplit_once(':') else {
            return Err(CoreError::InvalidStaging {
                spec: spec.to_string(),
            });
        };
        if source.is_empty() || directory.is_empty() {
            return Err(CoreError::InvalidStaging {
                spec: spec.to_string(),
            });
        }
        Ok(Self {
            mode,
            source: PathBuf::from(source),
            directory: directory.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdu_target_parses_all_fields() {
        let target: PduTarget = "5000,localhost,18001".parse().expect("parse");
        assert_eq!(target.records, 5000);
        assert_eq!(target.address, "localhost");
        assert_eq!(target.port, 18001);
    }

    #[test]
    fn tcp_target_rejects_missing_port() {
        let err = "data.pdu,localhost".parse::<TcpTarget>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidTarget { .. }));
    }

    #[test]
    fn pdu_target_rejects_non_numeric_count() {
        assert!("many,localhost,1".parse::<PduTarget>().is_err());
    }

    #[test]
    fn staging_splits_at_last_colon() {
        let step = StagingInstruction::parse(StagingMode::Move, "c:/data/in.rw:incoming")
            .expect("parse");
        assert_eq!(step.source, PathBuf::from("c:/data/in.rw"));
        assert_eq!(step.directory, "incoming");
    }

    #[test]
    fn staging_requires_directory() {
        assert!(StagingInstruction::parse(StagingMode::Copy, "file.rw:").is_err());
        assert!(StagingInstruction::parse(StagingMode::Copy, "file.rw").is_err());
    }

    #[test]
    fn bracketed_wraps_ipv6() {
        assert_eq!(bracketed("::1", 9000), "[::1]:9000");
    }
}
