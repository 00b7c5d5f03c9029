use crate::error::{AppError, Result};
use bgpkit_parser::error::ParserError;
use bgpkit_parser::{BgpkitParser, Elementor};
use ipnet::IpNet;
use std::path::Path;
use tracing::{info, warn};

/**
 * One prefix announcement extracted from a RIB snapshot
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRecord {
    pub prefix: IpNet,
    pub origin_asns: Vec<u32>,
}

/**
 * Capability to turn a raw MRT dump into prefix records.
 *
 * With `skip_malformed` set, records that fail to decode are dropped and
 * parsing continues; only conditions that make the file unreadable fail.
 */
pub trait RibParser: Send + Sync {
    fn parse(&self, path: &Path, skip_malformed: bool) -> Result<Vec<PrefixRecord>>;
}

/**
 * MRT parsing backed by bgpkit-parser
 */
#[derive(Debug, Clone, Copy, Default)]
pub struct BgpkitRibParser;

impl RibParser for BgpkitRibParser {
    fn parse(&self, path: &Path, skip_malformed: bool) -> Result<Vec<PrefixRecord>> {
        info!("Parsing snapshot {}", path.display());

        let path_str = path
            .to_str()
            .ok_or_else(|| AppError::Parse(format!("non UTF-8 path: {}", path.display())))?;
        let mut parser = BgpkitParser::new(path_str)
            .map_err(|e| AppError::Parse(format!("{}: {}", path.display(), e)))?
            .disable_warnings();
        let mut elementor = Elementor::new();

        let mut records = Vec::new();
        let mut skipped = 0usize;

        loop {
            let record = match parser.next_record() {
                Ok(record) => record,
                Err(e) => match e.error {
                    ParserError::EofExpected => break,
                    ParserError::IoError(io) => {
                        return Err(AppError::Parse(format!("{}: {}", path.display(), io)));
                    }
                    other if skip_malformed => {
                        skipped += 1;
                        tracing::debug!("Skipping malformed record: {}", other);
                        continue;
                    }
                    other => {
                        return Err(AppError::Parse(format!("{}: {}", path.display(), other)));
                    }
                },
            };

            for elem in elementor.record_to_elems(record) {
                let Some(origins) = elem.origin_asns else {
                    continue;
                };
                records.push(PrefixRecord {
                    prefix: elem.prefix.prefix,
                    origin_asns: origins.iter().map(|asn| asn.to_u32()).collect(),
                });
            }
        }

        if skipped > 0 {
            warn!("Skipped {} malformed records in {}", skipped, path.display());
        }
        info!("Snapshot parsed: {} prefix records", records.len());
        Ok(records)
    }
}
