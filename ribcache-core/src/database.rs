//! IP-prefix to origin-AS database in IPASN text form.
//!
//! ```text
//! ; IP-ASN32-DAT file
//! ; Original source:	/data/resources/ribs/rib.20240305.1200.bz2
//! ; Converted on  :	2024-03-05T13:52:40Z
//! ; Prefixes-v4   :	2
//! ; Prefixes-v6   :	0
//! ;
//! 1.0.0.0/24	13335
//! 1.0.4.0/22	{38803,56203}
//! ```

use crate::parser::PrefixRecord;
use ipnet::IpNet;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;

/**
 * Origin of a prefix: a single AS, or an AS_SET rendered as `{a,b}`
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Asn(u32),
    Set(Vec<u32>),
}

impl Origin {
    pub fn from_asns(asns: &[u32]) -> Option<Self> {
        match asns {
            [] => None,
            [asn] => Some(Origin::Asn(*asn)),
            many => Some(Origin::Set(many.to_vec())),
        }
    }

    pub fn asns(&self) -> Vec<u32> {
        match self {
            Origin::Asn(asn) => vec![*asn],
            Origin::Set(set) => set.clone(),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Asn(asn) => write!(f, "{}", asn),
            Origin::Set(set) => {
                let joined: Vec<String> = set.iter().map(|a| a.to_string()).collect();
                write!(f, "{{{}}}", joined.join(","))
            }
        }
    }
}

impl FromStr for Origin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
            let set = inner
                .split(',')
                .map(|a| a.trim().parse::<u32>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("invalid AS set {:?}: {}", s, e))?;
            return Origin::from_asns(&set).ok_or_else(|| "empty AS set".to_string());
        }
        s.parse::<u32>()
            .map(Origin::Asn)
            .map_err(|e| format!("invalid ASN {:?}: {}", s, e))
    }
}

/**
 * Counters describing how a database was assembled
 */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub records: usize,
    pub duplicates: usize,
    pub without_origin: usize,
}

/**
 * Prefix to origin mapping, ordered by prefix
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixDatabase {
    entries: BTreeMap<IpNet, Origin>,
}

impl PrefixDatabase {
    // The first origin seen for a prefix wins
    pub fn from_records(records: impl IntoIterator<Item = PrefixRecord>) -> (Self, BuildStats) {
        let mut entries = BTreeMap::new();
        let mut stats = BuildStats::default();

        for record in records {
            stats.records += 1;
            let Some(origin) = Origin::from_asns(&record.origin_asns) else {
                stats.without_origin += 1;
                continue;
            };
            match entries.entry(record.prefix.trunc()) {
                Entry::Vacant(slot) => {
                    slot.insert(origin);
                }
                Entry::Occupied(_) => stats.duplicates += 1,
            }
        }

        (Self { entries }, stats)
    }

    // Parse IPASN text, skipping comments and lines that do not parse
    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();

        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            let Some((prefix, origin)) = line.split_once('\t') else {
                warn!("Line {}: missing tab separator", idx + 1);
                continue;
            };
            let prefix = match prefix.trim().parse::<IpNet>() {
                Ok(p) => p.trunc(),
                Err(_) => {
                    warn!("Line {}: invalid prefix: {}", idx + 1, prefix);
                    continue;
                }
            };
            match origin.parse::<Origin>() {
                Ok(origin) => {
                    entries.insert(prefix, origin);
                }
                Err(e) => warn!("Line {}: {}", idx + 1, e),
            }
        }

        Self { entries }
    }

    pub fn render(&self, source: &str, converted_on: OffsetDateTime) -> String {
        let converted_on = converted_on
            .format(&Rfc3339)
            .unwrap_or_else(|_| converted_on.to_string());

        let mut out = String::with_capacity(self.entries.len() * 24 + 160);
        out.push_str("; IP-ASN32-DAT file\n");
        out.push_str(&format!("; Original source:\t{}\n", source));
        out.push_str(&format!("; Converted on  :\t{}\n", converted_on));
        out.push_str(&format!("; Prefixes-v4   :\t{}\n", self.v4_count()));
        out.push_str(&format!("; Prefixes-v6   :\t{}\n", self.v6_count()));
        out.push_str(";\n");

        for (prefix, origin) in &self.entries {
            out.push_str(&format!("{}\t{}\n", prefix, origin));
        }
        out
    }

    pub fn get(&self, prefix: &IpNet) -> Option<&Origin> {
        self.entries.get(prefix)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IpNet, &Origin)> {
        self.entries.iter()
    }

    pub fn v4_count(&self) -> usize {
        self.entries.keys().filter(|p| matches!(p, IpNet::V4(_))).count()
    }

    pub fn v6_count(&self) -> usize {
        self.entries.len() - self.v4_count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn record(prefix: &str, asns: &[u32]) -> PrefixRecord {
        PrefixRecord {
            prefix: prefix.parse().unwrap(),
            origin_asns: asns.to_vec(),
        }
    }

    #[test]
    fn test_first_origin_wins() {
        let (db, stats) = PrefixDatabase::from_records(vec![
            record("1.0.0.0/24", &[13335]),
            record("1.0.0.0/24", &[64512]),
            record("1.0.4.0/22", &[38803, 56203]),
            record("2001:db8::/32", &[]),
        ]);

        assert_eq!(db.len(), 2);
        assert_eq!(db.get(&"1.0.0.0/24".parse().unwrap()), Some(&Origin::Asn(13335)));
        assert_eq!(
            db.get(&"1.0.4.0/22".parse().unwrap()),
            Some(&Origin::Set(vec![38803, 56203]))
        );
        assert_eq!(
            stats,
            BuildStats {
                records: 4,
                duplicates: 1,
                without_origin: 1
            }
        );
    }

    #[test]
    fn test_render_layout() {
        let (db, _) = PrefixDatabase::from_records(vec![
            record("2001:db8::/32", &[64500]),
            record("8.8.8.0/24", &[15169]),
            record("1.0.4.0/22", &[38803, 56203]),
        ]);

        let text = db.render("rib.20240305.1200.bz2", datetime!(2024-03-05 13:52:40 UTC));
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "; IP-ASN32-DAT file");
        assert_eq!(lines[1], "; Original source:\trib.20240305.1200.bz2");
        assert_eq!(lines[2], "; Converted on  :\t2024-03-05T13:52:40Z");
        assert_eq!(lines[3], "; Prefixes-v4   :\t2");
        assert_eq!(lines[4], "; Prefixes-v6   :\t1");
        assert_eq!(
            &lines[6..],
            &["1.0.4.0/22\t{38803,56203}", "8.8.8.0/24\t15169", "2001:db8::/32\t64500"]
        );
    }

    #[test]
    fn test_parse_rendered_text() {
        let (db, _) = PrefixDatabase::from_records(vec![
            record("8.8.8.0/24", &[15169]),
            record("1.0.4.0/22", &[38803, 56203]),
        ]);
        let text = db.render("test", datetime!(2024-03-05 13:52:40 UTC));
        assert_eq!(PrefixDatabase::parse(&text), db);
    }

    #[test]
    fn test_parse_skips_bad_lines() {
        let text = "; comment\n8.8.8.0/24\t15169\nnot-a-prefix\t1\n9.9.9.0/24 19281\n1.1.1.0/24\tAS13335\n";
        let db = PrefixDatabase::parse(text);
        assert_eq!(db.len(), 1);
    }
}
