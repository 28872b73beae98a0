// # Results Parser
//
// Converts the speed test's delimited output into `ResultRecord`s.
//
// ## Dialects
//
// Each known output layout is a row in `DIALECTS`: its column mapping, the
// header keywords that identify it, and the port to assume when it has no
// port column. Matching is column count + header sniff, first match wins.
// When the first line is not a recognizable header, each row is matched by
// column count and by which columns parse as numbers.
//
// ```text
// IP,Port,Data Center,Region,City,Speed (MB/s),Latency (ms)
// 1.1.1.1,443,LAX,US,Los Angeles,15.5,25.3
//
// IP 地址,已发送,已接收,丢包率,平均延迟,下载速度(MB/s),地区码
// 104.17.110.237,4,4,0.00,31.60,18.75,HKG
// ```
//
// Malformed rows are skipped with a warning. Output keeps input order.

use std::net::IpAddr;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::ResultRecord;

/// Value marking a missing measurement
const NOT_AVAILABLE: &str = "N/A";

/// What a column holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Ip,
    Port,
    DataCenter,
    Region,
    City,
    Speed,
    Latency,
    /// Region code copied into data center, region and city
    Location,
    /// Numeric column the record does not keep (sent, received, loss rate)
    Metric,
}

impl Column {
    fn is_numeric(self) -> bool {
        matches!(self, Self::Port | Self::Speed | Self::Latency | Self::Metric)
    }
}

/// A speed test output layout
#[derive(Debug)]
pub struct Dialect {
    /// Short name used in logs
    pub name: &'static str,
    columns: &'static [Column],
    header_markers: &'static [&'static str],
    default_port: u16,
}

impl Dialect {
    /// Number of columns in this layout
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    fn matches_header(&self, fields: &[&str]) -> bool {
        fields.len() == self.width()
            && fields.iter().any(|field| {
                let name = header_name(field);
                self.header_markers.iter().any(|marker| name == *marker)
            })
    }

    fn matches_row(&self, fields: &[&str]) -> bool {
        fields.len() == self.width()
            && self
                .columns
                .iter()
                .zip(fields)
                .filter(|(column, _)| column.is_numeric())
                .all(|(column, value)| parse_numeric(*column, value).is_some())
    }

    fn build(&self, fields: &[&str]) -> std::result::Result<ResultRecord, String> {
        if fields.len() != self.width() {
            return Err(format!(
                "expected {} columns for {} layout, found {}",
                self.width(),
                self.name,
                fields.len()
            ));
        }

        let mut record = ResultRecord::new("", self.default_port, 0.0, 0.0);
        for (column, value) in self.columns.iter().zip(fields) {
            match column {
                Column::Ip => record.ip = value.to_string(),
                Column::DataCenter => record.data_center = value.to_string(),
                Column::Region => record.region = value.to_string(),
                Column::City => record.city = value.to_string(),
                Column::Location => {
                    record.data_center = value.to_string();
                    record.region = value.to_string();
                    record.city = value.to_string();
                }
                numeric => {
                    let parsed = parse_numeric(*numeric, value)
                        .ok_or_else(|| format!("invalid number '{}'", value))?;
                    match numeric {
                        Column::Port => record.port = parsed as u16,
                        Column::Speed => record.speed = parsed,
                        Column::Latency => record.latency = parsed,
                        _ => {}
                    }
                }
            }
        }

        if record.ip.is_empty() {
            return Err("empty IP field".to_string());
        }
        Ok(record)
    }
}

/// `IP 地址,已发送,已接收,丢包率,平均延迟,下载速度(MB/s),地区码`
pub static LOCALIZED: Dialect = Dialect {
    name: "localized",
    columns: &[
        Column::Ip,
        Column::Metric,
        Column::Metric,
        Column::Metric,
        Column::Latency,
        Column::Speed,
        Column::Location,
    ],
    header_markers: &[
        "已发送", "已接收", "丢包率", "平均延迟", "下载速度", "地区码", "sent", "received", "loss",
        "loss rate",
    ],
    default_port: 443,
};

/// Older six-column localized output without the region code
pub static LOCALIZED_LEGACY: Dialect = Dialect {
    name: "localized-legacy",
    columns: &[
        Column::Ip,
        Column::Metric,
        Column::Metric,
        Column::Metric,
        Column::Latency,
        Column::Speed,
    ],
    header_markers: &[
        "已发送", "已接收", "丢包率", "平均延迟", "下载速度", "sent", "received", "loss",
        "loss rate",
    ],
    default_port: 443,
};

/// `IP,Port,Data Center,Region,City,Speed (MB/s),Latency (ms)` and the
/// unit-less `IP,Port,DataCenter,Region,City,Speed,Latency`
pub static ENGLISH: Dialect = Dialect {
    name: "english",
    columns: &[
        Column::Ip,
        Column::Port,
        Column::DataCenter,
        Column::Region,
        Column::City,
        Column::Speed,
        Column::Latency,
    ],
    header_markers: &["port", "data center", "datacenter"],
    default_port: 0,
};

/// Candidate layouts in match order
pub static DIALECTS: &[&Dialect] = &[&LOCALIZED, &ENGLISH, &LOCALIZED_LEGACY];

/// Parse an empty-tolerant numeric field
///
/// Empty means zero. "N/A" means zero for speed and latency. A trailing `%`
/// is accepted on loss-rate columns.
fn parse_numeric(column: Column, value: &str) -> Option<f64> {
    if value.is_empty() {
        return Some(0.0);
    }
    match column {
        Column::Port => value.parse::<u16>().ok().map(f64::from),
        Column::Speed | Column::Latency if value == NOT_AVAILABLE => Some(0.0),
        Column::Metric if value == NOT_AVAILABLE => Some(0.0),
        Column::Metric => value
            .trim_end_matches('%')
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite()),
        _ => value.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

/// Header cell without its unit suffix, lowercased: `Speed (MB/s)` is `speed`
fn header_name(field: &str) -> String {
    let name = field.split(['(', '（']).next().unwrap_or(field);
    name.trim().to_lowercase()
}

fn split_fields(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

fn header_dialect(fields: &[&str]) -> Option<&'static Dialect> {
    DIALECTS.iter().copied().find(|d| d.matches_header(fields))
}

fn row_dialect(fields: &[&str]) -> Option<&'static Dialect> {
    DIALECTS.iter().copied().find(|d| d.matches_row(fields))
}

/// Parse speed test output held in memory
///
/// Fails with [`Error::ResultsEmpty`] when there are no usable data rows.
pub fn parse(raw_text: &str) -> Result<Vec<ResultRecord>> {
    let mut lines = raw_text
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim_start_matches('\u{feff}').trim()))
        .filter(|(_, line)| !line.is_empty())
        .peekable();

    let mut fixed_dialect = None;
    if let Some((line_no, first)) = lines.peek().copied() {
        let fields = split_fields(first);
        // A leading IP means the file has no header row
        if fields[0].parse::<IpAddr>().is_err() {
            if let Some(dialect) = header_dialect(&fields) {
                debug!("Detected {} header", dialect.name);
                fixed_dialect = Some(dialect);
                lines.next();
            } else if row_dialect(&fields).is_none() {
                warn!(line = line_no, "Unrecognized header, inferring layout per row");
                lines.next();
            }
        }
    }

    let mut records = Vec::new();
    let mut data_rows = 0usize;
    for (line_no, line) in lines {
        data_rows += 1;
        let fields = split_fields(line);
        let built = match fixed_dialect.or_else(|| row_dialect(&fields)) {
            Some(dialect) => dialect.build(&fields),
            None => Err(format!("{} columns match no known layout", fields.len())),
        };
        match built {
            Ok(record) => records.push(record),
            Err(reason) => warn!(line = line_no, %reason, "Skipping malformed result row"),
        }
    }

    if data_rows == 0 {
        return Err(Error::ResultsEmpty("no data rows".to_string()));
    }
    if records.is_empty() {
        return Err(Error::ResultsEmpty(format!(
            "all {} data rows were malformed",
            data_rows
        )));
    }

    info!(
        "Parsed {} results ({} rows skipped)",
        records.len(),
        data_rows - records.len()
    );
    Ok(records)
}

/// Parse a results file from disk
pub async fn parse_file(path: impl AsRef<Path>) -> Result<Vec<ResultRecord>> {
    let path = path.as_ref();
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::ResultsFileNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    parse(&content).map_err(|e| match e {
        Error::ResultsEmpty(reason) => {
            Error::ResultsEmpty(format!("{}: {}", path.display(), reason))
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_english_header_with_units() {
        let text = "IP,Port,Data Center,Region,City,Speed (MB/s),Latency (ms)\n\
                    1.1.1.1,443,LAX,US-West,Los Angeles,15.5,25.3\n";
        let records = parse(text).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.ip, "1.1.1.1");
        assert_eq!(r.port, 443);
        assert_eq!(r.data_center, "LAX");
        assert_eq!(r.region, "US-West");
        assert_eq!(r.city, "Los Angeles");
        assert_eq!(r.speed, 15.5);
        assert_eq!(r.latency, 25.3);
    }

    #[test]
    fn parses_unitless_english_header() {
        let text = "IP,Port,DataCenter,Region,City,Speed,Latency\n\
                    1.0.0.1,80,NYC,US-East,New York,12.8,30.1\n";
        let records = parse(text).unwrap();
        assert_eq!(records[0].port, 80);
        assert_eq!(records[0].data_center, "NYC");
    }

    #[test]
    fn parses_localized_header() {
        let text = "IP 地址,已发送,已接收,丢包率,平均延迟,下载速度(MB/s),地区码\n\
                    104.17.110.237,4,4,0.00,31.60,18.75,HKG\n";
        let records = parse(text).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.ip, "104.17.110.237");
        assert_eq!(r.port, 443);
        assert_eq!(r.speed, 18.75);
        assert_eq!(r.latency, 31.60);
        assert_eq!(r.data_center, "HKG");
        assert_eq!(r.region, "HKG");
        assert_eq!(r.city, "HKG");
    }

    #[test]
    fn headerless_rows_pick_layout_per_row() {
        let text = "104.17.110.237,4,4,0.00,31.60,18.75,HKG\n\
                    1.1.1.1,443,LAX,US-West,Los Angeles,5.2,15.5\n";
        let records = parse(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].port, 443);
        assert_eq!(records[0].speed, 18.75);
        assert_eq!(records[1].data_center, "LAX");
        assert_eq!(records[1].speed, 5.2);
        assert_eq!(records[1].latency, 15.5);
    }

    #[test]
    fn headerless_first_row_with_keyword_city_is_data() {
        let portland = "1.1.1.1,443,PDX,US,Portland,9.0,10.0\n\
                        1.0.0.1,443,LAX,US,LA,5.0,20.0\n";
        let ips: Vec<_> = parse(portland).unwrap().into_iter().map(|r| r.ip).collect();
        assert_eq!(ips, vec!["1.1.1.1", "1.0.0.1"]);

        let sentosa = "1.1.1.1,443,SIN,SG,Sentosa,9.0,10.0\n\
                       1.0.0.1,443,LAX,US,LA,5.0,20.0\n";
        let records = parse(sentosa).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].city, "Sentosa");
        assert_eq!(records[0].speed, 9.0);
    }

    #[test]
    fn header_keywords_match_whole_field_names() {
        assert!(ENGLISH.matches_header(&split_fields(
            "IP,Port,Data Center,Region,City,Speed (MB/s),Latency (ms)"
        )));
        assert!(LOCALIZED.matches_header(&split_fields(
            "IP 地址,已发送,已接收,丢包率,平均延迟,下载速度(MB/s),地区码"
        )));
        assert!(!ENGLISH.matches_header(&split_fields("x,443,PDX,US,Portland,9.0,10.0")));
        assert!(!LOCALIZED.matches_header(&split_fields("x,4,4,0.00,31.6,18.75,Sentosa")));
    }

    #[test]
    fn legacy_localized_output_has_no_location() {
        let text = "IP 地址,已发送,已接收,丢包率,平均延迟,下载速度 (MB/s)\n\
                    172.64.1.1,4,4,0.00,120.50,9.10\n";
        let records = parse(text).unwrap();
        assert_eq!(records[0].speed, 9.10);
        assert_eq!(records[0].latency, 120.50);
        assert!(records[0].data_center.is_empty());
    }

    #[test]
    fn not_available_and_empty_numbers_are_zero() {
        let text = "IP,Port,DataCenter,Region,City,Speed,Latency\n\
                    1.1.1.1,,LAX,US,LA,N/A,N/A\n\
                    1.0.0.1,443,NYC,US,NY,,\n";
        let records = parse(text).unwrap();
        assert_eq!(records[0].port, 0);
        assert_eq!(records[0].speed, 0.0);
        assert_eq!(records[0].latency, 0.0);
        assert_eq!(records[1].speed, 0.0);
    }

    #[test]
    fn not_available_marker_is_case_sensitive() {
        let text = "IP,Port,DataCenter,Region,City,Speed,Latency\n\
                    1.1.1.1,443,LAX,US,LA,n/a,10\n\
                    1.0.0.1,443,NYC,US,NY,3.0,10\n";
        let records = parse(text).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ip, "1.0.0.1");
    }

    #[test]
    fn whitespace_around_fields_is_trimmed() {
        let text = "  IP , Port , DataCenter , Region , City , Speed , Latency \n\
                     1.1.1.1 , 443 , LAX , US , LA , 5.5 , 20.0 \n";
        let records = parse(text).unwrap();
        assert_eq!(records[0].ip, "1.1.1.1");
        assert_eq!(records[0].data_center, "LAX");
        assert_eq!(records[0].speed, 5.5);
    }

    #[test]
    fn header_only_or_empty_input_is_results_empty() {
        assert!(matches!(
            parse("IP,Port,DataCenter,Region,City,Speed,Latency\n"),
            Err(Error::ResultsEmpty(_))
        ));
        assert!(matches!(parse(""), Err(Error::ResultsEmpty(_))));
        assert!(matches!(parse("\n\n  \n"), Err(Error::ResultsEmpty(_))));
    }

    #[test]
    fn byte_order_mark_does_not_hide_header() {
        let text = "\u{feff}IP,Port,DataCenter,Region,City,Speed,Latency\n1.1.1.1,443,LAX,US,LA,5,10\n";
        assert_eq!(parse(text).unwrap().len(), 1);
    }

    #[test]
    fn rows_with_wrong_width_or_bad_numbers_are_skipped() {
        let text = "IP,Port,DataCenter,Region,City,Speed,Latency\n\
                    1.1.1.1,443,LAX,US,LA,5.0,10.0\n\
                    1.1.1.2,443,LAX\n\
                    1.1.1.3,443,LAX,US,LA,fast,10.0\n\
                    ,443,LAX,US,LA,5.0,10.0\n\
                    1.1.1.4,99999,LAX,US,LA,5.0,10.0\n\
                    1.1.1.5,443,SJC,US,SJ,6.0,11.0\n";
        let ips: Vec<_> = parse(text).unwrap().into_iter().map(|r| r.ip).collect();
        assert_eq!(ips, vec!["1.1.1.1", "1.1.1.5"]);
    }

    #[tokio::test]
    async fn missing_file_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.csv");
        assert!(matches!(
            parse_file(&missing).await,
            Err(Error::ResultsFileNotFound(p)) if p == missing
        ));
    }

    #[tokio::test]
    async fn parse_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.csv");
        tokio::fs::write(&path, "1.1.1.1,443,LAX,US,LA,15.5,25.3\n")
            .await
            .unwrap();
        let records = parse_file(&path).await.unwrap();
        assert_eq!(records[0].ip, "1.1.1.1");
    }
}
