//! Bug reports from the Debian bug tracking system.
//!
//! Bugs are queried once per package through the Debbugs SOAP interface and
//! cached in the working directory as `<package>.bugs` (or `.secbugs` for
//! the security-only query).

use crate::cache::ArtifactCache;
use crate::errors::{DebcompareError, Result};
use crate::models::bug::BugRecord;
use crate::network::Fetcher;
use chrono::DateTime;
use quick_xml::{Reader, escape::escape, events::Event};
use std::sync::Arc;

/// Debbugs limits how many bugs `get_status` accepts in one call
const STATUS_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugQuery {
    pub package: String,
    /// Only bugs tagged `security`, archived ones included
    pub security_only: bool,
}

impl BugQuery {
    pub fn new(package: &str, security_only: bool) -> Self {
        BugQuery {
            package: package.to_string(),
            security_only,
        }
    }

    fn cache_name(&self) -> String {
        let extension = if self.security_only { "secbugs" } else { "bugs" };
        format!("{}.{}", self.package, extension)
    }

    fn pairs(&self) -> Vec<(&str, &str)> {
        let mut pairs = vec![("package", self.package.as_str())];
        if self.security_only {
            pairs.push(("tag", "security"));
            pairs.push(("archive", "both"));
        }
        pairs
    }
}

pub trait BugTracker: Send + Sync {
    fn bugs(&self, query: &BugQuery) -> Result<Vec<BugRecord>>;
}

/// Returns the bugs for `query`, reusing the cached list unless `force`.
pub fn load_bugs(
    cache: &ArtifactCache,
    tracker: &dyn BugTracker,
    query: &BugQuery,
    force: bool,
) -> Result<Vec<BugRecord>> {
    let name = query.cache_name();
    if let Some(bugs) = cache.load_document(&name, force)? {
        log::debug!("Using cached bug list: {}", name);
        return Ok(bugs);
    }
    let bugs = tracker.bugs(query)?;
    log::info!("Found {} bugs for {}", bugs.len(), query.package);
    cache.store_document(&name, &bugs)?;
    Ok(bugs)
}

/// [`BugTracker`] speaking the Debbugs SOAP protocol.
pub struct DebbugsClient {
    fetcher: Arc<dyn Fetcher>,
    endpoint: String,
}

const SOAP_HEADERS: [(&str, &str); 2] = [
    ("Content-Type", "text/xml; charset=utf-8"),
    ("SOAPAction", "\"Debbugs/SOAP\""),
];

fn envelope(body: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/""#,
            r#" xmlns:soapenc="http://schemas.xmlsoap.org/soap/encoding/""#,
            r#" xmlns:xsi="http://www.w3.org/1999/XMLSchema-instance""#,
            r#" xmlns:xsd="http://www.w3.org/1999/XMLSchema""#,
            r#" soap:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">"#,
            "<soap:Body>{}</soap:Body></soap:Envelope>"
        ),
        body
    )
}

fn get_bugs_request(query: &BugQuery) -> String {
    let pairs = query.pairs();
    let items: String = pairs
        .iter()
        .flat_map(|(k, v)| [*k, *v])
        .map(|s| format!(r#"<ns:item xsi:type="xsd:string">{}</ns:item>"#, escape(s)))
        .collect();
    envelope(&format!(
        r#"<ns:get_bugs xmlns:ns="Debbugs/SOAP"><ns:query soapenc:arrayType="xsd:anyType[{}]" xsi:type="soapenc:Array">{}</ns:query></ns:get_bugs>"#,
        pairs.len() * 2,
        items
    ))
}

fn get_status_request(bug_numbers: &[u64]) -> String {
    let items: String = bug_numbers
        .iter()
        .map(|n| format!(r#"<ns:item xsi:type="xsd:int">{}</ns:item>"#, n))
        .collect();
    envelope(&format!(
        r#"<ns:get_status xmlns:ns="Debbugs/SOAP"><ns:bugs soapenc:arrayType="xsd:int[{}]" xsi:type="soapenc:Array">{}</ns:bugs></ns:get_status>"#,
        bug_numbers.len(),
        items
    ))
}

fn xml_error(e: impl std::fmt::Display) -> DebcompareError {
    DebcompareError::BugTracker(format!("malformed SOAP response: {}", e))
}

/// Bug numbers from a `get_bugs` response.
pub fn parse_bug_numbers(xml: &str) -> Result<Vec<u64>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut numbers = Vec::new();
    let mut in_item = false;
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => in_item = e.local_name().as_ref() == b"item",
            Event::Text(t) if in_item => {
                let text = t.unescape().map_err(xml_error)?;
                if let Ok(n) = text.trim().parse() {
                    numbers.push(n);
                }
            }
            Event::End(_) => in_item = false,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(numbers)
}

#[derive(Default)]
struct PartialBug {
    bug_number: Option<u64>,
    date: Option<i64>,
    subject: Option<String>,
}

impl PartialBug {
    fn set(&mut self, field: &str, text: String) {
        match field {
            "bug_num" => self.bug_number = text.trim().parse().ok(),
            "date" => self.date = text.trim().parse().ok(),
            "subject" => self.subject = Some(text),
            _ => {}
        }
    }

    /// Ends the current `value`, leaving `self` empty for the next one.
    fn complete(&mut self) -> Option<BugRecord> {
        let PartialBug {
            bug_number,
            date,
            subject,
        } = std::mem::take(self);
        Some(BugRecord {
            bug_number: bug_number?,
            date: DateTime::from_timestamp(date?, 0)?.naive_utc(),
            subject: subject?,
        })
    }
}

/// Bug records from a `get_status` response.
///
/// Each bug is a `value` element holding `bug_num`, `date` (unix time) and
/// `subject` among many other fields.
pub fn parse_bug_status(xml: &str) -> Result<Vec<BugRecord>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut bugs = Vec::new();
    let mut partial = PartialBug::default();
    let mut field: Option<String> = None;
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => {
                field = Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                text.clear();
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                partial.set(&name, String::new());
            }
            Event::Text(t) => text.push_str(&t.unescape().map_err(xml_error)?),
            Event::End(e) => {
                let name = e.local_name();
                if field.as_deref().map(str::as_bytes) == Some(name.as_ref()) {
                    partial.set(&String::from_utf8_lossy(name.as_ref()), std::mem::take(&mut text));
                }
                if name.as_ref() == b"value" {
                    bugs.extend(partial.complete());
                }
                field = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(bugs)
}

impl DebbugsClient {
    pub fn new(fetcher: Arc<dyn Fetcher>, endpoint: &str) -> Self {
        DebbugsClient {
            fetcher,
            endpoint: endpoint.to_string(),
        }
    }

    fn call(&self, request: &str) -> Result<String> {
        let response = self.fetcher.post(&self.endpoint, &SOAP_HEADERS, request)?;
        if !response.is_success() {
            return Err(DebcompareError::BugTracker(format!(
                "{} returned HTTP status {}",
                self.endpoint, response.status
            )));
        }
        Ok(response.text())
    }
}

impl BugTracker for DebbugsClient {
    fn bugs(&self, query: &BugQuery) -> Result<Vec<BugRecord>> {
        let numbers = parse_bug_numbers(&self.call(&get_bugs_request(query))?)?;
        log::debug!("{} bug numbers for {}", numbers.len(), query.package);

        let mut bugs = Vec::with_capacity(numbers.len());
        for batch in numbers.chunks(STATUS_BATCH_SIZE) {
            bugs.extend(parse_bug_status(&self.call(&get_status_request(batch))?)?);
        }
        Ok(bugs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{HttpResponse, testing::FakeFetcher};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const GET_BUGS_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" xmlns:soapenc="http://schemas.xmlsoap.org/soap/encoding/">
<soap:Body><get_bugsResponse xmlns="Debbugs/SOAP">
<soapenc:Array soapenc:arrayType="xsd:int[2]">
<item>946000</item><item>951234</item>
</soapenc:Array></get_bugsResponse></soap:Body></soap:Envelope>"#;

    const GET_STATUS_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
<soap:Body><get_statusResponse xmlns="Debbugs/SOAP"><s-gensym3>
<item><key>946000</key><value>
  <fixed_versions><item>foo/1.0-2</item></fixed_versions>
  <subject>foo: crash on &lt;empty&gt; input</subject>
  <date>1578700800</date>
  <tags>security</tags>
  <bug_num>946000</bug_num>
</value></item>
<item><key>951234</key><value>
  <bug_num>951234</bug_num>
  <subject/>
  <date>1578528000</date>
</value></item>
</s-gensym3></get_statusResponse></soap:Body></soap:Envelope>"#;

    #[test]
    fn parses_bug_numbers() {
        assert_eq!(parse_bug_numbers(GET_BUGS_RESPONSE).unwrap(), vec![946000, 951234]);
    }

    #[test]
    fn parses_bug_status() {
        let bugs = parse_bug_status(GET_STATUS_RESPONSE).unwrap();
        assert_eq!(bugs.len(), 2);
        assert_eq!(bugs[0].bug_number, 946000);
        assert_eq!(bugs[0].subject, "foo: crash on <empty> input");
        assert_eq!(bugs[0].date.to_string(), "2020-01-11 00:00:00");
        assert_eq!(bugs[1].bug_number, 951234);
        assert_eq!(bugs[1].subject, "");
        assert_eq!(bugs[1].date.to_string(), "2020-01-09 00:00:00");
    }

    #[test]
    fn incomplete_values_do_not_leak_into_the_next_bug() {
        let xml = r#"<get_statusResponse><s-gensym3>
<item><key>1</key><value><bug_num>1</bug_num><subject>no date</subject></value></item>
<item><key>2</key><value><date>1578700800</date><subject>no number</subject></value></item>
<item><key>3</key><value><bug_num>3</bug_num><date>99999999999999999</date><subject>bad date</subject></value></item>
<item><key>4</key><value><bug_num>4</bug_num><date>1578528000</date><subject>complete</subject></value></item>
</s-gensym3></get_statusResponse>"#;

        assert_eq!(
            parse_bug_status(xml).unwrap(),
            vec![BugRecord {
                bug_number: 4,
                date: DateTime::from_timestamp(1578528000, 0).unwrap().naive_utc(),
                subject: "complete".to_string(),
            }]
        );
    }

    #[test]
    fn query_values_are_xml_escaped() {
        let request = get_bugs_request(&BugQuery::new("foo<&>bar", false));
        assert!(request.contains(">foo&lt;&amp;&gt;bar<"));
    }

    #[test]
    fn security_query_adds_tag_and_archive() {
        let request = get_bugs_request(&BugQuery::new("foo", true));
        assert!(request.contains(r#"arrayType="xsd:anyType[6]""#));
        assert!(request.contains(">security<"));
        assert!(request.contains(">both<"));
        assert!(!get_bugs_request(&BugQuery::new("foo", false)).contains("security"));
    }

    struct StaticTracker(Vec<BugRecord>);

    impl BugTracker for StaticTracker {
        fn bugs(&self, _query: &BugQuery) -> Result<Vec<BugRecord>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn bug_list_is_cached_per_query() {
        let tmp = TempDir::new().unwrap();
        let cache = ArtifactCache::new(tmp.path()).unwrap();
        let first = StaticTracker(parse_bug_status(GET_STATUS_RESPONSE).unwrap());
        let query = BugQuery::new("foo", false);

        let bugs = load_bugs(&cache, &first, &query, false).unwrap();
        assert!(tmp.path().join("foo.bugs").is_file());

        let empty = StaticTracker(Vec::new());
        assert_eq!(load_bugs(&cache, &empty, &query, false).unwrap(), bugs);
        assert!(load_bugs(&cache, &empty, &query, true).unwrap().is_empty());
        assert!(load_bugs(&cache, &empty, &BugQuery::new("foo", true), false).unwrap().is_empty());
        assert!(tmp.path().join("foo.secbugs").is_file());
    }

    #[test]
    fn debbugs_client_round_trip() {
        let fetcher = Arc::new(FakeFetcher::new());
        let query = BugQuery::new("foo", false);
        let endpoint = "http://bugs.test/soap.cgi";
        fetcher.serve(
            &format!("{}#{}", endpoint, get_bugs_request(&query)),
            HttpResponse::ok(GET_BUGS_RESPONSE),
        );
        fetcher.serve(
            &format!("{}#{}", endpoint, get_status_request(&[946000, 951234])),
            HttpResponse::ok(GET_STATUS_RESPONSE),
        );

        let client = DebbugsClient::new(fetcher.clone(), endpoint);
        let bugs = client.bugs(&query).unwrap();
        assert_eq!(bugs.len(), 2);
        assert_eq!(fetcher.requests().len(), 2);
    }

    #[test]
    fn tracker_http_errors_are_reported() {
        let client = DebbugsClient::new(Arc::new(FakeFetcher::new()), "http://bugs.test/soap.cgi");
        assert!(matches!(
            client.bugs(&BugQuery::new("foo", false)),
            Err(DebcompareError::BugTracker(_))
        ));
    }
}
