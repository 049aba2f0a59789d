use std::{ fmt, net::IpAddr, sync::OnceLock };

use regex::Regex;

const URL_PATTERN: &str = r"^[a-zA-Z][a-zA-Z0-9+.-]*://\S+$";
// md5, sha1, sha256
const HASH_PATTERN: &str = r"^(?:[0-9a-fA-F]{32}|[0-9a-fA-F]{40}|[0-9a-fA-F]{64})$";
const DOMAIN_PATTERN: &str = r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,63}\.?$";

static URL_RE: OnceLock<Option<Regex>> = OnceLock::new();
static HASH_RE: OnceLock<Option<Regex>> = OnceLock::new();
static DOMAIN_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// Best guess at what an indicator is. Only used to annotate logs, the
/// backend gets the query as typed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IocKind {
    Ip,
    Url,
    Hash,
    Domain,
    Unknown,
}

fn is_match(cell: &OnceLock<Option<Regex>>, pattern: &str, s: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .map(|re| re.is_match(s))
        .unwrap_or(false)
}

impl IocKind {
    pub fn classify(ioc: &str) -> IocKind {
        let s = ioc.trim();
        if s.is_empty() {
            return IocKind::Unknown;
        }
        if s.parse::<IpAddr>().is_ok() {
            IocKind::Ip
        } else if is_match(&URL_RE, URL_PATTERN, s) {
            IocKind::Url
        } else if is_match(&HASH_RE, HASH_PATTERN, s) {
            IocKind::Hash
        } else if is_match(&DOMAIN_RE, DOMAIN_PATTERN, s) {
            IocKind::Domain
        } else {
            IocKind::Unknown
        }
    }
}

impl fmt::Display for IocKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            IocKind::Ip => "ip",
            IocKind::Url => "url",
            IocKind::Hash => "hash",
            IocKind::Domain => "domain",
            IocKind::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod test {
    use table_test::table_test;

    use super::*;

    #[test]
    fn test_classify() {
        let table = vec![
            ("8.8.8.8", IocKind::Ip),
            ("2001:4860:4860::8888", IocKind::Ip),
            (" 1.2.3.4 ", IocKind::Ip),
            ("https://evil.example.com/payload.exe", IocKind::Url),
            ("hxxp://defanged.example", IocKind::Url),
            ("44d88612fea8a8f36de82e1278abb02f", IocKind::Hash),
            ("3395856ce81f2b7382dee72602f798b642f14140", IocKind::Hash),
            ("275a021bbfb6489e54d471899f7db9d1663fc695ec2fe2a2c4538aabf651fd0f", IocKind::Hash),
            ("example.com", IocKind::Domain),
            ("mail.sub-domain.example.co.uk", IocKind::Domain),
            ("deadbeef", IocKind::Unknown),
            ("not an indicator", IocKind::Unknown),
            ("", IocKind::Unknown),
            ("999.1.1.1", IocKind::Unknown)
        ];
        for (validator, input, expected) in table_test!(table) {
            let actual = IocKind::classify(input);
            validator
                .given(&format!("{:?}", input))
                .when("classify")
                .then(&format!("it should be {}", expected))
                .assert_eq(expected, actual);
        }
    }
}
