use crate::error::{ForwarderError, Result};

/// Which wire transport an upstream URL selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Udp,
    Tcp,
    Tls,
    Https,
    Quic,
}

#[derive(Debug, Clone)]
pub struct UpstreamUrl {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub path: String,
    /// `tcp+pipeline` / `tls+pipeline` / `h3`: request pipelined framing
    /// (or HTTP/3) instead of the scheme's historical default.
    pub pipeline: bool,
}

fn default_port(scheme: Scheme) -> u16 {
    match scheme {
        Scheme::Udp => 53,
        Scheme::Tcp => 53,
        Scheme::Tls => 853,
        Scheme::Https => 443,
        Scheme::Quic => 853,
    }
}

/// Parses `udp://`, `tcp://` (+ `tcp+pipeline`), `tls://` (+
/// `tls+pipeline`), `https://`, and `quic://` (+ `h3` alias for DoH over
/// HTTP/3) upstream URLs.
pub fn parse(raw: &str) -> Result<UpstreamUrl> {
    let (scheme_part, rest) = raw
        .split_once("://")
        .ok_or_else(|| ForwarderError::ConfigInvalid(format!("upstream url missing scheme: {raw}")))?;

    let (scheme, pipeline) = match scheme_part {
        "udp" => (Scheme::Udp, false),
        "tcp" => (Scheme::Tcp, false),
        "tcp+pipeline" => (Scheme::Tcp, true),
        "tls" => (Scheme::Tls, false),
        "tls+pipeline" => (Scheme::Tls, true),
        "https" => (Scheme::Https, false),
        "h3" => (Scheme::Https, true),
        "quic" => (Scheme::Quic, false),
        other => {
            return Err(ForwarderError::ConfigInvalid(format!(
                "unknown upstream scheme: {other}"
            )));
        }
    };

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port_str)) => {
            let port = port_str.parse::<u16>().map_err(|_| {
                ForwarderError::ConfigInvalid(format!("invalid port in upstream url: {raw}"))
            })?;
            (host.to_string(), port)
        }
        None => (authority.to_string(), default_port(scheme)),
    };

    if host.is_empty() {
        return Err(ForwarderError::ConfigInvalid(format!(
            "upstream url missing host: {raw}"
        )));
    }

    Ok(UpstreamUrl {
        scheme,
        host,
        port,
        path: path.to_string(),
        pipeline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults_per_scheme() {
        let udp = parse("udp://1.1.1.1").unwrap();
        assert_eq!(udp.scheme, Scheme::Udp);
        assert_eq!(udp.port, 53);

        let tls = parse("tls://dns.example.com").unwrap();
        assert_eq!(tls.scheme, Scheme::Tls);
        assert_eq!(tls.port, 853);

        let https = parse("https://dns.example.com/dns-query").unwrap();
        assert_eq!(https.scheme, Scheme::Https);
        assert_eq!(https.port, 443);
        assert_eq!(https.path, "/dns-query");
    }

    #[test]
    fn parses_pipeline_aliases() {
        let tcp_pipe = parse("tcp+pipeline://1.1.1.1:5353").unwrap();
        assert_eq!(tcp_pipe.scheme, Scheme::Tcp);
        assert!(tcp_pipe.pipeline);
        assert_eq!(tcp_pipe.port, 5353);

        let h3 = parse("h3://dns.example.com").unwrap();
        assert_eq!(h3.scheme, Scheme::Https);
        assert!(h3.pipeline);
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(parse("gopher://example.com").is_err());
    }
}
