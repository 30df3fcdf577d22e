use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::OriginError;

/// The (scheme, host, port) identity of a web page. All permission state is
/// keyed by it.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Origin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl Origin {
    /// Builds the origin of `url`. The port is the explicit port, or the
    /// scheme's default when it has one.
    pub fn from_url(url: &Url) -> Result<Self, OriginError> {
        if url.cannot_be_a_base() {
            return Err(OriginError::Opaque(url.to_string()));
        }
        let scheme = url.scheme().to_string();
        let host = match url.host_str() {
            Some(host) => host.to_ascii_lowercase(),
            // file:// URLs are the only tuple origins without a host.
            None if scheme == "file" => String::new(),
            None => return Err(OriginError::MissingHost(url.to_string())),
        };
        Ok(Self {
            scheme,
            host,
            port: url.port_or_known_default(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    fn default_port(&self) -> Option<u16> {
        match self.scheme.as_str() {
            "http" | "ws" => Some(80),
            "https" | "wss" => Some(443),
            "ftp" => Some(21),
            _ => None,
        }
    }
}

impl FromStr for Origin {
    type Err = OriginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_url(&Url::parse(s)?)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        match self.port {
            Some(port) if Some(port) != self.default_port() => write!(f, ":{port}"),
            _ => Ok(()),
        }
    }
}
