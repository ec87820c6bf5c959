use crate::errors::ImageError;
use regex::Regex;
use std::ops::Range;

/// Name of a Docker-style image registry server
///
/// This is a domain name with an optional port. It names an index: the
/// actual network endpoints, protocol versions, and whether plain http is
/// acceptable are decided by a [crate::registry::RegistryService].
#[derive(Clone)]
pub struct Registry {
    serialized: String,
    domain_pos: Range<usize>,
    port: Option<u16>,
}

serialized_string_impls!(Registry);

impl Registry {
    /// Returns a reference to the existing string representation
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Parse a [prim@str] as a [Registry]
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(&format!("^{}$", Registry::regex_str())).unwrap();
        }
        let invalid = || ImageError::InvalidReferenceFormat(s.to_owned());
        let captures = RE.captures(s).ok_or_else(invalid)?;
        let port = match captures.name("reg_p") {
            None => None,
            Some(m) => Some(m.as_str().parse().map_err(|_| invalid())?),
        };
        Ok(Registry {
            serialized: s.to_owned(),
            domain_pos: captures.name("reg_d").unwrap().range(),
            port,
        })
    }

    /// Returns a reference to the domain portion of the string
    pub fn domain_str(&self) -> &str {
        &self.serialized[self.domain_pos.clone()]
    }

    /// Returns the port, if present
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Is this a loopback registry, which is never required to use TLS?
    pub fn is_localhost(&self) -> bool {
        let domain = self.domain_str();
        domain == "localhost" || domain.starts_with("127.")
    }

    pub(crate) fn regex_str() -> &'static str {
        concat!(
            "(?P<reg>",
            /*  */ "(?P<reg_d>", // domain
            /* -- */ "(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])",
            /* -- */ "(?:\\.(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]))*",
            /*  */ ")",
            /*  */ "(?::(?P<reg_p>[0-9]+))?", // port
            ")",
        )
    }
}
