use std::fmt;

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    NotAuthenticated,
    AddressFormat(String),
    CatalogParse(String),
    Resolution {
        phase: ResolutionPhase,
        url: String,
        detail: String,
    },
    PermissionFilter(String),
    CatalogNotAttached,
    Protocol(String),
}

/// Which stage of catalog resolution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPhase {
    Fetch,
    Parse,
}

impl fmt::Display for ResolutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionPhase::Fetch => write!(f, "fetch"),
            ResolutionPhase::Parse => write!(f, "parse"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::NotAuthenticated => write!(f, "not authenticated"),
            Error::AddressFormat(s) => write!(f, "invalid parameter address: {s:?}"),
            Error::CatalogParse(msg) => write!(f, "bundle parse error: {msg}"),
            Error::Resolution { phase, url, detail } => {
                write!(f, "catalog resolution failed ({phase} {url}): {detail}")
            }
            Error::PermissionFilter(msg) => write!(f, "malformed menu tree: {msg}"),
            Error::CatalogNotAttached => write!(f, "no asset catalog attached"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
