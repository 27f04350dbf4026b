//! Destination checks for outbound requests.
//!
//! Literal addresses are screened before the request is built. Host names
//! are screened by [`GuardedResolver`], which the dispatcher's client uses
//! for every connection, so the addresses checked are the ones dialed.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use thiserror::Error;
use url::{Host, Url};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("DNS lookup failed: {0}")]
    Dns(String),

    #[error("Destination not allowed: {0}")]
    Blocked(String),
}

/// Refuse non-HTTP URLs and restricted literal addresses unless
/// `allow_private` is set. Host names pass through to the resolver.
pub fn check(url: &str, allow_private: bool) -> Result<(), TargetError> {
    let parsed = Url::parse(url).map_err(|e| TargetError::InvalidUrl(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(TargetError::InvalidUrl(format!("scheme {}", parsed.scheme())));
    }
    let ip = match parsed.host() {
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip),
        Some(Host::Domain(_)) => return Ok(()),
        None => return Err(TargetError::InvalidUrl("missing host".into())),
    };
    screen(url, vec![SocketAddr::new(ip, 0)], allow_private).map(|_| ())
}

fn screen(
    host: &str,
    addrs: Vec<SocketAddr>,
    allow_private: bool,
) -> Result<Vec<SocketAddr>, TargetError> {
    if addrs.is_empty() {
        return Err(TargetError::Dns(format!("{host}: no addresses")));
    }
    if !allow_private
        && let Some(addr) = addrs.iter().find(|a| is_restricted(a.ip()))
    {
        return Err(TargetError::Blocked(addr.ip().to_string()));
    }
    Ok(addrs)
}

/// System lookup through `tokio::net::lookup_host`.
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(async move {
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((name.as_str(), 0))
                .await
                .map_err(|e| TargetError::Dns(format!("{}: {e}", name.as_str())))?
                .collect();
            Ok::<Addrs, BoxError>(Box::new(addrs.into_iter()))
        })
    }
}

/// Resolver for the outbound client. Fails the lookup when any address of
/// the host is restricted and `allow_private` is unset.
#[derive(Clone)]
pub struct GuardedResolver {
    inner: Arc<dyn Resolve>,
    allow_private: bool,
}

impl GuardedResolver {
    pub fn new(inner: Arc<dyn Resolve>, allow_private: bool) -> Self {
        Self {
            inner,
            allow_private,
        }
    }
}

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let inner = self.inner.clone();
        let allow_private = self.allow_private;
        Box::pin(async move {
            let host = name.as_str().to_string();
            let addrs: Vec<SocketAddr> = inner.resolve(name).await?.collect();
            let addrs = screen(&host, addrs, allow_private)?;
            Ok::<Addrs, BoxError>(Box::new(addrs.into_iter()))
        })
    }
}

/// Loopback, private, link-local, shared (CGNAT) and unspecified ranges.
pub fn is_restricted(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || (a == 100 && (b & 0xc0) == 64)
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_restricted(IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}
